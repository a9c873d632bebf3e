//! Controller side of pair-setup and pair-verify.
//!
//! Drives both handshakes the way an iOS controller does. The bridge uses it
//! to exercise its own accessory side in tests and for diagnostics against a
//! running instance.

use std::path::Path;

use hap_core::{PairingError, StorageError};
use hap_crypto::aead::{decrypt_with_nonce, encrypt_with_nonce, nonce_from_string};
use hap_crypto::curve25519::EphemeralKeyPair;
use hap_crypto::ed25519::{self, IdentityKeyPair};
use hap_crypto::srp::{SrpChallenge, SrpClient, SrpProof, SALT_LEN, SRP_IDENTITY};
use hap_crypto::{hkdf, EncryptionKey, Role, SessionKeys, SharedSecret, Tlv8, TlvType};
use serde::{Deserialize, Serialize};

use crate::fields;

/// Controller identity: Ed25519 keypair plus a stable pairing identifier.
///
/// The same identifier must be sent in pair-setup M5 and every pair-verify
/// M3, otherwise the accessory will not find the pairing.
#[derive(Clone)]
pub struct ControllerIdentity {
    id: String,
    keypair: IdentityKeyPair,
}

#[derive(Serialize, Deserialize)]
struct StoredController {
    id: String,
    seed: String,
}

impl ControllerIdentity {
    /// Random keypair with a UUID-shaped id derived from the public key.
    pub fn generate() -> Self {
        Self::from_keypair(IdentityKeyPair::generate())
    }

    pub fn from_keypair(keypair: IdentityKeyPair) -> Self {
        let hex = hex::encode_upper(&keypair.public_key()[..16]);
        let id = format!(
            "{}-{}-{}-{}-{}",
            &hex[0..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..32]
        );
        Self { id, keypair }
    }

    pub fn with_id(keypair: IdentityKeyPair, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            keypair,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn keypair(&self) -> &IdentityKeyPair {
        &self.keypair
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.keypair.public_key()
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.keypair.sign(message)
    }

    /// Load from a JSON file holding the id and hex-encoded seed.
    pub fn load(path: &Path) -> Result<Self, StorageError> {
        let contents = std::fs::read_to_string(path)?;
        let stored: StoredController =
            serde_json::from_str(&contents).map_err(|e| StorageError::Corrupt(e.to_string()))?;
        let seed: [u8; 32] = hex::decode(&stored.seed)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?
            .try_into()
            .map_err(|v: Vec<u8>| {
                StorageError::Corrupt(format!("seed must be 32 bytes, got {}", v.len()))
            })?;

        Ok(Self::with_id(IdentityKeyPair::from_seed(&seed), stored.id))
    }

    pub fn save(&self, path: &Path) -> Result<(), StorageError> {
        let stored = StoredController {
            id: self.id.clone(),
            seed: hex::encode(self.keypair.seed()),
        };
        let json = serde_json::to_string_pretty(&stored)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load_or_generate(path: &Path) -> Result<Self, StorageError> {
        if path.exists() {
            Self::load(path)
        } else {
            let identity = Self::generate();
            identity.save(path)?;
            Ok(identity)
        }
    }
}

/// Accessory identity learned from pair-setup M6.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessoryInfo {
    pub pairing_id: String,
    pub public_key: [u8; 32],
}

/// Controller-side pair-setup: M1, M3, M5 out; M2, M4, M6 in.
pub struct SetupClient {
    identity: ControllerIdentity,
    srp: SrpClient,
    proof: Option<SrpProof>,
    encryption_key: Option<EncryptionKey>,
}

impl SetupClient {
    pub fn new(setup_code: &str, identity: ControllerIdentity) -> Self {
        Self {
            identity,
            srp: SrpClient::new(SRP_IDENTITY, setup_code.as_bytes()),
            proof: None,
            encryption_key: None,
        }
    }

    pub fn m1(&self) -> Tlv8 {
        Tlv8::state_only(1).with_u8(TlvType::Method, 0x00)
    }

    /// Answer the accessory's salt and public key with A and the proof M1.
    pub fn handle_m2(&mut self, m2: &Tlv8) -> Result<Tlv8, PairingError> {
        fields::expect_state(m2, 2)?;
        let salt: [u8; SALT_LEN] = fields::bytes(m2, TlvType::Salt)?
            .try_into()
            .map_err(|_| PairingError::InvalidTlv("salt must be 16 bytes".to_string()))?;
        let server_public_key = fields::bytes(m2, TlvType::PublicKey)?.to_vec();

        let proof = self
            .srp
            .process_challenge(&SrpChallenge {
                salt,
                server_public_key,
            })
            .map_err(|_| PairingError::InvalidPublicKey)?;

        let m3 = Tlv8::state_only(3)
            .with_bytes(TlvType::PublicKey, self.srp.public_key())
            .with_bytes(TlvType::Proof, proof.client_proof.clone());
        self.proof = Some(proof);
        Ok(m3)
    }

    /// Check the accessory's proof and send the encrypted controller identity.
    pub fn handle_m4(&mut self, m4: &Tlv8) -> Result<Tlv8, PairingError> {
        fields::expect_state(m4, 4)?;
        let proof = self
            .proof
            .as_ref()
            .ok_or(PairingError::StateMismatch { expected: 2, actual: 4 })?;

        let server_proof = fields::bytes(m4, TlvType::Proof)?;
        if !self.srp.verify_server_proof(server_proof, &proof.expected_server_proof) {
            return Err(PairingError::SrpVerificationFailed);
        }

        let session_key = SharedSecret::new(proof.shared_secret.clone());
        let encryption_key = SessionKeys::derive_pair_setup_key(&session_key)?;

        let controller_x = hkdf::derive_controller_sign_key(session_key.as_bytes())?;
        let ltpk = self.identity.public_key();
        let info = fields::concat(&[
            controller_x.as_slice(),
            self.identity.id().as_bytes(),
            ltpk.as_slice(),
        ]);
        let signature = self.identity.sign(&info);

        let sub = Tlv8::new()
            .with_str(TlvType::Identifier, self.identity.id())
            .with_bytes(TlvType::PublicKey, ltpk.to_vec())
            .with_bytes(TlvType::Signature, signature.to_vec());
        let encrypted = encrypt_with_nonce(
            encryption_key.as_bytes(),
            &nonce_from_string(b"PS-Msg05"),
            &sub.encode(),
        );

        self.encryption_key = Some(encryption_key);
        Ok(Tlv8::state_only(5).with_bytes(TlvType::EncryptedData, encrypted))
    }

    /// Decrypt and verify the accessory's identity.
    pub fn handle_m6(&mut self, m6: &Tlv8) -> Result<AccessoryInfo, PairingError> {
        fields::expect_state(m6, 6)?;
        let (proof, encryption_key) = match (&self.proof, &self.encryption_key) {
            (Some(proof), Some(key)) => (proof, key),
            _ => return Err(PairingError::StateMismatch { expected: 4, actual: 6 }),
        };

        let encrypted = fields::bytes(m6, TlvType::EncryptedData)?;
        let decrypted = decrypt_with_nonce(
            encryption_key.as_bytes(),
            &nonce_from_string(b"PS-Msg06"),
            encrypted,
        )?;

        let sub = Tlv8::parse(&decrypted);
        let pairing_id = fields::text(&sub, TlvType::Identifier)?;
        let public_key = fields::public_key(&sub)?;
        let signature = fields::bytes(&sub, TlvType::Signature)?;

        let accessory_x = hkdf::derive_accessory_sign_key(&proof.shared_secret)?;
        let info = fields::concat(&[
            accessory_x.as_slice(),
            pairing_id.as_bytes(),
            public_key.as_slice(),
        ]);
        ed25519::verify(&public_key, &info, signature).map_err(|_| PairingError::SignatureInvalid)?;

        Ok(AccessoryInfo {
            pairing_id: pairing_id.to_string(),
            public_key,
        })
    }
}

/// Controller-side pair-verify: M1, M3 out; M2, M4 in.
pub struct VerifyClient {
    identity: ControllerIdentity,
    accessory_ltpk: [u8; 32],
    ephemeral: Option<EphemeralKeyPair>,
    own_public: [u8; 32],
    shared_secret: Option<SharedSecret>,
}

impl VerifyClient {
    /// `accessory_ltpk` is the key learned during pair-setup.
    pub fn new(identity: ControllerIdentity, accessory_ltpk: [u8; 32]) -> Self {
        let ephemeral = EphemeralKeyPair::generate();
        Self {
            identity,
            accessory_ltpk,
            own_public: ephemeral.public_key(),
            ephemeral: Some(ephemeral),
            shared_secret: None,
        }
    }

    pub fn m1(&self) -> Tlv8 {
        Tlv8::state_only(1).with_bytes(TlvType::PublicKey, self.own_public.to_vec())
    }

    /// Verify the accessory's signature and answer with our own.
    pub fn handle_m2(&mut self, m2: &Tlv8) -> Result<Tlv8, PairingError> {
        fields::expect_state(m2, 2)?;
        let accessory_public = fields::public_key(m2)?;
        let encrypted = fields::bytes(m2, TlvType::EncryptedData)?;

        let ephemeral = self
            .ephemeral
            .take()
            .ok_or(PairingError::StateMismatch { expected: 1, actual: 2 })?;
        let shared_secret = ephemeral
            .diffie_hellman(&accessory_public)
            .map_err(|_| PairingError::InvalidPublicKey)?;
        let key = SessionKeys::derive_pair_verify_key(&shared_secret)?;

        let decrypted =
            decrypt_with_nonce(key.as_bytes(), &nonce_from_string(b"PV-Msg02"), encrypted)?;
        let sub = Tlv8::parse(&decrypted);
        let accessory_id = fields::text(&sub, TlvType::Identifier)?;
        let accessory_signature = fields::bytes(&sub, TlvType::Signature)?;

        let accessory_info = fields::concat(&[
            accessory_public.as_slice(),
            accessory_id.as_bytes(),
            self.own_public.as_slice(),
        ]);
        ed25519::verify(&self.accessory_ltpk, &accessory_info, accessory_signature)
            .map_err(|_| PairingError::SignatureInvalid)?;

        let controller_info = fields::concat(&[
            self.own_public.as_slice(),
            self.identity.id().as_bytes(),
            accessory_public.as_slice(),
        ]);
        let signature = self.identity.sign(&controller_info);

        let sub = Tlv8::new()
            .with_str(TlvType::Identifier, self.identity.id())
            .with_bytes(TlvType::Signature, signature.to_vec());
        let encrypted =
            encrypt_with_nonce(key.as_bytes(), &nonce_from_string(b"PV-Msg03"), &sub.encode());

        self.shared_secret = Some(shared_secret);
        Ok(Tlv8::state_only(3).with_bytes(TlvType::EncryptedData, encrypted))
    }

    /// Confirm M4 and derive the controller's traffic keys.
    pub fn handle_m4(&mut self, m4: &Tlv8) -> Result<SessionKeys, PairingError> {
        fields::expect_state(m4, 4)?;
        let shared_secret = self
            .shared_secret
            .take()
            .ok_or(PairingError::StateMismatch { expected: 2, actual: 4 })?;
        Ok(SessionKeys::derive_control_keys(&shared_secret, Role::Controller)?)
    }
}
