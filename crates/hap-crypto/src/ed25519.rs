//! Ed25519 long-term identity keys and signature verification.

use std::fmt;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hap_core::CryptoError;
use rand::rngs::OsRng;
use zeroize::ZeroizeOnDrop;

/// Long-term signing identity: LTPK plus the seed it derives from.
#[derive(Clone, ZeroizeOnDrop)]
pub struct IdentityKeyPair {
    #[zeroize(skip)]
    public: [u8; 32],
    seed: [u8; 32],
}

impl IdentityKeyPair {
    pub fn generate() -> Self {
        Self::from_signing_key(&SigningKey::generate(&mut OsRng))
    }

    /// Rebuild a stored identity.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self::from_signing_key(&SigningKey::from_bytes(seed))
    }

    fn from_signing_key(key: &SigningKey) -> Self {
        Self {
            public: key.verifying_key().to_bytes(),
            seed: key.to_bytes(),
        }
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.public
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        SigningKey::from_bytes(&self.seed).sign(message).to_bytes()
    }

    /// Seed to persist; [`from_seed`](Self::from_seed) restores the pair.
    pub fn seed(&self) -> [u8; 32] {
        self.seed
    }
}

impl fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("public", &hex::encode(self.public))
            .finish_non_exhaustive()
    }
}

/// Check `signature` over `message` against a raw 32-byte public key.
///
/// Accepts slices so callers can pass TLV values directly; wrong lengths are
/// reported as a bad key or bad signature.
pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    let public_key: &[u8; 32] = public_key.try_into().map_err(|_| CryptoError::InvalidPublicKey)?;
    let signature: &[u8; 64] = signature.try_into().map_err(|_| CryptoError::BadSignature)?;

    let verifying_key =
        VerifyingKey::from_bytes(public_key).map_err(|_| CryptoError::InvalidPublicKey)?;
    verifying_key
        .verify(message, &Signature::from_bytes(signature))
        .map_err(|_| CryptoError::BadSignature)
}
