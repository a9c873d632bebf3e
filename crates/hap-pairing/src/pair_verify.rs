//! HomeKit pair-verify (M1-M4), accessory side.
//!
//! Authenticates an already-paired controller on a fresh connection and
//! derives the traffic keys for the frame codec.

use std::mem;

use hap_core::{CryptoError, PairingError};
use hap_crypto::aead::{decrypt_with_nonce, encrypt_with_nonce, nonce_from_string};
use hap_crypto::curve25519::EphemeralKeyPair;
use hap_crypto::{ed25519, EncryptionKey, Role, SessionKeys, SharedSecret, Tlv8, TlvType};
use tracing::{debug, info, warn};

use crate::context::PairingContext;
use crate::fields;
use crate::registry::ConnectionHandle;

const PV_MSG02_NONCE: &[u8] = b"PV-Msg02";
const PV_MSG03_NONCE: &[u8] = b"PV-Msg03";

/// Per-connection pair-verify state.
#[derive(Default)]
pub enum PairVerify {
    #[default]
    Start,
    /// M2 sent, waiting for the controller's signed identity.
    KeysExchanged {
        shared_secret: SharedSecret,
        encryption_key: EncryptionKey,
        own_public: [u8; 32],
        peer_public: [u8; 32],
    },
    Established,
}

/// Outcome of a verified M3: who the peer is and the accessory's traffic keys.
pub struct VerifiedSession {
    pub peer_id: String,
    pub keys: SessionKeys,
}

/// Response to one pair-verify request.
///
/// `session` is set once M4 has been produced. The caller writes the
/// response in plaintext and only then installs the frame codec.
pub struct VerifyStep {
    pub response: Tlv8,
    pub session: Option<VerifiedSession>,
}

impl VerifyStep {
    fn reply(response: Tlv8) -> Self {
        Self {
            response,
            session: None,
        }
    }
}

impl PairVerify {
    pub fn new() -> Self {
        Self::Start
    }

    pub fn state_name(&self) -> &'static str {
        match self {
            PairVerify::Start => "Start",
            PairVerify::KeysExchanged { .. } => "KeysExchanged",
            PairVerify::Established => "Established",
        }
    }

    /// Process one `/pair-verify` request.
    ///
    /// A new M1 always restarts the exchange with fresh ephemeral keys.
    pub fn handle(
        &mut self,
        request: &Tlv8,
        conn: &ConnectionHandle,
        ctx: &PairingContext,
    ) -> VerifyStep {
        let state = request.state().unwrap_or(0);
        let current = mem::take(self);

        let result = match (state, current) {
            (1, _) => exchange_keys(request, conn, ctx).map(|(response, next)| {
                *self = next;
                VerifyStep::reply(response)
            }),
            (
                3,
                PairVerify::KeysExchanged {
                    shared_secret,
                    encryption_key,
                    own_public,
                    peer_public,
                },
            ) => finish(
                request,
                &shared_secret,
                &encryption_key,
                &own_public,
                &peer_public,
                conn,
                ctx,
            )
            .map(|step| {
                *self = PairVerify::Established;
                step
            }),
            (_, current) => Err(PairingError::StateMismatch {
                expected: match current {
                    PairVerify::KeysExchanged { .. } => 3,
                    _ => 1,
                },
                actual: state,
            }),
        };

        result.unwrap_or_else(|e| {
            warn!(conn = %conn.id(), state, error = %e, "Pair-verify rejected");
            VerifyStep::reply(Tlv8::error_response(state.wrapping_add(1), e.tlv_code()))
        })
    }
}

/// M1 -> M2: ephemeral key agreement and signed accessory proof.
fn exchange_keys(
    request: &Tlv8,
    conn: &ConnectionHandle,
    ctx: &PairingContext,
) -> Result<(Tlv8, PairVerify), PairingError> {
    let peer_public = fields::public_key(request)?;

    let ephemeral = EphemeralKeyPair::generate();
    let own_public = ephemeral.public_key();
    let shared_secret = ephemeral.diffie_hellman(&peer_public).map_err(|e| match e {
        CryptoError::InvalidPublicKey => PairingError::InvalidPublicKey,
        other => PairingError::Decryption(other),
    })?;
    let encryption_key = SessionKeys::derive_pair_verify_key(&shared_secret)?;

    let identity = ctx.store().bridge_identity();
    let accessory_info = fields::concat(&[
        own_public.as_slice(),
        identity.pairing_id().as_bytes(),
        peer_public.as_slice(),
    ]);
    let signature = identity.sign(&accessory_info);

    let sub = Tlv8::new()
        .with_str(TlvType::Identifier, identity.pairing_id())
        .with_bytes(TlvType::Signature, signature.to_vec());
    let encrypted = encrypt_with_nonce(
        encryption_key.as_bytes(),
        &nonce_from_string(PV_MSG02_NONCE),
        &sub.encode(),
    );
    debug!(conn = %conn.id(), "Pair-verify M1, sending ephemeral key");

    let response = Tlv8::state_only(2)
        .with_bytes(TlvType::PublicKey, own_public.to_vec())
        .with_bytes(TlvType::EncryptedData, encrypted);
    Ok((
        response,
        PairVerify::KeysExchanged {
            shared_secret,
            encryption_key,
            own_public,
            peer_public,
        },
    ))
}

/// M3 -> M4: authenticate the controller and derive traffic keys.
fn finish(
    request: &Tlv8,
    shared_secret: &SharedSecret,
    encryption_key: &EncryptionKey,
    own_public: &[u8; 32],
    peer_public: &[u8; 32],
    conn: &ConnectionHandle,
    ctx: &PairingContext,
) -> Result<VerifyStep, PairingError> {
    let encrypted = fields::bytes(request, TlvType::EncryptedData)?;
    let decrypted = decrypt_with_nonce(
        encryption_key.as_bytes(),
        &nonce_from_string(PV_MSG03_NONCE),
        encrypted,
    )?;

    let sub = Tlv8::parse(&decrypted);
    let peer_id = fields::text(&sub, TlvType::Identifier)?;
    let signature = fields::bytes(&sub, TlvType::Signature)?;

    let record = ctx
        .store()
        .get_pairing(peer_id)
        .ok_or_else(|| PairingError::UnknownPeer(peer_id.to_string()))?;

    let controller_info = fields::concat(&[
        peer_public.as_slice(),
        peer_id.as_bytes(),
        own_public.as_slice(),
    ]);
    ed25519::verify(&record.public_key, &controller_info, signature)
        .map_err(|_| PairingError::SignatureInvalid)?;

    let keys = SessionKeys::derive_control_keys(shared_secret, Role::Accessory)?;
    info!(conn = %conn.id(), peer = %peer_id, "Pair-verify complete");

    Ok(VerifyStep {
        response: Tlv8::state_only(4),
        session: Some(VerifiedSession {
            peer_id: peer_id.to_string(),
            keys,
        }),
    })
}
