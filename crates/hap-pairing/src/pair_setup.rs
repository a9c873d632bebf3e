//! HomeKit pair-setup (M1-M6), accessory side.
//!
//! Establishes the first admin pairing from the setup code using SRP-6a.
//! The exchange is strictly linear; any failure answers the controller with
//! `{State: n+1, Error: code}` and drops the connection back to the start.

use std::mem;

use hap_core::{BridgeStatus, CryptoError, PairingError, PairingRecord};
use hap_crypto::aead::{decrypt_with_nonce, encrypt_with_nonce, nonce_from_string};
use hap_crypto::srp::{SrpServer, SrpSession, SRP_IDENTITY};
use hap_crypto::{ed25519, hkdf, EncryptionKey, SessionKeys, SharedSecret, Tlv8, TlvType};
use tracing::{debug, info, warn};

use crate::context::PairingContext;
use crate::fields;
use crate::registry::ConnectionId;

/// Nonce for pair-setup M5 decryption.
const PS_MSG05_NONCE: &[u8] = b"PS-Msg05";
/// Nonce for pair-setup M6 encryption.
const PS_MSG06_NONCE: &[u8] = b"PS-Msg06";

const METHOD_PAIR_SETUP: u8 = 0x00;
const METHOD_PAIR_SETUP_WITH_AUTH: u8 = 0x01;

/// Per-connection pair-setup state.
#[derive(Default)]
pub enum PairSetup {
    #[default]
    Start,
    /// M2 sent, waiting for the controller's SRP proof.
    SrpStarted { srp: SrpServer },
    /// M4 sent, waiting for the controller's encrypted identity.
    SrpVerified {
        session_key: SharedSecret,
        encryption_key: EncryptionKey,
    },
    Completed,
}

impl PairSetup {
    pub fn new() -> Self {
        Self::Start
    }

    /// Name of the current state, for logging.
    pub fn state_name(&self) -> &'static str {
        match self {
            PairSetup::Start => "Start",
            PairSetup::SrpStarted { .. } => "SrpStarted",
            PairSetup::SrpVerified { .. } => "SrpVerified",
            PairSetup::Completed => "Completed",
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, PairSetup::Completed)
    }

    fn expected_state(&self) -> u8 {
        match self {
            PairSetup::Start | PairSetup::Completed => 1,
            PairSetup::SrpStarted { .. } => 3,
            PairSetup::SrpVerified { .. } => 5,
        }
    }

    /// Process one `/pair-setup` request and produce the response TLV.
    pub fn handle(&mut self, request: &Tlv8, conn: ConnectionId, ctx: &PairingContext) -> Tlv8 {
        let state = request.state().unwrap_or(0);
        let current = mem::take(self);

        let result = match (state, current) {
            (1, _) => start(request, conn, ctx),
            (3, PairSetup::SrpStarted { srp }) => verify_proof(request, &srp, conn, ctx),
            (
                5,
                PairSetup::SrpVerified {
                    session_key,
                    encryption_key,
                },
            ) => exchange(request, &session_key, &encryption_key, conn, ctx),
            (_, current) => Err(PairingError::StateMismatch {
                expected: current.expected_state(),
                actual: state,
            }),
        };

        match result {
            Ok((response, next)) => {
                *self = next;
                response
            }
            Err(e) => {
                warn!(%conn, state, error = %e, "Pair-setup rejected");
                ctx.gate().release(conn);
                Tlv8::error_response(state.wrapping_add(1), e.tlv_code())
            }
        }
    }

    /// Abandon any handshake in progress, releasing the setup gate.
    pub fn abort(&mut self, conn: ConnectionId, ctx: &PairingContext) {
        if !matches!(self, PairSetup::Start | PairSetup::Completed) {
            debug!(%conn, state = self.state_name(), "Pair-setup aborted");
        }
        *self = PairSetup::Start;
        ctx.gate().release(conn);
    }
}

type Step = Result<(Tlv8, PairSetup), PairingError>;

/// M1 -> M2: start an SRP session.
fn start(request: &Tlv8, conn: ConnectionId, ctx: &PairingContext) -> Step {
    let method = request.method().unwrap_or(METHOD_PAIR_SETUP);
    if method != METHOD_PAIR_SETUP && method != METHOD_PAIR_SETUP_WITH_AUTH {
        return Err(PairingError::UnsupportedMethod(method));
    }

    if ctx.store().bridge_identity().is_paired() {
        return Err(PairingError::AlreadyPaired);
    }
    ctx.gate().try_acquire(conn)?;

    let srp = SrpServer::new(SRP_IDENTITY, ctx.setup_code().as_bytes());
    debug!(%conn, method, "Pair-setup M1, sending SRP salt and public key");

    let response = Tlv8::state_only(2)
        .with_bytes(TlvType::PublicKey, srp.public_key())
        .with_bytes(TlvType::Salt, srp.salt().to_vec());
    Ok((response, PairSetup::SrpStarted { srp }))
}

/// M3 -> M4: check the controller's SRP proof.
fn verify_proof(request: &Tlv8, srp: &SrpServer, conn: ConnectionId, ctx: &PairingContext) -> Step {
    let client_public = fields::bytes(request, TlvType::PublicKey)?;
    let client_proof = fields::bytes(request, TlvType::Proof)?;

    let SrpSession {
        session_key,
        server_proof,
    } = srp
        .verify_client(client_public, client_proof)
        .map_err(|e| match e {
            CryptoError::ProofMismatch => {
                ctx.gate().record_failure();
                PairingError::SrpVerificationFailed
            }
            _ => PairingError::InvalidPublicKey,
        })?;

    let encryption_key = SessionKeys::derive_pair_setup_key(&session_key)?;
    debug!(%conn, "Pair-setup M3 verified, sending server proof");

    let response = Tlv8::state_only(4).with_bytes(TlvType::Proof, server_proof);
    Ok((
        response,
        PairSetup::SrpVerified {
            session_key,
            encryption_key,
        },
    ))
}

/// M5 -> M6: verify and store the controller, answer with the bridge identity.
fn exchange(
    request: &Tlv8,
    session_key: &SharedSecret,
    encryption_key: &EncryptionKey,
    conn: ConnectionId,
    ctx: &PairingContext,
) -> Step {
    let encrypted = fields::bytes(request, TlvType::EncryptedData)?;
    let decrypted = decrypt_with_nonce(
        encryption_key.as_bytes(),
        &nonce_from_string(PS_MSG05_NONCE),
        encrypted,
    )?;

    let sub = Tlv8::parse(&decrypted);
    let controller_id = fields::text(&sub, TlvType::Identifier)?;
    let controller_ltpk = fields::public_key(&sub)?;
    let signature = fields::bytes(&sub, TlvType::Signature)?;

    let controller_x = hkdf::derive_controller_sign_key(session_key.as_bytes())?;
    let controller_info = fields::concat(&[
        controller_x.as_slice(),
        controller_id.as_bytes(),
        controller_ltpk.as_slice(),
    ]);
    ed25519::verify(&controller_ltpk, &controller_info, signature)
        .map_err(|_| PairingError::SignatureInvalid)?;

    if !ctx
        .store()
        .save_pairing(PairingRecord::admin(controller_id, controller_ltpk))
    {
        return Err(PairingError::StorageFailed(controller_id.to_string()));
    }

    let identity = ctx.store().bridge_identity();
    let accessory_ltpk = identity.public_key();
    let accessory_x = hkdf::derive_accessory_sign_key(session_key.as_bytes())?;
    let accessory_info = fields::concat(&[
        accessory_x.as_slice(),
        identity.pairing_id().as_bytes(),
        accessory_ltpk.as_slice(),
    ]);
    let accessory_signature = identity.sign(&accessory_info);

    let sub = Tlv8::new()
        .with_str(TlvType::Identifier, identity.pairing_id())
        .with_bytes(TlvType::PublicKey, accessory_ltpk.to_vec())
        .with_bytes(TlvType::Signature, accessory_signature.to_vec());
    let encrypted = encrypt_with_nonce(
        encryption_key.as_bytes(),
        &nonce_from_string(PS_MSG06_NONCE),
        &sub.encode(),
    );

    ctx.store().set_bridge_status(BridgeStatus::Paired);
    ctx.advertiser().reload_service();
    ctx.gate().release(conn);
    info!(%conn, peer = %controller_id, "Pair-setup complete, controller stored as admin");

    let response = Tlv8::state_only(6).with_bytes(TlvType::EncryptedData, encrypted);
    Ok((response, PairSetup::Completed))
}
