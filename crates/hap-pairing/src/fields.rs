//! Required-field accessors for pairing messages.

use hap_core::PairingError;
use hap_crypto::{Tlv8, TlvType};

pub(crate) fn bytes(tlv: &Tlv8, tag: TlvType) -> Result<&[u8], PairingError> {
    tlv.get_bytes(tag).ok_or(PairingError::MissingTlv(tag as u8))
}

pub(crate) fn text(tlv: &Tlv8, tag: TlvType) -> Result<&str, PairingError> {
    tlv.get_str(tag).ok_or(PairingError::MissingTlv(tag as u8))
}

/// 32-byte public key (Ed25519 LTPK or X25519 ephemeral).
pub(crate) fn public_key(tlv: &Tlv8) -> Result<[u8; 32], PairingError> {
    bytes(tlv, TlvType::PublicKey)?
        .try_into()
        .map_err(|_| PairingError::InvalidPublicKey)
}

/// Fail on an error TLV or an unexpected state in a response.
pub(crate) fn expect_state(tlv: &Tlv8, expected: u8) -> Result<(), PairingError> {
    if let Some(code) = tlv.error() {
        return Err(PairingError::Rejected {
            state: expected,
            code,
        });
    }
    match tlv.state() {
        Some(state) if state == expected => Ok(()),
        other => Err(PairingError::StateMismatch {
            expected,
            actual: other.unwrap_or(0),
        }),
    }
}

/// `a || b || c`, the shape of every signed handshake payload.
pub(crate) fn concat(parts: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(parts.iter().map(|p| p.len()).sum());
    for part in parts {
        out.extend_from_slice(part);
    }
    out
}
