//! Session key types and derivation.

use crate::hkdf;
use hap_core::CryptoError;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Shared secret from SRP or ECDH.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret(Vec<u8>);

/// 32-byte symmetric key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; 32]);

/// Directional traffic keys for one verified connection.
///
/// `write_key` seals what this endpoint sends, `read_key` opens what it
/// receives. The controller's `write_key` is the accessory's `read_key`.
#[derive(Clone, ZeroizeOnDrop)]
pub struct SessionKeys {
    pub write_key: EncryptionKey,
    pub read_key: EncryptionKey,
}

/// Which end of the connection the keys belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Accessory,
    Controller,
}

impl SharedSecret {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl EncryptionKey {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl SessionKeys {
    /// Derive traffic keys from the pair-verify shared secret.
    ///
    /// Controller-to-accessory traffic uses the "Control-Write" key and the
    /// reverse direction uses "Control-Read".
    pub fn derive_control_keys(
        shared_secret: &SharedSecret,
        role: Role,
    ) -> Result<Self, CryptoError> {
        let to_accessory = EncryptionKey(hkdf::derive_control_write_key(shared_secret.as_bytes())?);
        let to_controller = EncryptionKey(hkdf::derive_control_read_key(shared_secret.as_bytes())?);

        Ok(match role {
            Role::Controller => Self {
                write_key: to_accessory,
                read_key: to_controller,
            },
            Role::Accessory => Self {
                write_key: to_controller,
                read_key: to_accessory,
            },
        })
    }

    /// Derive the pair-setup encryption key from the SRP session key.
    pub fn derive_pair_setup_key(session_key: &SharedSecret) -> Result<EncryptionKey, CryptoError> {
        Ok(EncryptionKey(hkdf::derive_pair_setup_key(session_key.as_bytes())?))
    }

    /// Derive the pair-verify encryption key from the X25519 shared secret.
    pub fn derive_pair_verify_key(
        shared_secret: &SharedSecret,
    ) -> Result<EncryptionKey, CryptoError> {
        Ok(EncryptionKey(hkdf::derive_pair_verify_key(shared_secret.as_bytes())?))
    }
}
