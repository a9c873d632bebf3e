//! Error types for the HAP bridge.

use thiserror::Error;

use crate::status::TlvErrorCode;

/// Primary error type for all bridge operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Pairing error: {0}")]
    Pairing(#[from] PairingError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Advertisement error: {0}")]
    Advertise(#[from] AdvertiseError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors raised while running a pairing handshake or pairings request.
///
/// These never leave the state machines as-is: each one is mapped onto a
/// wire error code with [`PairingError::tlv_code`] and returned to the
/// controller inside a TLV response.
#[derive(Error, Debug)]
pub enum PairingError {
    #[error("Accessory is already paired")]
    AlreadyPaired,

    #[error("Another pair-setup is in progress")]
    Busy,

    #[error("Too many unsuccessful pair-setup attempts")]
    MaxTries,

    #[error("SRP verification failed")]
    SrpVerificationFailed,

    #[error("Invalid controller public key")]
    InvalidPublicKey,

    #[error("Signature verification failed")]
    SignatureInvalid,

    #[error("Unknown pairing identifier: {0}")]
    UnknownPeer(String),

    #[error("Admin permission required")]
    NotAdmin,

    #[error("Pairing {0} already exists with a different public key")]
    PublicKeyMismatch(String),

    #[error("Pairing store refused to save {0}")]
    SaveRejected(String),

    #[error("Pairing store failed while saving {0}")]
    StorageFailed(String),

    #[error("Accessory rejected M{state} with error {code}")]
    Rejected { state: u8, code: u8 },

    #[error("Pairing state mismatch: expected {expected}, got {actual}")]
    StateMismatch { expected: u8, actual: u8 },

    #[error("Unsupported pairing method: {0}")]
    UnsupportedMethod(u8),

    #[error("Missing required TLV type: {0}")]
    MissingTlv(u8),

    #[error("Invalid TLV value: {0}")]
    InvalidTlv(String),

    #[error("Decryption of encrypted data failed: {0}")]
    Decryption(#[from] CryptoError),
}

impl PairingError {
    /// Wire error code reported to the controller for this failure.
    pub fn tlv_code(&self) -> TlvErrorCode {
        match self {
            PairingError::AlreadyPaired => TlvErrorCode::Unavailable,
            PairingError::Busy => TlvErrorCode::Busy,
            PairingError::MaxTries => TlvErrorCode::MaxTries,
            PairingError::SaveRejected(_) => TlvErrorCode::MaxPeers,
            PairingError::SrpVerificationFailed
            | PairingError::SignatureInvalid
            | PairingError::UnknownPeer(_)
            | PairingError::NotAdmin
            | PairingError::Decryption(_) => TlvErrorCode::Authentication,
            PairingError::InvalidPublicKey
            | PairingError::PublicKeyMismatch(_)
            | PairingError::StorageFailed(_)
            | PairingError::Rejected { .. }
            | PairingError::StateMismatch { .. }
            | PairingError::UnsupportedMethod(_)
            | PairingError::MissingTlv(_)
            | PairingError::InvalidTlv(_) => TlvErrorCode::Unknown,
        }
    }
}

/// Cryptographic operation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("SRP proof mismatch")]
    ProofMismatch,

    #[error("Signature verification failed")]
    BadSignature,

    #[error("Authentication tag mismatch")]
    AuthTagMismatch,
}

/// Errors from the pairing store.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt pairing store: {0}")]
    Corrupt(String),
}

/// Errors on an accessory connection once bytes are flowing.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Encrypted frame failed authentication")]
    FrameCorrupted,

    #[error("Encrypted frame length {0} exceeds maximum")]
    FrameTooLarge(usize),

    #[error("Malformed HTTP request: {0}")]
    MalformedRequest(String),
}

/// mDNS advertisement errors.
#[derive(Error, Debug)]
pub enum AdvertiseError {
    #[error("mDNS daemon error: {0}")]
    Daemon(String),

    #[error("Service registration failed: {0}")]
    Register(String),
}

/// Convenience Result type.
pub type Result<T> = std::result::Result<T, Error>;
