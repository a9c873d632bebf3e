//! # hap-core
//!
//! Core types and error definitions shared across the HAP bridge crates.
//!
//! This crate provides:
//! - Pairing records, permissions and bridge status
//! - TLV error codes and JSON status codes
//! - Common error types

pub mod error;
pub mod pairing;
pub mod status;

pub use error::{
    AdvertiseError, CryptoError, Error, PairingError, Result, StorageError, TransportError,
};
pub use pairing::{BridgeStatus, PairingRecord, Permissions};
pub use status::{HapStatus, TlvErrorCode};
