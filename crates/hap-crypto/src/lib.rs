//! # hap-crypto
//!
//! Cryptographic primitives and wire encoding for HAP pairing.
//!
//! This crate provides:
//! - TLV8 message encoding/decoding
//! - ChaCha20, Poly1305 and the combined AEAD (RFC 7539)
//! - SRP-6a (3072-bit) for pair-setup
//! - X25519 key agreement and Ed25519 signatures
//! - HKDF-SHA512 key derivation with the HAP labels
//!
//! All secret material is zeroized on drop.

pub mod aead;
pub mod chacha20;
pub mod curve25519;
pub mod ed25519;
pub mod hkdf;
pub mod keys;
pub mod poly1305;
pub mod srp;
pub mod tlv;

pub use aead::ChaCha20Poly1305;
pub use keys::{EncryptionKey, Role, SessionKeys, SharedSecret};
pub use tlv::{Tlv8, TlvItem, TlvType, TlvValue};
