//! # hap-pairing
//!
//! Accessory side of HomeKit pairing for the bridge.
//!
//! This crate implements:
//! - Pair-Setup (SRP-6a, M1-M6) establishing the first admin controller
//! - Pair-Verify (X25519 + Ed25519, M1-M4) keying each connection
//! - The pairings manager (add, remove and list controllers)
//! - The encrypted frame codec installed after Pair-Verify
//! - The session registry of verified connections
//!
//! Long-term pairings and the bridge identity are reached through the
//! [`PairingStore`] collaborator; re-announcements go through [`Advertiser`].

mod channel;
mod context;
mod controller;
mod fields;
mod identity;
mod pair_setup;
mod pair_verify;
mod pairings;
mod registry;
mod session;
mod store;
mod traits;

#[cfg(test)]
mod test_support;

pub use channel::{FrameCodec, MAX_FRAME_PAYLOAD};
pub use context::{PairingContext, SetupGate, MAX_FAILED_ATTEMPTS};
pub use controller::{AccessoryInfo, ControllerIdentity, SetupClient, VerifyClient};
pub use identity::{random_pairing_id, BridgeIdentity};
pub use pair_setup::PairSetup;
pub use pair_verify::{PairVerify, VerifiedSession, VerifyStep};
pub use pairings::{handle_pairings, PairingMethod, PairingsOutcome};
pub use registry::{ConnectionHandle, ConnectionId, SessionRegistry};
pub use session::{ConnectionState, Session};
pub use store::{FilePairingStore, MemoryPairingStore, DEFAULT_CAPACITY};
pub use traits::{Advertiser, NoopAdvertiser, PairingStore};
