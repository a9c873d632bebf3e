//! Collaborator traits consumed by the pairing state machines.

use hap_core::{BridgeStatus, PairingRecord};

use crate::identity::BridgeIdentity;

/// Persistent storage for the bridge identity and controller pairings.
///
/// Calls are blocking and each one is expected to be atomic.
#[cfg_attr(test, mockall::automock)]
pub trait PairingStore: Send + Sync {
    /// Bridge pairing id, long-term keypair and status flag.
    fn bridge_identity(&self) -> BridgeIdentity;

    fn get_pairing(&self, identifier: &str) -> Option<PairingRecord>;

    /// Insert or update a pairing. Returns `false` if the store refused it.
    fn save_pairing(&self, record: PairingRecord) -> bool;

    /// Remove a pairing. Removing an unknown identifier is not an error.
    fn remove_pairing(&self, identifier: &str);

    fn list_pairings(&self) -> Vec<PairingRecord>;

    /// Drop every pairing if none of them is an admin, returning what was removed.
    fn clear_pairings_if_no_admin(&self) -> Vec<PairingRecord>;

    fn set_bridge_status(&self, status: BridgeStatus);
}

/// Service advertisement, re-announced after pairing state changes.
#[cfg_attr(test, mockall::automock)]
pub trait Advertiser: Send + Sync {
    /// Fire-and-forget re-announcement.
    fn reload_service(&self);
}

/// Advertiser that does nothing, for bridges running without mDNS.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAdvertiser;

impl Advertiser for NoopAdvertiser {
    fn reload_service(&self) {}
}
