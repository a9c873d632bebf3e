//! State shared by every connection of one bridge.

use std::sync::{Arc, Mutex, MutexGuard};

use hap_core::PairingError;
use tracing::warn;

use crate::registry::{ConnectionId, SessionRegistry};
use crate::traits::{Advertiser, PairingStore};

/// Failed SRP proofs tolerated before pair-setup is refused for good.
pub const MAX_FAILED_ATTEMPTS: u32 = 100;

#[derive(Debug, Default)]
struct GateState {
    owner: Option<ConnectionId>,
    failed_attempts: u32,
}

/// Serializes pair-setup across connections and counts failed attempts.
#[derive(Debug, Default)]
pub struct SetupGate {
    state: Mutex<GateState>,
}

impl SetupGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim pair-setup for `conn`.
    ///
    /// Re-claiming by the current owner succeeds, so a controller may restart
    /// its own handshake.
    pub fn try_acquire(&self, conn: ConnectionId) -> Result<(), PairingError> {
        let mut state = self.lock();
        if state.failed_attempts >= MAX_FAILED_ATTEMPTS {
            return Err(PairingError::MaxTries);
        }
        match state.owner {
            Some(owner) if owner != conn => Err(PairingError::Busy),
            _ => {
                state.owner = Some(conn);
                Ok(())
            }
        }
    }

    /// Release the gate if `conn` holds it.
    pub fn release(&self, conn: ConnectionId) {
        let mut state = self.lock();
        if state.owner == Some(conn) {
            state.owner = None;
        }
    }

    pub fn record_failure(&self) {
        let mut state = self.lock();
        state.failed_attempts = state.failed_attempts.saturating_add(1);
        if state.failed_attempts == MAX_FAILED_ATTEMPTS {
            warn!(attempts = state.failed_attempts, "Pair-setup locked after too many failures");
        }
    }

    pub fn failed_attempts(&self) -> u32 {
        self.lock().failed_attempts
    }

    pub fn owner(&self) -> Option<ConnectionId> {
        self.lock().owner
    }
}

/// Everything the handshakes and the pairings manager need beyond the
/// per-connection state.
pub struct PairingContext {
    store: Arc<dyn PairingStore>,
    advertiser: Arc<dyn Advertiser>,
    registry: Arc<SessionRegistry>,
    setup_code: String,
    gate: SetupGate,
}

impl PairingContext {
    pub fn new(
        store: Arc<dyn PairingStore>,
        advertiser: Arc<dyn Advertiser>,
        registry: Arc<SessionRegistry>,
        setup_code: impl Into<String>,
    ) -> Self {
        Self {
            store,
            advertiser,
            registry,
            setup_code: setup_code.into(),
            gate: SetupGate::new(),
        }
    }

    pub fn store(&self) -> &dyn PairingStore {
        self.store.as_ref()
    }

    pub fn advertiser(&self) -> &dyn Advertiser {
        self.advertiser.as_ref()
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Setup code in `XXX-XX-XXX` form, the SRP password.
    pub fn setup_code(&self) -> &str {
        &self.setup_code
    }

    pub fn gate(&self) -> &SetupGate {
        &self.gate
    }
}
