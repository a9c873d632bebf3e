//! Fixtures shared by the unit tests.

use std::sync::Arc;

use crate::context::PairingContext;
use crate::controller::{AccessoryInfo, ControllerIdentity, SetupClient};
use crate::pair_setup::PairSetup;
use crate::registry::{ConnectionId, SessionRegistry};
use crate::store::MemoryPairingStore;
use crate::traits::{Advertiser, NoopAdvertiser, PairingStore};

pub(crate) const SETUP_CODE: &str = "518-08-582";
pub(crate) const BRIDGE_ID: &str = "0E:AA:BB:CC:DD:EE";

pub(crate) fn memory_context() -> (Arc<MemoryPairingStore>, PairingContext) {
    let store = Arc::new(MemoryPairingStore::new(BRIDGE_ID));
    let ctx = context_with(store.clone(), Arc::new(NoopAdvertiser));
    (store, ctx)
}

pub(crate) fn context_with(
    store: Arc<dyn PairingStore>,
    advertiser: Arc<dyn Advertiser>,
) -> PairingContext {
    PairingContext::new(store, advertiser, Arc::new(SessionRegistry::new()), SETUP_CODE)
}

/// Run a full pair-setup for `controller` against `ctx`.
pub(crate) fn pair_controller(
    ctx: &PairingContext,
    controller: &ControllerIdentity,
) -> AccessoryInfo {
    let conn = ConnectionId(u64::MAX);
    let mut client = SetupClient::new(SETUP_CODE, controller.clone());
    let mut setup = PairSetup::new();

    let m2 = setup.handle(&client.m1(), conn, ctx);
    let m3 = client.handle_m2(&m2).unwrap();
    let m4 = setup.handle(&m3, conn, ctx);
    let m5 = client.handle_m4(&m4).unwrap();
    let m6 = setup.handle(&m5, conn, ctx);
    client.handle_m6(&m6).unwrap()
}
