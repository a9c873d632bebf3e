//! `_hap._tcp` service advertisement over mDNS.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use hap_core::{AdvertiseError, BridgeStatus};
use hap_pairing::{Advertiser, PairingStore};
use mdns_sd::{ServiceDaemon, ServiceInfo};
use tracing::{debug, info, warn};

/// HAP over IP service type.
pub const HAP_SERVICE_TYPE: &str = "_hap._tcp.local.";

/// Protocol version advertised in `pv`.
const PROTOCOL_VERSION: &str = "1.1";

/// Static part of the advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    pub name: String,
    pub model: String,
    pub category: u16,
}

impl ServiceRecord {
    /// TXT record for the given config number, pairing id and status.
    pub fn txt_properties(
        &self,
        config_number: u32,
        pairing_id: &str,
        status: BridgeStatus,
    ) -> Vec<(String, String)> {
        vec![
            ("c#".to_string(), config_number.to_string()),
            ("ff".to_string(), "0".to_string()),
            ("id".to_string(), pairing_id.to_string()),
            ("md".to_string(), self.model.clone()),
            ("pv".to_string(), PROTOCOL_VERSION.to_string()),
            ("s#".to_string(), "1".to_string()),
            ("sf".to_string(), status.status_flag().to_string()),
            ("ci".to_string(), self.category.to_string()),
        ]
    }

    /// mDNS host name derived from the pairing id.
    fn host_name(pairing_id: &str) -> String {
        format!("hap-{}.local.", pairing_id.replace(':', "").to_ascii_lowercase())
    }
}

/// `c#` stays within 1..=65535 and wraps back to 1.
fn next_config_number(n: u32) -> u32 {
    if n >= u16::MAX as u32 {
        1
    } else {
        n + 1
    }
}

/// Advertiser backed by an `mdns-sd` daemon.
///
/// Nothing is announced until the first [`reload_service`](Advertiser::reload_service);
/// the server calls it once the listener port is known.
pub struct MdnsAdvertiser {
    daemon: ServiceDaemon,
    record: ServiceRecord,
    store: Arc<dyn PairingStore>,
    port: AtomicU16,
    config_number: AtomicU32,
    registered: Mutex<Option<String>>,
}

impl MdnsAdvertiser {
    pub fn new(
        record: ServiceRecord,
        store: Arc<dyn PairingStore>,
    ) -> Result<Self, AdvertiseError> {
        let daemon = ServiceDaemon::new()
            .map_err(|e| AdvertiseError::Daemon(format!("Failed to create mDNS daemon: {}", e)))?;

        Ok(Self {
            daemon,
            record,
            store,
            port: AtomicU16::new(0),
            config_number: AtomicU32::new(0),
            registered: Mutex::new(None),
        })
    }

    pub fn set_port(&self, port: u16) {
        self.port.store(port, Ordering::SeqCst);
    }

    pub fn config_number(&self) -> u32 {
        self.config_number.load(Ordering::SeqCst)
    }

    fn announce(&self) -> Result<(), AdvertiseError> {
        let port = self.port.load(Ordering::SeqCst);
        if port == 0 {
            return Err(AdvertiseError::Register("listener port not set".to_string()));
        }

        let prev = self
            .config_number
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(next_config_number(n)))
            .unwrap_or_else(|n| n);
        let config_number = next_config_number(prev);

        let identity = self.store.bridge_identity();
        let properties = self
            .record
            .txt_properties(config_number, identity.pairing_id(), identity.status());

        let info = ServiceInfo::new(
            HAP_SERVICE_TYPE,
            &self.record.name,
            &ServiceRecord::host_name(identity.pairing_id()),
            "",
            port,
            properties.into_iter().collect::<HashMap<String, String>>(),
        )
        .map_err(|e| AdvertiseError::Register(e.to_string()))?
        .enable_addr_auto();

        let fullname = info.get_fullname().to_string();
        self.daemon
            .register(info)
            .map_err(|e| AdvertiseError::Register(e.to_string()))?;

        let mut registered = self.registered.lock().unwrap_or_else(|p| p.into_inner());
        *registered = Some(fullname);

        info!(
            name = %self.record.name,
            port,
            config_number,
            sf = identity.status().status_flag(),
            "Advertised HAP service"
        );
        Ok(())
    }

    /// Withdraw the service and stop the daemon.
    pub fn shutdown(&self) {
        let fullname = self.registered.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(fullname) = fullname {
            if let Err(e) = self.daemon.unregister(&fullname) {
                debug!(error = %e, "mDNS unregister failed");
            }
        }
        if let Err(e) = self.daemon.shutdown() {
            debug!(error = %e, "mDNS daemon shutdown failed");
        }
    }
}

impl Advertiser for MdnsAdvertiser {
    fn reload_service(&self) {
        if let Err(e) = self.announce() {
            warn!(error = %e, "Failed to update mDNS advertisement");
        }
    }
}
