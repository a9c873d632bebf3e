//! Pairing store implementations.
//!
//! [`MemoryPairingStore`] keeps everything in process memory;
//! [`FilePairingStore`] mirrors the same table into a JSON file after each
//! mutation. Both cap the number of controllers at [`DEFAULT_CAPACITY`]
//! unless configured otherwise.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use hap_core::{BridgeStatus, PairingRecord, Permissions, StorageError};
use hap_crypto::ed25519::IdentityKeyPair;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::identity::BridgeIdentity;
use crate::traits::PairingStore;

/// Maximum number of paired controllers an accessory accepts.
pub const DEFAULT_CAPACITY: usize = 16;

/// Pairings plus bridge identity, shared by both store flavors.
struct PairingTable {
    identity: BridgeIdentity,
    pairings: Vec<PairingRecord>,
    capacity: usize,
}

impl PairingTable {
    fn get(&self, identifier: &str) -> Option<&PairingRecord> {
        self.pairings.iter().find(|p| p.identifier == identifier)
    }

    fn save(&mut self, record: PairingRecord) -> bool {
        let existing = self
            .pairings
            .iter_mut()
            .find(|p| p.identifier == record.identifier);
        if let Some(existing) = existing {
            if existing.public_key != record.public_key {
                warn!(peer = %record.identifier, "Refusing to replace pairing public key");
                return false;
            }
            existing.permissions = record.permissions;
            return true;
        }

        if self.pairings.len() >= self.capacity {
            warn!(peer = %record.identifier, capacity = self.capacity, "Pairing store full");
            return false;
        }

        self.pairings.push(record);
        true
    }

    fn remove(&mut self, identifier: &str) -> bool {
        let before = self.pairings.len();
        self.pairings.retain(|p| p.identifier != identifier);
        self.pairings.len() != before
    }

    fn clear_if_no_admin(&mut self) -> Vec<PairingRecord> {
        if self.pairings.iter().any(PairingRecord::is_admin) {
            return Vec::new();
        }
        std::mem::take(&mut self.pairings)
    }
}

fn lock(table: &Mutex<PairingTable>) -> MutexGuard<'_, PairingTable> {
    table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory pairing store. Pairings are lost when the process exits.
pub struct MemoryPairingStore {
    table: Mutex<PairingTable>,
}

impl MemoryPairingStore {
    /// Store with a freshly generated bridge identity.
    pub fn new(pairing_id: impl Into<String>) -> Self {
        Self::with_identity(BridgeIdentity::generate(pairing_id))
    }

    pub fn with_identity(identity: BridgeIdentity) -> Self {
        Self {
            table: Mutex::new(PairingTable {
                identity,
                pairings: Vec::new(),
                capacity: DEFAULT_CAPACITY,
            }),
        }
    }

    pub fn with_capacity(self, capacity: usize) -> Self {
        lock(&self.table).capacity = capacity;
        self
    }
}

impl PairingStore for MemoryPairingStore {
    fn bridge_identity(&self) -> BridgeIdentity {
        lock(&self.table).identity.clone()
    }

    fn get_pairing(&self, identifier: &str) -> Option<PairingRecord> {
        lock(&self.table).get(identifier).cloned()
    }

    fn save_pairing(&self, record: PairingRecord) -> bool {
        lock(&self.table).save(record)
    }

    fn remove_pairing(&self, identifier: &str) {
        lock(&self.table).remove(identifier);
    }

    fn list_pairings(&self) -> Vec<PairingRecord> {
        lock(&self.table).pairings.clone()
    }

    fn clear_pairings_if_no_admin(&self) -> Vec<PairingRecord> {
        lock(&self.table).clear_if_no_admin()
    }

    fn set_bridge_status(&self, status: BridgeStatus) {
        let mut table = lock(&self.table);
        table.identity = table.identity.clone().with_status(status);
    }
}

/// On-disk layout of the pairing file.
#[derive(Serialize, Deserialize)]
struct StoredState {
    pairing_id: String,
    #[serde(with = "hex_key")]
    seed: [u8; 32],
    #[serde(default)]
    status: BridgeStatus,
    #[serde(default)]
    pairings: Vec<StoredPairing>,
}

#[derive(Serialize, Deserialize)]
struct StoredPairing {
    identifier: String,
    #[serde(with = "hex_key")]
    public_key: [u8; 32],
    permissions: Permissions,
}

mod hex_key {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(D::Error::custom)?;
        bytes
            .try_into()
            .map_err(|v: Vec<u8>| D::Error::invalid_length(v.len(), &"32 bytes"))
    }
}

/// JSON-file backed pairing store.
///
/// The file holds the bridge pairing id, its Ed25519 seed, the status flag
/// and every pairing record. It is rewritten after each mutation.
pub struct FilePairingStore {
    path: PathBuf,
    table: Mutex<PairingTable>,
}

impl FilePairingStore {
    /// Open the store at `path`, creating it with a new identity if missing.
    ///
    /// `pairing_id` is only used when the file is created; an existing file
    /// keeps the id it was created with.
    pub fn open(path: impl AsRef<Path>, pairing_id: &str) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();

        let table = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            let state: StoredState =
                serde_json::from_str(&contents).map_err(|e| StorageError::Corrupt(e.to_string()))?;
            debug!(path = %path.display(), pairings = state.pairings.len(), "Loaded pairing store");
            PairingTable {
                identity: BridgeIdentity::new(
                    state.pairing_id,
                    IdentityKeyPair::from_seed(&state.seed),
                    state.status,
                ),
                pairings: state
                    .pairings
                    .into_iter()
                    .map(|p| PairingRecord::new(p.identifier, p.public_key, p.permissions))
                    .collect(),
                capacity: DEFAULT_CAPACITY,
            }
        } else {
            debug!(path = %path.display(), "Creating pairing store");
            PairingTable {
                identity: BridgeIdentity::generate(pairing_id),
                pairings: Vec::new(),
                capacity: DEFAULT_CAPACITY,
            }
        };

        let store = Self {
            path,
            table: Mutex::new(table),
        };
        store.persist(&lock(&store.table))?;
        Ok(store)
    }

    pub fn with_capacity(self, capacity: usize) -> Self {
        lock(&self.table).capacity = capacity;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, table: &PairingTable) -> Result<(), StorageError> {
        let state = StoredState {
            pairing_id: table.identity.pairing_id().to_string(),
            seed: table.identity.keypair().seed(),
            status: table.identity.status(),
            pairings: table
                .pairings
                .iter()
                .map(|p| StoredPairing {
                    identifier: p.identifier.clone(),
                    public_key: p.public_key,
                    permissions: p.permissions,
                })
                .collect(),
        };
        let json = serde_json::to_string_pretty(&state)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Persist after a mutation, logging instead of failing the caller.
    fn persist_logged(&self, table: &PairingTable) -> bool {
        match self.persist(table) {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to write pairing store");
                false
            }
        }
    }
}

impl PairingStore for FilePairingStore {
    fn bridge_identity(&self) -> BridgeIdentity {
        lock(&self.table).identity.clone()
    }

    fn get_pairing(&self, identifier: &str) -> Option<PairingRecord> {
        lock(&self.table).get(identifier).cloned()
    }

    fn save_pairing(&self, record: PairingRecord) -> bool {
        let mut table = lock(&self.table);
        let previous = table.pairings.clone();
        if !table.save(record) {
            return false;
        }
        if !self.persist_logged(&table) {
            table.pairings = previous;
            return false;
        }
        true
    }

    fn remove_pairing(&self, identifier: &str) {
        let mut table = lock(&self.table);
        if table.remove(identifier) {
            self.persist_logged(&table);
        }
    }

    fn list_pairings(&self) -> Vec<PairingRecord> {
        lock(&self.table).pairings.clone()
    }

    fn clear_pairings_if_no_admin(&self) -> Vec<PairingRecord> {
        let mut table = lock(&self.table);
        let removed = table.clear_if_no_admin();
        if !removed.is_empty() {
            self.persist_logged(&table);
        }
        removed
    }

    fn set_bridge_status(&self, status: BridgeStatus) {
        let mut table = lock(&self.table);
        table.identity = table.identity.clone().with_status(status);
        self.persist_logged(&table);
    }
}
