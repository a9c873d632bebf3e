//! Registry of verified connections, keyed by controller pairing id.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::Notify;
use tracing::debug;

/// Identifier of one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Handle used to ask a live connection to shut down.
///
/// Clones share the same close signal. A close requested before the
/// connection starts waiting is not lost.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    close: Arc<Notify>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId) -> Self {
        Self {
            id,
            close: Arc::new(Notify::new()),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Request the connection to close.
    pub fn close(&self) {
        self.close.notify_one();
    }

    /// Resolves once [`close`](Self::close) has been called on any clone.
    pub async fn closed(&self) {
        self.close.notified().await;
    }
}

/// Concurrent map from verified pairing id to its live connection.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    entries: RwLock<HashMap<String, ConnectionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ConnectionHandle>> {
        self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ConnectionHandle>> {
        self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register `handle` as the live connection for `pairing_id`.
    ///
    /// An older connection for the same identity is closed and returned.
    pub fn register(&self, pairing_id: &str, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let conn = handle.id();
        let previous = self.write().insert(pairing_id.to_string(), handle);
        match previous {
            Some(old) if old.id() != conn => {
                debug!(peer = %pairing_id, old = %old.id(), new = %conn, "Replacing session");
                old.close();
                Some(old)
            }
            _ => None,
        }
    }

    /// Remove the entry for `pairing_id` if it still belongs to `conn`.
    pub fn unregister(&self, pairing_id: &str, conn: ConnectionId) -> bool {
        let mut entries = self.write();
        match entries.get(pairing_id) {
            Some(handle) if handle.id() == conn => {
                entries.remove(pairing_id);
                true
            }
            _ => false,
        }
    }

    /// Remove and close the connection registered for `pairing_id`.
    pub fn close(&self, pairing_id: &str) -> bool {
        let removed = self.write().remove(pairing_id);
        match removed {
            Some(handle) => {
                debug!(peer = %pairing_id, conn = %handle.id(), "Closing session");
                handle.close();
                true
            }
            None => false,
        }
    }

    /// Remove and close every registered connection.
    pub fn close_all(&self) -> usize {
        let drained: Vec<_> = self.write().drain().collect();
        for (_, handle) in &drained {
            handle.close();
        }
        drained.len()
    }

    /// Remove every entry, closing all connections except `keep`.
    ///
    /// `keep` is the connection that asked for the teardown; it closes itself
    /// after its response has been written.
    pub fn close_all_except(&self, keep: ConnectionId) -> usize {
        let drained: Vec<_> = self.write().drain().collect();
        let mut closed = 0;
        for (_, handle) in drained {
            if handle.id() != keep {
                handle.close();
                closed += 1;
            }
        }
        closed
    }

    pub fn connection_for(&self, pairing_id: &str) -> Option<ConnectionId> {
        self.read().get(pairing_id).map(ConnectionHandle::id)
    }

    pub fn is_registered(&self, pairing_id: &str) -> bool {
        self.read().contains_key(pairing_id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
