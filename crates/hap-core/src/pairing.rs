//! Pairing records and bridge status.

use serde::{Deserialize, Serialize};

/// Permission level of a paired controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permissions {
    Regular,
    Admin,
}

impl Permissions {
    /// Decode the `Permissions` TLV byte. Any non-zero value is admin.
    pub fn from_byte(b: u8) -> Self {
        if b & 0x01 == 0x01 {
            Permissions::Admin
        } else {
            Permissions::Regular
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Permissions::Regular => 0x00,
            Permissions::Admin => 0x01,
        }
    }

    pub fn is_admin(self) -> bool {
        self == Permissions::Admin
    }
}

/// A controller trusted by the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingRecord {
    /// Controller pairing identifier (opaque UTF-8, usually a UUID).
    pub identifier: String,
    /// Controller long-term Ed25519 public key.
    pub public_key: [u8; 32],
    pub permissions: Permissions,
}

impl PairingRecord {
    pub fn new(
        identifier: impl Into<String>,
        public_key: [u8; 32],
        permissions: Permissions,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            public_key,
            permissions,
        }
    }

    pub fn admin(identifier: impl Into<String>, public_key: [u8; 32]) -> Self {
        Self::new(identifier, public_key, Permissions::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.permissions.is_admin()
    }
}

/// Pairing status of the bridge, advertised through the `sf` TXT flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeStatus {
    #[default]
    Unpaired,
    Paired,
}

impl BridgeStatus {
    /// Value of the `sf` status flag.
    pub fn status_flag(self) -> u8 {
        match self {
            BridgeStatus::Unpaired => 1,
            BridgeStatus::Paired => 0,
        }
    }
}
