//! Bridge configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use hap_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default HAP port.
pub const DEFAULT_PORT: u16 = 51826;

/// Accessory category advertised in `ci` (2 = bridge).
pub const CATEGORY_BRIDGE: u16 = 2;

/// Setup codes HomeKit refuses because they are trivially guessable.
const TRIVIAL_SETUP_CODES: &[&str] = &[
    "000-00-000",
    "111-11-111",
    "222-22-222",
    "333-33-333",
    "444-44-444",
    "555-55-555",
    "666-66-666",
    "777-77-777",
    "888-88-888",
    "999-99-999",
    "123-45-678",
    "876-54-321",
];

/// Runtime configuration for one bridge instance, loaded from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    pub name: String,
    /// `XXX-XX-XXX`, the SRP password for pair-setup.
    pub setup_code: String,
    /// MAC-style pairing id; generated when absent.
    #[serde(default)]
    pub pairing_id: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,
    #[serde(default = "default_category")]
    pub category: u16,
    #[serde(default = "default_model")]
    pub model: String,
    /// JSON pairing store; pairings live in memory when absent.
    #[serde(default)]
    pub storage_path: Option<PathBuf>,
    #[serde(default = "default_advertise")]
    pub advertise: bool,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_category() -> u16 {
    CATEGORY_BRIDGE
}

fn default_model() -> String {
    "HAP Bridge".to_string()
}

fn default_advertise() -> bool {
    true
}

impl BridgeConfig {
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::new()
    }

    /// Read and validate a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("name must not be empty".to_string()));
        }
        validate_setup_code(&self.setup_code)?;
        if let Some(id) = &self.pairing_id {
            validate_pairing_id(id)?;
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

/// Check `XXX-XX-XXX` shape and reject trivial codes.
pub fn validate_setup_code(code: &str) -> Result<()> {
    let bytes = code.as_bytes();
    let well_formed = bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            3 | 6 => *b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !well_formed {
        return Err(Error::Config(format!(
            "setup code {:?} must have the form XXX-XX-XXX",
            code
        )));
    }
    if TRIVIAL_SETUP_CODES.contains(&code) {
        return Err(Error::Config(format!("setup code {} is too simple", code)));
    }
    Ok(())
}

fn validate_pairing_id(id: &str) -> Result<()> {
    let parts: Vec<&str> = id.split(':').collect();
    let valid = parts.len() == 6
        && parts
            .iter()
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()));
    if valid {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "pairing id {:?} must look like AA:BB:CC:DD:EE:FF",
            id
        )))
    }
}

/// Builder for [`BridgeConfig`].
#[derive(Debug, Clone)]
pub struct BridgeConfigBuilder {
    config: BridgeConfig,
}

impl BridgeConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: BridgeConfig {
                name: "HAP Bridge".to_string(),
                setup_code: String::new(),
                pairing_id: None,
                port: DEFAULT_PORT,
                bind_address: default_bind_address(),
                category: CATEGORY_BRIDGE,
                model: default_model(),
                storage_path: None,
                advertise: true,
            },
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn setup_code(mut self, code: impl Into<String>) -> Self {
        self.config.setup_code = code.into();
        self
    }

    pub fn pairing_id(mut self, id: impl Into<String>) -> Self {
        self.config.pairing_id = Some(id.into());
        self
    }

    /// Port to listen on. Zero picks a free port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn bind_address(mut self, addr: IpAddr) -> Self {
        self.config.bind_address = addr;
        self
    }

    pub fn category(mut self, category: u16) -> Self {
        self.config.category = category;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.storage_path = Some(path.into());
        self
    }

    pub fn advertise(mut self, enabled: bool) -> Self {
        self.config.advertise = enabled;
        self
    }

    pub fn build(self) -> Result<BridgeConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for BridgeConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
