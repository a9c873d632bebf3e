//! Long-term identity of the bridge.

use hap_core::BridgeStatus;
use hap_crypto::ed25519::IdentityKeyPair;
use rand::{rngs::OsRng, RngCore};

/// Bridge identity used by both handshakes.
///
/// The pairing id is a MAC-style string (`AA:BB:CC:DD:EE:FF`) that the
/// controller sees in the `id` TXT record and inside the signed handshake
/// payloads, so it must stay stable for as long as any pairing exists.
#[derive(Clone)]
pub struct BridgeIdentity {
    pairing_id: String,
    keypair: IdentityKeyPair,
    status: BridgeStatus,
}

impl BridgeIdentity {
    pub fn new(
        pairing_id: impl Into<String>,
        keypair: IdentityKeyPair,
        status: BridgeStatus,
    ) -> Self {
        Self {
            pairing_id: pairing_id.into(),
            keypair,
            status,
        }
    }

    /// Fresh unpaired identity with a random keypair.
    pub fn generate(pairing_id: impl Into<String>) -> Self {
        Self::new(pairing_id, IdentityKeyPair::generate(), BridgeStatus::Unpaired)
    }

    pub fn pairing_id(&self) -> &str {
        &self.pairing_id
    }

    pub fn keypair(&self) -> &IdentityKeyPair {
        &self.keypair
    }

    /// Long-term public key (LTPK).
    pub fn public_key(&self) -> [u8; 32] {
        self.keypair.public_key()
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.keypair.sign(message)
    }

    pub fn status(&self) -> BridgeStatus {
        self.status
    }

    pub fn is_paired(&self) -> bool {
        self.status == BridgeStatus::Paired
    }

    pub fn with_status(mut self, status: BridgeStatus) -> Self {
        self.status = status;
        self
    }
}

impl std::fmt::Debug for BridgeIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeIdentity")
            .field("pairing_id", &self.pairing_id)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Random locally-administered MAC-style pairing id.
pub fn random_pairing_id() -> String {
    let mut bytes = [0u8; 6];
    OsRng.fill_bytes(&mut bytes);
    // locally administered, unicast
    bytes[0] = (bytes[0] | 0x02) & 0xFE;
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}
