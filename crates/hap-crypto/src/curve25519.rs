//! X25519 ephemeral key agreement for pair-verify.

use hap_core::CryptoError;
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::ZeroizeOnDrop;

use crate::keys::SharedSecret;

/// Ephemeral Curve25519 key pair, consumed by the key agreement.
#[derive(ZeroizeOnDrop)]
pub struct EphemeralKeyPair {
    #[zeroize(skip)]
    public: [u8; 32],
    secret: [u8; 32],
}

impl EphemeralKeyPair {
    /// Generate a new random key pair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self {
            public: public.to_bytes(),
            secret: secret.to_bytes(),
        }
    }

    /// Create from existing secret key bytes.
    pub fn from_secret(secret: &[u8; 32]) -> Self {
        let static_secret = StaticSecret::from(*secret);
        let public = PublicKey::from(&static_secret);
        Self {
            public: public.to_bytes(),
            secret: *secret,
        }
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.public
    }

    /// Compute the shared secret with a peer's public key.
    ///
    /// Rejects keys of the wrong length and low-order points (which yield an
    /// all-zero shared secret).
    pub fn diffie_hellman(self, peer_public: &[u8]) -> Result<SharedSecret, CryptoError> {
        let peer: [u8; 32] = peer_public.try_into().map_err(|_| CryptoError::InvalidPublicKey)?;
        if peer.iter().all(|&b| b == 0) {
            return Err(CryptoError::InvalidPublicKey);
        }

        let shared = StaticSecret::from(self.secret).diffie_hellman(&PublicKey::from(peer));
        if !shared.was_contributory() {
            return Err(CryptoError::InvalidPublicKey);
        }

        Ok(SharedSecret::new(shared.as_bytes().to_vec()))
    }
}
