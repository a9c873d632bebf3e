//! ChaCha20-Poly1305 AEAD (RFC 7539 section 2.8) and HAP nonce helpers.

use hap_core::CryptoError;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::chacha20::ChaCha20;
use crate::poly1305::{self, Poly1305};

pub use crate::poly1305::TAG_LEN;

/// AEAD cipher bound to one 256-bit key.
#[derive(ZeroizeOnDrop)]
pub struct ChaCha20Poly1305 {
    key: [u8; 32],
}

impl ChaCha20Poly1305 {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    pub fn from_slice(key: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; 32] = key.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: 32,
            actual: key.len(),
        })?;
        Ok(Self::new(key))
    }

    /// Encrypt and return `ciphertext || tag`.
    pub fn encrypt(&self, nonce: &[u8; 12], aad: &[u8], plaintext: &[u8]) -> Vec<u8> {
        let (mut out, tag) = self.encrypt_detached(nonce, aad, plaintext);
        out.extend_from_slice(&tag);
        out
    }

    /// Encrypt and return the ciphertext and tag separately.
    pub fn encrypt_detached(
        &self,
        nonce: &[u8; 12],
        aad: &[u8],
        plaintext: &[u8],
    ) -> (Vec<u8>, [u8; TAG_LEN]) {
        let cipher = ChaCha20::new(&self.key, nonce);
        let mut ciphertext = plaintext.to_vec();
        cipher.apply_keystream(1, &mut ciphertext);
        let tag = compute_tag(&cipher, aad, &ciphertext);
        (ciphertext, tag)
    }

    /// Verify and decrypt `ciphertext || tag`.
    ///
    /// No plaintext is produced unless the tag matches.
    pub fn decrypt(
        &self,
        nonce: &[u8; 12],
        aad: &[u8],
        ciphertext_with_tag: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        if ciphertext_with_tag.len() < TAG_LEN {
            return Err(CryptoError::Decryption(
                "Ciphertext too short (missing tag)".to_string(),
            ));
        }
        let split = ciphertext_with_tag.len() - TAG_LEN;
        let (ciphertext, tag) = ciphertext_with_tag.split_at(split);
        self.decrypt_detached(nonce, aad, ciphertext, tag)
    }

    pub fn decrypt_detached(
        &self,
        nonce: &[u8; 12],
        aad: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let cipher = ChaCha20::new(&self.key, nonce);
        let expected = compute_tag(&cipher, aad, ciphertext);
        if !poly1305::verify(&expected, tag) {
            return Err(CryptoError::AuthTagMismatch);
        }
        let mut plaintext = ciphertext.to_vec();
        cipher.apply_keystream(1, &mut plaintext);
        Ok(plaintext)
    }
}

/// Poly1305 one-time key: first half of keystream block zero.
fn one_time_key(cipher: &ChaCha20) -> [u8; 32] {
    let mut block = cipher.block(0);
    let mut key = [0u8; 32];
    key.copy_from_slice(&block[..32]);
    block.zeroize();
    key
}

fn compute_tag(cipher: &ChaCha20, aad: &[u8], ciphertext: &[u8]) -> [u8; TAG_LEN] {
    let mut otk = one_time_key(cipher);
    let mut mac = Poly1305::new(&otk);
    otk.zeroize();

    mac.update_padded(aad);
    mac.update_padded(ciphertext);
    mac.update(&(aad.len() as u64).to_le_bytes());
    mac.update(&(ciphertext.len() as u64).to_le_bytes());
    mac.finalize()
}

/// Encrypt with explicit 12-byte nonce and no associated data (pairing sub-TLVs).
///
/// Returns ciphertext with 16-byte auth tag appended.
pub fn encrypt_with_nonce(key: &[u8; 32], nonce: &[u8; 12], plaintext: &[u8]) -> Vec<u8> {
    ChaCha20Poly1305::new(*key).encrypt(nonce, &[], plaintext)
}

/// Decrypt with explicit 12-byte nonce and no associated data.
///
/// Expects ciphertext with 16-byte auth tag appended.
pub fn decrypt_with_nonce(
    key: &[u8; 32],
    nonce: &[u8; 12],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    ChaCha20Poly1305::new(*key).decrypt(nonce, &[], ciphertext)
}

/// Create a 12-byte nonce from a string (right-aligned, left-padded with zeros).
///
/// HAP nonces like "PV-Msg02" become `\x00\x00\x00\x00PV-Msg02`.
pub fn nonce_from_string(s: &[u8]) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    let len = s.len().min(12);
    nonce[12 - len..].copy_from_slice(&s[..len]);
    nonce
}

/// Build a 12-byte nonce from a 64-bit frame counter (little-endian in bytes 4..12).
pub fn nonce_from_counter(counter: u64) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[4..12].copy_from_slice(&counter.to_le_bytes());
    nonce
}
