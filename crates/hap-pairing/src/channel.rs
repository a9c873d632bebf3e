//! Encrypted frame codec used after pair-verify.
//!
//! Every byte on a verified connection travels in frames:
//!
//! ```text
//! +----------------+------------------+----------+
//! | Length (2 LE)  | Ciphertext (N)   | Tag (16) |
//! +----------------+------------------+----------+
//! ```
//!
//! - Length: plaintext length, at most 1024, also the AEAD associated data
//! - Nonce: 64-bit per-direction counter, starting at zero
//!
//! Inbound bytes may arrive split anywhere; partial frames are buffered until
//! the rest shows up.

use hap_core::TransportError;
use hap_crypto::aead::{nonce_from_counter, ChaCha20Poly1305, TAG_LEN};
use hap_crypto::SessionKeys;
use tracing::trace;

/// Largest plaintext carried by one frame.
pub const MAX_FRAME_PAYLOAD: usize = 1024;

const LENGTH_LEN: usize = 2;

/// Directional ChaCha20-Poly1305 framing for one connection.
pub struct FrameCodec {
    write_cipher: ChaCha20Poly1305,
    read_cipher: ChaCha20Poly1305,
    write_counter: u64,
    read_counter: u64,
    inbound: Vec<u8>,
}

impl FrameCodec {
    /// Build from keys oriented for this endpoint (`write_key` seals outbound).
    pub fn new(keys: &SessionKeys) -> Self {
        Self {
            write_cipher: ChaCha20Poly1305::new(*keys.write_key.as_bytes()),
            read_cipher: ChaCha20Poly1305::new(*keys.read_key.as_bytes()),
            write_counter: 0,
            read_counter: 0,
            inbound: Vec::new(),
        }
    }

    /// Seal `plaintext` into as many frames as needed.
    ///
    /// Empty input produces no frames.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Vec<u8> {
        let frames = plaintext.len().div_ceil(MAX_FRAME_PAYLOAD);
        let mut out = Vec::with_capacity(plaintext.len() + frames * (LENGTH_LEN + TAG_LEN));

        for chunk in plaintext.chunks(MAX_FRAME_PAYLOAD) {
            let aad = (chunk.len() as u16).to_le_bytes();
            let nonce = nonce_from_counter(self.write_counter);
            self.write_counter += 1;

            out.extend_from_slice(&aad);
            out.extend_from_slice(&self.write_cipher.encrypt(&nonce, &aad, chunk));
        }

        trace!(len = plaintext.len(), frames, "Encrypted outbound data");
        out
    }

    /// Feed received bytes and open every complete frame.
    ///
    /// Returns `Ok(None)` while no complete frame is available. A frame that
    /// fails authentication or declares an oversized length is fatal for the
    /// connection; nothing decoded in that call is released.
    pub fn decrypt(&mut self, data: &[u8]) -> Result<Option<Vec<u8>>, TransportError> {
        self.inbound.extend_from_slice(data);

        let mut plaintext = Vec::new();
        let mut consumed = 0;

        while self.inbound.len() - consumed >= LENGTH_LEN {
            let frame = &self.inbound[consumed..];
            let len = u16::from_le_bytes([frame[0], frame[1]]) as usize;
            if len > MAX_FRAME_PAYLOAD {
                return Err(TransportError::FrameTooLarge(len));
            }

            let total = LENGTH_LEN + len + TAG_LEN;
            if frame.len() < total {
                break;
            }

            let nonce = nonce_from_counter(self.read_counter);
            let opened = self
                .read_cipher
                .decrypt(&nonce, &frame[..LENGTH_LEN], &frame[LENGTH_LEN..total])
                .map_err(|_| TransportError::FrameCorrupted)?;
            self.read_counter += 1;

            plaintext.extend_from_slice(&opened);
            consumed += total;
        }

        self.inbound.drain(..consumed);

        if plaintext.is_empty() {
            Ok(None)
        } else {
            trace!(len = plaintext.len(), buffered = self.inbound.len(), "Decrypted inbound data");
            Ok(Some(plaintext))
        }
    }

    pub fn write_counter(&self) -> u64 {
        self.write_counter
    }

    pub fn read_counter(&self) -> u64 {
        self.read_counter
    }

    /// Bytes of an incomplete frame waiting for more input.
    pub fn buffered(&self) -> usize {
        self.inbound.len()
    }
}
