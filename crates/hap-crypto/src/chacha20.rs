//! ChaCha20 stream cipher (RFC 7539, 20 rounds, 96-bit nonce).

use zeroize::ZeroizeOnDrop;

/// Size of one keystream block in bytes.
pub const BLOCK_LEN: usize = 64;

const CONSTANTS: [u32; 4] = [0x6170_7865, 0x3320_646e, 0x7962_2d32, 0x6b20_6574];

/// ChaCha20 keyed with a 256-bit key and a 96-bit nonce.
///
/// The block counter is supplied per call so the same instance can produce
/// the Poly1305 one-time key (counter 0) and the payload keystream
/// (counter 1 onwards).
#[derive(ZeroizeOnDrop)]
pub struct ChaCha20 {
    /// Initial state with the counter word left at zero.
    state: [u32; 16],
}

#[inline(always)]
fn quarter_round(s: &mut [u32; 16], a: usize, b: usize, c: usize, d: usize) {
    s[a] = s[a].wrapping_add(s[b]);
    s[d] = (s[d] ^ s[a]).rotate_left(16);
    s[c] = s[c].wrapping_add(s[d]);
    s[b] = (s[b] ^ s[c]).rotate_left(12);
    s[a] = s[a].wrapping_add(s[b]);
    s[d] = (s[d] ^ s[a]).rotate_left(8);
    s[c] = s[c].wrapping_add(s[d]);
    s[b] = (s[b] ^ s[c]).rotate_left(7);
}

fn le_word(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

impl ChaCha20 {
    pub fn new(key: &[u8; 32], nonce: &[u8; 12]) -> Self {
        let mut state = [0u32; 16];
        state[..4].copy_from_slice(&CONSTANTS);
        for (i, chunk) in key.chunks_exact(4).enumerate() {
            state[4 + i] = le_word(chunk);
        }
        for (i, chunk) in nonce.chunks_exact(4).enumerate() {
            state[13 + i] = le_word(chunk);
        }
        Self { state }
    }

    /// Produce the keystream block for `counter`.
    pub fn block(&self, counter: u32) -> [u8; BLOCK_LEN] {
        let mut input = self.state;
        input[12] = counter;

        let mut working = input;
        for _ in 0..10 {
            // column round
            quarter_round(&mut working, 0, 4, 8, 12);
            quarter_round(&mut working, 1, 5, 9, 13);
            quarter_round(&mut working, 2, 6, 10, 14);
            quarter_round(&mut working, 3, 7, 11, 15);
            // diagonal round
            quarter_round(&mut working, 0, 5, 10, 15);
            quarter_round(&mut working, 1, 6, 11, 12);
            quarter_round(&mut working, 2, 7, 8, 13);
            quarter_round(&mut working, 3, 4, 9, 14);
        }

        let mut out = [0u8; BLOCK_LEN];
        for (i, word) in working.iter().enumerate() {
            let sum = word.wrapping_add(input[i]);
            out[i * 4..i * 4 + 4].copy_from_slice(&sum.to_le_bytes());
        }
        out
    }

    /// XOR `data` in place with the keystream starting at block `counter`.
    pub fn apply_keystream(&self, counter: u32, data: &mut [u8]) {
        for (i, chunk) in data.chunks_mut(BLOCK_LEN).enumerate() {
            let keystream = self.block(counter.wrapping_add(i as u32));
            for (byte, k) in chunk.iter_mut().zip(keystream.iter()) {
                *byte ^= k;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sequential_key() -> [u8; 32] {
        let mut key = [0u8; 32];
        for (i, b) in key.iter_mut().enumerate() {
            *b = i as u8;
        }
        key
    }

    mod known_vectors {
        use super::*;

        #[test]
        fn rfc7539_quarter_round() {
            // Section 2.1.1
            let mut s = [0u32; 16];
            s[0] = 0x1111_1111;
            s[1] = 0x0102_0304;
            s[2] = 0x9b8d_6f43;
            s[3] = 0x0123_4567;
            quarter_round(&mut s, 0, 1, 2, 3);
            assert_eq!(s[0], 0xea2a_92f4);
            assert_eq!(s[1], 0xcb1c_f8ce);
            assert_eq!(s[2], 0x4581_472e);
            assert_eq!(s[3], 0x5881_c4bb);
        }

        #[test]
        fn rfc7539_block_function() {
            // Section 2.3.2
            let nonce: [u8; 12] = hex::decode("000000090000004a00000000")
                .unwrap()
                .try_into()
                .unwrap();
            let cipher = ChaCha20::new(&sequential_key(), &nonce);
            let block = cipher.block(1);

            let expected = hex::decode(
                "10f1e7e4d13b5915500fdd1fa32071c4c7d1f4c733c068030422aa9ac3d46c4e\
                 d2826446079faa0914c2d705d98b02a2b5129cd1de164eb9cbd083e8a2503c4e",
            )
            .unwrap();
            assert_eq!(block.to_vec(), expected);
        }

        #[test]
        fn rfc7539_encryption() {
            // Section 2.4.2
            let nonce: [u8; 12] = hex::decode("000000000000004a00000000")
                .unwrap()
                .try_into()
                .unwrap();
            let cipher = ChaCha20::new(&sequential_key(), &nonce);
            let mut data = b"Ladies and Gentlemen of the class of '99: If I could offer you \
                only one tip for the future, sunscreen would be it."
                .to_vec();
            cipher.apply_keystream(1, &mut data);

            let expected = hex::decode(
                "6e2e359a2568f98041ba0728dd0d6981e97e7aec1d4360c20a27afccfd9fae0b\
                 f91b65c5524733ab8f593dabcd62b3571639d624e65152ab8f530c359f0861d8\
                 07ca0dbf500d6a6156a38e088a22b65e52bc514d16ccf806818ce91ab7793736\
                 5af90bbf74a35be6b40b8eedf2785e42874d",
            )
            .unwrap();
            assert_eq!(data, expected);
        }
    }

    mod keystream {
        use super::*;

        #[test]
        fn applying_twice_restores_plaintext() {
            let cipher = ChaCha20::new(&[0x42u8; 32], &[7u8; 12]);
            let original: Vec<u8> = (0..200u32).map(|i| (i * 3) as u8).collect();
            let mut data = original.clone();
            cipher.apply_keystream(1, &mut data);
            assert_ne!(data, original);
            cipher.apply_keystream(1, &mut data);
            assert_eq!(data, original);
        }

        #[test]
        fn consecutive_blocks_use_consecutive_counters() {
            let cipher = ChaCha20::new(&[1u8; 32], &[0u8; 12]);
            let mut data = vec![0u8; BLOCK_LEN * 2];
            cipher.apply_keystream(5, &mut data);
            assert_eq!(&data[..BLOCK_LEN], &cipher.block(5)[..]);
            assert_eq!(&data[BLOCK_LEN..], &cipher.block(6)[..]);
        }

        #[test]
        fn nonce_changes_keystream() {
            let a = ChaCha20::new(&[1u8; 32], &[0u8; 12]);
            let b = ChaCha20::new(&[1u8; 32], &[1u8; 12]);
            assert_ne!(a.block(0), b.block(0));
        }
    }
}
