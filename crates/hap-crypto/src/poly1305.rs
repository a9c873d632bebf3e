//! Poly1305 one-time authenticator (RFC 7539 section 2.5).
//!
//! Arithmetic uses five 26-bit limbs so every product fits in a `u64`.

use subtle::ConstantTimeEq;
use zeroize::ZeroizeOnDrop;

pub const KEY_LEN: usize = 32;
pub const TAG_LEN: usize = 16;

const MASK26: u32 = 0x03ff_ffff;

#[derive(ZeroizeOnDrop)]
pub struct Poly1305 {
    r: [u32; 5],
    h: [u32; 5],
    pad: [u32; 4],
    buffer: [u8; 16],
    leftover: usize,
}

fn le32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

impl Poly1305 {
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        // r is clamped as it is loaded
        let r = [
            le32(&key[0..4]) & 0x03ff_ffff,
            (le32(&key[3..7]) >> 2) & 0x03ff_ff03,
            (le32(&key[6..10]) >> 4) & 0x03ff_c0ff,
            (le32(&key[9..13]) >> 6) & 0x03f0_3fff,
            (le32(&key[12..16]) >> 8) & 0x000f_ffff,
        ];
        let pad = [
            le32(&key[16..20]),
            le32(&key[20..24]),
            le32(&key[24..28]),
            le32(&key[28..32]),
        ];
        Self {
            r,
            h: [0; 5],
            pad,
            buffer: [0; 16],
            leftover: 0,
        }
    }

    fn block(&mut self, m: &[u8; 16], hibit: u32) {
        let [r0, r1, r2, r3, r4] = self.r.map(|v| v as u64);
        let (s1, s2, s3, s4) = (r1 * 5, r2 * 5, r3 * 5, r4 * 5);

        let h = &mut self.h;
        h[0] += le32(&m[0..4]) & MASK26;
        h[1] += (le32(&m[3..7]) >> 2) & MASK26;
        h[2] += (le32(&m[6..10]) >> 4) & MASK26;
        h[3] += (le32(&m[9..13]) >> 6) & MASK26;
        h[4] += (le32(&m[12..16]) >> 8) | hibit;

        let (h0, h1, h2, h3, h4) = (
            h[0] as u64,
            h[1] as u64,
            h[2] as u64,
            h[3] as u64,
            h[4] as u64,
        );

        let d0 = h0 * r0 + h1 * s4 + h2 * s3 + h3 * s2 + h4 * s1;
        let mut d1 = h0 * r1 + h1 * r0 + h2 * s4 + h3 * s3 + h4 * s2;
        let mut d2 = h0 * r2 + h1 * r1 + h2 * r0 + h3 * s4 + h4 * s3;
        let mut d3 = h0 * r3 + h1 * r2 + h2 * r1 + h3 * r0 + h4 * s4;
        let mut d4 = h0 * r4 + h1 * r3 + h2 * r2 + h3 * r1 + h4 * r0;

        let mask = u64::from(MASK26);
        let mut c = d0 >> 26;
        h[0] = (d0 & mask) as u32;
        d1 += c;
        c = d1 >> 26;
        h[1] = (d1 & mask) as u32;
        d2 += c;
        c = d2 >> 26;
        h[2] = (d2 & mask) as u32;
        d3 += c;
        c = d3 >> 26;
        h[3] = (d3 & mask) as u32;
        d4 += c;
        c = d4 >> 26;
        h[4] = (d4 & mask) as u32;
        h[0] += (c * 5) as u32;
        let carry = h[0] >> 26;
        h[0] &= MASK26;
        h[1] += carry;
    }

    pub fn update(&mut self, mut data: &[u8]) {
        if self.leftover > 0 {
            let take = (16 - self.leftover).min(data.len());
            self.buffer[self.leftover..self.leftover + take].copy_from_slice(&data[..take]);
            self.leftover += take;
            data = &data[take..];
            if self.leftover < 16 {
                return;
            }
            let block = self.buffer;
            self.block(&block, 1 << 24);
            self.leftover = 0;
        }

        let mut chunks = data.chunks_exact(16);
        for chunk in &mut chunks {
            let mut block = [0u8; 16];
            block.copy_from_slice(chunk);
            self.block(&block, 1 << 24);
        }

        let rest = chunks.remainder();
        self.buffer[..rest.len()].copy_from_slice(rest);
        self.leftover = rest.len();
    }

    /// Feed `data` followed by zero bytes up to the next 16-byte boundary.
    pub fn update_padded(&mut self, data: &[u8]) {
        self.update(data);
        let rem = data.len() % 16;
        if rem != 0 {
            self.update(&[0u8; 16][..16 - rem]);
        }
    }

    pub fn finalize(mut self) -> [u8; TAG_LEN] {
        if self.leftover > 0 {
            let mut block = [0u8; 16];
            block[..self.leftover].copy_from_slice(&self.buffer[..self.leftover]);
            block[self.leftover] = 1;
            self.block(&block, 0);
        }

        let mut h = self.h;

        let mut c = h[1] >> 26;
        h[1] &= MASK26;
        h[2] += c;
        c = h[2] >> 26;
        h[2] &= MASK26;
        h[3] += c;
        c = h[3] >> 26;
        h[3] &= MASK26;
        h[4] += c;
        c = h[4] >> 26;
        h[4] &= MASK26;
        h[0] += c * 5;
        c = h[0] >> 26;
        h[0] &= MASK26;
        h[1] += c;

        // g = h + 5 - 2^130, selected when h >= p
        let mut g = [0u32; 5];
        g[0] = h[0] + 5;
        c = g[0] >> 26;
        g[0] &= MASK26;
        g[1] = h[1] + c;
        c = g[1] >> 26;
        g[1] &= MASK26;
        g[2] = h[2] + c;
        c = g[2] >> 26;
        g[2] &= MASK26;
        g[3] = h[3] + c;
        c = g[3] >> 26;
        g[3] &= MASK26;
        g[4] = h[4].wrapping_add(c).wrapping_sub(1 << 26);

        let select = (g[4] >> 31).wrapping_sub(1);
        for i in 0..5 {
            h[i] = (h[i] & !select) | (g[i] & select);
        }

        let w0 = h[0] | (h[1] << 26);
        let w1 = (h[1] >> 6) | (h[2] << 20);
        let w2 = (h[2] >> 12) | (h[3] << 14);
        let w3 = (h[3] >> 18) | (h[4] << 8);

        let mut tag = [0u8; TAG_LEN];
        let mut f = u64::from(w0) + u64::from(self.pad[0]);
        tag[0..4].copy_from_slice(&(f as u32).to_le_bytes());
        f = u64::from(w1) + u64::from(self.pad[1]) + (f >> 32);
        tag[4..8].copy_from_slice(&(f as u32).to_le_bytes());
        f = u64::from(w2) + u64::from(self.pad[2]) + (f >> 32);
        tag[8..12].copy_from_slice(&(f as u32).to_le_bytes());
        f = u64::from(w3) + u64::from(self.pad[3]) + (f >> 32);
        tag[12..16].copy_from_slice(&(f as u32).to_le_bytes());
        tag
    }
}

/// One-shot MAC of `data`.
pub fn mac(key: &[u8; KEY_LEN], data: &[u8]) -> [u8; TAG_LEN] {
    let mut poly = Poly1305::new(key);
    poly.update(data);
    poly.finalize()
}

/// Constant-time tag comparison.
pub fn verify(expected: &[u8; TAG_LEN], received: &[u8]) -> bool {
    received.len() == TAG_LEN && bool::from(expected.ct_eq(received))
}
