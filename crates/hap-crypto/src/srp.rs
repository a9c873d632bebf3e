//! SRP-6a for HAP pair-setup.
//!
//! Uses 3072-bit prime (RFC 5054), generator g=5, SHA-512. The accessory
//! plays the server role; the client role is used by the controller driver.

use hap_core::CryptoError;
use num_bigint::{BigUint, RandBigInt};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::keys::SharedSecret;

/// Fixed SRP username for pair-setup.
pub const SRP_IDENTITY: &[u8] = b"Pair-Setup";

/// Salt length used by the accessory.
pub const SALT_LEN: usize = 16;

/// Width of N in bytes.
pub const N_BYTES: usize = 384;

/// N from RFC 5054 appendix A, 3072-bit group.
const RFC5054_N_3072: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E08",
    "8A67CC74020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B",
    "302B0A6DF25F14374FE1356D6D51C245E485B576625E7EC6F44C42E9",
    "A637ED6B0BFF5CB6F406B7EDEE386BFB5A899FA5AE9F24117C4B1FE6",
    "49286651ECE45B3DC2007CB8A163BF0598DA48361C55D39A69163FA8",
    "FD24CF5F83655D23DCA3AD961C62F356208552BB9ED529077096966D",
    "670C354E4ABC9804F1746C08CA18217C32905E462E36CE3BE39E772C",
    "180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718",
    "3995497CEA956AE515D2261898FA051015728E5A8AAAC42DAD33170D",
    "04507A33A85521ABDF1CBA64ECFB850458DBEF0A8AEA71575D060C7D",
    "B3970F85A6E1E4C7ABF5AE8CDB0933D71E8C94E04A25619DCEE3D226",
    "1AD2EE6BF12FFA06D98A0864D87602733EC86A64521F2B18177B200C",
    "BBE117577A615D6C770988C0BAD946E208E24FA074E5AB3143DB5BFC",
    "E0FD108E4B82D120A93AD2CAFFFFFFFFFFFFFFFF"
);

/// Group parameters.
pub struct SrpParams {
    /// Prime modulus N.
    pub n: BigUint,
    /// Generator, 5 for this group.
    pub g: BigUint,
}

impl Default for SrpParams {
    fn default() -> Self {
        let n = BigUint::parse_bytes(RFC5054_N_3072.as_bytes(), 16)
            .expect("RFC 5054 prime constant is valid hex");
        let g = BigUint::from(5u32);
        Self { n, g }
    }
}

/// Accessory-side SRP session for one pair-setup attempt.
#[derive(ZeroizeOnDrop)]
pub struct SrpServer {
    #[zeroize(skip)]
    params: SrpParams,
    identity: Vec<u8>,
    salt: [u8; SALT_LEN],
    verifier: Vec<u8>,
    private_key: Vec<u8>,
    #[zeroize(skip)]
    public_key: BigUint,
}

/// Outcome of a verified client proof.
pub struct SrpSession {
    /// K = H(S), input to every pair-setup HKDF call.
    pub session_key: SharedSecret,
    /// M2 returned to the controller.
    pub server_proof: Vec<u8>,
}

impl SrpServer {
    /// Start a session with a fresh random salt and private value.
    pub fn new(identity: &[u8], password: &[u8]) -> Self {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let b = OsRng.gen_biguint(256);
        Self::with_secrets(identity, password, salt, &b.to_bytes_be())
    }

    /// Start a session with caller-supplied salt and private value.
    pub fn with_secrets(
        identity: &[u8],
        password: &[u8],
        salt: [u8; SALT_LEN],
        private_key: &[u8],
    ) -> Self {
        let params = SrpParams::default();

        // v = g^x mod N
        let x = compute_x(&salt, identity, password);
        let verifier = params.g.modpow(&x, &params.n);

        // B = (k*v + g^b) mod N
        let b = BigUint::from_bytes_be(private_key);
        let k = compute_k(&params);
        let g_b = params.g.modpow(&b, &params.n);
        let public_key = ((&k * &verifier) + g_b) % &params.n;

        Self {
            params,
            identity: identity.to_vec(),
            salt,
            verifier: verifier.to_bytes_be(),
            private_key: private_key.to_vec(),
            public_key,
        }
    }

    pub fn salt(&self) -> [u8; SALT_LEN] {
        self.salt
    }

    /// Server public value B (384 bytes).
    pub fn public_key(&self) -> Vec<u8> {
        pad(&self.public_key)
    }

    /// Check the controller's proof M1 and produce M2.
    pub fn verify_client(
        &self,
        client_public: &[u8],
        client_proof: &[u8],
    ) -> Result<SrpSession, CryptoError> {
        let a = BigUint::from_bytes_be(client_public);
        if &a % &self.params.n == BigUint::ZERO {
            return Err(CryptoError::InvalidPublicKey);
        }

        let u = compute_u(&a, &self.public_key);
        if u == BigUint::ZERO {
            return Err(CryptoError::InvalidPublicKey);
        }

        // S = (A * v^u)^b mod N
        let verifier = BigUint::from_bytes_be(&self.verifier);
        let b = BigUint::from_bytes_be(&self.private_key);
        let base = (&a * verifier.modpow(&u, &self.params.n)) % &self.params.n;
        let s = base.modpow(&b, &self.params.n);

        let session_key = hash_premaster(&s);
        let expected = compute_m1(
            &self.params,
            &self.identity,
            &self.salt,
            &a,
            &self.public_key,
            &session_key,
        );

        if !bool::from(expected.as_slice().ct_eq(client_proof)) {
            return Err(CryptoError::ProofMismatch);
        }

        let server_proof = compute_m2(&a, &expected, &session_key);
        Ok(SrpSession {
            session_key: SharedSecret::new(session_key),
            server_proof,
        })
    }
}

/// Controller-side SRP state.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SrpClient {
    #[zeroize(skip)]
    params: SrpParams,
    identity: Vec<u8>,
    password: Vec<u8>,
    private_key: Vec<u8>,
    #[zeroize(skip)]
    public_key: BigUint,
}

/// Values the accessory sends in M2.
pub struct SrpChallenge {
    pub salt: [u8; SALT_LEN],
    pub server_public_key: Vec<u8>,
}

/// Result of processing a challenge.
pub struct SrpProof {
    pub client_proof: Vec<u8>,
    pub shared_secret: Vec<u8>,
    pub expected_server_proof: Vec<u8>,
}

impl SrpClient {
    /// Create new SRP client with identity and password.
    ///
    /// For HAP, identity is "Pair-Setup" and password is the setup code.
    pub fn new(identity: &[u8], password: &[u8]) -> Self {
        let a = OsRng.gen_biguint(256);
        Self::with_private_key(identity, password, &a.to_bytes_be())
    }

    pub fn with_private_key(identity: &[u8], password: &[u8], private_key: &[u8]) -> Self {
        let params = SrpParams::default();
        let a = BigUint::from_bytes_be(private_key);
        let public_key = params.g.modpow(&a, &params.n);

        Self {
            params,
            identity: identity.to_vec(),
            password: password.to_vec(),
            private_key: private_key.to_vec(),
            public_key,
        }
    }

    /// Client public value A (384 bytes).
    pub fn public_key(&self) -> Vec<u8> {
        pad(&self.public_key)
    }

    /// Process the accessory's challenge and generate M1.
    pub fn process_challenge(&self, challenge: &SrpChallenge) -> Result<SrpProof, CryptoError> {
        let b = BigUint::from_bytes_be(&challenge.server_public_key);
        if &b % &self.params.n == BigUint::ZERO {
            return Err(CryptoError::InvalidPublicKey);
        }

        let a = BigUint::from_bytes_be(&self.private_key);
        let u = compute_u(&self.public_key, &b);
        if u == BigUint::ZERO {
            return Err(CryptoError::InvalidPublicKey);
        }

        let x = compute_x(&challenge.salt, &self.identity, &self.password);
        let k = compute_k(&self.params);

        // S = (B - k * g^x)^(a + u*x) mod N
        let k_gx = (&k * self.params.g.modpow(&x, &self.params.n)) % &self.params.n;
        let base = if b >= k_gx {
            (&b - &k_gx) % &self.params.n
        } else {
            (&b + &self.params.n - &k_gx) % &self.params.n
        };
        let exponent = (&a + &u * &x) % (&self.params.n - BigUint::from(1u32));
        let s = base.modpow(&exponent, &self.params.n);

        let shared_secret = hash_premaster(&s);
        let client_proof = compute_m1(
            &self.params,
            &self.identity,
            &challenge.salt,
            &self.public_key,
            &b,
            &shared_secret,
        );
        let expected_server_proof = compute_m2(&self.public_key, &client_proof, &shared_secret);

        Ok(SrpProof {
            client_proof,
            shared_secret,
            expected_server_proof,
        })
    }

    /// Verify the accessory's proof M2.
    pub fn verify_server_proof(&self, proof: &[u8], expected: &[u8]) -> bool {
        proof.ct_eq(expected).into()
    }
}

/// SHA-512 over the concatenation of `parts`.
fn digest(parts: &[&[u8]]) -> Vec<u8> {
    parts
        .iter()
        .fold(Sha512::new(), |h, part| h.chain_update(part))
        .finalize()
        .to_vec()
}

/// Big-endian value left-padded to the modulus width.
fn pad(value: &BigUint) -> Vec<u8> {
    let raw = value.to_bytes_be();
    let skip = raw.len().saturating_sub(N_BYTES);
    let mut out = vec![0u8; N_BYTES.saturating_sub(raw.len())];
    out.extend_from_slice(&raw[skip..]);
    out
}

fn digest_int(parts: &[&[u8]]) -> BigUint {
    BigUint::from_bytes_be(&digest(parts))
}

/// K = H(PAD(S))
fn hash_premaster(s: &BigUint) -> Vec<u8> {
    let mut padded = pad(s);
    let key = digest(&[&padded]);
    padded.zeroize();
    key
}

/// M1 = H(H(N) xor H(g) | H(I) | s | PAD(A) | PAD(B) | K)
fn compute_m1(
    params: &SrpParams,
    identity: &[u8],
    salt: &[u8],
    a: &BigUint,
    b: &BigUint,
    k: &[u8],
) -> Vec<u8> {
    let h_n = digest(&[&pad(&params.n)]);
    // H(g) over the raw generator byte, unlike k which pads g
    let h_g = digest(&[&params.g.to_bytes_be()]);
    let group: Vec<u8> = h_n.iter().zip(&h_g).map(|(n, g)| n ^ g).collect();

    digest(&[&group, &digest(&[identity]), salt, &pad(a), &pad(b), k])
}

/// M2 = H(PAD(A) | M1 | K)
fn compute_m2(a: &BigUint, m1: &[u8], k: &[u8]) -> Vec<u8> {
    digest(&[&pad(a), m1, k])
}

/// k = H(N | PAD(g))
fn compute_k(params: &SrpParams) -> BigUint {
    digest_int(&[&pad(&params.n), &pad(&params.g)])
}

/// u = H(PAD(A) | PAD(B))
fn compute_u(a: &BigUint, b: &BigUint) -> BigUint {
    digest_int(&[&pad(a), &pad(b)])
}

/// x = H(s | H(I | ":" | P))
fn compute_x(salt: &[u8], identity: &[u8], password: &[u8]) -> BigUint {
    let inner = digest(&[identity, b":", password]);
    digest_int(&[salt, &inner])
}
