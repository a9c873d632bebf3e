//! HKDF-SHA512 key derivation for pairing and session keys.

use hap_core::CryptoError;

use hkdf::Hkdf;
use sha2::Sha512;

/// Derive key using HKDF-SHA512.
///
/// # Arguments
/// * `ikm` - Input key material
/// * `salt` - Salt value (can be empty)
/// * `info` - Context/application-specific info
/// * `length` - Desired output length in bytes
pub fn derive_key(
    ikm: &[u8],
    salt: &[u8],
    info: &[u8],
    length: usize,
) -> Result<Vec<u8>, CryptoError> {
    let hk = Hkdf::<Sha512>::new(Some(salt), ikm);
    let mut okm = vec![0u8; length];
    hk.expand(info, &mut okm)
        .map_err(|_| CryptoError::KeyDerivation("HKDF expand failed".to_string()))?;
    Ok(okm)
}

/// Derive a 32-byte key; every HAP call site uses this length.
pub fn derive_key_32(ikm: &[u8], salt: &[u8], info: &[u8]) -> Result<[u8; 32], CryptoError> {
    let hk = Hkdf::<Sha512>::new(Some(salt), ikm);
    let mut okm = [0u8; 32];
    hk.expand(info, &mut okm)
        .map_err(|_| CryptoError::KeyDerivation("HKDF expand failed".to_string()))?;
    Ok(okm)
}

/// Salt and info strings used by HAP.
pub mod constants {
    pub const PAIR_SETUP_ENCRYPT_SALT: &[u8] = b"Pair-Setup-Encrypt-Salt";
    pub const PAIR_SETUP_ENCRYPT_INFO: &[u8] = b"Pair-Setup-Encrypt-Info";

    pub const PAIR_SETUP_CONTROLLER_SIGN_SALT: &[u8] = b"Pair-Setup-Controller-Sign-Salt";
    pub const PAIR_SETUP_CONTROLLER_SIGN_INFO: &[u8] = b"Pair-Setup-Controller-Sign-Info";

    pub const PAIR_SETUP_ACCESSORY_SIGN_SALT: &[u8] = b"Pair-Setup-Accessory-Sign-Salt";
    pub const PAIR_SETUP_ACCESSORY_SIGN_INFO: &[u8] = b"Pair-Setup-Accessory-Sign-Info";

    pub const PAIR_VERIFY_ENCRYPT_SALT: &[u8] = b"Pair-Verify-Encrypt-Salt";
    pub const PAIR_VERIFY_ENCRYPT_INFO: &[u8] = b"Pair-Verify-Encrypt-Info";

    pub const CONTROL_SALT: &[u8] = b"Control-Salt";
    pub const CONTROL_WRITE_KEY_INFO: &[u8] = b"Control-Write-Encryption-Key";
    pub const CONTROL_READ_KEY_INFO: &[u8] = b"Control-Read-Encryption-Key";
}

/// Derive pair-setup encryption key from the SRP session key.
pub fn derive_pair_setup_key(session_key: &[u8]) -> Result<[u8; 32], CryptoError> {
    derive_key_32(
        session_key,
        constants::PAIR_SETUP_ENCRYPT_SALT,
        constants::PAIR_SETUP_ENCRYPT_INFO,
    )
}

/// Derive iOSDeviceX, the controller's signing prefix in M5.
pub fn derive_controller_sign_key(session_key: &[u8]) -> Result<[u8; 32], CryptoError> {
    derive_key_32(
        session_key,
        constants::PAIR_SETUP_CONTROLLER_SIGN_SALT,
        constants::PAIR_SETUP_CONTROLLER_SIGN_INFO,
    )
}

/// Derive AccessoryX, the accessory's signing prefix in M6.
pub fn derive_accessory_sign_key(session_key: &[u8]) -> Result<[u8; 32], CryptoError> {
    derive_key_32(
        session_key,
        constants::PAIR_SETUP_ACCESSORY_SIGN_SALT,
        constants::PAIR_SETUP_ACCESSORY_SIGN_INFO,
    )
}

/// Derive pair-verify encryption key.
pub fn derive_pair_verify_key(shared_secret: &[u8]) -> Result<[u8; 32], CryptoError> {
    derive_key_32(
        shared_secret,
        constants::PAIR_VERIFY_ENCRYPT_SALT,
        constants::PAIR_VERIFY_ENCRYPT_INFO,
    )
}

/// Derive the key protecting controller-to-accessory traffic.
pub fn derive_control_write_key(shared_secret: &[u8]) -> Result<[u8; 32], CryptoError> {
    derive_key_32(
        shared_secret,
        constants::CONTROL_SALT,
        constants::CONTROL_WRITE_KEY_INFO,
    )
}

/// Derive the key protecting accessory-to-controller traffic.
pub fn derive_control_read_key(shared_secret: &[u8]) -> Result<[u8; 32], CryptoError> {
    derive_key_32(
        shared_secret,
        constants::CONTROL_SALT,
        constants::CONTROL_READ_KEY_INFO,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_key_matches_hkdf_crate() {
        let ikm = [0x0bu8; 22];
        let salt = b"salt";
        let info = b"info";

        let hk = Hkdf::<Sha512>::new(Some(salt), &ikm);
        let mut expected = [0u8; 42];
        hk.expand(info, &mut expected).unwrap();

        assert_eq!(derive_key(&ikm, salt, info, 42).unwrap(), expected.to_vec());
    }

    #[test]
    fn derive_key_32_is_prefix_of_longer_output() {
        let long = derive_key(b"secret", b"s", b"i", 64).unwrap();
        let short = derive_key_32(b"secret", b"s", b"i").unwrap();
        assert_eq!(&long[..32], &short);
    }

    #[test]
    fn oversized_request_fails() {
        // HKDF-SHA512 can emit at most 255 * 64 bytes.
        let result = derive_key(b"secret", b"s", b"i", 255 * 64 + 1);
        assert!(matches!(result, Err(CryptoError::KeyDerivation(_))));
    }

    #[test]
    fn labels_produce_distinct_keys() {
        let secret = [0x42u8; 64];
        let keys = [
            derive_pair_setup_key(&secret).unwrap(),
            derive_controller_sign_key(&secret).unwrap(),
            derive_accessory_sign_key(&secret).unwrap(),
            derive_pair_verify_key(&secret).unwrap(),
            derive_control_write_key(&secret).unwrap(),
            derive_control_read_key(&secret).unwrap(),
        ];
        for i in 0..keys.len() {
            for j in i + 1..keys.len() {
                assert_ne!(keys[i], keys[j], "keys {} and {} collide", i, j);
            }
        }
    }

    #[test]
    fn control_keys_share_salt() {
        let secret = [7u8; 32];
        let expected =
            derive_key_32(&secret, b"Control-Salt", b"Control-Read-Encryption-Key").unwrap();
        assert_eq!(derive_control_read_key(&secret).unwrap(), expected);
    }
}
