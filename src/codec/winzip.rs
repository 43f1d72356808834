//! WinZip AES entry decryption
//!
//! Encrypted payload layout: `salt ‖ password verifier (2 bytes) ‖
//! ciphertext ‖ authentication code (10 bytes)`. PBKDF2-HMAC-SHA1 over the
//! password and salt yields the AES key, the HMAC key and the verifier in
//! one derivation. The cipher is AES-CTR with a little-endian 128-bit
//! counter that starts at 1; the authentication code is an HMAC-SHA1 over
//! the ciphertext, truncated to 10 bytes.

use aes::{Aes128, Aes192, Aes256};
use ctr::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use sha1::Sha1;

use crate::error::{Error, Result};
use crate::p4k::AesStrength;

type HmacSha1 = Hmac<Sha1>;
type Aes128Ctr = ctr::Ctr128LE<Aes128>;
type Aes192Ctr = ctr::Ctr128LE<Aes192>;
type Aes256Ctr = ctr::Ctr128LE<Aes256>;

/// Length of the password verifier preceding the ciphertext
pub const VERIFIER_LEN: usize = 2;

/// Length of the truncated HMAC-SHA1 trailer
pub const AUTH_CODE_LEN: usize = 10;

/// PBKDF2 iteration count fixed by the WinZip AE specification
pub const PBKDF2_ITERATIONS: u32 = 1000;

/// Derived key material: AES key, HMAC key, password verifier
struct DerivedKeys {
    cipher_key: Vec<u8>,
    mac_key: Vec<u8>,
    verifier: [u8; VERIFIER_LEN],
}

fn derive_keys(password: &[u8], salt: &[u8], strength: AesStrength) -> DerivedKeys {
    let key_len = strength.key_len();
    let mut derived = vec![0u8; key_len * 2 + VERIFIER_LEN];
    pbkdf2_hmac::<Sha1>(password, salt, PBKDF2_ITERATIONS, &mut derived);

    let mut verifier = [0u8; VERIFIER_LEN];
    verifier.copy_from_slice(&derived[key_len * 2..]);

    DerivedKeys {
        cipher_key: derived[..key_len].to_vec(),
        mac_key: derived[key_len..key_len * 2].to_vec(),
        verifier,
    }
}

/// Apply the AES-CTR keystream in place. Counter starts at 1, little-endian.
fn apply_ctr(strength: AesStrength, key: &[u8], data: &mut [u8]) -> Result<()> {
    let iv = 1u128.to_le_bytes();
    let bad_key = |_| Error::InvalidOperation("AES key length mismatch");

    match strength {
        AesStrength::Aes128 => {
            let mut cipher = Aes128Ctr::new_from_slices(key, &iv).map_err(bad_key)?;
            cipher.apply_keystream(data);
        }
        AesStrength::Aes192 => {
            let mut cipher = Aes192Ctr::new_from_slices(key, &iv).map_err(bad_key)?;
            cipher.apply_keystream(data);
        }
        AesStrength::Aes256 => {
            let mut cipher = Aes256Ctr::new_from_slices(key, &iv).map_err(bad_key)?;
            cipher.apply_keystream(data);
        }
    }
    Ok(())
}

fn auth_code(mac_key: &[u8], ciphertext: &[u8]) -> Result<[u8; AUTH_CODE_LEN]> {
    let mut mac = HmacSha1::new_from_slice(mac_key)
        .map_err(|_| Error::InvalidOperation("HMAC key length mismatch"))?;
    mac.update(ciphertext);
    let tag = mac.finalize().into_bytes();

    let mut code = [0u8; AUTH_CODE_LEN];
    code.copy_from_slice(&tag[..AUTH_CODE_LEN]);
    Ok(code)
}

/// Decrypt a WinZip-AES entry payload, verifying the password verifier
/// before touching the stream and the authentication code before the
/// plaintext is handed back.
///
/// # Errors
/// Returns [`Error::CorruptEntry`] if the payload is too short to hold the
/// crypto framing, [`Error::AuthenticationFailed`] on verifier or
/// authentication code mismatch.
pub fn decrypt(
    name: &str,
    payload: &[u8],
    strength: AesStrength,
    password: &[u8],
) -> Result<Vec<u8>> {
    let salt_len = strength.salt_len();
    let framing = salt_len + VERIFIER_LEN + AUTH_CODE_LEN;
    if payload.len() < framing {
        return Err(Error::CorruptEntry {
            name: name.to_string(),
            reason: format!(
                "payload too short for AES framing: {} < {framing} bytes",
                payload.len()
            ),
        });
    }

    let salt = &payload[..salt_len];
    let verifier = &payload[salt_len..salt_len + VERIFIER_LEN];
    let ciphertext = &payload[salt_len + VERIFIER_LEN..payload.len() - AUTH_CODE_LEN];
    let trailer = &payload[payload.len() - AUTH_CODE_LEN..];

    let keys = derive_keys(password, salt, strength);

    if verifier != keys.verifier {
        return Err(Error::AuthenticationFailed {
            name: name.to_string(),
            reason: "password verifier mismatch",
        });
    }

    let expected = auth_code(&keys.mac_key, ciphertext)?;
    if trailer != expected {
        return Err(Error::AuthenticationFailed {
            name: name.to_string(),
            reason: "authentication code mismatch",
        });
    }

    let mut plaintext = ciphertext.to_vec();
    apply_ctr(strength, &keys.cipher_key, &mut plaintext)?;
    Ok(plaintext)
}

/// Produce a full encrypted payload (test helper, the library is read-only)
#[cfg(test)]
pub fn encrypt(
    plaintext: &[u8],
    strength: AesStrength,
    password: &[u8],
    salt: &[u8],
) -> Vec<u8> {
    assert_eq!(salt.len(), strength.salt_len());
    let keys = derive_keys(password, salt, strength);

    let mut ciphertext = plaintext.to_vec();
    apply_ctr(strength, &keys.cipher_key, &mut ciphertext).unwrap();
    let code = auth_code(&keys.mac_key, &ciphertext).unwrap();

    let mut payload = Vec::with_capacity(salt.len() + VERIFIER_LEN + ciphertext.len() + AUTH_CODE_LEN);
    payload.extend_from_slice(salt);
    payload.extend_from_slice(&keys.verifier);
    payload.extend_from_slice(&ciphertext);
    payload.extend_from_slice(&code);
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PASSWORD: &[u8] = b"archive master key";
    const SALT_256: [u8; 16] = [
        0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E,
        0x0F, 0x10,
    ];

    #[test]
    fn test_round_trip_all_strengths() {
        let plaintext = b"localization payload bytes";
        for strength in [AesStrength::Aes128, AesStrength::Aes192, AesStrength::Aes256] {
            let salt = vec![0x5Au8; strength.salt_len()];
            let payload = encrypt(plaintext, strength, PASSWORD, &salt);
            let decoded = decrypt("test.xml", &payload, strength, PASSWORD).unwrap();
            assert_eq!(decoded, plaintext);
        }
    }

    #[test]
    fn test_wrong_password_fails_verifier() {
        let payload = encrypt(b"data", AesStrength::Aes256, PASSWORD, &SALT_256);
        let err = decrypt("test.xml", &payload, AesStrength::Aes256, b"wrong").unwrap_err();
        assert!(matches!(
            err,
            Error::AuthenticationFailed {
                reason: "password verifier mismatch",
                ..
            }
        ));
    }

    #[test]
    fn test_corrupted_auth_code_fails() {
        let mut payload = encrypt(b"data", AesStrength::Aes256, PASSWORD, &SALT_256);
        let last = payload.len() - 1;
        payload[last] ^= 0xFF;
        let err = decrypt("test.xml", &payload, AesStrength::Aes256, PASSWORD).unwrap_err();
        assert!(matches!(
            err,
            Error::AuthenticationFailed {
                reason: "authentication code mismatch",
                ..
            }
        ));
    }

    #[test]
    fn test_corrupted_ciphertext_fails_auth() {
        let mut payload = encrypt(b"data bytes here", AesStrength::Aes128, PASSWORD, &[7u8; 8]);
        // Flip a ciphertext byte, leaving framing intact
        payload[12] ^= 0x80;
        let err = decrypt("test.xml", &payload, AesStrength::Aes128, PASSWORD).unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailed { .. }));
    }

    #[test]
    fn test_short_payload_is_corrupt() {
        let err = decrypt("test.xml", &[0u8; 4], AesStrength::Aes256, PASSWORD).unwrap_err();
        assert!(matches!(err, Error::CorruptEntry { .. }));
    }
}
