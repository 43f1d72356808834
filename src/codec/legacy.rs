//! PKZip-classic stream cipher
//!
//! The traditional ZIP encryption scheme: three 32-bit key registers are
//! seeded from the key bytes, then advanced once per plaintext byte. Each
//! payload byte is XORed with a keystream byte derived from the third
//! register. Encrypted entries carry a 12-byte header whose final byte
//! doubles as a cheap password check.

/// Length of the encryption header prepended to legacy-encrypted payloads
pub const HEADER_LEN: usize = 12;

/// Keystream state for the classic cipher
pub struct LegacyCipher {
    keys: [u32; 3],
}

impl LegacyCipher {
    /// Initialize the key registers from the archive key bytes
    #[must_use]
    pub fn new(key: &[u8]) -> Self {
        let mut cipher = Self {
            keys: [0x12345678, 0x23456789, 0x34567890],
        };
        for &b in key {
            cipher.update_keys(b);
        }
        cipher
    }

    /// Single-byte CRC-32 table step on a raw register value.
    ///
    /// `crc32fast` only exposes the pre/post-inverted form, so undo the
    /// conditioning on both sides.
    fn crc32_byte(crc: u32, b: u8) -> u32 {
        let mut hasher = crc32fast::Hasher::new_with_initial(!crc);
        hasher.update(&[b]);
        !hasher.finalize()
    }

    fn update_keys(&mut self, plain: u8) {
        self.keys[0] = Self::crc32_byte(self.keys[0], plain);
        self.keys[1] = self.keys[1]
            .wrapping_add(self.keys[0] & 0xFF)
            .wrapping_mul(134775813)
            .wrapping_add(1);
        self.keys[2] = Self::crc32_byte(self.keys[2], (self.keys[1] >> 24) as u8);
    }

    fn keystream_byte(&self) -> u8 {
        let temp = (self.keys[2] | 2) & 0xFFFF;
        (temp.wrapping_mul(temp ^ 1) >> 8) as u8
    }

    /// Decrypt one byte and advance the keystream
    pub fn decrypt_byte(&mut self, cipher: u8) -> u8 {
        let plain = cipher ^ self.keystream_byte();
        self.update_keys(plain);
        plain
    }

    /// Decrypt a buffer in place
    pub fn decrypt(&mut self, data: &mut [u8]) {
        for b in data {
            *b = self.decrypt_byte(*b);
        }
    }

    /// Encrypt one byte and advance the keystream
    #[cfg(test)]
    pub fn encrypt_byte(&mut self, plain: u8) -> u8 {
        let cipher = plain ^ self.keystream_byte();
        self.update_keys(plain);
        cipher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const KEY: [u8; 16] = [
        0x5E, 0x7A, 0x20, 0x02, 0x30, 0x2E, 0xEB, 0x1A, 0x3B, 0xB6, 0x17, 0xC3, 0x0F, 0xDE,
        0x1E, 0x47,
    ];

    #[test]
    fn test_crc32_byte_matches_reference_table() {
        // Reference: table-driven update crc = table[(crc ^ b) & 0xff] ^ (crc >> 8)
        // with the standard reflected polynomial 0xEDB88320.
        fn reference(crc: u32, b: u8) -> u32 {
            let mut entry = (crc ^ u32::from(b)) & 0xFF;
            for _ in 0..8 {
                entry = if entry & 1 != 0 {
                    0xEDB88320 ^ (entry >> 1)
                } else {
                    entry >> 1
                };
            }
            entry ^ (crc >> 8)
        }

        for (crc, b) in [(0u32, 0u8), (0x12345678, 0xAB), (u32::MAX, 0xFF), (1, 1)] {
            assert_eq!(LegacyCipher::crc32_byte(crc, b), reference(crc, b));
        }
    }

    #[test]
    fn test_round_trip() {
        let plaintext = b"The quick brown fox jumps over the lazy dog";

        let mut enc = LegacyCipher::new(&KEY);
        let ciphertext: Vec<u8> = plaintext.iter().map(|&b| enc.encrypt_byte(b)).collect();
        assert_ne!(&ciphertext[..], &plaintext[..]);

        let mut dec = LegacyCipher::new(&KEY);
        let mut round = ciphertext;
        dec.decrypt(&mut round);
        assert_eq!(&round[..], &plaintext[..]);
    }

    #[test]
    fn test_wrong_key_garbles() {
        let mut enc = LegacyCipher::new(&KEY);
        let ciphertext: Vec<u8> = b"payload".iter().map(|&b| enc.encrypt_byte(b)).collect();

        let mut dec = LegacyCipher::new(&[0u8; 16]);
        let mut round = ciphertext;
        dec.decrypt(&mut round);
        assert_ne!(&round[..], b"payload");
    }
}
