//! Entry codec: per-entry decryption + decompression
//!
//! Pure transform from the raw stored payload of one archive entry to its
//! original bytes. Decryption (if any) runs first, then DEFLATE, then a
//! CRC-32 check against the value recorded in the central directory.

pub mod legacy;
pub mod winzip;

use std::io::Read;

use flate2::read::DeflateDecoder;
use tracing::trace;

use crate::error::{Error, Result};
use crate::p4k::{CompressionMethod, EncryptionKind};

use legacy::LegacyCipher;

/// Decode one entry payload.
///
/// `expected_crc` is the CRC-32 recorded for the uncompressed data; a value
/// of 0 disables the check (AE-2 entries record no CRC).
///
/// # Errors
/// - [`Error::UnsupportedCompressionMethod`] for methods other than stored
///   and deflate
/// - [`Error::AuthenticationFailed`] on any cipher verification mismatch
/// - [`Error::CorruptEntry`] when inflate fails or the CRC does not match
pub fn decode_entry(
    name: &str,
    payload: &[u8],
    method: CompressionMethod,
    encryption: &EncryptionKind,
    expected_crc: u32,
) -> Result<Vec<u8>> {
    let compressed = match encryption {
        EncryptionKind::None => payload.to_vec(),
        EncryptionKind::Legacy { key } => decrypt_legacy(name, payload, key, expected_crc)?,
        EncryptionKind::Aes { strength, key } => winzip::decrypt(name, payload, *strength, key)?,
    };

    let data = match method {
        CompressionMethod::Stored => compressed,
        CompressionMethod::Deflated => inflate(name, &compressed)?,
        CompressionMethod::Unknown(id) => {
            return Err(Error::UnsupportedCompressionMethod { method: id });
        }
    };

    if expected_crc != 0 {
        let actual = crc32fast::hash(&data);
        if actual != expected_crc {
            return Err(Error::CorruptEntry {
                name: name.to_string(),
                reason: format!("CRC mismatch: expected {expected_crc:#010x}, got {actual:#010x}"),
            });
        }
    }

    trace!(entry = name, bytes = data.len(), "decoded entry");
    Ok(data)
}

/// Strip and verify the 12-byte legacy crypto header, then decrypt the rest.
///
/// The last header byte must equal the high byte of the entry CRC; a
/// mismatch means the key is wrong for this entry.
fn decrypt_legacy(name: &str, payload: &[u8], key: &[u8], expected_crc: u32) -> Result<Vec<u8>> {
    if payload.len() < legacy::HEADER_LEN {
        return Err(Error::CorruptEntry {
            name: name.to_string(),
            reason: format!(
                "payload too short for crypto header: {} < {} bytes",
                payload.len(),
                legacy::HEADER_LEN
            ),
        });
    }

    let mut cipher = LegacyCipher::new(key);
    let mut data = payload.to_vec();
    cipher.decrypt(&mut data);

    if expected_crc != 0 && data[legacy::HEADER_LEN - 1] != (expected_crc >> 24) as u8 {
        return Err(Error::AuthenticationFailed {
            name: name.to_string(),
            reason: "crypto header check byte mismatch",
        });
    }

    data.drain(..legacy::HEADER_LEN);
    Ok(data)
}

fn inflate(name: &str, compressed: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = DeflateDecoder::new(compressed);
    let mut data = Vec::new();
    decoder
        .read_to_end(&mut data)
        .map_err(|e| Error::CorruptEntry {
            name: name.to_string(),
            reason: format!("inflate failed: {e}"),
        })?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::DeflateEncoder;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const KEY: [u8; 16] = [
        0x5E, 0x7A, 0x20, 0x02, 0x30, 0x2E, 0xEB, 0x1A, 0x3B, 0xB6, 0x17, 0xC3, 0x0F, 0xDE,
        0x1E, 0x47,
    ];

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn legacy_encrypt(compressed: &[u8], key: &[u8], crc: u32) -> Vec<u8> {
        let mut cipher = LegacyCipher::new(key);
        let mut header = [0x42u8; legacy::HEADER_LEN];
        header[legacy::HEADER_LEN - 1] = (crc >> 24) as u8;

        let mut out = Vec::with_capacity(legacy::HEADER_LEN + compressed.len());
        for &b in header.iter().chain(compressed) {
            out.push(cipher.encrypt_byte(b));
        }
        out
    }

    #[test]
    fn test_stored_passthrough() {
        let data = b"plain stored bytes";
        let crc = crc32fast::hash(data);
        let out = decode_entry("a.txt", data, CompressionMethod::Stored, &EncryptionKind::None, crc)
            .unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_deflated_round_trip() {
        let data = b"some text that deflate will happily shrink shrink shrink";
        let crc = crc32fast::hash(data);
        let out = decode_entry(
            "a.txt",
            &deflate(data),
            CompressionMethod::Deflated,
            &EncryptionKind::None,
            crc,
        )
        .unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_unsupported_method() {
        let err = decode_entry(
            "a.bin",
            b"....",
            CompressionMethod::Unknown(14),
            &EncryptionKind::None,
            0,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedCompressionMethod { method: 14 }
        ));
    }

    #[test]
    fn test_corrupt_deflate_stream() {
        let err = decode_entry(
            "a.txt",
            &[0xFF, 0x00, 0x12, 0x34],
            CompressionMethod::Deflated,
            &EncryptionKind::None,
            0,
        )
        .unwrap_err();
        assert!(matches!(err, Error::CorruptEntry { .. }));
    }

    #[test]
    fn test_legacy_known_plaintext() {
        let data = b"known plaintext for the legacy cipher path";
        let crc = crc32fast::hash(data);
        let payload = legacy_encrypt(&deflate(data), &KEY, crc);

        let out = decode_entry(
            "enc.txt",
            &payload,
            CompressionMethod::Deflated,
            &EncryptionKind::Legacy { key: KEY.to_vec() },
            crc,
        )
        .unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_legacy_wrong_key_fails_header_check() {
        let data = b"secret";
        let crc = crc32fast::hash(data);
        let payload = legacy_encrypt(&deflate(data), &KEY, crc);

        let err = decode_entry(
            "enc.txt",
            &payload,
            CompressionMethod::Deflated,
            &EncryptionKind::Legacy { key: vec![0u8; 16] },
            crc,
        )
        .unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailed { .. }));
    }

    #[test]
    fn test_aes_entry_full_path() {
        use crate::p4k::AesStrength;

        let data = b"authenticated and deflated payload";
        let crc = crc32fast::hash(data);
        let payload = winzip::encrypt(&deflate(data), AesStrength::Aes256, &KEY, &[9u8; 16]);

        let out = decode_entry(
            "enc.xml",
            &payload,
            CompressionMethod::Deflated,
            &EncryptionKind::Aes {
                strength: AesStrength::Aes256,
                key: KEY.to_vec(),
            },
            crc,
        )
        .unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_crc_mismatch_is_corrupt() {
        let data = b"bytes";
        let err = decode_entry(
            "a.txt",
            data,
            CompressionMethod::Stored,
            &EncryptionKind::None,
            0xDEADBEEF,
        )
        .unwrap_err();
        assert!(matches!(err, Error::CorruptEntry { .. }));
    }
}
