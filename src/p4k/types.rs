//! Types for P4K archive handling

/// Compression method used for an entry in the archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    /// No compression, payload is stored verbatim
    Stored,
    /// Raw DEFLATE stream
    Deflated,
    /// Anything this reader does not decode
    Unknown(u16),
}

impl CompressionMethod {
    /// Parse the method id from a central directory record
    #[must_use]
    pub fn from_id(id: u16) -> Self {
        match id {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflated,
            other => CompressionMethod::Unknown(other),
        }
    }

    #[must_use]
    pub fn as_id(self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflated => 8,
            CompressionMethod::Unknown(id) => id,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CompressionMethod::Stored => "stored",
            CompressionMethod::Deflated => "deflated",
            CompressionMethod::Unknown(_) => "unknown",
        }
    }
}

/// Key strength of a WinZip-AES encrypted entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AesStrength {
    Aes128,
    Aes192,
    Aes256,
}

impl AesStrength {
    /// Parse the strength byte from the AES extra field
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(AesStrength::Aes128),
            2 => Some(AesStrength::Aes192),
            3 => Some(AesStrength::Aes256),
            _ => None,
        }
    }

    /// Salt length in bytes (half the key length)
    #[must_use]
    pub fn salt_len(self) -> usize {
        self.key_len() / 2
    }

    /// AES key length in bytes
    #[must_use]
    pub fn key_len(self) -> usize {
        match self {
            AesStrength::Aes128 => 16,
            AesStrength::Aes192 => 24,
            AesStrength::Aes256 => 32,
        }
    }
}

/// WinZip AES extra-field data (header id 0x9901) attached to an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AesInfo {
    /// Key strength declared by the extra field
    pub strength: AesStrength,
    /// The real compression method, hidden behind method id 99
    pub real_method: u16,
}

/// Per-entry encryption transform, resolved once per entry from the
/// entry flags plus archive-level configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncryptionKind {
    /// Entry is not encrypted
    None,
    /// PKZip-classic stream cipher keyed by the archive-wide key
    Legacy {
        /// Key bytes fed to the keystream initializer
        key: Vec<u8>,
    },
    /// WinZip AES with per-entry salt, password verifier and trailing
    /// authentication code
    Aes {
        strength: AesStrength,
        /// Password bytes for the PBKDF2 derivation
        key: Vec<u8>,
    },
}

/// Immutable metadata for one packed entry, read from the central directory
#[derive(Debug, Clone)]
pub struct EntryMetadata {
    /// Full slash-delimited path inside the archive
    pub path: String,
    /// Size of the payload as stored (crypto framing included)
    pub compressed_size: u64,
    /// Size after decompression
    pub uncompressed_size: u64,
    /// Compression method id as recorded (99 for AES-wrapped entries)
    pub method: CompressionMethod,
    /// General purpose bit flags (bit 0 = encrypted)
    pub flags: u16,
    /// CRC-32 of the uncompressed payload (0 when unrecorded)
    pub crc32: u32,
    /// Absolute offset of the entry's local file header
    pub local_header_offset: u64,
    /// AES extra-field data, if the entry is WinZip-AES encrypted
    pub aes: Option<AesInfo>,
    /// True when the path denotes a directory marker
    pub is_directory: bool,
}

impl EntryMetadata {
    /// Whether the entry payload is encrypted at all
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.flags & 0x0001 != 0
    }

    /// The method that actually compressed the payload.
    ///
    /// AES entries record method 99 in the directory and carry the real
    /// method in the extra field.
    #[must_use]
    pub fn effective_method(&self) -> CompressionMethod {
        match self.aes {
            Some(info) => CompressionMethod::from_id(info.real_method),
            None => self.method,
        }
    }

    /// Resolve the encryption transform for this entry given the
    /// archive-wide key material
    #[must_use]
    pub fn encryption(&self, key: &[u8]) -> EncryptionKind {
        if let Some(info) = self.aes {
            EncryptionKind::Aes {
                strength: info.strength,
                key: key.to_vec(),
            }
        } else if self.is_encrypted() {
            EncryptionKind::Legacy { key: key.to_vec() }
        } else {
            EncryptionKind::None
        }
    }

    /// Leaf file name (final path segment)
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.path
            .trim_end_matches(['/', '\\'])
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or("")
    }
}

/// Archive-level configuration
#[derive(Debug, Clone)]
pub struct P4kOptions {
    /// Key material applied to encrypted entries. Used directly as the
    /// legacy keystream key and as the password for AES key derivation.
    ///
    /// Whether this constant is stable across game format revisions is not
    /// guaranteed, which is why it is configurable rather than baked in.
    pub key: Vec<u8>,
}

impl Default for P4kOptions {
    fn default() -> Self {
        Self {
            key: super::DEFAULT_LEGACY_KEY.to_vec(),
        }
    }
}

/// Progress information during archive loading
#[derive(Debug, Clone)]
pub struct P4kProgress {
    /// Current operation phase
    pub phase: P4kPhase,
    /// Current item number (1-indexed)
    pub current: usize,
    /// Total number of items
    pub total: usize,
    /// Entry being processed (if applicable)
    pub current_entry: Option<String>,
}

impl P4kProgress {
    #[must_use]
    pub fn new(phase: P4kPhase, current: usize, total: usize) -> Self {
        Self {
            phase,
            current,
            total,
            current_entry: None,
        }
    }

    #[must_use]
    pub fn with_entry(phase: P4kPhase, current: usize, total: usize, entry: impl Into<String>) -> Self {
        Self {
            phase,
            current,
            total,
            current_entry: Some(entry.into()),
        }
    }

    /// Get the progress percentage (0.0 - 1.0)
    #[must_use]
    pub fn percentage(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.current as f32 / self.total as f32
        }
    }
}

/// Phase of an archive load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum P4kPhase {
    /// Locating and reading the central directory
    ReadingDirectory,
    /// Parsing entry metadata records
    ReadingEntries,
    /// Building the directory tree
    BuildingIndex,
    /// Load complete
    Complete,
}

impl P4kPhase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadingDirectory => "Reading central directory",
            Self::ReadingEntries => "Reading entries",
            Self::BuildingIndex => "Building index",
            Self::Complete => "Complete",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(path: &str) -> EntryMetadata {
        EntryMetadata {
            path: path.to_string(),
            compressed_size: 0,
            uncompressed_size: 0,
            method: CompressionMethod::Stored,
            flags: 0,
            crc32: 0,
            local_header_offset: 0,
            aes: None,
            is_directory: path.ends_with('/'),
        }
    }

    #[test]
    fn test_method_round_trip() {
        assert_eq!(CompressionMethod::from_id(0), CompressionMethod::Stored);
        assert_eq!(CompressionMethod::from_id(8), CompressionMethod::Deflated);
        assert_eq!(CompressionMethod::from_id(99), CompressionMethod::Unknown(99));
        assert_eq!(CompressionMethod::Unknown(99).as_id(), 99);
    }

    #[test]
    fn test_file_name() {
        assert_eq!(meta("Data/Localization/global.ini").file_name(), "global.ini");
        assert_eq!(meta("Data\\Libs\\foo.xml").file_name(), "foo.xml");
        assert_eq!(meta("Data/Localization/").file_name(), "Localization");
        assert_eq!(meta("").file_name(), "");
    }

    #[test]
    fn test_encryption_resolution() {
        let key = [0xAAu8; 16];

        let plain = meta("a.txt");
        assert_eq!(plain.encryption(&key), EncryptionKind::None);

        let mut legacy = meta("b.txt");
        legacy.flags = 0x0001;
        assert_eq!(
            legacy.encryption(&key),
            EncryptionKind::Legacy { key: key.to_vec() }
        );

        let mut aes = meta("c.txt");
        aes.flags = 0x0001;
        aes.method = CompressionMethod::Unknown(99);
        aes.aes = Some(AesInfo {
            strength: AesStrength::Aes256,
            real_method: 8,
        });
        assert_eq!(aes.effective_method(), CompressionMethod::Deflated);
        match aes.encryption(&key) {
            EncryptionKind::Aes { strength, .. } => assert_eq!(strength, AesStrength::Aes256),
            other => panic!("expected AES, got {other:?}"),
        }
    }

    #[test]
    fn test_progress_percentage() {
        assert!((P4kProgress::new(P4kPhase::Complete, 0, 0).percentage() - 1.0).abs() < f32::EPSILON);
        assert!((P4kProgress::new(P4kPhase::ReadingEntries, 1, 4).percentage() - 0.25).abs() < f32::EPSILON);
    }
}
