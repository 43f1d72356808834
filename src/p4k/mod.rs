//! P4K archive reading
//!
//! The container is a ZIP-derived format; entries may be stored or
//! deflated, and encrypted with either the classic PKZip stream cipher or
//! WinZip AES, both keyed by an archive-wide constant rather than a user
//! password.

mod archive;
mod reader;
mod tree;
mod types;

pub use archive::{P4kArchive, ProgressCallback};
pub use reader::P4kDirectoryReader;
pub use tree::{P4kDirectory, P4kEntry, P4kItem, build_tree};
pub use types::{
    AesInfo, AesStrength, CompressionMethod, EncryptionKind, EntryMetadata, P4kOptions,
    P4kPhase, P4kProgress,
};

/// Key applied to encrypted entries of the game's archives.
///
/// This is the constant the live client uses as of format revision 3.x;
/// treat it as a default, not a guarantee, and override via
/// [`P4kOptions`] if a future revision rolls the key.
pub const DEFAULT_LEGACY_KEY: [u8; 16] = [
    0x5E, 0x7A, 0x20, 0x02, 0x30, 0x2E, 0xEB, 0x1A, 0x3B, 0xB6, 0x17, 0xC3, 0x0F, 0xDE, 0x1E,
    0x47,
];
