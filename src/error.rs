//! Error types for `cryp4k`

use thiserror::Error;

/// The error type for `cryp4k` operations.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    // ==================== IO Errors ====================
    /// IO error from file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ==================== P4K Archive Errors ====================
    /// The file has no locatable end-of-central-directory structure.
    #[error("not a P4K archive: end of central directory not found")]
    NotAnArchive,

    /// A declared offset or size points past the end of the file.
    #[error("truncated archive: {context} at offset {offset} exceeds file length {file_len}")]
    Truncated {
        /// What was being located when the overrun was detected.
        context: &'static str,
        /// The offending absolute offset.
        offset: u64,
        /// Actual length of the archive file.
        file_len: u64,
    },

    /// The entry uses a compression method this reader does not handle.
    #[error("unsupported compression method: {method}")]
    UnsupportedCompressionMethod {
        /// Raw method id from the central directory.
        method: u16,
    },

    /// The entry's compressed stream could not be decoded.
    #[error("corrupt entry {name}: {reason}")]
    CorruptEntry {
        /// Archive path of the entry.
        name: String,
        /// What went wrong while decoding.
        reason: String,
    },

    /// Password verifier or authentication code mismatch on an encrypted entry.
    #[error("authentication failed for {name}: {reason}")]
    AuthenticationFailed {
        /// Archive path of the entry.
        name: String,
        /// Which check failed.
        reason: &'static str,
    },

    /// The requested operation does not apply to this item kind.
    #[error("invalid operation: {0}")]
    InvalidOperation(&'static str),

    /// Archive loading was cancelled by the caller.
    #[error("archive load cancelled")]
    Cancelled,

    // ==================== CryXmlB Format Errors ====================
    /// The buffer does not carry a valid CryXmlB header.
    #[error("invalid CryXmlB signature")]
    InvalidSignature,

    /// A node, attribute or child index points outside its table.
    #[error("index out of bounds: {context} {index} (table length {len})")]
    OutOfBounds {
        /// Which table the index was resolved against.
        context: &'static str,
        /// The offending index.
        index: usize,
        /// Length of that table.
        len: usize,
    },

    /// A node references itself as a transitive descendant.
    #[error("cyclic structure: node {node} appears on its own attach path")]
    CyclicStructure {
        /// Index of the node that closed the cycle.
        node: usize,
    },

    /// Shared subtrees expanded the document past the decode budget.
    #[error("document expansion exceeded {budget} elements")]
    DocumentTooLarge {
        /// Maximum number of elements the decoder will materialize.
        budget: usize,
    },

    // ==================== Parsing Errors ====================
    /// XML rendering error.
    #[error("XML error: {0}")]
    XmlError(#[from] quick_xml::Error),

    /// UTF-8 conversion error.
    #[error("UTF-8 conversion error: {0}")]
    Utf8Error(#[from] std::string::FromUtf8Error),
}

/// A specialized Result type for `cryp4k` operations.
pub type Result<T> = std::result::Result<T, Error>;
