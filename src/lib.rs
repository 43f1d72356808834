//! # cryp4k
//!
//! A pure-Rust library for reading Star Citizen P4K archive containers.
//!
//! P4K files are ZIP-derived archives that can exceed 100 GB, so the
//! Zip64 extensions are first-class here. Individual entries may be
//! stored or Deflate-compressed, and may be wrapped in either the PKZip
//! classic stream cipher or WinZip AES. Compiled CryXmlB assets are
//! decoded back to plain XML on demand.
//!
//! ## Quick Start
//!
//! ```no_run
//! use cryp4k::p4k::P4kArchive;
//!
//! let archive = P4kArchive::load("Data.p4k")?;
//!
//! // Search for entries by file name, case-insensitive
//! for entry in archive.find_files("global.ini") {
//!     println!("{}", entry.path());
//! }
//!
//! // Read an entry, decoding CryXmlB to XML text when present
//! if let Some(entry) = archive.entry("Data/Libs/Foundry/Records/ship.xml") {
//!     let xml = archive.read_to_string(entry)?;
//!     println!("{xml}");
//! }
//! # Ok::<(), cryp4k::Error>(())
//! ```
//!
//! ### Using the Prelude
//!
//! ```
//! use cryp4k::prelude::*;
//! ```

pub mod codec;
pub mod error;
pub mod formats;
pub mod p4k;

// Re-exports for convenience
pub use error::{Error, Result};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::formats::cryxml::{XmlElement, is_cryxml, parse_cryxml_bytes, to_xml_string};
    pub use crate::p4k::{
        CompressionMethod, EntryMetadata, P4kArchive, P4kDirectory, P4kEntry, P4kItem, P4kOptions,
        P4kPhase, P4kProgress,
    };
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
