//! CryXmlB binary XML format
//!
//! CryEngine ships most of its XML assets compiled into a flat-table
//! binary form. [`parse_cryxml_bytes`] decodes such a buffer into an
//! [`XmlElement`] tree and [`to_xml_string`] renders the tree back to
//! plain XML text. [`is_cryxml`] sniffs the signature so callers can
//! decide whether a `.xml` entry needs decoding at all.

mod document;
mod reader;
mod writer;

pub use document::XmlElement;
pub use reader::{is_cryxml, parse_cryxml_bytes};
pub use writer::to_xml_string;

/// File signature, includes the trailing NUL
pub const SIGNATURE: [u8; 8] = *b"CryXmlB\0";

/// Fixed header size: signature, XML size and four (offset, count) pairs
pub const HEADER_SIZE: usize = 44;
