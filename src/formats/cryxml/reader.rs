//! CryXmlB binary decoding
//!
//! The format stores an XML-like tree as four flat little-endian tables: a
//! node table, an attribute table, a child-index table and a string blob of
//! NUL-terminated UTF-8 strings addressed by byte offset. Decoding reads
//! every table up front into an arena, then assembles the tree from node 0
//! with explicit bounds and cycle checks — the tables are untrusted input.

use std::collections::HashMap;
use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};
use tracing::trace;

use crate::error::{Error, Result};
use super::document::XmlElement;
use super::{HEADER_SIZE, SIGNATURE};

/// Size of one node record
const NODE_RECORD_SIZE: usize = 28;
/// Size of one attribute record
const ATTR_RECORD_SIZE: usize = 8;
/// String offset meaning "no string"
const NO_STRING: u32 = 0xFFFF_FFFF;

struct Header {
    node_table_offset: usize,
    node_count: usize,
    attr_table_offset: usize,
    attr_count: usize,
    child_table_offset: usize,
    child_count: usize,
    string_data_offset: usize,
    string_data_size: usize,
}

struct RawNode {
    tag_offset: u32,
    content_offset: u32,
    attr_count: usize,
    child_count: usize,
    first_attr: usize,
    first_child: usize,
}

/// Check whether a buffer starts with the CryXmlB signature
#[must_use]
pub fn is_cryxml(data: &[u8]) -> bool {
    data.len() >= SIGNATURE.len() && data[..SIGNATURE.len()] == SIGNATURE
}

/// Decode a CryXmlB buffer into its root element.
///
/// # Errors
/// - [`Error::InvalidSignature`] on a bad magic, a header whose tables do
///   not fit the buffer, or an empty node table
/// - [`Error::OutOfBounds`] when a node's attribute or child range leaves
///   its table
/// - [`Error::CyclicStructure`] when a node appears on its own attach path
/// - [`Error::DocumentTooLarge`] when shared subtrees expand the output
///   past a small multiple of the node count
pub fn parse_cryxml_bytes(data: &[u8]) -> Result<XmlElement> {
    let header = read_header(data)?;
    let strings = index_strings(
        &data[header.string_data_offset..header.string_data_offset + header.string_data_size],
    );

    let nodes = read_nodes(data, &header)?;
    let attrs = read_attrs(data, &header)?;
    let child_table = read_child_table(data, &header)?;

    trace!(
        nodes = nodes.len(),
        attributes = attrs.len(),
        strings = strings.len(),
        "decoded CryXmlB tables"
    );

    assemble(&nodes, &attrs, &child_table, &strings)
}

fn read_header(data: &[u8]) -> Result<Header> {
    if data.len() < HEADER_SIZE || data[..SIGNATURE.len()] != SIGNATURE {
        return Err(Error::InvalidSignature);
    }

    let mut cursor = Cursor::new(&data[SIGNATURE.len()..HEADER_SIZE]);
    let _xml_size = cursor.read_u32::<LittleEndian>()?;
    let node_table_offset = cursor.read_u32::<LittleEndian>()? as usize;
    let node_count = cursor.read_u32::<LittleEndian>()? as usize;
    let attr_table_offset = cursor.read_u32::<LittleEndian>()? as usize;
    let attr_count = cursor.read_u32::<LittleEndian>()? as usize;
    let child_table_offset = cursor.read_u32::<LittleEndian>()? as usize;
    let child_count = cursor.read_u32::<LittleEndian>()? as usize;
    let string_data_offset = cursor.read_u32::<LittleEndian>()? as usize;
    let string_data_size = cursor.read_u32::<LittleEndian>()? as usize;

    let header = Header {
        node_table_offset,
        node_count,
        attr_table_offset,
        attr_count,
        child_table_offset,
        child_count,
        string_data_offset,
        string_data_size,
    };

    // A document with no nodes has no root; tables that overrun the buffer
    // mean the header lies about the layout. Both are structural failures.
    let fits = |offset: usize, count: usize, record: usize| {
        count
            .checked_mul(record)
            .and_then(|len| offset.checked_add(len))
            .is_some_and(|end| end <= data.len())
    };
    if header.node_count == 0
        || !fits(header.node_table_offset, header.node_count, NODE_RECORD_SIZE)
        || !fits(header.attr_table_offset, header.attr_count, ATTR_RECORD_SIZE)
        || !fits(header.child_table_offset, header.child_count, 4)
        || !fits(header.string_data_offset, header.string_data_size, 1)
    {
        return Err(Error::InvalidSignature);
    }

    Ok(header)
}

/// Prebuild the offset → string index in one pass over the blob.
///
/// Offsets elsewhere in the file address string starts by byte position;
/// building the full index up front avoids assuming anything about the
/// order lookups will arrive in.
fn index_strings(blob: &[u8]) -> HashMap<u32, String> {
    let mut strings = HashMap::new();
    let mut start = 0usize;
    for (i, &b) in blob.iter().enumerate() {
        if b == 0 {
            strings.insert(
                start as u32,
                String::from_utf8_lossy(&blob[start..i]).into_owned(),
            );
            start = i + 1;
        }
    }
    if start < blob.len() {
        // Unterminated tail, keep it addressable anyway
        strings.insert(
            start as u32,
            String::from_utf8_lossy(&blob[start..]).into_owned(),
        );
    }
    strings
}

/// Missing or reserved offsets resolve to the empty string, never an error
fn resolve<'a>(strings: &'a HashMap<u32, String>, offset: u32) -> &'a str {
    if offset == NO_STRING {
        return "";
    }
    strings.get(&offset).map_or("", String::as_str)
}

fn read_nodes(data: &[u8], header: &Header) -> Result<Vec<RawNode>> {
    let mut cursor = Cursor::new(&data[header.node_table_offset..]);
    let mut nodes = Vec::with_capacity(header.node_count);
    for _ in 0..header.node_count {
        let tag_offset = cursor.read_u32::<LittleEndian>()?;
        let content_offset = cursor.read_u32::<LittleEndian>()?;
        let attr_count = cursor.read_u16::<LittleEndian>()? as usize;
        let child_count = cursor.read_u16::<LittleEndian>()? as usize;
        let _parent_index = cursor.read_u32::<LittleEndian>()?;
        let first_attr = cursor.read_u32::<LittleEndian>()? as usize;
        let first_child = cursor.read_u32::<LittleEndian>()? as usize;
        let _reserved = cursor.read_u32::<LittleEndian>()?;

        nodes.push(RawNode {
            tag_offset,
            content_offset,
            attr_count,
            child_count,
            first_attr,
            first_child,
        });
    }
    Ok(nodes)
}

fn read_attrs(data: &[u8], header: &Header) -> Result<Vec<(u32, u32)>> {
    let mut cursor = Cursor::new(&data[header.attr_table_offset..]);
    let mut attrs = Vec::with_capacity(header.attr_count);
    for _ in 0..header.attr_count {
        let key = cursor.read_u32::<LittleEndian>()?;
        let value = cursor.read_u32::<LittleEndian>()?;
        attrs.push((key, value));
    }
    Ok(attrs)
}

fn read_child_table(data: &[u8], header: &Header) -> Result<Vec<u32>> {
    let mut cursor = Cursor::new(&data[header.child_table_offset..]);
    let mut table = Vec::with_capacity(header.child_count);
    for _ in 0..header.child_count {
        table.push(cursor.read_u32::<LittleEndian>()?);
    }
    Ok(table)
}

/// Materialize the element for one node: tag, attributes, text. Validates
/// the node's attribute range.
fn materialize(
    node: &RawNode,
    attrs: &[(u32, u32)],
    strings: &HashMap<u32, String>,
) -> Result<XmlElement> {
    let attr_end = node
        .first_attr
        .checked_add(node.attr_count)
        .filter(|&end| end <= attrs.len())
        .ok_or(Error::OutOfBounds {
            context: "attribute table",
            index: node.first_attr.saturating_add(node.attr_count),
            len: attrs.len(),
        })?;

    let mut element = XmlElement::new(resolve(strings, node.tag_offset));
    for &(key_offset, value_offset) in &attrs[node.first_attr..attr_end] {
        element.attributes.insert(
            resolve(strings, key_offset).to_string(),
            resolve(strings, value_offset).to_string(),
        );
    }

    let content = resolve(strings, node.content_offset);
    if !content.is_empty() {
        element.text = Some(content.to_string());
    }
    Ok(element)
}

/// Assemble the tree from node 0 with an explicit stack.
///
/// `on_path` marks the nodes currently on the attach path; revisiting one
/// is a cycle. Depth is bounded by the node count, never by recursion.
/// A node may legally sit under several parents and is duplicated per
/// occurrence, so total output is capped; a chain of doubled references
/// would otherwise expand a kilobyte of tables into billions of elements.
fn assemble(
    nodes: &[RawNode],
    attrs: &[(u32, u32)],
    child_table: &[u32],
    strings: &HashMap<u32, String>,
) -> Result<XmlElement> {
    struct Frame {
        node: usize,
        next_child: usize,
        element: XmlElement,
    }

    let check_child_range = |node: &RawNode| {
        node.first_child
            .checked_add(node.child_count)
            .filter(|&end| end <= child_table.len())
            .ok_or(Error::OutOfBounds {
                context: "child table",
                index: node.first_child.saturating_add(node.child_count),
                len: child_table.len(),
            })
    };

    let budget = nodes.len().saturating_mul(8).max(64);
    let mut produced = 1usize;

    let mut on_path = vec![false; nodes.len()];
    let mut stack = Vec::new();

    check_child_range(&nodes[0])?;
    on_path[0] = true;
    stack.push(Frame {
        node: 0,
        next_child: 0,
        element: materialize(&nodes[0], attrs, strings)?,
    });

    while let Some(top) = stack.last_mut() {
        let raw = &nodes[top.node];

        if top.next_child < raw.child_count {
            let slot = raw.first_child + top.next_child;
            top.next_child += 1;

            let child = child_table[slot] as usize;
            if child >= nodes.len() {
                return Err(Error::OutOfBounds {
                    context: "node table",
                    index: child,
                    len: nodes.len(),
                });
            }
            if on_path[child] {
                return Err(Error::CyclicStructure { node: child });
            }

            produced += 1;
            if produced > budget {
                return Err(Error::DocumentTooLarge { budget });
            }

            check_child_range(&nodes[child])?;
            on_path[child] = true;
            stack.push(Frame {
                node: child,
                next_child: 0,
                element: materialize(&nodes[child], attrs, strings)?,
            });
        } else if let Some(done) = stack.pop() {
            on_path[done.node] = false;
            match stack.last_mut() {
                Some(parent) => parent.element.children.push(done.element),
                None => return Ok(done.element),
            }
        }
    }

    unreachable!("root frame returns before the stack drains")
}
