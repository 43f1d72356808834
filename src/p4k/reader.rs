//! P4K central directory reader
//!
//! The container is a ZIP-derived archive, so it is read from the end: find
//! the end-of-central-directory record, follow it (through the Zip64
//! structures when present) to the central directory, then parse one
//! metadata record per entry. Payload offsets are resolved lazily through
//! each entry's local file header, since its variable-length fields can
//! differ from the central directory copy.

use std::io::{Cursor, Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};
use tracing::debug;

use crate::error::{Error, Result};
use super::types::{AesInfo, AesStrength, CompressionMethod, EntryMetadata};

/// End of central directory signature `PK\x05\x06`
const EOCD_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x05, 0x06];
/// Minimum EOCD record size
const EOCD_SIZE: usize = 22;
/// Maximum ZIP comment length, bounds the backwards EOCD search
const MAX_COMMENT_SIZE: u64 = 65535;

/// Zip64 EOCD locator signature `PK\x06\x07`
const ZIP64_LOCATOR_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x06, 0x07];
const ZIP64_LOCATOR_SIZE: u64 = 20;

/// Zip64 EOCD record signature `PK\x06\x06`
const ZIP64_EOCD_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x06, 0x06];
const ZIP64_EOCD_SIZE: usize = 56;

/// Central directory file header signature `PK\x01\x02`
const CDFH_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x01, 0x02];
/// Minimum central directory record size (fixed fields, empty name)
const CDFH_MIN_SIZE: u64 = 46;

/// Local file header signatures: the standard `PK\x03\x04` and the P4K
/// variant `PK\x03\x14` used by the game's archives
const LFH_SIGNATURES: [[u8; 4]; 2] = [[0x50, 0x4B, 0x03, 0x04], [0x50, 0x4B, 0x03, 0x14]];
const LFH_SIZE: u64 = 30;

/// Extra field id for Zip64 extended information
const EXTRA_ZIP64: u16 = 0x0001;
/// Extra field id for the WinZip AES descriptor
const EXTRA_AES: u16 = 0x9901;

#[derive(Debug)]
struct Eocd {
    total_entries: u64,
    cd_size: u64,
    cd_offset: u64,
    needs_zip64: bool,
}

/// Low-level reader over the archive's trailing metadata structures
pub struct P4kDirectoryReader<R: Read + Seek> {
    reader: R,
    file_len: u64,
}

impl<R: Read + Seek> P4kDirectoryReader<R> {
    /// Wrap a seekable source.
    ///
    /// # Errors
    /// Returns an error if the source length cannot be determined.
    pub fn new(mut reader: R) -> Result<Self> {
        let file_len = reader.seek(SeekFrom::End(0))?;
        Ok(Self { reader, file_len })
    }

    /// Total length of the underlying file
    #[must_use]
    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    /// Locate and parse the EOCD record, following Zip64 structures if the
    /// 32-bit fields are saturated.
    fn read_eocd(&mut self) -> Result<Eocd> {
        let search_len = (MAX_COMMENT_SIZE + EOCD_SIZE as u64).min(self.file_len);
        if search_len < EOCD_SIZE as u64 {
            return Err(Error::NotAnArchive);
        }

        let search_start = self.file_len - search_len;
        self.reader.seek(SeekFrom::Start(search_start))?;
        let mut tail = vec![0u8; search_len as usize];
        self.reader.read_exact(&mut tail)?;

        // Search backwards; a hit is only valid when the recorded comment
        // length matches the bytes actually remaining after the record.
        for i in (0..=tail.len() - EOCD_SIZE).rev() {
            if tail[i..i + 4] != EOCD_SIGNATURE {
                continue;
            }
            let comment_len = u16::from_le_bytes([tail[i + 20], tail[i + 21]]) as usize;
            if comment_len != tail.len() - i - EOCD_SIZE {
                continue;
            }

            let mut cursor = Cursor::new(&tail[i + 4..i + EOCD_SIZE]);
            let _disk_number = cursor.read_u16::<LittleEndian>()?;
            let _disk_with_cd = cursor.read_u16::<LittleEndian>()?;
            let _disk_entries = cursor.read_u16::<LittleEndian>()?;
            let total_entries = cursor.read_u16::<LittleEndian>()?;
            let cd_size = cursor.read_u32::<LittleEndian>()?;
            let cd_offset = cursor.read_u32::<LittleEndian>()?;

            let needs_zip64 = total_entries == 0xFFFF
                || cd_size == 0xFFFF_FFFF
                || cd_offset == 0xFFFF_FFFF;

            let eocd_offset = search_start + i as u64;
            if needs_zip64 {
                return self.read_zip64_eocd(eocd_offset);
            }
            return Ok(Eocd {
                total_entries: u64::from(total_entries),
                cd_size: u64::from(cd_size),
                cd_offset: u64::from(cd_offset),
                needs_zip64,
            });
        }

        Err(Error::NotAnArchive)
    }

    /// Read the Zip64 EOCD through its locator, which sits immediately
    /// before the classic EOCD record.
    fn read_zip64_eocd(&mut self, eocd_offset: u64) -> Result<Eocd> {
        let locator_offset = eocd_offset
            .checked_sub(ZIP64_LOCATOR_SIZE)
            .ok_or(Error::NotAnArchive)?;

        self.reader.seek(SeekFrom::Start(locator_offset))?;
        let mut locator = [0u8; 20];
        self.reader.read_exact(&mut locator)?;
        if locator[..4] != ZIP64_LOCATOR_SIGNATURE {
            return Err(Error::NotAnArchive);
        }
        let eocd64_offset = u64::from_le_bytes(locator[8..16].try_into().unwrap_or_default());

        let eocd64_end = eocd64_offset.checked_add(ZIP64_EOCD_SIZE as u64);
        if eocd64_end.is_none_or(|end| end > self.file_len) {
            return Err(Error::Truncated {
                context: "zip64 end of central directory",
                offset: eocd64_offset,
                file_len: self.file_len,
            });
        }

        self.reader.seek(SeekFrom::Start(eocd64_offset))?;
        let mut record = [0u8; ZIP64_EOCD_SIZE];
        self.reader.read_exact(&mut record)?;
        if record[..4] != ZIP64_EOCD_SIGNATURE {
            return Err(Error::NotAnArchive);
        }

        let mut cursor = Cursor::new(&record[4..]);
        let _record_size = cursor.read_u64::<LittleEndian>()?;
        let _version_made_by = cursor.read_u16::<LittleEndian>()?;
        let _version_needed = cursor.read_u16::<LittleEndian>()?;
        let _disk_number = cursor.read_u32::<LittleEndian>()?;
        let _disk_with_cd = cursor.read_u32::<LittleEndian>()?;
        let _disk_entries = cursor.read_u64::<LittleEndian>()?;
        let total_entries = cursor.read_u64::<LittleEndian>()?;
        let cd_size = cursor.read_u64::<LittleEndian>()?;
        let cd_offset = cursor.read_u64::<LittleEndian>()?;

        Ok(Eocd {
            total_entries,
            cd_size,
            cd_offset,
            needs_zip64: true,
        })
    }

    /// Read the full central directory and parse every entry record in one
    /// ordered pass.
    ///
    /// # Errors
    /// Returns [`Error::NotAnArchive`] when no EOCD can be located and
    /// [`Error::Truncated`] when the directory or an entry offset points
    /// past the end of the file.
    pub fn read_entries(&mut self) -> Result<Vec<EntryMetadata>> {
        self.read_entries_with(|_, _, _| Ok(()))
    }

    /// Like [`Self::read_entries`], invoking `on_entry` with
    /// `(current, total, entry)` after each record is parsed. An error from
    /// the hook aborts the scan, which lets callers report progress and
    /// cancel cooperatively between records.
    ///
    /// # Errors
    /// Same as [`Self::read_entries`], plus whatever the hook returns.
    pub fn read_entries_with(
        &mut self,
        mut on_entry: impl FnMut(usize, usize, &EntryMetadata) -> Result<()>,
    ) -> Result<Vec<EntryMetadata>> {
        let eocd = self.read_eocd()?;
        debug!(
            entries = eocd.total_entries,
            zip64 = eocd.needs_zip64,
            "located central directory"
        );

        let cd_end = eocd.cd_offset.checked_add(eocd.cd_size);
        if cd_end.is_none_or(|end| end > self.file_len) {
            return Err(Error::Truncated {
                context: "central directory",
                offset: eocd.cd_offset,
                file_len: self.file_len,
            });
        }

        // Each record occupies at least the fixed header size, which bounds
        // how many entries the directory can actually hold. Checked before
        // the count drives any allocation.
        if eocd.total_entries > eocd.cd_size / CDFH_MIN_SIZE {
            return Err(Error::Truncated {
                context: "central directory entry count",
                offset: eocd.cd_offset,
                file_len: self.file_len,
            });
        }

        self.reader.seek(SeekFrom::Start(eocd.cd_offset))?;
        let mut cd_data = vec![0u8; eocd.cd_size as usize];
        self.reader.read_exact(&mut cd_data)?;

        let total = eocd.total_entries as usize;
        let mut cursor = Cursor::new(cd_data.as_slice());
        let mut entries = Vec::with_capacity(total);
        for i in 0..total {
            let entry = parse_central_entry(&mut cursor)?;
            if entry.local_header_offset >= self.file_len {
                return Err(Error::Truncated {
                    context: "local header",
                    offset: entry.local_header_offset,
                    file_len: self.file_len,
                });
            }
            on_entry(i + 1, total, &entry)?;
            entries.push(entry);
        }

        Ok(entries)
    }

    /// Resolve the absolute offset of an entry's payload by reading its
    /// local file header.
    ///
    /// # Errors
    /// Returns [`Error::Truncated`] if header or payload extend past the end
    /// of the file, [`Error::CorruptEntry`] on a bad header signature.
    pub fn data_offset(&mut self, entry: &EntryMetadata) -> Result<u64> {
        let header_end = entry.local_header_offset.checked_add(LFH_SIZE);
        if header_end.is_none_or(|end| end > self.file_len) {
            return Err(Error::Truncated {
                context: "local header",
                offset: entry.local_header_offset,
                file_len: self.file_len,
            });
        }

        self.reader.seek(SeekFrom::Start(entry.local_header_offset))?;
        let mut header = [0u8; 30];
        self.reader.read_exact(&mut header)?;

        if !LFH_SIGNATURES.iter().any(|sig| header[..4] == *sig) {
            return Err(Error::CorruptEntry {
                name: entry.path.clone(),
                reason: "bad local file header signature".to_string(),
            });
        }

        let name_len = u64::from(u16::from_le_bytes([header[26], header[27]]));
        let extra_len = u64::from(u16::from_le_bytes([header[28], header[29]]));
        let data_offset = entry.local_header_offset + LFH_SIZE + name_len + extra_len;

        let payload_end = data_offset.checked_add(entry.compressed_size);
        if payload_end.is_none_or(|end| end > self.file_len) {
            return Err(Error::Truncated {
                context: "entry payload",
                offset: data_offset,
                file_len: self.file_len,
            });
        }

        Ok(data_offset)
    }

    /// Read an entry's stored payload: exactly `compressed_size` bytes at
    /// the offset its local header resolves to.
    ///
    /// # Errors
    /// Propagates the failures of [`Self::data_offset`] plus transient I/O
    /// errors from the underlying file.
    pub fn read_payload(&mut self, entry: &EntryMetadata) -> Result<Vec<u8>> {
        let offset = self.data_offset(entry)?;
        self.reader.seek(SeekFrom::Start(offset))?;
        let mut payload = vec![0u8; entry.compressed_size as usize];
        self.reader.read_exact(&mut payload)?;
        Ok(payload)
    }
}

/// Parse one central directory record at the cursor position.
fn parse_central_entry(cursor: &mut Cursor<&[u8]>) -> Result<EntryMetadata> {
    let mut signature = [0u8; 4];
    cursor.read_exact(&mut signature)?;
    if signature != CDFH_SIGNATURE {
        return Err(Error::NotAnArchive);
    }

    let _version_made_by = cursor.read_u16::<LittleEndian>()?;
    let _version_needed = cursor.read_u16::<LittleEndian>()?;
    let flags = cursor.read_u16::<LittleEndian>()?;
    let method_id = cursor.read_u16::<LittleEndian>()?;
    let _mod_time = cursor.read_u16::<LittleEndian>()?;
    let _mod_date = cursor.read_u16::<LittleEndian>()?;
    let crc32 = cursor.read_u32::<LittleEndian>()?;
    let mut compressed_size = u64::from(cursor.read_u32::<LittleEndian>()?);
    let mut uncompressed_size = u64::from(cursor.read_u32::<LittleEndian>()?);
    let name_len = cursor.read_u16::<LittleEndian>()? as usize;
    let extra_len = cursor.read_u16::<LittleEndian>()? as usize;
    let comment_len = cursor.read_u16::<LittleEndian>()? as usize;
    let _disk_start = cursor.read_u16::<LittleEndian>()?;
    let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
    let _external_attrs = cursor.read_u32::<LittleEndian>()?;
    let mut local_header_offset = u64::from(cursor.read_u32::<LittleEndian>()?);

    let mut name_bytes = vec![0u8; name_len];
    cursor.read_exact(&mut name_bytes)?;
    // Lossy conversion: the game's paths are ASCII, but stay defensive
    let path = String::from_utf8_lossy(&name_bytes).into_owned();

    let mut aes = None;
    let extra_end = cursor.position() + extra_len as u64;
    while cursor.position() + 4 <= extra_end {
        let header_id = cursor.read_u16::<LittleEndian>()?;
        let field_len = cursor.read_u16::<LittleEndian>()?;
        let field_end = cursor.position() + u64::from(field_len);

        match header_id {
            EXTRA_ZIP64 => {
                // Spill fields appear only for the saturated 32-bit values,
                // in this fixed order
                if uncompressed_size == 0xFFFF_FFFF && cursor.position() + 8 <= field_end {
                    uncompressed_size = cursor.read_u64::<LittleEndian>()?;
                }
                if compressed_size == 0xFFFF_FFFF && cursor.position() + 8 <= field_end {
                    compressed_size = cursor.read_u64::<LittleEndian>()?;
                }
                if local_header_offset == 0xFFFF_FFFF && cursor.position() + 8 <= field_end {
                    local_header_offset = cursor.read_u64::<LittleEndian>()?;
                }
            }
            EXTRA_AES if field_len >= 7 => {
                let _ae_version = cursor.read_u16::<LittleEndian>()?;
                let mut vendor = [0u8; 2];
                cursor.read_exact(&mut vendor)?;
                let strength_byte = cursor.read_u8()?;
                let real_method = cursor.read_u16::<LittleEndian>()?;

                if &vendor == b"AE" {
                    if let Some(strength) = AesStrength::from_byte(strength_byte) {
                        aes = Some(AesInfo {
                            strength,
                            real_method,
                        });
                    }
                }
            }
            _ => {}
        }
        cursor.set_position(field_end);
    }
    cursor.set_position(extra_end + comment_len as u64);

    let is_directory = path.ends_with('/') || path.ends_with('\\');

    Ok(EntryMetadata {
        method: CompressionMethod::from_id(method_id),
        path,
        compressed_size,
        uncompressed_size,
        flags,
        crc32,
        local_header_offset,
        aes,
        is_directory,
    })
}
