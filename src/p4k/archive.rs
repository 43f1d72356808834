//! Archive facade
//!
//! [`P4kArchive`] is the public entry point: it loads the central directory
//! once, owns the resulting tree, and serves per-entry reads on demand.
//! Every read opens its own file handle, so concurrent `open` calls never
//! fight over a shared seek cursor.

use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

use crate::codec;
use crate::error::{Error, Result};
use crate::formats::cryxml;

use super::reader::P4kDirectoryReader;
use super::tree::{P4kDirectory, P4kEntry, P4kItem, build_tree};
use super::types::{P4kOptions, P4kPhase, P4kProgress};

/// Progress callback type
pub type ProgressCallback<'a> = &'a dyn Fn(&P4kProgress);

/// An opened P4K archive: parsed metadata plus the directory tree
pub struct P4kArchive {
    path: PathBuf,
    options: P4kOptions,
    root: P4kDirectory,
}

impl P4kArchive {
    /// Open an archive with the default key material.
    ///
    /// # Errors
    /// Returns [`Error::NotAnArchive`] when the trailing directory
    /// structure cannot be located, [`Error::Truncated`] when declared
    /// offsets exceed the file length, and [`Error::Io`] for file system
    /// failures.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with_options(path, P4kOptions::default())
    }

    /// Open an archive with explicit options.
    ///
    /// # Errors
    /// Same as [`Self::load`].
    pub fn load_with_options(path: impl AsRef<Path>, options: P4kOptions) -> Result<Self> {
        Self::load_with_progress(path, options, None, None)
    }

    /// Open an archive, reporting progress and honoring cooperative
    /// cancellation between entries.
    ///
    /// # Errors
    /// Same as [`Self::load`], plus [`Error::Cancelled`] when the cancel
    /// flag is raised mid-load.
    pub fn load_with_progress(
        path: impl AsRef<Path>,
        options: P4kOptions,
        progress: Option<ProgressCallback>,
        cancel: Option<&AtomicBool>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let report = |p: &P4kProgress| {
            if let Some(callback) = progress {
                callback(p);
            }
        };
        let cancelled = || cancel.is_some_and(|flag| flag.load(Ordering::Relaxed));

        info!(archive = %path.display(), "loading P4K archive");
        report(&P4kProgress::new(P4kPhase::ReadingDirectory, 0, 1));

        let file = File::open(&path)?;
        let mut reader = P4kDirectoryReader::new(BufReader::new(file))?;
        let entries = reader.read_entries_with(|current, total, entry| {
            if cancelled() {
                return Err(Error::Cancelled);
            }
            report(&P4kProgress::with_entry(
                P4kPhase::ReadingEntries,
                current,
                total,
                entry.path.clone(),
            ));
            Ok(())
        })?;
        if cancelled() {
            return Err(Error::Cancelled);
        }

        let total = entries.len();
        report(&P4kProgress::new(P4kPhase::BuildingIndex, 0, 1));
        let root = build_tree(entries);
        report(&P4kProgress::new(P4kPhase::Complete, total, total));
        debug!(entries = total, "archive index built");

        Ok(Self {
            path,
            options,
            root,
        })
    }

    /// Path of the backing archive file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The synthetic root directory
    #[must_use]
    pub fn root(&self) -> &P4kDirectory {
        &self.root
    }

    /// Find every file whose leaf name matches `name` case-insensitively.
    ///
    /// Results come in pre-order tree traversal: within a directory, files
    /// in insertion order before subdirectories in insertion order.
    #[must_use]
    pub fn find_files(&self, name: &str) -> Vec<&P4kEntry> {
        let folded = name.to_lowercase();
        let mut matches = Vec::new();
        self.root.collect_matches(&folded, &mut matches);
        matches
    }

    /// All files under `directory` (case-insensitive prefix match over
    /// full paths, separators normalized). Directories are not yielded.
    pub fn entries_in_directory(&self, directory: &str) -> impl Iterator<Item = &P4kEntry> {
        let normalized = directory.replace('\\', "/");
        let prefix = format!("{}/", normalized.trim_end_matches('/')).to_lowercase();

        let mut files = Vec::new();
        self.root.walk_files(&mut files);
        files
            .into_iter()
            .filter(move |entry| entry.path().to_lowercase().starts_with(&prefix))
    }

    /// Look up a single file by its full archive path (case-insensitive,
    /// either separator).
    #[must_use]
    pub fn entry(&self, path: &str) -> Option<&P4kEntry> {
        let mut cursor = &self.root;
        let segments: Vec<&str> = path
            .split(['/', '\\'])
            .filter(|s| !s.is_empty())
            .collect();
        let (last, parents) = segments.split_last()?;

        for segment in parents {
            match cursor.child(segment)? {
                P4kItem::Directory(dir) => cursor = dir,
                P4kItem::File(_) => return None,
            }
        }
        match cursor.child(last)? {
            P4kItem::File(entry) => Some(entry),
            P4kItem::Directory(_) => None,
        }
    }

    /// Decode one entry completely and return its original bytes.
    ///
    /// Opens an independent file handle, so callers may read entries from
    /// multiple threads against the same archive.
    ///
    /// # Errors
    /// Returns [`Error::Truncated`] or [`Error::CorruptEntry`] for broken
    /// payload framing, [`Error::AuthenticationFailed`] for key mismatches,
    /// [`Error::UnsupportedCompressionMethod`] for methods this reader does
    /// not decode.
    pub fn read_bytes(&self, entry: &P4kEntry) -> Result<Vec<u8>> {
        let metadata = entry.metadata();
        let file = File::open(&self.path)?;
        let mut reader = P4kDirectoryReader::new(BufReader::new(file))?;
        let payload = reader.read_payload(metadata)?;

        codec::decode_entry(
            &metadata.path,
            &payload,
            metadata.effective_method(),
            &metadata.encryption(&self.options.key),
            metadata.crc32,
        )
    }

    /// Open one entry as a readable stream of decoded bytes.
    ///
    /// # Errors
    /// Same as [`Self::read_bytes`].
    pub fn open(&self, entry: &P4kEntry) -> Result<Cursor<Vec<u8>>> {
        Ok(Cursor::new(self.read_bytes(entry)?))
    }

    /// Open a tree item; directories are a caller error.
    ///
    /// # Errors
    /// Returns [`Error::InvalidOperation`] for directory items, otherwise
    /// same as [`Self::open`].
    pub fn open_item(&self, item: &P4kItem) -> Result<Cursor<Vec<u8>>> {
        match item {
            P4kItem::Directory(_) => {
                Err(Error::InvalidOperation("cannot open a directory entry"))
            }
            P4kItem::File(entry) => self.open(entry),
        }
    }

    /// Read an entry as text, transparently decoding CryXmlB.
    ///
    /// Binary XML is detected by extension plus signature sniff, so plain
    /// text files named `.xml` pass through untouched.
    ///
    /// # Errors
    /// Same as [`Self::read_bytes`], plus the CryXmlB decode errors for
    /// binary XML entries.
    pub fn read_to_string(&self, entry: &P4kEntry) -> Result<String> {
        let bytes = self.read_bytes(entry)?;
        if entry.is_cryxml_candidate() && cryxml::is_cryxml(&bytes) {
            let document = cryxml::parse_cryxml_bytes(&bytes)?;
            return cryxml::to_xml_string(&document);
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Extract an entry under `destination`, recreating its archive path.
    /// Returns the path written.
    ///
    /// # Errors
    /// Same as [`Self::read_bytes`], plus file system errors while writing.
    pub fn extract_to(&self, entry: &P4kEntry, destination: impl AsRef<Path>) -> Result<PathBuf> {
        let mut target = destination.as_ref().to_path_buf();
        for segment in entry.path().split('/').filter(|s| !s.is_empty()) {
            target.push(segment);
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, self.read_bytes(entry)?)?;
        debug!(entry = entry.path(), target = %target.display(), "extracted entry");
        Ok(target)
    }

    /// Write an entry's decoded bytes to an explicit destination file.
    ///
    /// # Errors
    /// Same as [`Self::read_bytes`], plus file system errors while writing.
    pub fn save_to(&self, entry: &P4kEntry, destination: impl AsRef<Path>) -> Result<()> {
        std::fs::write(destination, self.read_bytes(entry)?)?;
        Ok(())
    }
}
