//! Archive directory tree
//!
//! The central directory is a flat, ordered list of paths; this module
//! folds it into a rooted tree of directories and file leaves. Child names
//! are unique per directory under case folding, entry order is preserved,
//! and when two entries collapse to the same folded path the later one in
//! the metadata list wins.

use super::types::EntryMetadata;

/// One node of the archive tree: a directory or a file leaf
#[derive(Debug, Clone)]
pub enum P4kItem {
    Directory(P4kDirectory),
    File(P4kEntry),
}

impl P4kItem {
    /// Node name (final path segment)
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            P4kItem::Directory(d) => &d.name,
            P4kItem::File(f) => f.name(),
        }
    }

    /// Full slash-delimited path from the archive root
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            P4kItem::Directory(d) => &d.path,
            P4kItem::File(f) => f.path(),
        }
    }

    #[must_use]
    pub fn is_directory(&self) -> bool {
        matches!(self, P4kItem::Directory(_))
    }
}

/// A directory node with insertion-ordered children
#[derive(Debug, Clone)]
pub struct P4kDirectory {
    /// Directory name; empty for the synthetic root
    pub name: String,
    /// Full path; empty for the synthetic root
    pub path: String,
    children: Vec<P4kItem>,
}

/// A file leaf wrapping the entry metadata; handed out as the handle for
/// open/extract operations
#[derive(Debug, Clone)]
pub struct P4kEntry {
    pub(crate) metadata: EntryMetadata,
}

impl P4kEntry {
    /// Leaf file name
    #[must_use]
    pub fn name(&self) -> &str {
        self.metadata.file_name()
    }

    /// Full path inside the archive
    #[must_use]
    pub fn path(&self) -> &str {
        &self.metadata.path
    }

    /// Size of the stored payload
    #[must_use]
    pub fn compressed_size(&self) -> u64 {
        self.metadata.compressed_size
    }

    /// Size after decoding
    #[must_use]
    pub fn uncompressed_size(&self) -> u64 {
        self.metadata.uncompressed_size
    }

    /// The underlying central directory metadata
    #[must_use]
    pub fn metadata(&self) -> &EntryMetadata {
        &self.metadata
    }

    /// Name heuristic for CryXmlB content: the game stores binary XML under
    /// a plain `.xml` extension
    #[must_use]
    pub fn is_cryxml_candidate(&self) -> bool {
        self.name().to_lowercase().ends_with(".xml")
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

impl P4kDirectory {
    pub(crate) fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            children: Vec::new(),
        }
    }

    /// Children in insertion order
    #[must_use]
    pub fn children(&self) -> &[P4kItem] {
        &self.children
    }

    /// Case-insensitive child lookup
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&P4kItem> {
        let folded = name.to_lowercase();
        self.children
            .iter()
            .find(|c| c.name().to_lowercase() == folded)
    }

    fn child_position(&self, name: &str) -> Option<usize> {
        let folded = name.to_lowercase();
        self.children
            .iter()
            .position(|c| c.name().to_lowercase() == folded)
    }

    /// Find or create a subdirectory. A same-named file child is displaced
    /// (later entry wins).
    fn ensure_dir(&mut self, name: &str) -> &mut P4kDirectory {
        let idx = match self.child_position(name) {
            Some(i) => {
                if !self.children[i].is_directory() {
                    let path = join_path(&self.path, name);
                    self.children[i] = P4kItem::Directory(P4kDirectory::new(name, path));
                }
                i
            }
            None => {
                let path = join_path(&self.path, name);
                self.children
                    .push(P4kItem::Directory(P4kDirectory::new(name, path)));
                self.children.len() - 1
            }
        };
        match &mut self.children[idx] {
            P4kItem::Directory(d) => d,
            P4kItem::File(_) => unreachable!("ensure_dir always leaves a directory at idx"),
        }
    }

    /// Attach a file leaf, replacing any same-named child in place
    fn insert_file(&mut self, entry: P4kEntry) {
        match self.child_position(entry.name()) {
            Some(i) => self.children[i] = P4kItem::File(entry),
            None => self.children.push(P4kItem::File(entry)),
        }
    }

    /// Collect every file matching `folded` (a pre-lowercased leaf name),
    /// pre-order: files of a directory before its subdirectories.
    pub(crate) fn collect_matches<'a>(&'a self, folded: &str, out: &mut Vec<&'a P4kEntry>) {
        for child in &self.children {
            if let P4kItem::File(entry) = child {
                if entry.name().to_lowercase() == folded {
                    out.push(entry);
                }
            }
        }
        for child in &self.children {
            if let P4kItem::Directory(dir) = child {
                dir.collect_matches(folded, out);
            }
        }
    }

    /// Walk every file leaf in tree order
    pub(crate) fn walk_files<'a>(&'a self, out: &mut Vec<&'a P4kEntry>) {
        for child in &self.children {
            match child {
                P4kItem::File(entry) => out.push(entry),
                P4kItem::Directory(dir) => dir.walk_files(out),
            }
        }
    }
}

/// Build the directory tree from the ordered entry metadata list.
///
/// Paths split on `/` or `\`; empty segments are skipped; a trailing empty
/// segment (or an explicit directory marker) creates directories without
/// attaching a file leaf.
#[must_use]
pub fn build_tree(entries: Vec<EntryMetadata>) -> P4kDirectory {
    let mut root = P4kDirectory::new("", "");

    for metadata in entries {
        let segments: Vec<&str> = metadata.path.split(['/', '\\']).collect();
        let Some((last, parents)) = segments.split_last() else {
            continue;
        };

        let mut cursor = &mut root;
        for segment in parents {
            if segment.is_empty() {
                continue;
            }
            cursor = cursor.ensure_dir(segment);
        }

        if last.is_empty() || metadata.is_directory {
            if !last.is_empty() {
                cursor.ensure_dir(last);
            }
            continue;
        }

        // Normalize backslash paths so handles report slash-delimited paths
        let full_path = join_path(&cursor.path, last);
        let mut metadata = metadata;
        metadata.path = full_path;
        cursor.insert_file(P4kEntry { metadata });
    }

    root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::p4k::types::CompressionMethod;
    use pretty_assertions::assert_eq;

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
            is_directory: path.ends_with('/') || path.ends_with('\\'),
        }
    }

    #[test]
    fn test_tree_shape() {
        let root = build_tree(vec![meta("a/b.txt"), meta("a/c.txt"), meta("d.txt")]);

        assert_eq!(root.children().len(), 2);
        assert_eq!(root.children()[0].name(), "a");
        assert!(root.children()[0].is_directory());
        assert_eq!(root.children()[1].name(), "d.txt");
        assert!(!root.children()[1].is_directory());

        let P4kItem::Directory(a) = &root.children()[0] else {
            panic!("expected directory");
        };
        assert_eq!(a.children().len(), 2);
        assert_eq!(a.children()[0].name(), "b.txt");
        assert_eq!(a.children()[1].name(), "c.txt");
        assert_eq!(a.children()[0].path(), "a/b.txt");
    }

    #[test]
    fn test_case_insensitive_overwrite() {
        let root = build_tree(vec![meta("A/x"), meta("a/X")]);

        assert_eq!(root.children().len(), 1);
        let P4kItem::Directory(a) = &root.children()[0] else {
            panic!("expected directory");
        };
        // Directory keeps its first-seen name, the file is replaced in place
        assert_eq!(a.name, "A");
        assert_eq!(a.children().len(), 1);
        assert_eq!(a.children()[0].name(), "X");
    }

    #[test]
    fn test_directory_markers_create_no_leaves() {
        let root = build_tree(vec![meta("a/b/"), meta("a/b/c.txt")]);

        let Some(P4kItem::Directory(a)) = root.child("a") else {
            panic!("expected directory a");
        };
        let Some(P4kItem::Directory(b)) = a.child("b") else {
            panic!("expected directory b");
        };
        assert_eq!(b.children().len(), 1);
        assert_eq!(b.children()[0].name(), "c.txt");
    }

    #[test]
    fn test_backslash_paths_normalized() {
        let root = build_tree(vec![meta("Data\\Libs\\foo.xml")]);
        let mut files = Vec::new();
        root.walk_files(&mut files);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path(), "Data/Libs/foo.xml");
    }

    #[test]
    fn test_match_order_files_before_subdirectories() {
        let root = build_tree(vec![
            meta("sub/global.ini"),
            meta("global.ini"),
            meta("zz/deeper/global.ini"),
        ]);

        let mut matches = Vec::new();
        root.collect_matches("global.ini", &mut matches);
        let paths: Vec<&str> = matches.iter().map(|e| e.path()).collect();
        // Root-level file first, then subdirectories in insertion order
        assert_eq!(paths, vec!["global.ini", "sub/global.ini", "zz/deeper/global.ini"]);
    }
}
