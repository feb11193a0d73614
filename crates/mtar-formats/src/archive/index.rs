//! Offset map of an archive's entries

use crate::archive::error::{FormatError, FormatResult};
use crate::archive::header::{METHOD_DEFLATED, METHOD_STORED};
use serde::{Deserialize, Serialize};

/// How an entry's payload is encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompressionMethod {
    /// Payload is the content itself
    Stored,
    /// Payload is a raw deflate stream
    Deflated,
}

impl CompressionMethod {
    /// Map a ZIP method id
    pub const fn from_raw(method: u16) -> Option<Self> {
        match method {
            METHOD_STORED => Some(Self::Stored),
            METHOD_DEFLATED => Some(Self::Deflated),
            _ => None,
        }
    }

    /// ZIP method id
    pub const fn as_raw(self) -> u16 {
        match self {
            Self::Stored => METHOD_STORED,
            Self::Deflated => METHOD_DEFLATED,
        }
    }
}

/// Location of one entry's payload in the logical archive stream
///
/// `start_offset` is the first payload byte, `end_offset` is one past the
/// last. Headers and trailing data descriptors are outside the extent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntryDescriptor {
    /// Normalized relative path
    pub name: String,
    /// Offset of the first payload byte
    pub start_offset: u64,
    /// Offset one past the last payload byte
    pub end_offset: u64,
    /// Payload encoding
    pub compression_method: CompressionMethod,
    /// Whether this is a directory record
    pub is_directory: bool,
}

impl ArchiveEntryDescriptor {
    /// Number of payload bytes in the logical stream
    pub const fn extent_len(&self) -> u64 {
        self.end_offset - self.start_offset
    }

    /// Name of the entry relative to a directory prefix
    ///
    /// Returns `None` if the entry is not under `prefix`.
    pub fn relative_name<'a>(&'a self, prefix: &str) -> Option<&'a str> {
        self.name
            .strip_prefix(prefix)
            .filter(|rest| !rest.is_empty())
    }
}

/// What a name or prefix resolves to in an index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryMatch<'a> {
    /// One non-directory entry with exactly this name
    File(&'a ArchiveEntryDescriptor),
    /// A directory; `files` are the non-directory entries below it in offset
    /// order and may be empty
    Directory {
        /// Prefix including the trailing `/`
        prefix: String,
        /// Files under the prefix
        files: Vec<&'a ArchiveEntryDescriptor>,
    },
}

impl<'a> EntryMatch<'a> {
    /// Every file the match covers
    pub fn files(&self) -> Vec<&'a ArchiveEntryDescriptor> {
        match self {
            Self::File(entry) => vec![*entry],
            Self::Directory { files, .. } => files.clone(),
        }
    }
}

/// Ordered entries of one archive plus its total length
///
/// Entries are in stream order: offsets never decrease and extents never
/// overlap. The index is immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveIndex {
    entries: Vec<ArchiveEntryDescriptor>,
    total_length: u64,
}

impl ArchiveIndex {
    /// Build an index, checking ordering and extent invariants
    pub fn new(entries: Vec<ArchiveEntryDescriptor>, total_length: u64) -> FormatResult<Self> {
        let mut previous_end = 0u64;
        for entry in &entries {
            if entry.end_offset < entry.start_offset {
                return Err(invalid(format!(
                    "entry \"{}\" ends at {} before it starts at {}",
                    entry.name, entry.end_offset, entry.start_offset
                )));
            }
            if entry.start_offset < previous_end {
                return Err(invalid(format!(
                    "entry \"{}\" starts at {} inside the previous entry ending at {}",
                    entry.name, entry.start_offset, previous_end
                )));
            }
            if entry.is_directory && entry.extent_len() != 0 {
                return Err(invalid(format!(
                    "directory entry \"{}\" has {} payload bytes",
                    entry.name,
                    entry.extent_len()
                )));
            }
            if entry.end_offset > total_length {
                return Err(invalid(format!(
                    "entry \"{}\" ends at {} past the archive length {}",
                    entry.name, entry.end_offset, total_length
                )));
            }
            previous_end = entry.end_offset;
        }
        Ok(Self {
            entries,
            total_length,
        })
    }

    /// Entries in stream order
    pub fn entries(&self) -> &[ArchiveEntryDescriptor] {
        &self.entries
    }

    /// Length of the logical archive stream
    pub const fn total_length(&self) -> u64 {
        self.total_length
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the archive has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in stream order
    pub fn iter(&self) -> std::slice::Iter<'_, ArchiveEntryDescriptor> {
        self.entries.iter()
    }

    /// Entry with exactly this name
    pub fn find_entry(&self, name: &str) -> Option<&ArchiveEntryDescriptor> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Whether a directory record exists for `prefix` or any file lies below it
    pub fn has_directory(&self, prefix: &str) -> bool {
        let prefix = directory_prefix(prefix);
        self.entries.iter().any(|entry| entry.name.starts_with(&prefix))
    }

    /// Non-directory entries below a directory prefix, in stream order
    pub fn files_under(&self, prefix: &str) -> Vec<&ArchiveEntryDescriptor> {
        let prefix = directory_prefix(prefix);
        self.entries
            .iter()
            .filter(|entry| !entry.is_directory && entry.name.starts_with(&prefix))
            .collect()
    }

    /// Resolve a module or resource path
    ///
    /// An exact match on a file wins. Otherwise the name is treated as a
    /// directory prefix, with or without its trailing `/`.
    ///
    /// ```rust
    /// use mtar_formats::{ArchiveEntryDescriptor, ArchiveIndex, CompressionMethod, EntryMatch};
    ///
    /// let file = |name: &str, start: u64, end: u64| ArchiveEntryDescriptor {
    ///     name: name.to_string(),
    ///     start_offset: start,
    ///     end_offset: end,
    ///     compression_method: CompressionMethod::Stored,
    ///     is_directory: false,
    /// };
    /// let index = ArchiveIndex::new(
    ///     vec![file("web/a.txt", 40, 50), file("web/b.txt", 90, 95)],
    ///     200,
    /// )?;
    ///
    /// assert!(matches!(index.resolve("web/a.txt"), Some(EntryMatch::File(_))));
    /// assert_eq!(index.resolve("web").map(|m| m.files().len()), Some(2));
    /// assert!(index.resolve("api").is_none());
    /// # Ok::<(), mtar_formats::FormatError>(())
    /// ```
    pub fn resolve(&self, name: &str) -> Option<EntryMatch<'_>> {
        if let Some(entry) = self.find_entry(name) {
            if !entry.is_directory {
                return Some(EntryMatch::File(entry));
            }
        }
        if !self.has_directory(name) {
            return None;
        }
        Some(EntryMatch::Directory {
            prefix: directory_prefix(name),
            files: self.files_under(name),
        })
    }
}

impl<'a> IntoIterator for &'a ArchiveIndex {
    type Item = &'a ArchiveEntryDescriptor;
    type IntoIter = std::slice::Iter<'a, ArchiveEntryDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

fn directory_prefix(name: &str) -> String {
    if name.ends_with('/') {
        name.to_string()
    } else {
        format!("{name}/")
    }
}

fn invalid(reason: String) -> FormatError {
    FormatError::InvalidIndex { reason }
}
