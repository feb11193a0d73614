//! Multi-part archive sequencing
//!
//! Large uploads arrive as several blobs named
//! `<archive><delimiter><n>`, for example `app.mtar.part.0`. The archive is
//! the concatenation of the parts in ascending numeric order of `n`.

use crate::error::{ResolveError, ResolveResult};
use mtar_storage::{BlobId, BlobStore, BlobStream};
use std::io::{self, Read};
use tracing::{debug, warn};

/// One stored fragment of an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePart {
    /// Part name including any numeric suffix
    pub name: String,
    /// Handle of the part's bytes
    pub blob_id: BlobId,
}

impl ArchivePart {
    /// Create a part
    pub fn new(name: impl Into<String>, blob_id: impl Into<BlobId>) -> Self {
        Self {
            name: name.into(),
            blob_id: blob_id.into(),
        }
    }
}

/// Orders archive parts by their numeric suffix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartsSequencer {
    delimiter: String,
}

impl Default for PartsSequencer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DELIMITER)
    }
}

impl PartsSequencer {
    /// Delimiter used when none is configured
    pub const DEFAULT_DELIMITER: &'static str = ".part.";

    /// Create a sequencer splitting names at `delimiter`
    pub fn new(delimiter: impl Into<String>) -> Self {
        Self {
            delimiter: delimiter.into(),
        }
    }

    /// Delimiter between archive name and part number
    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Split a part name into archive name and part number
    ///
    /// Returns `Ok(None)` if the name has no delimiter.
    pub fn parse_name<'a>(&self, part: &'a str) -> ResolveResult<Option<(&'a str, u64)>> {
        let Some((prefix, suffix)) = part.rsplit_once(self.delimiter.as_str()) else {
            return Ok(None);
        };
        let index = suffix
            .parse::<u64>()
            .ok()
            .filter(|_| suffix.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| ResolveError::InvalidPartSuffix {
                part: part.to_string(),
            })?;
        Ok(Some((prefix, index)))
    }

    /// Order parts and derive the logical archive name
    ///
    /// A single part without a delimiter is a complete archive. Otherwise
    /// every part must carry a numeric suffix, and suffixes must be unique.
    pub fn sequence(&self, parts: Vec<ArchivePart>) -> ResolveResult<SequencedArchive> {
        if parts.is_empty() {
            return Err(ResolveError::NoArchiveParts);
        }

        if parts.len() == 1 && self.parse_name(&parts[0].name)?.is_none() {
            return Ok(SequencedArchive {
                logical_name: parts[0].name.clone(),
                parts,
            });
        }

        let mut numbered = Vec::with_capacity(parts.len());
        for part in parts {
            let Some((prefix, index)) = self.parse_name(&part.name)? else {
                return Err(ResolveError::InvalidPartSuffix { part: part.name });
            };
            let prefix = prefix.to_string();
            numbered.push((index, prefix, part));
        }
        numbered.sort_by_key(|(index, _, _)| *index);

        for pair in numbered.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(ResolveError::DuplicatePartIndex {
                    first: pair[0].2.name.clone(),
                    second: pair[1].2.name.clone(),
                    index: pair[0].0,
                });
            }
        }

        let logical_name = numbered[0].1.clone();
        for (_, prefix, part) in &numbered[1..] {
            if *prefix != logical_name {
                warn!(
                    "Archive part {} does not match archive name {}",
                    part.name, logical_name
                );
            }
        }

        debug!(
            "Sequenced {} parts of archive {}",
            numbered.len(),
            logical_name
        );
        Ok(SequencedArchive {
            logical_name,
            parts: numbered.into_iter().map(|(_, _, part)| part).collect(),
        })
    }
}

/// Parts in read order plus the archive name they form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencedArchive {
    logical_name: String,
    parts: Vec<ArchivePart>,
}

impl SequencedArchive {
    /// Display name of the logical archive
    pub fn logical_name(&self) -> &str {
        &self.logical_name
    }

    /// Parts in read order
    pub fn parts(&self) -> &[ArchivePart] {
        &self.parts
    }

    /// Whether the archive spans more than one blob
    pub fn is_multi_part(&self) -> bool {
        self.parts.len() > 1
    }

    /// Sum of the part sizes
    pub fn total_size<S: BlobStore + ?Sized>(&self, store: &S) -> ResolveResult<u64> {
        let mut total = 0u64;
        for part in &self.parts {
            total += store.blob_size(&part.blob_id)?;
        }
        Ok(total)
    }

    /// Read the concatenation of all parts
    ///
    /// Each part is opened only once the previous one is exhausted.
    pub fn open<'s, S: BlobStore + ?Sized>(&self, store: &'s S) -> PartsReader<'s, S> {
        PartsReader {
            store,
            parts: self.parts.iter().map(|p| p.blob_id.clone()).collect(),
            next: 0,
            current: None,
        }
    }
}

/// Sequential reader over consecutive part blobs
pub struct PartsReader<'s, S: BlobStore + ?Sized> {
    store: &'s S,
    parts: Vec<BlobId>,
    next: usize,
    current: Option<BlobStream>,
}

impl<S: BlobStore + ?Sized> PartsReader<'_, S> {
    /// Index of the part being read, if any is open
    pub fn current_part(&self) -> Option<usize> {
        self.current.as_ref().map(|_| self.next - 1)
    }
}

impl<S: BlobStore + ?Sized> Read for PartsReader<'_, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.current.is_none() {
                let Some(id) = self.parts.get(self.next) else {
                    return Ok(0);
                };
                debug!("Opening archive part {}", id);
                self.current = Some(self.store.fetch_full_stream(id).map_err(io::Error::other)?);
                self.next += 1;
            }
            if let Some(stream) = self.current.as_mut() {
                let n = stream.read(buf)?;
                if n > 0 {
                    return Ok(n);
                }
            }
            // Part exhausted; release it before opening the next
            self.current = None;
        }
    }
}
