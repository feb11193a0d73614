//! Where an archive's bytes come from

use crate::error::{ResolveError, ResolveResult};
use crate::parts::{ArchivePart, PartsSequencer, SequencedArchive};
use mtar_formats::{ArchiveIndex, ArchiveIndexer};
use mtar_storage::{BlobId, BlobStore, StorageError};
use std::io::{self, Read};
use tracing::{debug, info};

/// An archive stored as one blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleBlobSource {
    /// Archive name
    pub name: String,
    /// Handle of the archive bytes
    pub blob_id: BlobId,
}

/// An archive stored as several ordered part blobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiPartBlobSource {
    /// Sequenced parts
    pub archive: SequencedArchive,
}

/// Logical archive byte stream
///
/// Offsets in an [`ArchiveIndex`] are always relative to this stream,
/// whichever variant backs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveSource {
    /// One blob; byte ranges are fetched directly
    Single(SingleBlobSource),
    /// Concatenated parts; read sequentially from the first byte
    MultiPart(MultiPartBlobSource),
}

impl ArchiveSource {
    /// Archive stored as one blob
    pub fn single(name: impl Into<String>, blob_id: impl Into<BlobId>) -> Self {
        Self::Single(SingleBlobSource {
            name: name.into(),
            blob_id: blob_id.into(),
        })
    }

    /// Archive made from stored parts
    ///
    /// A collection of one part becomes a [`ArchiveSource::Single`] source
    /// named after the logical archive.
    pub fn from_parts(sequencer: &PartsSequencer, parts: Vec<ArchivePart>) -> ResolveResult<Self> {
        let archive = sequencer.sequence(parts)?;
        if archive.is_multi_part() {
            return Ok(Self::MultiPart(MultiPartBlobSource { archive }));
        }
        let name = archive.logical_name().to_string();
        let blob_id = archive
            .parts()
            .first()
            .map(|part| part.blob_id.clone())
            .ok_or(ResolveError::NoArchiveParts)?;
        Ok(Self::Single(SingleBlobSource { name, blob_id }))
    }

    /// Archive display name
    pub fn name(&self) -> &str {
        match self {
            Self::Single(source) => &source.name,
            Self::MultiPart(source) => source.archive.logical_name(),
        }
    }

    /// Whether entry payloads can be fetched by range
    pub const fn is_range_addressable(&self) -> bool {
        matches!(self, Self::Single(_))
    }

    /// Length of the logical stream
    pub fn total_size<S: BlobStore + ?Sized>(&self, store: &S) -> ResolveResult<u64> {
        match self {
            Self::Single(source) => Ok(store.blob_size(&source.blob_id)?),
            Self::MultiPart(source) => source.archive.total_size(store),
        }
    }

    /// Open the logical stream from its first byte
    pub fn open_sequential<'s, S: BlobStore + ?Sized>(
        &self,
        store: &'s S,
    ) -> ResolveResult<Box<dyn Read + Send + 's>> {
        match self {
            Self::Single(source) => Ok(store.fetch_full_stream(&source.blob_id)?),
            Self::MultiPart(source) => Ok(Box::new(source.archive.open(store))),
        }
    }

    /// Open bytes `[start, end)` of the logical stream
    ///
    /// Multi-part sources read and discard the bytes before `start`.
    pub fn open_range<'s, S: BlobStore + ?Sized>(
        &self,
        store: &'s S,
        start: u64,
        end: u64,
    ) -> ResolveResult<Box<dyn Read + Send + 's>> {
        match self {
            Self::Single(source) => Ok(store.fetch_range(&source.blob_id, start, end)?),
            Self::MultiPart(source) => {
                let invalid = |size| StorageError::InvalidRange {
                    blob: source.archive.logical_name().into(),
                    start,
                    end,
                    size,
                };
                if start > end {
                    return Err(invalid(source.archive.total_size(store)?).into());
                }
                let mut stream = source.archive.open(store);
                let skipped = io::copy(&mut stream.by_ref().take(start), &mut io::sink())?;
                if skipped < start {
                    return Err(invalid(skipped).into());
                }
                Ok(Box::new(stream.take(end - start)))
            }
        }
    }

    /// Build the entry index in one pass over the logical stream
    pub fn index<S: BlobStore + ?Sized>(&self, store: &S) -> ResolveResult<ArchiveIndex> {
        self.index_with(store, &ArchiveIndexer::new())
    }

    /// Build the entry index with a configured indexer
    pub fn index_with<S: BlobStore + ?Sized>(
        &self,
        store: &S,
        indexer: &ArchiveIndexer,
    ) -> ResolveResult<ArchiveIndex> {
        debug!("Indexing archive {}", self.name());
        let stream = self.open_sequential(store)?;
        let index = indexer.index(stream).map_err(|e| {
            let err = ResolveError::from(e);
            err.log(self.name());
            err
        })?;
        info!(
            "Indexed archive {}: {} entries, {} bytes",
            self.name(),
            index.len(),
            index.total_length()
        );
        Ok(index)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use mtar_storage::MemoryBlobStore;
    use pretty_assertions::assert_eq;

    fn split_store(content: &[u8], cuts: &[usize]) -> (MemoryBlobStore, Vec<ArchivePart>) {
        let store = MemoryBlobStore::new();
        let mut parts = Vec::new();
        let mut start = 0;
        for (i, end) in cuts.iter().copied().chain([content.len()]).enumerate() {
            let id = BlobId::new(format!("blob-{i}"));
            store.insert(id.clone(), content[start..end].to_vec());
            parts.push(ArchivePart::new(format!("pkg.mtar.part.{i}"), id));
            start = end;
        }
        (store, parts)
    }

    fn read_all(mut reader: Box<dyn Read + Send + '_>) -> Vec<u8> {
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_single_part_collection_is_range_addressable() {
        let (_, parts) = split_store(b"abc", &[]);
        let source = ArchiveSource::from_parts(&PartsSequencer::default(), parts).unwrap();
        assert!(source.is_range_addressable());
        assert_eq!(source.name(), "pkg.mtar");
    }

    #[test]
    fn test_multi_part_range_spans_boundaries() {
        let (store, parts) = split_store(b"0123456789", &[3, 7]);
        let source = ArchiveSource::from_parts(&PartsSequencer::default(), parts).unwrap();
        assert!(!source.is_range_addressable());
        assert_eq!(source.total_size(&store).unwrap(), 10);

        assert_eq!(read_all(source.open_range(&store, 2, 8).unwrap()), b"234567");
        assert_eq!(read_all(source.open_sequential(&store).unwrap()), b"0123456789");
        assert!(read_all(source.open_range(&store, 10, 10).unwrap()).is_empty());
    }

    #[test]
    fn test_multi_part_range_past_end() {
        let (store, parts) = split_store(b"0123", &[2]);
        let source = ArchiveSource::from_parts(&PartsSequencer::default(), parts).unwrap();
        let err = source.open_range(&store, 6, 8).err().unwrap();
        assert!(matches!(
            err,
            ResolveError::Storage(StorageError::InvalidRange { size: 4, .. })
        ));
        assert!(err.is_storage_error());
    }

    #[test]
    fn test_single_range() {
        let store = MemoryBlobStore::new();
        store.insert(BlobId::new("b"), b"0123456789".to_vec());
        let source = ArchiveSource::single("pkg.mtar", "b");
        assert_eq!(read_all(source.open_range(&store, 4, 6).unwrap()), b"45");
        assert!(source.open_range(&store, 4, 11).is_err());
    }
}
