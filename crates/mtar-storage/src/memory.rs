//! In-memory blob store

use crate::blob::{BlobId, BlobStore, BlobStream};
use crate::{Result, StorageError, check_range};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use tracing::debug;

/// Blob store holding every blob in memory
///
/// Blobs are reference-counted, so open streams stay valid even if the blob
/// is replaced or removed while they are read.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<BlobId, Bytes>>,
}

impl MemoryBlobStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a blob
    pub fn insert(&self, id: BlobId, content: impl Into<Bytes>) {
        self.blobs.write().insert(id, content.into());
    }

    /// Remove a blob, returning whether it existed
    pub fn remove(&self, id: &BlobId) -> bool {
        self.blobs.write().remove(id).is_some()
    }

    /// Full content of a blob
    pub fn get(&self, id: &BlobId) -> Option<Bytes> {
        self.blobs.read().get(id).cloned()
    }

    /// Number of stored blobs
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    fn lookup(&self, id: &BlobId) -> Result<Bytes> {
        self.get(id)
            .ok_or_else(|| StorageError::BlobNotFound(id.clone()))
    }
}

impl BlobStore for MemoryBlobStore {
    fn fetch_full_stream(&self, id: &BlobId) -> Result<BlobStream> {
        let content = self.lookup(id)?;
        debug!("Streaming blob {} ({} bytes)", id, content.len());
        Ok(Box::new(Cursor::new(content)))
    }

    fn fetch_range(&self, id: &BlobId, start: u64, end: u64) -> Result<BlobStream> {
        let content = self.lookup(id)?;
        check_range(id, start, end, content.len() as u64)?;
        debug!("Streaming blob {} range [{}, {})", id, start, end);
        Ok(Box::new(Cursor::new(
            content.slice(start as usize..end as usize),
        )))
    }

    fn blob_size(&self, id: &BlobId) -> Result<u64> {
        Ok(self.lookup(id)?.len() as u64)
    }

    fn store_blob(&self, name: &str, content: &mut dyn Read) -> Result<BlobId> {
        let mut buffer = Vec::new();
        content.read_to_end(&mut buffer)?;
        let id = BlobId::new(name);
        debug!("Stored blob {} ({} bytes)", id, buffer.len());
        self.insert(id.clone(), buffer);
        Ok(id)
    }
}
