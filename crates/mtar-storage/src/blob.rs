//! Blob handles and the store trait

use crate::{Result, StorageError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;

/// Opaque handle of a stored blob
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobId(String);

impl BlobId {
    /// Wrap a backend-specific identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier as text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlobId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for BlobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Readable blob content
pub type BlobStream = Box<dyn Read + Send>;

/// Backend that persists and serves archive bytes
///
/// Implementations must support concurrent independent reads. Streams are
/// owned by the caller and released when dropped.
pub trait BlobStore: Send + Sync {
    /// Open the whole blob as a sequential stream
    fn fetch_full_stream(&self, id: &BlobId) -> Result<BlobStream>;

    /// Open bytes `[start, end)` of the blob
    ///
    /// Fails with [`StorageError::InvalidRange`] unless
    /// `start <= end <= size`.
    fn fetch_range(&self, id: &BlobId, start: u64, end: u64) -> Result<BlobStream>;

    /// Size of the blob in bytes
    fn blob_size(&self, id: &BlobId) -> Result<u64>;

    /// Persist `content` under a name derived from `name`
    fn store_blob(&self, name: &str, content: &mut dyn Read) -> Result<BlobId>;
}

/// Scoped access to blob streams
///
/// The stream exists only for the duration of the consumer call and is
/// dropped on every exit path, including consumer errors and panics.
pub trait BlobStoreExt: BlobStore {
    /// Run `consumer` over the whole blob
    fn consume_full_stream<T, E, F>(&self, id: &BlobId, consumer: F) -> std::result::Result<T, E>
    where
        E: From<StorageError>,
        F: FnOnce(&mut (dyn Read + Send)) -> std::result::Result<T, E>,
    {
        let mut stream = self.fetch_full_stream(id)?;
        consumer(&mut *stream)
    }

    /// Run `consumer` over bytes `[start, end)` of the blob
    fn consume_range<T, E, F>(
        &self,
        id: &BlobId,
        start: u64,
        end: u64,
        consumer: F,
    ) -> std::result::Result<T, E>
    where
        E: From<StorageError>,
        F: FnOnce(&mut (dyn Read + Send)) -> std::result::Result<T, E>,
    {
        let mut stream = self.fetch_range(id, start, end)?;
        consumer(&mut *stream)
    }
}

impl<S: BlobStore + ?Sized> BlobStoreExt for S {}
