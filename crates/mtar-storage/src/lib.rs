//! Blob storage boundary for application archives.
//!
//! Archives and their parts live in an external blob store. The resolution
//! engine only ever reads from it, either as one sequential stream or as a
//! byte range, and writes back exactly one kind of object: a repackaged
//! module staged for upload.
//!
//! - **[`BlobStore`]**: object-safe trait every backend implements
//! - **[`BlobStoreExt`]**: scoped access that releases the stream on every
//!   exit path
//! - **[`MemoryBlobStore`]**: shared in-memory backend for tests and tools
//! - **[`FileSystemBlobStore`]**: one file per blob under a root directory
//!
//! # Example
//!
//! ```rust
//! use mtar_storage::{BlobId, BlobStore, BlobStoreExt, MemoryBlobStore};
//! use std::io::Read;
//!
//! let store = MemoryBlobStore::new();
//! store.insert(BlobId::new("pkg.mtar"), b"PK\x05\x06".to_vec());
//!
//! let head = store.consume_range(&BlobId::new("pkg.mtar"), 0, 2, |stream| {
//!     let mut buf = Vec::new();
//!     stream.read_to_end(&mut buf)?;
//!     Ok::<_, mtar_storage::StorageError>(buf)
//! })?;
//! assert_eq!(head, b"PK");
//! # Ok::<(), mtar_storage::StorageError>(())
//! ```

#![warn(missing_docs)]
#![allow(clippy::must_use_candidate)]

use thiserror::Error;

mod blob;
mod filesystem;
mod memory;

pub use blob::{BlobId, BlobStore, BlobStoreExt, BlobStream};
pub use filesystem::FileSystemBlobStore;
pub use memory::MemoryBlobStore;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors raised by blob store backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No blob with this id.
    #[error("Blob not found: {0}")]
    BlobNotFound(BlobId),

    /// Requested range lies outside the blob.
    #[error("Invalid range [{start}, {end}) for blob {blob} of {size} bytes")]
    InvalidRange {
        /// Blob the range was requested from
        blob: BlobId,
        /// First requested byte
        start: u64,
        /// One past the last requested byte
        end: u64,
        /// Actual blob size
        size: u64,
    },

    /// Blob id cannot be mapped onto this backend.
    #[error("Invalid blob id: {0}")]
    InvalidBlobId(String),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Check if the blob does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::BlobNotFound(_))
    }
}

/// Version information for the storage crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub(crate) fn check_range(blob: &BlobId, start: u64, end: u64, size: u64) -> Result<()> {
    if start > end || end > size {
        return Err(StorageError::InvalidRange {
            blob: blob.clone(),
            start,
            end,
            size,
        });
    }
    Ok(())
}
