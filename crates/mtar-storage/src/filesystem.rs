//! Directory-backed blob store

use crate::blob::{BlobId, BlobStore, BlobStream};
use crate::{Result, StorageError, check_range};
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Blob store keeping one file per blob under a root directory
///
/// Blob ids are used directly as file names, so ids that could address a
/// file outside the root are rejected.
#[derive(Debug, Clone)]
pub struct FileSystemBlobStore {
    root: PathBuf,
}

impl FileSystemBlobStore {
    /// Open a store rooted at `root`, creating the directory if needed
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.exists() {
            info!("Creating blob store directory: {}", root.display());
            fs::create_dir_all(&root)?;
        }
        Ok(Self { root })
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File backing a blob id
    pub fn blob_path(&self, id: &BlobId) -> Result<PathBuf> {
        validate_id(id.as_str())?;
        Ok(self.root.join(id.as_str()))
    }

    fn open_blob(&self, id: &BlobId) -> Result<File> {
        let path = self.blob_path(id)?;
        File::open(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                StorageError::BlobNotFound(id.clone())
            } else {
                StorageError::Io(e)
            }
        })
    }
}

impl BlobStore for FileSystemBlobStore {
    fn fetch_full_stream(&self, id: &BlobId) -> Result<BlobStream> {
        let file = self.open_blob(id)?;
        debug!("Streaming blob file {}", id);
        Ok(Box::new(io::BufReader::new(file)))
    }

    fn fetch_range(&self, id: &BlobId, start: u64, end: u64) -> Result<BlobStream> {
        let mut file = self.open_blob(id)?;
        let size = file.metadata()?.len();
        check_range(id, start, end, size)?;
        file.seek(SeekFrom::Start(start))?;
        debug!("Streaming blob file {} range [{}, {})", id, start, end);
        Ok(Box::new(io::BufReader::new(file.take(end - start))))
    }

    fn blob_size(&self, id: &BlobId) -> Result<u64> {
        Ok(self.open_blob(id)?.metadata()?.len())
    }

    fn store_blob(&self, name: &str, content: &mut dyn Read) -> Result<BlobId> {
        let id = BlobId::new(name);
        let path = self.blob_path(&id)?;

        // Write beside the target and rename, so readers never see a partial blob
        let mut staging = tempfile::NamedTempFile::new_in(&self.root)?;
        let written = io::copy(content, &mut staging)?;
        staging.persist(&path).map_err(|e| StorageError::Io(e.error))?;

        info!("Stored blob {} ({} bytes)", id, written);
        Ok(id)
    }
}

fn validate_id(id: &str) -> Result<()> {
    let invalid = id.is_empty()
        || id == "."
        || id == ".."
        || id.contains(['/', '\\', '\0'])
        || id.contains("..");
    if invalid {
        return Err(StorageError::InvalidBlobId(id.to_string()));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::BlobStoreExt;

    fn store() -> (tempfile::TempDir, FileSystemBlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSystemBlobStore::open(dir.path().join("blobs")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_store_and_fetch() {
        let (_dir, store) = store();
        let id = store
            .store_blob("pkg.mtar.part.0", &mut &b"0123456789"[..])
            .unwrap();
        assert_eq!(store.blob_size(&id).unwrap(), 10);

        let mut all = Vec::new();
        store
            .fetch_full_stream(&id)
            .unwrap()
            .read_to_end(&mut all)
            .unwrap();
        assert_eq!(all, b"0123456789");

        let middle = store
            .consume_range(&id, 3, 7, |stream| {
                let mut buf = Vec::new();
                stream.read_to_end(&mut buf)?;
                Ok::<_, StorageError>(buf)
            })
            .unwrap();
        assert_eq!(middle, b"3456");
    }

    #[test]
    fn test_rejects_escaping_ids() {
        let (_dir, store) = store();
        for id in ["../outside", "a/b", "a\\b", "..", ""] {
            let err = store.fetch_full_stream(&BlobId::new(id)).err().unwrap();
            assert!(matches!(err, StorageError::InvalidBlobId(_)), "{id}");
        }
        assert!(store.store_blob("../x", &mut &b"x"[..]).is_err());
    }

    #[test]
    fn test_missing_blob_and_bad_range() {
        let (_dir, store) = store();
        assert!(store
            .blob_size(&BlobId::new("missing"))
            .unwrap_err()
            .is_not_found());

        let id = store.store_blob("small", &mut &b"abc"[..]).unwrap();
        assert!(matches!(
            store.fetch_range(&id, 1, 4).err().unwrap(),
            StorageError::InvalidRange { size: 3, .. }
        ));
    }

    #[test]
    fn test_store_replaces_existing_blob() {
        let (_dir, store) = store();
        store.store_blob("m.zip", &mut &b"first"[..]).unwrap();
        let id = store.store_blob("m.zip", &mut &b"second!"[..]).unwrap();
        assert_eq!(store.blob_size(&id).unwrap(), 7);
    }
}
