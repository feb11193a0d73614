//! Error taxonomy for archive resolution

use crate::config::ConfigError;
use mtar_formats::FormatError;
use mtar_storage::StorageError;
use thiserror::Error;
use tracing::warn;

/// Archive resolution result type
pub type ResolveResult<T> = Result<T, ResolveError>;

/// Errors surfaced to the deployment pipeline
///
/// Messages name the entry, part or limit involved since they are shown to
/// the user deploying the package.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Malformed or unsafe archive container
    #[error(transparent)]
    Format(#[from] FormatError),

    /// Blob store failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Invalid limits or settings
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No entry matches the requested name or prefix
    #[error("Could not find archive entry \"{name}\"")]
    EntryNotFound {
        /// Requested name or prefix
        name: String,
    },

    /// Consumed content would exceed the operation's budget
    #[error("The size of \"{entry}\" exceeds the configured max size limit \"{limit}\"")]
    SizeLimitExceeded {
        /// Entry being read when the budget ran out
        entry: String,
        /// Configured limit in bytes
        limit: u64,
    },

    /// Part name suffix is missing or not a non-negative integer
    #[error("Invalid archive part name \"{part}\": suffix after the delimiter must be a non-negative integer")]
    InvalidPartSuffix {
        /// Offending part name
        part: String,
    },

    /// Two parts carry the same index
    #[error("Archive parts \"{first}\" and \"{second}\" have the same index {index}")]
    DuplicatePartIndex {
        /// Part seen first
        first: String,
        /// Part seen second
        second: String,
        /// Shared index
        index: u64,
    },

    /// No parts were supplied for an archive
    #[error("Archive has no parts")]
    NoArchiveParts,

    /// Single-entry extraction was asked for a directory
    #[error("Archive entry \"{name}\" is a directory and must be read with directory extraction")]
    DirectoryRequiresDirectoryExtraction {
        /// Directory prefix
        name: String,
    },

    /// Digest requested from a context created without one
    #[error("No digest is being computed for this operation")]
    MissingDigest,

    /// Parameter file is not valid JSON
    #[error("Could not parse JSON content of archive entry \"{entry}\": {source}")]
    InvalidJson {
        /// Entry that was parsed
        entry: String,
        /// Parser error
        #[source]
        source: serde_json::Error,
    },

    /// I/O error on temporary output
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ResolveError {
    /// Check if the failure is attributable to the input archive
    ///
    /// Content errors are terminal for the pipeline step and never retried.
    pub fn is_content_error(&self) -> bool {
        match self {
            Self::Format(e) => !matches!(e.root(), FormatError::Io(_)),
            Self::EntryNotFound { .. }
            | Self::SizeLimitExceeded { .. }
            | Self::InvalidPartSuffix { .. }
            | Self::DuplicatePartIndex { .. }
            | Self::NoArchiveParts
            | Self::DirectoryRequiresDirectoryExtraction { .. }
            | Self::InvalidJson { .. } => true,
            Self::Storage(_) | Self::Config(_) | Self::MissingDigest | Self::Io(_) => false,
        }
    }

    /// Check if the blob store failed
    ///
    /// Retrying is the caller's concern.
    pub fn is_storage_error(&self) -> bool {
        match self {
            Self::Storage(_) => true,
            Self::Format(e) => matches!(e.root(), FormatError::Io(_)),
            _ => false,
        }
    }

    /// Check if the archive tried to place content outside its root
    pub fn is_security_violation(&self) -> bool {
        matches!(self, Self::Format(e) if e.is_security_violation())
    }

    /// Check if the bytes look damaged in transit rather than invalid
    pub fn is_corrupted_stream(&self) -> bool {
        matches!(self, Self::Format(e) if e.is_corrupted_stream())
    }

    /// Check if a size budget was exceeded
    pub fn is_size_limit(&self) -> bool {
        matches!(self, Self::SizeLimitExceeded { .. })
    }

    /// Log the error with the severity its class calls for
    pub(crate) fn log(&self, archive: &str) {
        if self.is_security_violation() {
            warn!("Rejected unsafe entry in archive {}: {}", archive, self);
        } else if self.is_corrupted_stream() {
            warn!(
                "Possible transport corruption in archive {}: {}",
                archive, self
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use mtar_formats::UnsafePathReason;
    use mtar_storage::BlobId;

    #[test]
    fn test_classification() {
        let unsafe_name: ResolveError = FormatError::UnsafeEntryName {
            entry: "../x".to_string(),
            reason: UnsafePathReason::NotNormalized,
        }
        .into();
        assert!(unsafe_name.is_content_error());
        assert!(unsafe_name.is_security_violation());
        assert!(!unsafe_name.is_corrupted_stream());

        let truncated: ResolveError = FormatError::TruncatedDeflateStream.for_entry("a").into();
        assert!(truncated.is_content_error());
        assert!(truncated.is_corrupted_stream());
        assert!(!truncated.is_storage_error());

        let missing: ResolveError = StorageError::BlobNotFound(BlobId::new("b")).into();
        assert!(missing.is_storage_error());
        assert!(!missing.is_content_error());

        let read_failure: ResolveError =
            FormatError::Io(std::io::Error::other("connection reset")).into();
        assert!(read_failure.is_storage_error());
        assert!(!read_failure.is_content_error());
    }

    #[test]
    fn test_messages_name_entry_and_limit() {
        let err = ResolveError::SizeLimitExceeded {
            entry: "web/server.jar".to_string(),
            limit: 1000,
        };
        assert_eq!(
            err.to_string(),
            "The size of \"web/server.jar\" exceeds the configured max size limit \"1000\""
        );
        assert!(err.is_content_error());
        assert!(err.is_size_limit());

        let err = ResolveError::InvalidPartSuffix {
            part: "app.part.x".to_string(),
        };
        assert!(err.to_string().contains("app.part.x"));
    }
}
