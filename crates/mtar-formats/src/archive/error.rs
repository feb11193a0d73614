//! Error types for archive container operations

use std::fmt;
use thiserror::Error;

/// Archive operation result type
pub type FormatResult<T> = Result<T, FormatError>;

/// Why an entry name was rejected as unsafe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsafePathReason {
    /// Name is empty
    Empty,
    /// Name starts at a filesystem root or drive
    Absolute,
    /// Name contains `.`, `..` or empty path segments
    NotNormalized,
    /// Name contains a backslash or NUL byte
    ForbiddenCharacter,
}

impl fmt::Display for UnsafePathReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Empty => "should not be empty",
            Self::Absolute => "should not be absolute",
            Self::NotNormalized => {
                "should be normalized (should not contain any \".\", \"..\" or \"//\" path segments)"
            }
            Self::ForbiddenCharacter => "should not contain backslashes or NUL characters",
        };
        f.write_str(text)
    }
}

/// Errors raised while reading or writing archive containers
#[derive(Debug, Error)]
pub enum FormatError {
    /// Unknown record signature where a header was expected
    #[error("Invalid archive record signature 0x{signature:08X} at offset {offset}")]
    InvalidSignature {
        /// Offset of the signature in the logical stream
        offset: u64,
        /// Signature found
        signature: u32,
    },

    /// Stream ended inside a record or before the central directory
    #[error("Archive truncated at offset {offset} while reading {context}")]
    Truncated {
        /// Offset at which the stream ended
        offset: u64,
        /// What was being read
        context: &'static str,
    },

    /// Entry name is not valid UTF-8
    #[error("Archive entry name at offset {offset} is not valid UTF-8")]
    InvalidEntryName {
        /// Offset of the entry's local header
        offset: u64,
    },

    /// Entry name is absolute or escapes the archive root
    #[error("Archive entry name \"{entry}\" {reason}")]
    UnsafeEntryName {
        /// Offending entry name
        entry: String,
        /// Rule the name violates
        reason: UnsafePathReason,
    },

    /// Compression method other than stored or deflated
    #[error("Archive entry \"{entry}\" uses unsupported compression method {method}")]
    UnsupportedCompression {
        /// Entry name
        entry: String,
        /// Raw method identifier
        method: u16,
    },

    /// Entry is encrypted
    #[error("Archive entry \"{entry}\" is encrypted")]
    EncryptedEntry {
        /// Entry name
        entry: String,
    },

    /// Stored entry whose size is only known from a trailing descriptor
    #[error("Stored archive entry \"{entry}\" must declare its size in the local header")]
    StoredEntryWithDataDescriptor {
        /// Entry name
        entry: String,
    },

    /// Declared size disagrees with the bytes actually present
    #[error("Archive entry \"{entry}\" declares {declared} {what} bytes but contains {actual}")]
    SizeMismatch {
        /// Entry name
        entry: String,
        /// Which size disagrees ("compressed" or "uncompressed")
        what: &'static str,
        /// Size declared by the container
        declared: u64,
        /// Size observed while reading
        actual: u64,
    },

    /// Source returned more bytes than the entry's extent
    #[error("Archive entry \"{entry}\" extends past its declared extent of {extent} bytes")]
    ExtentOverrun {
        /// Entry name
        entry: String,
        /// Expected extent length
        extent: u64,
    },

    /// CRC-32 of the entry's content disagrees with the container
    #[error("Archive entry \"{entry}\" checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    CrcMismatch {
        /// Entry name
        entry: String,
        /// CRC declared by the container
        expected: u32,
        /// CRC of the content read
        actual: u32,
    },

    /// Input ended before the deflate stream reported completion
    #[error("Deflate stream ended before completion")]
    TruncatedDeflateStream,

    /// Deflate stream is malformed
    #[error("Deflate stream is corrupt: {0}")]
    Deflate(String),

    /// Inflated output would exceed the configured ceiling
    #[error("Decompressed size exceeds the configured max size limit \"{limit}\"")]
    DecompressedSizeExceeded {
        /// Configured ceiling in bytes
        limit: u64,
    },

    /// Failure attributed to a specific entry
    #[error("Archive entry \"{entry}\": {source}")]
    Entry {
        /// Entry name
        entry: String,
        /// Underlying failure
        #[source]
        source: Box<FormatError>,
    },

    /// Index entries are out of order or overlap
    #[error("Invalid archive index: {reason}")]
    InvalidIndex {
        /// Detailed description of the violation
        reason: String,
    },

    /// Output exceeds what the builder can represent
    #[error("Archive too large: {0}")]
    ArchiveTooLarge(String),

    /// Builder call made out of order
    #[error("Archive builder has {0}")]
    BuilderState(&'static str),

    /// Binary read/write error
    #[error("Binary format error: {0}")]
    BinRw(#[from] binrw::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FormatError {
    /// Attach an entry name to an error that does not carry one
    pub fn for_entry(self, entry: &str) -> Self {
        match self {
            Self::TruncatedDeflateStream
            | Self::Deflate(_)
            | Self::DecompressedSizeExceeded { .. }
            | Self::Io(_)
            | Self::BinRw(_) => Self::Entry {
                entry: entry.to_string(),
                source: Box::new(self),
            },
            other => other,
        }
    }

    /// Innermost error, looking through entry attribution
    pub fn root(&self) -> &Self {
        match self {
            Self::Entry { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if the archive tried to place files outside its root
    pub fn is_security_violation(&self) -> bool {
        matches!(self.root(), Self::UnsafeEntryName { .. })
    }

    /// Check if this looks like corruption of the bytes in transit
    ///
    /// These are a subtype of content errors that may indicate transport
    /// corruption rather than an invalid package.
    pub fn is_corrupted_stream(&self) -> bool {
        matches!(
            self.root(),
            Self::TruncatedDeflateStream
                | Self::Deflate(_)
                | Self::SizeMismatch { .. }
                | Self::ExtentOverrun { .. }
                | Self::CrcMismatch { .. }
                | Self::Truncated { .. }
        )
    }

    /// Check if the decompressed size ceiling was hit
    pub fn is_size_limit(&self) -> bool {
        matches!(self.root(), Self::DecompressedSizeExceeded { .. })
    }
}
