//! Streaming ZIP container parsing and building for multi-target application archives
//!
#![allow(clippy::cast_possible_truncation)] // Intentional for binary format parsing
#![allow(clippy::cast_lossless)] // Sometimes clearer than From
#![allow(clippy::doc_markdown)] // Format terms don't need backticks
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
#![allow(clippy::similar_names)] // Domain-specific naming patterns
#![allow(clippy::return_self_not_must_use)] // Builder patterns
#![allow(clippy::use_self)] // Type clarity
//! Deployable application packages are ZIP-family archives that may be larger
//! than available memory and are read from a remote blob store rather than a
//! local file. This crate provides the pieces needed to work with them
//! strictly as forward-only byte streams:
//!
//! - **Record codecs**: local file headers, data descriptors and central
//!   directory records (binrw)
//! - **Path safety**: rejection of absolute and traversing entry names
//! - **Bounded inflation**: raw deflate with a hard output ceiling
//! - **Indexing**: one pass over an archive producing byte-exact entry extents
//! - **Building**: a minimal streaming archive writer with deterministic
//!   timestamps
//!
//! # Design Principles
//!
//! - **Never seek**: every reader is a plain `Read`/`BufRead`
//! - **Bounded memory**: peak memory is one read buffer, independent of
//!   archive size
//! - **Fail closed**: unsafe names, size disagreements and truncated streams
//!   are errors, never silently tolerated

#![warn(missing_docs)]

/// ZIP container support: headers, indexing, inflation and building
///
/// See the [`archive`] module for the index data model and usage examples.
pub mod archive;

pub use archive::{
    ArchiveBuilder, ArchiveEntryDescriptor, ArchiveIndex, ArchiveIndexer, BoundedInflater,
    CompressionMethod, DosDateTime, EntryMatch, ExtentReader, FormatError, FormatResult,
    PositionedReader, UnsafePathReason, validate_entry_name,
};
