//! Archive content resolution for multi-target application deployment.
//!
//! An application archive is a ZIP-family file holding the content of every
//! module of an application plus its deployment descriptor. Archives can be
//! far larger than memory and may have been uploaded as several numbered
//! parts, so everything here works on forward-only streams from a
//! [`BlobStore`](mtar_storage::BlobStore).
//!
//! - **[`PartsSequencer`]**: orders uploaded parts by numeric suffix
//! - **[`ArchiveSource`]**: one blob or a sequence of parts, read as one
//!   logical stream
//! - **[`ArchiveResolutionContext`]**: per-operation byte budget, digest and
//!   resume state
//! - **[`EntryExtractor`]**: budgeted streaming of entry content
//! - **[`ArchiveRepackager`]**: per-module output, plain bytes or a new
//!   archive
//! - **[`calculate_module_digest`]**: content digest of a module
//!
//! # Example
//!
//! ```rust
//! use mtar_formats::{ArchiveBuilder, DosDateTime};
//! use mtar_resolver::{ArchiveSource, EntryExtractor, ResolverConfig, SizeLimit};
//! use mtar_storage::{BlobId, MemoryBlobStore};
//!
//! let mut builder = ArchiveBuilder::new(Vec::new(), DosDateTime::EPOCH);
//! builder.add_entry("web/index.html", b"<html/>")?;
//! let store = MemoryBlobStore::new();
//! store.insert(BlobId::new("app.mtar"), builder.finish()?);
//!
//! let source = ArchiveSource::single("app.mtar", "app.mtar");
//! let index = source.index(&store)?;
//! let extractor = EntryExtractor::new(&store, &source, &index);
//!
//! let config = ResolverConfig::default();
//! let mut ctx = config.context("web/", SizeLimit::Archive)?;
//! assert_eq!(extractor.extract_bytes(&mut ctx, "web/index.html")?, b"<html/>");
//! assert_eq!(ctx.bytes_consumed(), 7);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Error Handling
//!
//! Every failure is a [`ResolveError`]. Content errors
//! ([`ResolveError::is_content_error`]) are terminal for the pipeline step;
//! storage errors ([`ResolveError::is_storage_error`]) are left to the caller
//! to retry.

#![warn(missing_docs)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod context;
pub mod digest;
pub mod elements;
pub mod error;
pub mod extractor;
pub mod parts;
pub mod repackage;
pub mod source;

pub use config::{ConfigError, ResolverConfig, SizeLimit};
pub use context::ArchiveResolutionContext;
pub use digest::calculate_module_digest;
pub use elements::{
    DEPLOYMENT_DESCRIPTOR_ENTRY, MANIFEST_ENTRY, extract_deployment_descriptor,
    extract_external_contents, extract_manifest, extract_resource_parameters,
};
pub use error::{ResolveError, ResolveResult};
pub use extractor::{EntryExtractor, EntrySink};
pub use parts::{ArchivePart, PartsReader, PartsSequencer, SequencedArchive};
pub use repackage::{ArchiveRepackager, RepackagedKind, RepackagedModule, files_remaining};
pub use source::{ArchiveSource, MultiPartBlobSource, SingleBlobSource};

pub use mtar_crypto::DigestAlgorithm;
pub use mtar_formats::{ArchiveEntryDescriptor, ArchiveIndex, CompressionMethod, EntryMatch};
pub use mtar_storage::{BlobId, BlobStore};

/// Version information for the resolver crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
