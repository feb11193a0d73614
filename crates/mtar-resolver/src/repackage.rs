//! Standalone module archives built from a slice of an application archive
//!
//! A module path names either one file or a directory. A file is delivered
//! as its plain bytes. A directory becomes a new archive holding every file
//! below it, with names made relative to the directory:
//!
//! ```text
//! web/index.html      ->  index.html
//! web/static/app.js   ->  static/app.js
//! ```
//!
//! Output always goes to a temporary file that is deleted if anything fails,
//! so a partial module never escapes.

use crate::context::ArchiveResolutionContext;
use crate::error::{ResolveError, ResolveResult};
use crate::extractor::{EntryExtractor, EntrySink};
use crate::source::ArchiveSource;
use chrono::{DateTime, Datelike, Timelike, Utc};
use mtar_formats::{ArchiveBuilder, ArchiveEntryDescriptor, ArchiveIndex, DosDateTime, EntryMatch};
use mtar_storage::{BlobId, BlobStore};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Shape of a repackaged module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepackagedKind {
    /// Plain content of a single file
    File,
    /// Archive of the files below a directory
    Archive,
}

/// Repackaged module content held in a temporary file
#[derive(Debug)]
pub struct RepackagedModule {
    kind: RepackagedKind,
    file: NamedTempFile,
    size: u64,
    entries: Vec<String>,
}

impl RepackagedModule {
    /// Whether the output is plain content or an archive
    pub const fn kind(&self) -> RepackagedKind {
        self.kind
    }

    /// Size of the output in bytes
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Source entries included, by their full name in the original archive
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Location of the temporary file
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Open the output for reading from the start
    pub fn open(&self) -> ResolveResult<File> {
        Ok(self.file.reopen()?)
    }

    /// Read the whole output into memory
    pub fn read_to_vec(&self) -> ResolveResult<Vec<u8>> {
        let mut content = Vec::new();
        self.open()?.read_to_end(&mut content)?;
        Ok(content)
    }

    /// Hand the output to the blob store; the temporary file is removed
    pub fn stage<S: BlobStore + ?Sized>(self, store: &S, name: &str) -> ResolveResult<BlobId> {
        let mut content = self.open()?;
        let id = store.store_blob(name, &mut content)?;
        info!(
            "Staged repackaged module {} ({} bytes, {} entries)",
            id,
            self.size,
            self.entries.len()
        );
        Ok(id)
    }
}

/// Builds module output from an indexed archive
///
/// Every archive produced by one repackager carries the same timestamp, so
/// repackaging the same input twice yields identical bytes.
pub struct ArchiveRepackager<'a, S: BlobStore + ?Sized> {
    store: &'a S,
    timestamp: DosDateTime,
}

impl<'a, S: BlobStore + ?Sized> ArchiveRepackager<'a, S> {
    /// Create a repackager stamping entries with the current UTC time
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            timestamp: dos_timestamp(&Utc::now()),
        }
    }

    /// Use a fixed timestamp instead of the creation time
    pub fn with_timestamp(mut self, timestamp: DosDateTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Timestamp recorded on every entry
    pub const fn timestamp(&self) -> DosDateTime {
        self.timestamp
    }

    /// Repackage the module at the context's prefix
    ///
    /// Entries the context lists as already delivered are left out of
    /// directory output. Content counts against the context's budget.
    ///
    /// # Errors
    ///
    /// - [`ResolveError::EntryNotFound`] if the prefix matches nothing
    /// - [`ResolveError::SizeLimitExceeded`] if the content exceeds the budget
    pub fn repackage(
        &self,
        ctx: &mut ArchiveResolutionContext,
        source: &ArchiveSource,
        index: &ArchiveIndex,
    ) -> ResolveResult<RepackagedModule> {
        let extractor = EntryExtractor::new(self.store, source, index);
        let module = ctx.prefix().to_string();

        let repackaged = match index.resolve(&module) {
            None => return Err(ResolveError::EntryNotFound { name: module }),
            Some(EntryMatch::File(entry)) => self.copy_file(ctx, &extractor, entry)?,
            Some(EntryMatch::Directory { prefix, files }) => {
                let pending: Vec<&ArchiveEntryDescriptor> = files
                    .into_iter()
                    .filter(|entry| !ctx.is_delivered(&entry.name))
                    .collect();
                self.pack_directory(ctx, &extractor, &prefix, &pending)?
            }
        };

        info!(
            "Repackaged module {} of {}: {} entries, {} bytes",
            module,
            source.name(),
            repackaged.entries.len(),
            repackaged.size
        );
        Ok(repackaged)
    }

    fn copy_file(
        &self,
        ctx: &mut ArchiveResolutionContext,
        extractor: &EntryExtractor<'_, S>,
        entry: &ArchiveEntryDescriptor,
    ) -> ResolveResult<RepackagedModule> {
        let mut file = NamedTempFile::new()?;
        let size = {
            let mut writer = BufWriter::new(file.as_file_mut());
            let size = extractor.stream_entry(ctx, &entry.name, |chunk| {
                writer.write_all(chunk)?;
                Ok(())
            })?;
            writer.flush()?;
            size
        };
        Ok(RepackagedModule {
            kind: RepackagedKind::File,
            file,
            size,
            entries: vec![entry.name.clone()],
        })
    }

    fn pack_directory(
        &self,
        ctx: &mut ArchiveResolutionContext,
        extractor: &EntryExtractor<'_, S>,
        prefix: &str,
        files: &[&ArchiveEntryDescriptor],
    ) -> ResolveResult<RepackagedModule> {
        debug!("Packing {} entries under {}", files.len(), prefix);
        let mut packer = Packer {
            builder: ArchiveBuilder::new(BufWriter::new(NamedTempFile::new()?), self.timestamp),
            prefix,
            entries: Vec::with_capacity(files.len()),
        };
        extractor.stream_descriptors(ctx, files, &mut packer)?;

        let Packer {
            builder, entries, ..
        } = packer;
        let file = builder
            .finish()?
            .into_inner()
            .map_err(|e| ResolveError::Io(e.into_error()))?;
        let size = file.as_file().metadata()?.len();
        Ok(RepackagedModule {
            kind: RepackagedKind::Archive,
            file,
            size,
            entries,
        })
    }
}

/// Entry sink writing each file into a new archive under its relative name
struct Packer<'p, W: Write> {
    builder: ArchiveBuilder<W>,
    prefix: &'p str,
    entries: Vec<String>,
}

impl<W: Write> EntrySink for Packer<'_, W> {
    fn begin_entry(&mut self, entry: &ArchiveEntryDescriptor) -> ResolveResult<()> {
        let name = entry.relative_name(self.prefix).unwrap_or(&entry.name);
        self.builder.begin_entry(name)?;
        self.entries.push(entry.name.clone());
        Ok(())
    }

    fn write_chunk(&mut self, _entry: &ArchiveEntryDescriptor, chunk: &[u8]) -> ResolveResult<()> {
        Ok(self.builder.write_data(chunk)?)
    }

    fn end_entry(&mut self, _entry: &ArchiveEntryDescriptor) -> ResolveResult<()> {
        Ok(self.builder.end_entry()?)
    }
}

/// Files of the context's module that have not been delivered yet
pub fn files_remaining(
    ctx: &ArchiveResolutionContext,
    index: &ArchiveIndex,
) -> ResolveResult<Vec<String>> {
    let matched = index
        .resolve(ctx.prefix())
        .ok_or_else(|| ResolveError::EntryNotFound {
            name: ctx.prefix().to_string(),
        })?;
    Ok(matched
        .files()
        .into_iter()
        .filter(|entry| !ctx.is_delivered(&entry.name))
        .map(|entry| entry.name.clone())
        .collect())
}

fn dos_timestamp(now: &DateTime<Utc>) -> DosDateTime {
    DosDateTime::new(
        u16::try_from(now.year()).unwrap_or(0),
        now.month() as u8,
        now.day() as u8,
        now.hour() as u8,
        now.minute() as u8,
        now.second() as u8,
    )
}
