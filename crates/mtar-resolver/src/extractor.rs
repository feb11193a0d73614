//! Budgeted streaming of entry content
//!
//! Every byte handed to a sink has passed through the operation's
//! [`ArchiveResolutionContext`]: the budget is checked first, then the
//! counter and the digest are updated, then the sink sees the chunk. A
//! failed check stops the stream before the offending chunk is delivered.
//!
//! Entries are reached in one of two ways:
//!
//! - **Range reads** for sources stored as one blob: one range fetch per
//!   entry, bounded to the entry's extent
//! - **Sequential reads** for multi-part sources: one pass over the logical
//!   stream, skipping the bytes between extents

use crate::context::ArchiveResolutionContext;
use crate::error::{ResolveError, ResolveResult};
use crate::source::ArchiveSource;
use mtar_formats::{
    ArchiveEntryDescriptor, ArchiveIndex, BoundedInflater, CompressionMethod, EntryMatch,
    ExtentReader, FormatError, PositionedReader,
};
use mtar_storage::BlobStore;
use std::collections::HashSet;
use std::io::{BufRead, BufReader};
use tracing::debug;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Receiver of decoded entry content
///
/// Chunks of one entry arrive in order between
/// [`begin_entry`](Self::begin_entry) and [`end_entry`](Self::end_entry).
/// Any closure taking `(&ArchiveEntryDescriptor, &[u8])` is a sink.
pub trait EntrySink {
    /// Called before the first chunk of an entry
    fn begin_entry(&mut self, _entry: &ArchiveEntryDescriptor) -> ResolveResult<()> {
        Ok(())
    }

    /// Receive the next chunk of `entry`'s content
    fn write_chunk(&mut self, entry: &ArchiveEntryDescriptor, chunk: &[u8]) -> ResolveResult<()>;

    /// Called after the last chunk of an entry
    fn end_entry(&mut self, _entry: &ArchiveEntryDescriptor) -> ResolveResult<()> {
        Ok(())
    }
}

impl<F> EntrySink for F
where
    F: FnMut(&ArchiveEntryDescriptor, &[u8]) -> ResolveResult<()>,
{
    fn write_chunk(&mut self, entry: &ArchiveEntryDescriptor, chunk: &[u8]) -> ResolveResult<()> {
        self(entry, chunk)
    }
}

/// Streams entry content out of an indexed archive
pub struct EntryExtractor<'a, S: BlobStore + ?Sized> {
    store: &'a S,
    source: &'a ArchiveSource,
    index: &'a ArchiveIndex,
}

impl<'a, S: BlobStore + ?Sized> EntryExtractor<'a, S> {
    /// Create an extractor over an archive and its index
    pub fn new(store: &'a S, source: &'a ArchiveSource, index: &'a ArchiveIndex) -> Self {
        Self {
            store,
            source,
            index,
        }
    }

    /// Archive being read
    pub fn source(&self) -> &'a ArchiveSource {
        self.source
    }

    /// Index of the archive being read
    pub fn index(&self) -> &'a ArchiveIndex {
        self.index
    }

    /// Stream the content of one file entry into `sink`
    ///
    /// Returns the number of content bytes delivered.
    ///
    /// # Errors
    ///
    /// - [`ResolveError::EntryNotFound`] if nothing matches `name`
    /// - [`ResolveError::DirectoryRequiresDirectoryExtraction`] if `name`
    ///   is a directory
    /// - [`ResolveError::SizeLimitExceeded`] if the content would exceed the
    ///   context's budget
    pub fn stream_entry<F>(
        &self,
        ctx: &mut ArchiveResolutionContext,
        name: &str,
        mut sink: F,
    ) -> ResolveResult<u64>
    where
        F: FnMut(&[u8]) -> ResolveResult<()>,
    {
        match self.index.resolve(name) {
            None => Err(ResolveError::EntryNotFound {
                name: name.to_string(),
            }),
            Some(EntryMatch::Directory { .. }) => {
                Err(ResolveError::DirectoryRequiresDirectoryExtraction {
                    name: name.to_string(),
                })
            }
            Some(EntryMatch::File(entry)) => self.stream_descriptors(
                ctx,
                &[entry],
                &mut |_: &ArchiveEntryDescriptor, chunk: &[u8]| sink(chunk),
            ),
        }
    }

    /// Stream every file matched by `prefix` into `sink`
    ///
    /// A directory prefix covers every file below it in stream order;
    /// directory records themselves carry no content and are skipped. A
    /// name that matches one file streams just that file.
    pub fn stream_files<K>(
        &self,
        ctx: &mut ArchiveResolutionContext,
        prefix: &str,
        sink: &mut K,
    ) -> ResolveResult<u64>
    where
        K: EntrySink + ?Sized,
    {
        let matched = self
            .index
            .resolve(prefix)
            .ok_or_else(|| ResolveError::EntryNotFound {
                name: prefix.to_string(),
            })?;
        self.stream_descriptors(ctx, &matched.files(), sink)
    }

    /// Stream the given entries into `sink`
    ///
    /// Entries must come from this extractor's index. An entry listed more
    /// than once is streamed once, at its first position in `entries`.
    pub fn stream_descriptors<K>(
        &self,
        ctx: &mut ArchiveResolutionContext,
        entries: &[&ArchiveEntryDescriptor],
        sink: &mut K,
    ) -> ResolveResult<u64>
    where
        K: EntrySink + ?Sized,
    {
        let mut seen = HashSet::new();
        let mut files: Vec<&ArchiveEntryDescriptor> = entries
            .iter()
            .copied()
            .filter(|entry| !entry.is_directory && seen.insert(entry.start_offset))
            .collect();
        if files.is_empty() {
            return Ok(0);
        }

        let result = if self.source.is_range_addressable() {
            self.stream_by_range(ctx, &files, sink)
        } else {
            files.sort_by_key(|entry| entry.start_offset);
            self.stream_sequential(ctx, &files, sink)
        };
        result.inspect_err(|e| e.log(self.source.name()))
    }

    /// Read one file entry into memory
    pub fn extract_bytes(
        &self,
        ctx: &mut ArchiveResolutionContext,
        name: &str,
    ) -> ResolveResult<Vec<u8>> {
        let mut content = Vec::new();
        self.stream_entry(ctx, name, |chunk| {
            content.extend_from_slice(chunk);
            Ok(())
        })?;
        Ok(content)
    }

    /// Read one file entry and parse it as JSON
    pub fn extract_json(
        &self,
        ctx: &mut ArchiveResolutionContext,
        name: &str,
    ) -> ResolveResult<serde_json::Value> {
        let content = self.extract_bytes(ctx, name)?;
        serde_json::from_slice(&content).map_err(|source| ResolveError::InvalidJson {
            entry: name.to_string(),
            source,
        })
    }

    fn stream_by_range<K>(
        &self,
        ctx: &mut ArchiveResolutionContext,
        files: &[&ArchiveEntryDescriptor],
        sink: &mut K,
    ) -> ResolveResult<u64>
    where
        K: EntrySink + ?Sized,
    {
        let mut total = 0u64;
        for entry in files {
            debug!(
                "Fetching {} [{}, {}) from {}",
                entry.name,
                entry.start_offset,
                entry.end_offset,
                self.source.name()
            );
            let stream = self
                .source
                .open_range(self.store, entry.start_offset, entry.end_offset)?;
            let buffered = BufReader::with_capacity(READ_BUFFER_SIZE, stream);
            let payload = ExtentReader::new(buffered, &entry.name, entry.extent_len()).strict();
            total += decode_entry(ctx, entry, payload, sink)?;
        }
        Ok(total)
    }

    fn stream_sequential<K>(
        &self,
        ctx: &mut ArchiveResolutionContext,
        files: &[&ArchiveEntryDescriptor],
        sink: &mut K,
    ) -> ResolveResult<u64>
    where
        K: EntrySink + ?Sized,
    {
        debug!(
            "Reading {} entries sequentially from {}",
            files.len(),
            self.source.name()
        );
        let stream = self.source.open_sequential(self.store)?;
        let mut reader = PositionedReader::with_capacity(READ_BUFFER_SIZE, stream);

        let mut total = 0u64;
        for entry in files {
            let gap = entry
                .start_offset
                .checked_sub(reader.position())
                .ok_or_else(|| FormatError::InvalidIndex {
                    reason: format!(
                        "entry \"{}\" starts at {} before the current position {}",
                        entry.name,
                        entry.start_offset,
                        reader.position()
                    ),
                })?;
            reader.skip(gap, "gap between entries")?;
            let payload = ExtentReader::new(&mut reader, &entry.name, entry.extent_len());
            total += decode_entry(ctx, entry, payload, sink)?;
        }
        Ok(total)
    }
}

/// Decode one entry's payload through the budget into the sink
fn decode_entry<R, K>(
    ctx: &mut ArchiveResolutionContext,
    entry: &ArchiveEntryDescriptor,
    mut payload: ExtentReader<R>,
    sink: &mut K,
) -> ResolveResult<u64>
where
    R: BufRead,
    K: EntrySink + ?Sized,
{
    sink.begin_entry(entry)?;

    let produced = match entry.compression_method {
        CompressionMethod::Stored => {
            let mut produced = 0u64;
            loop {
                let chunk = payload
                    .fill_buf()
                    .map_err(|e| FormatError::from(e).for_entry(&entry.name))?;
                if chunk.is_empty() {
                    break;
                }
                ctx.account(&entry.name, chunk)?;
                sink.write_chunk(entry, chunk)?;
                let len = chunk.len();
                payload.consume(len);
                produced += len as u64;
            }
            produced
        }
        CompressionMethod::Deflated => {
            let mut inflater = BoundedInflater::new(Some(ctx.remaining()));
            let inflated = inflater.inflate(&mut payload, |chunk: &[u8]| -> ResolveResult<()> {
                ctx.account(&entry.name, chunk)?;
                sink.write_chunk(entry, chunk)
            });
            inflated.map_err(|e| match e {
                ResolveError::Format(e) if e.is_size_limit() => ResolveError::SizeLimitExceeded {
                    entry: entry.name.clone(),
                    limit: ctx.max_allowed_bytes(),
                },
                ResolveError::Format(e) => ResolveError::Format(e.for_entry(&entry.name)),
                other => other,
            })?
        }
    };

    payload.finish()?;
    sink.end_entry(entry)?;
    Ok(produced)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::parts::{ArchivePart, PartsSequencer};
    use mtar_formats::{ArchiveBuilder, DosDateTime};
    use mtar_storage::{BlobId, MemoryBlobStore};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::io::Write;

    /// Archive with a stored and a deflated entry, written by the zip crate
    fn fixture() -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let stored = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        let deflated = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        writer.add_directory("web/", stored).unwrap();
        writer.start_file("web/index.html", stored).unwrap();
        writer.write_all(b"<html>hello</html>").unwrap();
        writer.start_file("web/app.js", deflated).unwrap();
        writer.write_all(&b"console.log(1);\n".repeat(200)).unwrap();
        writer.start_file("params.json", deflated).unwrap();
        writer.write_all(br#"{"memory":"512M"}"#).unwrap();
        writer.finish().unwrap().into_inner()
    }

    fn single(content: Vec<u8>) -> (MemoryBlobStore, ArchiveSource) {
        let store = MemoryBlobStore::new();
        store.insert(BlobId::new("pkg"), content);
        (store, ArchiveSource::single("pkg.mtar", "pkg"))
    }

    fn multi(content: &[u8], part_size: usize) -> (MemoryBlobStore, ArchiveSource) {
        let store = MemoryBlobStore::new();
        let parts = content
            .chunks(part_size)
            .enumerate()
            .map(|(i, chunk)| {
                let id = BlobId::new(format!("part-{i}"));
                store.insert(id.clone(), chunk.to_vec());
                ArchivePart::new(format!("pkg.mtar.part.{i}"), id)
            })
            .collect();
        let source = ArchiveSource::from_parts(&PartsSequencer::default(), parts).unwrap();
        (store, source)
    }

    fn ctx(limit: u64) -> ArchiveResolutionContext {
        ArchiveResolutionContext::new("", limit).unwrap()
    }

    #[test]
    fn test_extract_stored_and_deflated() {
        let (store, source) = single(fixture());
        let index = source.index(&store).unwrap();
        let extractor = EntryExtractor::new(&store, &source, &index);

        let mut ctx = ctx(1 << 20);
        assert_eq!(
            extractor.extract_bytes(&mut ctx, "web/index.html").unwrap(),
            b"<html>hello</html>"
        );
        let js = extractor.extract_bytes(&mut ctx, "web/app.js").unwrap();
        assert_eq!(js, b"console.log(1);\n".repeat(200));
        assert_eq!(ctx.bytes_consumed(), 18 + 3200);
    }

    #[test]
    fn test_not_found_and_directory() {
        let (store, source) = single(fixture());
        let index = source.index(&store).unwrap();
        let extractor = EntryExtractor::new(&store, &source, &index);
        let mut ctx = ctx(1 << 20);

        let err = extractor.extract_bytes(&mut ctx, "api/").unwrap_err();
        assert!(matches!(err, ResolveError::EntryNotFound { ref name } if name == "api/"));

        let err = extractor.extract_bytes(&mut ctx, "web/").unwrap_err();
        assert!(matches!(
            err,
            ResolveError::DirectoryRequiresDirectoryExtraction { .. }
        ));
        assert_eq!(ctx.bytes_consumed(), 0);
    }

    #[test]
    fn test_stream_files_reports_entries_in_order() {
        let (store, source) = multi(&fixture(), 100);
        let index = source.index(&store).unwrap();
        let extractor = EntryExtractor::new(&store, &source, &index);

        let mut seen: Vec<(String, usize)> = Vec::new();
        let mut ctx = ctx(1 << 20);
        let total = extractor
            .stream_files(
                &mut ctx,
                "web",
                &mut |entry: &ArchiveEntryDescriptor, chunk: &[u8]| -> ResolveResult<()> {
                    match seen.last_mut() {
                        Some((name, len)) if *name == entry.name => *len += chunk.len(),
                        _ => seen.push((entry.name.clone(), chunk.len())),
                    }
                    Ok(())
                },
            )
            .unwrap();
        assert_eq!(total, 3218);
        assert_eq!(
            seen,
            vec![
                ("web/index.html".to_string(), 18),
                ("web/app.js".to_string(), 3200)
            ]
        );
    }

    #[test]
    fn test_repeated_descriptor_streamed_once() {
        let content = fixture();
        for (store, source) in [single(content.clone()), multi(&content, 100)] {
            let index = source.index(&store).unwrap();
            let extractor = EntryExtractor::new(&store, &source, &index);
            let app = index.find_entry("web/app.js").unwrap();
            let page = index.find_entry("web/index.html").unwrap();

            let mut names: Vec<String> = Vec::new();
            let mut ctx = ctx(1 << 20);
            let total = extractor
                .stream_descriptors(
                    &mut ctx,
                    &[app, page, app],
                    &mut |entry: &ArchiveEntryDescriptor, _chunk: &[u8]| -> ResolveResult<()> {
                        if names.last() != Some(&entry.name) {
                            names.push(entry.name.clone());
                        }
                        Ok(())
                    },
                )
                .unwrap();
            assert_eq!(total, 3218);
            assert_eq!(ctx.bytes_consumed(), 3218);
            names.sort();
            assert_eq!(names, vec!["web/app.js", "web/index.html"]);
        }
    }

    #[test]
    fn test_budget_stops_before_sink() {
        let (store, source) = single(fixture());
        let index = source.index(&store).unwrap();
        let extractor = EntryExtractor::new(&store, &source, &index);

        let mut delivered = 0usize;
        let mut ctx = ctx(100);
        let err = extractor
            .stream_entry(&mut ctx, "web/app.js", |chunk| {
                delivered += chunk.len();
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::SizeLimitExceeded { ref entry, limit: 100 } if entry == "web/app.js"
        ));
        assert!(delivered <= 100);
        assert!(ctx.bytes_consumed() <= 100);
    }

    #[test]
    fn test_extract_json() {
        let (store, source) = single(fixture());
        let index = source.index(&store).unwrap();
        let extractor = EntryExtractor::new(&store, &source, &index);

        let value = extractor.extract_json(&mut ctx(1024), "params.json").unwrap();
        assert_eq!(value["memory"], "512M");

        let err = extractor
            .extract_json(&mut ctx(1 << 20), "web/index.html")
            .unwrap_err();
        assert!(matches!(err, ResolveError::InvalidJson { ref entry, .. } if entry == "web/index.html"));
    }

    #[test]
    fn test_truncated_blob_is_corrupted_stream() {
        let mut builder = ArchiveBuilder::new(Vec::new(), DosDateTime::EPOCH);
        builder.add_entry("a.txt", &[7u8; 5000]).unwrap();
        let archive = builder.finish().unwrap();

        let (store, source) = single(archive.clone());
        let index = source.index(&store).unwrap();
        let entry = index.find_entry("a.txt").unwrap().clone();

        // Same index, but the stored blob lost the tail of the payload
        store.insert(
            BlobId::new("pkg"),
            archive[..entry.end_offset as usize - 3].to_vec(),
        );
        let extractor = EntryExtractor::new(&store, &source, &index);
        let err = extractor.extract_bytes(&mut ctx(1 << 20), "a.txt").unwrap_err();
        assert!(err.is_storage_error() || err.is_corrupted_stream(), "{err}");
    }

    #[test]
    fn test_sequential_truncation_is_corrupted_stream() {
        let mut builder = ArchiveBuilder::new(Vec::new(), DosDateTime::EPOCH);
        builder.add_entry("a.txt", &[7u8; 5000]).unwrap();
        let archive = builder.finish().unwrap();

        let (store, source) = multi(&archive, archive.len() / 2 + 1);
        let index = source.index(&store).unwrap();
        let entry = index.find_entry("a.txt").unwrap().clone();

        // The parts now end two bytes into the deflate stream
        store.insert(
            BlobId::new("part-0"),
            archive[..entry.start_offset as usize + 2].to_vec(),
        );
        store.insert(BlobId::new("part-1"), Vec::new());
        let extractor = EntryExtractor::new(&store, &source, &index);
        let err = extractor.extract_bytes(&mut ctx(1 << 20), "a.txt").unwrap_err();
        assert!(err.is_corrupted_stream(), "{err}");
        assert!(err.is_content_error());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn test_chunking_invariance(part_size in 1usize..400, limit_slack in 0u64..64) {
            let archive = fixture();
            let (store, single_source) = single(archive.clone());
            let single_index = single_source.index(&store).unwrap();
            let expected = EntryExtractor::new(&store, &single_source, &single_index)
                .extract_bytes(&mut ctx(1 << 20), "web/app.js")
                .unwrap();

            let (parts_store, parts_source) = multi(&archive, part_size);
            let parts_index = parts_source.index(&parts_store).unwrap();
            prop_assert_eq!(&parts_index, &single_index);

            let mut budget = ctx(expected.len() as u64 + limit_slack);
            let actual = EntryExtractor::new(&parts_store, &parts_source, &parts_index)
                .extract_bytes(&mut budget, "web/app.js")
                .unwrap();
            prop_assert_eq!(actual, expected);
        }
    }
}
