//! Minimal streaming ZIP writer
//!
//! Every entry is deflated and written in streaming form: the local header
//! carries zero sizes, flag bit 3 is set, and a signed data descriptor follows
//! the payload. The writer therefore never seeks and can target a pipe or a
//! temporary file.
//!
//! ```text
//! [local header][name][deflate stream][descriptor] ... [central directory][end record]
//! ```
//!
//! All entries carry the one timestamp given at construction, so building
//! the same entries twice yields identical bytes.
//!
//! Sizes and offsets that do not fit in 32 bits switch the affected records
//! to their ZIP64 forms: a 64-bit data descriptor, a ZIP64 extra field in the
//! central directory, and a ZIP64 end record with its locator.

use crate::archive::error::{FormatError, FormatResult};
use crate::archive::header::{
    CENTRAL_DIRECTORY_SIGNATURE, CentralDirectoryHeader, DataDescriptor, DosDateTime,
    END_OF_CENTRAL_DIRECTORY_SIGNATURE, EndOfCentralDirectory, FLAG_DATA_DESCRIPTOR, FLAG_UTF8,
    LOCAL_FILE_HEADER_SIGNATURE, LocalFileHeader, METHOD_DEFLATED, VERSION_DEFLATE,
    VERSION_ZIP64, ZIP64_END_OF_CENTRAL_DIRECTORY_LOCATOR_SIGNATURE,
    ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE, Zip64EndOfCentralDirectory,
    Zip64EndOfCentralDirectoryLocator, zip64_extra_field,
};
use crate::archive::path::validate_entry_name;
use flate2::{Compress, Compression, Crc, FlushCompress, Status};
use std::io::Write;

const ENTRY_FLAGS: u16 = FLAG_DATA_DESCRIPTOR | FLAG_UTF8;
const SCRATCH_SIZE: usize = 32 * 1024;

/// Central directory data for one written entry
#[derive(Debug, Clone)]
struct WrittenEntry {
    name: String,
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
    local_header_offset: u64,
}

/// Entry whose payload is being written
struct OpenEntry {
    name: String,
    header_offset: u64,
    data_start: u64,
    compress: Compress,
    crc: Crc,
    uncompressed_size: u64,
}

/// Builder for deflate-only ZIP archives
///
/// Entries are written either in one call with
/// [`add_entry`](Self::add_entry) or incrementally with
/// [`begin_entry`](Self::begin_entry), [`write_data`](Self::write_data) and
/// [`end_entry`](Self::end_entry), which lets callers stream content of any
/// size without holding it in memory.
pub struct ArchiveBuilder<W: Write> {
    writer: W,
    position: u64,
    timestamp: DosDateTime,
    entries: Vec<WrittenEntry>,
    open: Option<OpenEntry>,
    scratch: Vec<u8>,
}

impl<W: Write> ArchiveBuilder<W> {
    /// Create a builder stamping every entry with `timestamp`
    ///
    /// # Arguments
    /// * `writer` - Destination for the archive bytes
    /// * `timestamp` - Modification time recorded on every entry
    pub fn new(writer: W, timestamp: DosDateTime) -> Self {
        Self {
            writer,
            position: 0,
            timestamp,
            entries: Vec::new(),
            open: None,
            scratch: vec![0u8; SCRATCH_SIZE],
        }
    }

    /// Number of entries completed so far
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Bytes written so far
    pub const fn position(&self) -> u64 {
        self.position
    }

    /// Write a complete entry
    pub fn add_entry(&mut self, name: &str, data: &[u8]) -> FormatResult<()> {
        self.begin_entry(name)?;
        self.write_data(data)?;
        self.end_entry()
    }

    /// Start a new entry and write its local header
    pub fn begin_entry(&mut self, name: &str) -> FormatResult<()> {
        if self.open.is_some() {
            return Err(FormatError::BuilderState("an entry already open"));
        }
        validate_entry_name(name)?;
        let header_offset = self.position;
        let file_name_length = u16::try_from(name.len()).map_err(|_| {
            FormatError::ArchiveTooLarge(format!("entry name of {} bytes", name.len()))
        })?;

        let header = LocalFileHeader {
            version_needed: VERSION_DEFLATE,
            flags: ENTRY_FLAGS,
            compression_method: METHOD_DEFLATED,
            last_mod_time: self.timestamp.time,
            last_mod_date: self.timestamp.date,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            file_name_length,
            extra_field_length: 0,
        };
        self.emit(&LOCAL_FILE_HEADER_SIGNATURE.to_le_bytes())?;
        self.emit(&header.to_bytes()?)?;
        self.emit(name.as_bytes())?;

        self.open = Some(OpenEntry {
            name: name.to_string(),
            header_offset,
            data_start: self.position,
            compress: Compress::new(Compression::default(), false),
            crc: Crc::new(),
            uncompressed_size: 0,
        });
        Ok(())
    }

    /// Append content to the open entry
    pub fn write_data(&mut self, data: &[u8]) -> FormatResult<()> {
        let Some(entry) = self.open.as_mut() else {
            return Err(FormatError::BuilderState("no open entry"));
        };
        entry.crc.update(data);
        entry.uncompressed_size += data.len() as u64;
        self.position += deflate_into(
            &mut entry.compress,
            &mut self.writer,
            &mut self.scratch,
            data,
            FlushCompress::None,
        )?;
        Ok(())
    }

    /// Finish the open entry and write its data descriptor
    pub fn end_entry(&mut self) -> FormatResult<()> {
        let Some(mut entry) = self.open.take() else {
            return Err(FormatError::BuilderState("no open entry"));
        };
        self.position += deflate_into(
            &mut entry.compress,
            &mut self.writer,
            &mut self.scratch,
            &[],
            FlushCompress::Finish,
        )?;

        let descriptor = DataDescriptor {
            crc32: entry.crc.sum(),
            compressed_size: self.position - entry.data_start,
            uncompressed_size: entry.uncompressed_size,
        };
        self.emit(&descriptor.to_bytes())?;

        self.entries.push(WrittenEntry {
            crc32: descriptor.crc32,
            compressed_size: descriptor.compressed_size,
            uncompressed_size: descriptor.uncompressed_size,
            local_header_offset: entry.header_offset,
            name: entry.name,
        });
        Ok(())
    }

    /// Write the central directory and return the underlying writer
    ///
    /// An entry still open is finished first.
    pub fn finish(mut self) -> FormatResult<W> {
        if self.open.is_some() {
            self.end_entry()?;
        }

        let directory_offset = self.position;
        let entries = std::mem::take(&mut self.entries);
        for entry in &entries {
            let (header, extra) = self.central_record(entry);
            self.emit(&CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes())?;
            self.emit(&header.to_bytes()?)?;
            self.emit(entry.name.as_bytes())?;
            self.emit(&extra)?;
        }
        let directory_size = self.position - directory_offset;
        let entry_count = entries.len() as u64;

        if entry_count >= u64::from(u16::MAX)
            || directory_size >= u64::from(u32::MAX)
            || directory_offset >= u64::from(u32::MAX)
        {
            let record_offset = self.position;
            let record = Zip64EndOfCentralDirectory {
                record_size: Zip64EndOfCentralDirectory::RECORD_SIZE,
                version_made_by: VERSION_ZIP64,
                version_needed: VERSION_ZIP64,
                disk_number: 0,
                central_directory_disk: 0,
                entries_on_disk: entry_count,
                total_entries: entry_count,
                central_directory_size: directory_size,
                central_directory_offset: directory_offset,
            };
            self.emit(&ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes())?;
            self.emit(&record.to_bytes()?)?;

            let locator = Zip64EndOfCentralDirectoryLocator {
                end_record_disk: 0,
                end_record_offset: record_offset,
                total_disks: 1,
            };
            self.emit(&ZIP64_END_OF_CENTRAL_DIRECTORY_LOCATOR_SIGNATURE.to_le_bytes())?;
            self.emit(&locator.to_bytes()?)?;
        }

        let count = u16::try_from(entry_count).unwrap_or(u16::MAX);
        let end = EndOfCentralDirectory {
            disk_number: 0,
            central_directory_disk: 0,
            entries_on_disk: count,
            total_entries: count,
            central_directory_size: saturate(directory_size),
            central_directory_offset: saturate(directory_offset),
            comment_length: 0,
        };
        self.emit(&END_OF_CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes())?;
        self.emit(&end.to_bytes()?)?;
        self.writer.flush()?;
        Ok(self.writer)
    }

    /// Central directory header and extra field for a written entry
    fn central_record(&self, entry: &WrittenEntry) -> (CentralDirectoryHeader, Vec<u8>) {
        let mut zip64 = Vec::new();
        let uncompressed_size = zip64_field(entry.uncompressed_size, &mut zip64);
        let compressed_size = zip64_field(entry.compressed_size, &mut zip64);
        let local_header_offset = zip64_field(entry.local_header_offset, &mut zip64);
        let (version, extra) = if zip64.is_empty() {
            (VERSION_DEFLATE, Vec::new())
        } else {
            (VERSION_ZIP64, zip64_extra_field(&zip64))
        };

        let header = CentralDirectoryHeader {
            version_made_by: version,
            version_needed: version,
            flags: ENTRY_FLAGS,
            compression_method: METHOD_DEFLATED,
            last_mod_time: self.timestamp.time,
            last_mod_date: self.timestamp.date,
            crc32: entry.crc32,
            compressed_size,
            uncompressed_size,
            file_name_length: entry.name.len() as u16,
            extra_field_length: extra.len() as u16,
            file_comment_length: 0,
            disk_number_start: 0,
            internal_attributes: 0,
            external_attributes: 0,
            local_header_offset,
        };
        (header, extra)
    }

    fn emit(&mut self, bytes: &[u8]) -> FormatResult<()> {
        self.writer.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }
}

/// Run the compressor over `input` and write everything it produces
fn deflate_into<W: Write>(
    compress: &mut Compress,
    writer: &mut W,
    scratch: &mut [u8],
    mut input: &[u8],
    flush: FlushCompress,
) -> FormatResult<u64> {
    let mut written = 0u64;
    loop {
        let before_in = compress.total_in();
        let before_out = compress.total_out();
        let status = compress
            .compress(input, scratch, flush)
            .map_err(|e| FormatError::Deflate(e.to_string()))?;
        let used = (compress.total_in() - before_in) as usize;
        let produced = (compress.total_out() - before_out) as usize;

        writer.write_all(&scratch[..produced])?;
        written += produced as u64;
        input = &input[used..];

        let done = match flush {
            FlushCompress::Finish => status == Status::StreamEnd,
            _ => input.is_empty() && produced < scratch.len(),
        };
        if done {
            return Ok(written);
        }
        if used == 0 && produced == 0 && status == Status::BufError {
            return Err(FormatError::Deflate("compressor made no progress".to_string()));
        }
    }
}

/// 32-bit record value, moved into the ZIP64 extra field when it does not fit
fn zip64_field(value: u64, zip64: &mut Vec<u64>) -> u32 {
    if value >= u64::from(u32::MAX) {
        zip64.push(value);
        u32::MAX
    } else {
        value as u32
    }
}

fn saturate(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}
