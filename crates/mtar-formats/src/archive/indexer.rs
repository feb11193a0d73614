//! Single forward pass that maps entry extents

use crate::archive::error::{FormatError, FormatResult};
use crate::archive::header::{
    CENTRAL_DIRECTORY_SIGNATURE, DATA_DESCRIPTOR_SIGNATURE, END_OF_CENTRAL_DIRECTORY_SIGNATURE,
    LOCAL_FILE_HEADER_LEN, LOCAL_FILE_HEADER_SIGNATURE, LocalFileHeader,
    ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE, Zip64Sizes,
};
use crate::archive::index::{ArchiveEntryDescriptor, ArchiveIndex, CompressionMethod};
use crate::archive::inflate::BoundedInflater;
use crate::archive::path::validate_entry_name;
use crate::archive::reader::{ExtentReader, PositionedReader};
use flate2::Crc;
use std::io::{BufRead, Read};

/// Builds an [`ArchiveIndex`] from a forward-only byte stream
///
/// Local file headers are decoded in stream order. Every entry name is
/// checked with [`validate_entry_name`] before any of its payload is read.
/// Deflated payloads are inflated into a discarding sink to locate the end of
/// the deflate stream, stored payloads are skipped by their declared size,
/// and in both cases the CRC and sizes are checked against the header or
/// trailing data descriptor. The pass ends at the central directory; the rest
/// of the stream is drained only to learn its total length.
///
/// ```rust
/// use mtar_formats::{ArchiveBuilder, ArchiveIndexer, DosDateTime};
///
/// let mut builder = ArchiveBuilder::new(Vec::new(), DosDateTime::EPOCH);
/// builder.add_entry("web/readme.txt", b"hello world")?;
/// let bytes = builder.finish()?;
///
/// let index = ArchiveIndexer::new().index(bytes.as_slice())?;
/// assert_eq!(index.len(), 1);
/// assert_eq!(index.total_length(), bytes.len() as u64);
/// # Ok::<(), mtar_formats::FormatError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ArchiveIndexer {
    buffer_size: usize,
}

impl Default for ArchiveIndexer {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveIndexer {
    /// Default read buffer size (64 KiB)
    pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

    /// Create an indexer with the default buffer size
    pub const fn new() -> Self {
        Self {
            buffer_size: Self::DEFAULT_BUFFER_SIZE,
        }
    }

    /// Use a different read buffer size
    pub const fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Index the archive in `reader`, consuming it to the end
    pub fn index<R: Read>(&self, reader: R) -> FormatResult<ArchiveIndex> {
        let mut input = PositionedReader::with_capacity(self.buffer_size.max(64), reader);
        let mut entries = Vec::new();

        loop {
            let offset = input.position();
            let Some(signature) = input.read_signature()? else {
                return Err(FormatError::Truncated {
                    offset,
                    context: "central directory",
                });
            };

            match signature {
                LOCAL_FILE_HEADER_SIGNATURE => {
                    entries.push(read_entry(&mut input, offset)?);
                }
                CENTRAL_DIRECTORY_SIGNATURE
                | END_OF_CENTRAL_DIRECTORY_SIGNATURE
                | ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE => {
                    input.drain()?;
                    break;
                }
                _ => return Err(FormatError::InvalidSignature { offset, signature }),
            }
        }

        ArchiveIndex::new(entries, input.position())
    }
}

fn read_entry<R: Read>(
    input: &mut PositionedReader<R>,
    header_offset: u64,
) -> FormatResult<ArchiveEntryDescriptor> {
    let mut fixed = [0u8; LOCAL_FILE_HEADER_LEN];
    input.read_record(&mut fixed, "local file header")?;
    let header = LocalFileHeader::parse(&fixed)?;

    let mut name_bytes = vec![0u8; header.file_name_length as usize];
    input.read_record(&mut name_bytes, "entry name")?;
    let mut extra = vec![0u8; header.extra_field_length as usize];
    input.read_record(&mut extra, "extra field")?;

    let name = String::from_utf8(name_bytes).map_err(|_| FormatError::InvalidEntryName {
        offset: header_offset,
    })?;
    validate_entry_name(&name)?;

    if header.is_encrypted() {
        return Err(FormatError::EncryptedEntry { entry: name });
    }
    let compression_method = CompressionMethod::from_raw(header.compression_method).ok_or_else(
        || FormatError::UnsupportedCompression {
            entry: name.clone(),
            method: header.compression_method,
        },
    )?;

    let zip64 = Zip64Sizes::from_extra_field(&extra, &header);
    let declared = DeclaredSizes::from_header(&header, zip64.as_ref());
    let is_directory = name.ends_with('/');
    let start_offset = input.position();

    let observed = match compression_method {
        CompressionMethod::Stored => {
            if header.has_data_descriptor() {
                return Err(FormatError::StoredEntryWithDataDescriptor { entry: name });
            }
            scan_stored(input, &name, declared.compressed_size)?
        }
        CompressionMethod::Deflated => scan_deflated(input, &name)?,
    };
    let payload_end = input.position();

    let expected = if header.has_data_descriptor() {
        read_data_descriptor(input, zip64.is_some(), &observed)?
    } else {
        declared
    };
    expected.check(&name, &observed)?;

    let end_offset = if is_directory {
        if observed.uncompressed_size != 0 {
            return Err(FormatError::InvalidIndex {
                reason: format!(
                    "directory entry \"{name}\" has {} bytes of content",
                    observed.uncompressed_size
                ),
            });
        }
        // Deflated directory records carry an empty deflate stream
        start_offset
    } else {
        payload_end
    };

    Ok(ArchiveEntryDescriptor {
        name,
        start_offset,
        end_offset,
        compression_method,
        is_directory,
    })
}

/// CRC and sizes, either declared by the container or observed in the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DeclaredSizes {
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
}

impl DeclaredSizes {
    fn from_header(header: &LocalFileHeader, zip64: Option<&Zip64Sizes>) -> Self {
        let compressed_size = zip64
            .and_then(|z| z.compressed_size)
            .filter(|_| header.compressed_size == u32::MAX)
            .unwrap_or(u64::from(header.compressed_size));
        let uncompressed_size = zip64
            .and_then(|z| z.uncompressed_size)
            .filter(|_| header.uncompressed_size == u32::MAX)
            .unwrap_or(u64::from(header.uncompressed_size));
        Self {
            crc32: header.crc32,
            compressed_size,
            uncompressed_size,
        }
    }

    fn check(&self, entry: &str, observed: &Self) -> FormatResult<()> {
        if self.compressed_size != observed.compressed_size {
            return Err(FormatError::SizeMismatch {
                entry: entry.to_string(),
                what: "compressed",
                declared: self.compressed_size,
                actual: observed.compressed_size,
            });
        }
        if self.uncompressed_size != observed.uncompressed_size {
            return Err(FormatError::SizeMismatch {
                entry: entry.to_string(),
                what: "uncompressed",
                declared: self.uncompressed_size,
                actual: observed.uncompressed_size,
            });
        }
        if self.crc32 != observed.crc32 {
            return Err(FormatError::CrcMismatch {
                entry: entry.to_string(),
                expected: self.crc32,
                actual: observed.crc32,
            });
        }
        Ok(())
    }
}

fn scan_stored<R: Read>(
    input: &mut PositionedReader<R>,
    entry: &str,
    size: u64,
) -> FormatResult<DeclaredSizes> {
    let mut crc = Crc::new();
    let mut extent = ExtentReader::new(&mut *input, entry, size);
    loop {
        let chunk = extent.fill_buf()?;
        if chunk.is_empty() {
            break;
        }
        let n = chunk.len();
        crc.update(chunk);
        extent.consume(n);
    }
    extent.finish()?;
    Ok(DeclaredSizes {
        crc32: crc.sum(),
        compressed_size: size,
        uncompressed_size: size,
    })
}

fn scan_deflated<R: Read>(
    input: &mut PositionedReader<R>,
    entry: &str,
) -> FormatResult<DeclaredSizes> {
    let start = input.position();
    let mut crc = Crc::new();
    let mut inflater = BoundedInflater::new(None);
    let uncompressed_size = inflater
        .inflate(input, |chunk: &[u8]| -> FormatResult<()> {
            crc.update(chunk);
            Ok(())
        })
        .map_err(|e| e.for_entry(entry))?;
    Ok(DeclaredSizes {
        crc32: crc.sum(),
        compressed_size: input.position() - start,
        uncompressed_size,
    })
}

/// Read the descriptor that follows a deferred payload
///
/// The 64-bit layout is used when the local header carried a ZIP64 field or
/// when the payload turned out larger than 32 bits can express. Streaming
/// writers only learn the latter after the header has been written.
fn read_data_descriptor<R: Read>(
    input: &mut PositionedReader<R>,
    zip64_extra: bool,
    observed: &DeclaredSizes,
) -> FormatResult<DeclaredSizes> {
    let zip64 = zip64_extra
        || observed.compressed_size > u64::from(u32::MAX)
        || observed.uncompressed_size > u64::from(u32::MAX);

    let mut word = [0u8; 4];
    input.read_record(&mut word, "data descriptor")?;
    if u32::from_le_bytes(word) == DATA_DESCRIPTOR_SIGNATURE {
        input.read_record(&mut word, "data descriptor")?;
    }
    let crc32 = u32::from_le_bytes(word);

    let (compressed_size, uncompressed_size) = if zip64 {
        let mut sizes = [0u8; 16];
        input.read_record(&mut sizes, "data descriptor")?;
        let mut compressed = [0u8; 8];
        let mut uncompressed = [0u8; 8];
        compressed.copy_from_slice(&sizes[0..8]);
        uncompressed.copy_from_slice(&sizes[8..16]);
        (u64::from_le_bytes(compressed), u64::from_le_bytes(uncompressed))
    } else {
        let mut sizes = [0u8; 8];
        input.read_record(&mut sizes, "data descriptor")?;
        (
            u64::from(u32::from_le_bytes([sizes[0], sizes[1], sizes[2], sizes[3]])),
            u64::from(u32::from_le_bytes([sizes[4], sizes[5], sizes[6], sizes[7]])),
        )
    };

    Ok(DeclaredSizes {
        crc32,
        compressed_size,
        uncompressed_size,
    })
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn descriptor64(crc32: u32, compressed: u64, uncompressed: u64) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&DATA_DESCRIPTOR_SIGNATURE.to_le_bytes());
        out.extend_from_slice(&crc32.to_le_bytes());
        out.extend_from_slice(&compressed.to_le_bytes());
        out.extend_from_slice(&uncompressed.to_le_bytes());
        out
    }

    #[test]
    fn test_large_observed_size_selects_64_bit_descriptor() {
        let observed = DeclaredSizes {
            crc32: 0xDEAD_BEEF,
            compressed_size: 4_200_000,
            uncompressed_size: u64::from(u32::MAX) + 1_000_001,
        };
        let bytes = descriptor64(
            observed.crc32,
            observed.compressed_size,
            observed.uncompressed_size,
        );
        let mut input = PositionedReader::with_capacity(64, bytes.as_slice());

        let declared = read_data_descriptor(&mut input, false, &observed).unwrap();
        assert_eq!(declared, observed);
        assert_eq!(input.position(), 24);
    }

    #[test]
    fn test_small_entry_without_extra_uses_32_bit_descriptor() {
        let observed = DeclaredSizes {
            crc32: 7,
            compressed_size: 10,
            uncompressed_size: 20,
        };
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&DATA_DESCRIPTOR_SIGNATURE.to_le_bytes());
        bytes.extend_from_slice(&7u32.to_le_bytes());
        bytes.extend_from_slice(&10u32.to_le_bytes());
        bytes.extend_from_slice(&20u32.to_le_bytes());
        bytes.extend_from_slice(b"PK\x03\x04");
        let mut input = PositionedReader::with_capacity(64, bytes.as_slice());

        let declared = read_data_descriptor(&mut input, false, &observed).unwrap();
        assert_eq!(declared, observed);
        assert_eq!(input.position(), 16);
    }
}
