//! ZIP record structures
//!
//! All multi-byte fields are little-endian. Signatures are handled by the
//! caller so that a forward-only reader can dispatch on them before deciding
//! which record follows.
//!
//! ```text
//! [local header][name][extra][payload][data descriptor?] ... [central directory][end of central directory]
//! ```

use crate::archive::error::FormatResult;
use binrw::{BinRead, BinWrite};
use std::io::Cursor;

/// Local file header signature (`PK\x03\x04`)
pub const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x0403_4b50;

/// Data descriptor signature (`PK\x07\x08`), optional in the descriptor itself
pub const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x0807_4b50;

/// Central directory file header signature (`PK\x01\x02`)
pub const CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x0201_4b50;

/// End of central directory signature (`PK\x05\x06`)
pub const END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x0605_4b50;

/// ZIP64 end of central directory record signature (`PK\x06\x06`)
pub const ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x0606_4b50;

/// ZIP64 end of central directory locator signature (`PK\x06\x07`)
pub const ZIP64_END_OF_CENTRAL_DIRECTORY_LOCATOR_SIGNATURE: u32 = 0x0706_4b50;

/// Size of the fixed part of a local file header, excluding the signature
pub const LOCAL_FILE_HEADER_LEN: usize = 26;

/// ZIP64 extended information extra field id
pub const ZIP64_EXTRA_FIELD_ID: u16 = 0x0001;

/// Flag bit 0: entry is encrypted
pub const FLAG_ENCRYPTED: u16 = 0x0001;

/// Flag bit 3: CRC and sizes follow the payload in a data descriptor
pub const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;

/// Flag bit 11: name is UTF-8
pub const FLAG_UTF8: u16 = 0x0800;

/// Method id for stored entries
pub const METHOD_STORED: u16 = 0;

/// Method id for deflated entries
pub const METHOD_DEFLATED: u16 = 8;

/// Version needed to extract deflated entries (2.0)
pub const VERSION_DEFLATE: u16 = 20;

/// Version needed to extract ZIP64 entries (4.5)
pub const VERSION_ZIP64: u16 = 45;

/// Fixed part of a local file header
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct LocalFileHeader {
    /// Minimum version needed to extract
    pub version_needed: u16,
    /// General purpose bit flags
    pub flags: u16,
    /// Compression method
    pub compression_method: u16,
    /// DOS last modification time
    pub last_mod_time: u16,
    /// DOS last modification date
    pub last_mod_date: u16,
    /// CRC-32 of uncompressed content (zero when deferred)
    pub crc32: u32,
    /// Compressed size (zero when deferred, `u32::MAX` when in ZIP64 extra)
    pub compressed_size: u32,
    /// Uncompressed size (zero when deferred, `u32::MAX` when in ZIP64 extra)
    pub uncompressed_size: u32,
    /// Length of the name that follows
    pub file_name_length: u16,
    /// Length of the extra field that follows the name
    pub extra_field_length: u16,
}

impl LocalFileHeader {
    /// Parse the fixed header bytes that follow the signature
    pub fn parse(bytes: &[u8; LOCAL_FILE_HEADER_LEN]) -> FormatResult<Self> {
        Ok(Self::read(&mut Cursor::new(&bytes[..]))?)
    }

    /// Whether sizes and CRC are deferred to a data descriptor
    pub const fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }

    /// Whether the entry is encrypted
    pub const fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    /// Serialize the fixed header bytes, without the signature
    pub fn to_bytes(&self) -> FormatResult<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::with_capacity(LOCAL_FILE_HEADER_LEN));
        self.write(&mut cursor)?;
        Ok(cursor.into_inner())
    }
}

/// Sizes taken from a ZIP64 extended information extra field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Zip64Sizes {
    /// 64-bit uncompressed size, if present
    pub uncompressed_size: Option<u64>,
    /// 64-bit compressed size, if present
    pub compressed_size: Option<u64>,
}

impl Zip64Sizes {
    /// Locate the ZIP64 field in a local header's extra data
    ///
    /// Returns `None` when the extra data has no ZIP64 field. Fields appear in
    /// the order uncompressed, compressed, and only when the corresponding
    /// header value is `u32::MAX`; local headers written in streaming mode may
    /// carry both regardless.
    pub fn from_extra_field(extra: &[u8], header: &LocalFileHeader) -> Option<Self> {
        let mut pos = 0;
        while pos + 4 <= extra.len() {
            let id = u16::from_le_bytes([extra[pos], extra[pos + 1]]);
            let len = u16::from_le_bytes([extra[pos + 2], extra[pos + 3]]) as usize;
            let data_start = pos + 4;
            let data_end = (data_start + len).min(extra.len());
            if id == ZIP64_EXTRA_FIELD_ID {
                let data = &extra[data_start..data_end];
                let mut values = data
                    .chunks_exact(8)
                    .map(|c| u64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]));
                let both = data.len() >= 16;
                let uncompressed_size = if header.uncompressed_size == u32::MAX || both {
                    values.next()
                } else {
                    None
                };
                let compressed_size = if header.compressed_size == u32::MAX || both {
                    values.next()
                } else {
                    None
                };
                return Some(Self {
                    uncompressed_size,
                    compressed_size,
                });
            }
            pos = data_start + len;
        }
        None
    }
}

/// Encode a ZIP64 extended information extra field
///
/// `values` must already be in record order: uncompressed size, compressed
/// size, local header offset, each present only when the fixed field holds
/// `u32::MAX`.
pub fn zip64_extra_field(values: &[u64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + values.len() * 8);
    out.extend_from_slice(&ZIP64_EXTRA_FIELD_ID.to_le_bytes());
    out.extend_from_slice(&((values.len() * 8) as u16).to_le_bytes());
    for value in values {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// Trailing data descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataDescriptor {
    /// CRC-32 of uncompressed content
    pub crc32: u32,
    /// Compressed size
    pub compressed_size: u64,
    /// Uncompressed size
    pub uncompressed_size: u64,
}

impl DataDescriptor {
    /// Encoded length with signature and 32-bit sizes
    pub const ENCODED_LEN: usize = 16;

    /// Encoded length with signature and 64-bit sizes
    pub const ZIP64_ENCODED_LEN: usize = 24;

    /// Whether either size needs the 64-bit layout
    pub fn is_zip64(&self) -> bool {
        self.compressed_size > u64::from(u32::MAX) || self.uncompressed_size > u64::from(u32::MAX)
    }

    /// Serialize with signature, using 64-bit sizes only when required
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::ZIP64_ENCODED_LEN);
        out.extend_from_slice(&DATA_DESCRIPTOR_SIGNATURE.to_le_bytes());
        out.extend_from_slice(&self.crc32.to_le_bytes());
        if self.is_zip64() {
            out.extend_from_slice(&self.compressed_size.to_le_bytes());
            out.extend_from_slice(&self.uncompressed_size.to_le_bytes());
        } else {
            out.extend_from_slice(&(self.compressed_size as u32).to_le_bytes());
            out.extend_from_slice(&(self.uncompressed_size as u32).to_le_bytes());
        }
        out
    }
}

/// Central directory file header, excluding the signature
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct CentralDirectoryHeader {
    /// Version made by
    pub version_made_by: u16,
    /// Minimum version needed to extract
    pub version_needed: u16,
    /// General purpose bit flags
    pub flags: u16,
    /// Compression method
    pub compression_method: u16,
    /// DOS last modification time
    pub last_mod_time: u16,
    /// DOS last modification date
    pub last_mod_date: u16,
    /// CRC-32 of uncompressed content
    pub crc32: u32,
    /// Compressed size
    pub compressed_size: u32,
    /// Uncompressed size
    pub uncompressed_size: u32,
    /// Length of the name that follows
    pub file_name_length: u16,
    /// Length of the extra field
    pub extra_field_length: u16,
    /// Length of the file comment
    pub file_comment_length: u16,
    /// Disk number where the entry starts
    pub disk_number_start: u16,
    /// Internal file attributes
    pub internal_attributes: u16,
    /// External file attributes
    pub external_attributes: u32,
    /// Offset of the local header from the start of the archive
    pub local_header_offset: u32,
}

impl CentralDirectoryHeader {
    /// Serialize the fixed record bytes, without the signature
    pub fn to_bytes(&self) -> FormatResult<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::with_capacity(42));
        self.write(&mut cursor)?;
        Ok(cursor.into_inner())
    }
}

/// End of central directory record, excluding the signature
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct EndOfCentralDirectory {
    /// Number of this disk
    pub disk_number: u16,
    /// Disk where the central directory starts
    pub central_directory_disk: u16,
    /// Central directory records on this disk
    pub entries_on_disk: u16,
    /// Total central directory records
    pub total_entries: u16,
    /// Size of the central directory in bytes
    pub central_directory_size: u32,
    /// Offset of the central directory from the start of the archive
    pub central_directory_offset: u32,
    /// Length of the archive comment
    pub comment_length: u16,
}

impl EndOfCentralDirectory {
    /// Serialize the fixed record bytes, without the signature
    pub fn to_bytes(&self) -> FormatResult<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::with_capacity(18));
        self.write(&mut cursor)?;
        Ok(cursor.into_inner())
    }
}

/// ZIP64 end of central directory record, excluding the signature
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct Zip64EndOfCentralDirectory {
    /// Size of the remaining record, 44 without extensible data
    pub record_size: u64,
    /// Version made by
    pub version_made_by: u16,
    /// Minimum version needed to extract
    pub version_needed: u16,
    /// Number of this disk
    pub disk_number: u32,
    /// Disk where the central directory starts
    pub central_directory_disk: u32,
    /// Central directory records on this disk
    pub entries_on_disk: u64,
    /// Total central directory records
    pub total_entries: u64,
    /// Size of the central directory in bytes
    pub central_directory_size: u64,
    /// Offset of the central directory from the start of the archive
    pub central_directory_offset: u64,
}

impl Zip64EndOfCentralDirectory {
    /// Record size counted from after the size field
    pub const RECORD_SIZE: u64 = 44;

    /// Serialize the fixed record bytes, without the signature
    pub fn to_bytes(&self) -> FormatResult<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::with_capacity(52));
        self.write(&mut cursor)?;
        Ok(cursor.into_inner())
    }
}

/// Locator pointing at the ZIP64 end of central directory record
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct Zip64EndOfCentralDirectoryLocator {
    /// Disk holding the ZIP64 end record
    pub end_record_disk: u32,
    /// Offset of the ZIP64 end record from the start of the archive
    pub end_record_offset: u64,
    /// Total number of disks
    pub total_disks: u32,
}

impl Zip64EndOfCentralDirectoryLocator {
    /// Serialize the fixed record bytes, without the signature
    pub fn to_bytes(&self) -> FormatResult<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::with_capacity(16));
        self.write(&mut cursor)?;
        Ok(cursor.into_inner())
    }
}

/// MS-DOS date and time as stored in ZIP headers
///
/// Resolution is two seconds; years are limited to 1980..=2107.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DosDateTime {
    /// Packed time: hour(5) minute(6) second/2(5)
    pub time: u16,
    /// Packed date: year-1980(7) month(4) day(5)
    pub date: u16,
}

impl DosDateTime {
    /// Earliest representable timestamp, 1980-01-01 00:00:00
    pub const EPOCH: Self = Self {
        time: 0,
        date: (1 << 5) | 1,
    };

    /// Pack calendar fields, clamping the year to the DOS range
    pub fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        if year < 1980 {
            return Self::EPOCH;
        }
        let year = year.min(2107) - 1980;
        let date = (year << 9) | (u16::from(month.clamp(1, 12)) << 5) | u16::from(day.clamp(1, 31));
        let time = (u16::from(hour.min(23)) << 11)
            | (u16::from(minute.min(59)) << 5)
            | u16::from(second.min(59) / 2);
        Self { time, date }
    }

    /// Calendar year
    pub const fn year(self) -> u16 {
        (self.date >> 9) + 1980
    }

    /// Month, 1-12
    pub const fn month(self) -> u8 {
        ((self.date >> 5) & 0x0F) as u8
    }

    /// Day of month, 1-31
    pub const fn day(self) -> u8 {
        (self.date & 0x1F) as u8
    }

    /// Hour, 0-23
    pub const fn hour(self) -> u8 {
        (self.time >> 11) as u8
    }

    /// Minute, 0-59
    pub const fn minute(self) -> u8 {
        ((self.time >> 5) & 0x3F) as u8
    }

    /// Second, always even
    pub const fn second(self) -> u8 {
        ((self.time & 0x1F) * 2) as u8
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use binrw::BinWrite;

    #[test]
    fn test_local_header_parse() {
        let mut bytes = [0u8; LOCAL_FILE_HEADER_LEN];
        bytes[0..2].copy_from_slice(&20u16.to_le_bytes());
        bytes[2..4].copy_from_slice(&FLAG_DATA_DESCRIPTOR.to_le_bytes());
        bytes[4..6].copy_from_slice(&METHOD_DEFLATED.to_le_bytes());
        bytes[22..24].copy_from_slice(&14u16.to_le_bytes());
        bytes[24..26].copy_from_slice(&4u16.to_le_bytes());

        let header = LocalFileHeader::parse(&bytes).expect("Test operation should succeed");
        assert_eq!(header.version_needed, 20);
        assert!(header.has_data_descriptor());
        assert!(!header.is_encrypted());
        assert_eq!(header.compression_method, METHOD_DEFLATED);
        assert_eq!(header.file_name_length, 14);
        assert_eq!(header.extra_field_length, 4);
    }

    #[test]
    fn test_local_header_write_length() {
        let header = LocalFileHeader {
            version_needed: 20,
            flags: 0,
            compression_method: METHOD_STORED,
            last_mod_time: 0,
            last_mod_date: 0,
            crc32: 0xDEAD_BEEF,
            compressed_size: 5,
            uncompressed_size: 5,
            file_name_length: 1,
            extra_field_length: 0,
        };
        let mut out = Cursor::new(Vec::new());
        header.write(&mut out).expect("Test operation should succeed");
        let bytes = out.into_inner();
        assert_eq!(bytes.len(), LOCAL_FILE_HEADER_LEN);
        assert_eq!(&bytes[10..14], &0xDEAD_BEEFu32.to_le_bytes());
    }

    #[test]
    fn test_zip64_extra_field() {
        let header = LocalFileHeader {
            version_needed: 45,
            flags: 0,
            compression_method: METHOD_STORED,
            last_mod_time: 0,
            last_mod_date: 0,
            crc32: 0,
            compressed_size: u32::MAX,
            uncompressed_size: u32::MAX,
            file_name_length: 0,
            extra_field_length: 20,
        };
        let mut extra = Vec::new();
        extra.extend_from_slice(&ZIP64_EXTRA_FIELD_ID.to_le_bytes());
        extra.extend_from_slice(&16u16.to_le_bytes());
        extra.extend_from_slice(&5_000_000_000u64.to_le_bytes());
        extra.extend_from_slice(&4_000_000_000u64.to_le_bytes());

        let sizes = Zip64Sizes::from_extra_field(&extra, &header).expect("ZIP64 field present");
        assert_eq!(sizes.uncompressed_size, Some(5_000_000_000));
        assert_eq!(sizes.compressed_size, Some(4_000_000_000));
    }

    #[test]
    fn test_extra_field_without_zip64() {
        let header = LocalFileHeader {
            version_needed: 20,
            flags: 0,
            compression_method: METHOD_STORED,
            last_mod_time: 0,
            last_mod_date: 0,
            crc32: 0,
            compressed_size: 3,
            uncompressed_size: 3,
            file_name_length: 0,
            extra_field_length: 9,
        };
        // Extended timestamp field
        let extra = [0x55, 0x54, 0x05, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00];
        assert!(Zip64Sizes::from_extra_field(&extra, &header).is_none());
    }

    #[test]
    fn test_data_descriptor_bytes() {
        let descriptor = DataDescriptor {
            crc32: 1,
            compressed_size: 2,
            uncompressed_size: 3,
        };
        let bytes = descriptor.to_bytes();
        assert_eq!(bytes.len(), DataDescriptor::ENCODED_LEN);
        assert_eq!(&bytes[0..4], b"PK\x07\x08");
        assert_eq!(&bytes[8..12], &2u32.to_le_bytes());
    }

    #[test]
    fn test_data_descriptor_switches_to_64_bit_sizes() {
        let descriptor = DataDescriptor {
            crc32: 9,
            compressed_size: 1_000,
            uncompressed_size: u64::from(u32::MAX) + 1,
        };
        assert!(descriptor.is_zip64());
        let bytes = descriptor.to_bytes();
        assert_eq!(bytes.len(), DataDescriptor::ZIP64_ENCODED_LEN);
        assert_eq!(&bytes[8..16], &1_000u64.to_le_bytes());
        assert_eq!(&bytes[16..24], &(u64::from(u32::MAX) + 1).to_le_bytes());
    }

    #[test]
    fn test_zip64_extra_field_encoding() {
        let extra = zip64_extra_field(&[5_000_000_000, 7]);
        assert_eq!(extra.len(), 20);
        assert_eq!(&extra[0..2], &ZIP64_EXTRA_FIELD_ID.to_le_bytes());
        assert_eq!(&extra[2..4], &16u16.to_le_bytes());
        assert_eq!(&extra[4..12], &5_000_000_000u64.to_le_bytes());
    }

    #[test]
    fn test_zip64_end_records_length() {
        let end = Zip64EndOfCentralDirectory {
            record_size: Zip64EndOfCentralDirectory::RECORD_SIZE,
            version_made_by: VERSION_ZIP64,
            version_needed: VERSION_ZIP64,
            disk_number: 0,
            central_directory_disk: 0,
            entries_on_disk: 1,
            total_entries: 1,
            central_directory_size: 60,
            central_directory_offset: 5_000_000_000,
        };
        let bytes = end.to_bytes().expect("Test operation should succeed");
        assert_eq!(bytes.len() as u64, 8 + Zip64EndOfCentralDirectory::RECORD_SIZE);

        let locator = Zip64EndOfCentralDirectoryLocator {
            end_record_disk: 0,
            end_record_offset: 5_000_000_060,
            total_disks: 1,
        };
        let bytes = locator.to_bytes().expect("Test operation should succeed");
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[4..12], &5_000_000_060u64.to_le_bytes());
    }

    #[test]
    fn test_dos_date_time_round_trip() {
        let ts = DosDateTime::new(2024, 3, 15, 13, 45, 31);
        assert_eq!(ts.year(), 2024);
        assert_eq!(ts.month(), 3);
        assert_eq!(ts.day(), 15);
        assert_eq!(ts.hour(), 13);
        assert_eq!(ts.minute(), 45);
        assert_eq!(ts.second(), 30);
    }

    #[test]
    fn test_dos_date_time_clamps_early_years() {
        assert_eq!(DosDateTime::new(1970, 1, 1, 0, 0, 0), DosDateTime::EPOCH);
        assert_eq!(DosDateTime::EPOCH.year(), 1980);
    }

    #[test]
    fn test_central_directory_header_length() {
        let header = CentralDirectoryHeader {
            version_made_by: VERSION_DEFLATE,
            version_needed: VERSION_DEFLATE,
            flags: FLAG_DATA_DESCRIPTOR,
            compression_method: METHOD_DEFLATED,
            last_mod_time: 0,
            last_mod_date: 0,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            file_name_length: 3,
            extra_field_length: 0,
            file_comment_length: 0,
            disk_number_start: 0,
            internal_attributes: 0,
            external_attributes: 0,
            local_header_offset: 77,
        };
        let bytes = header.to_bytes().expect("Test operation should succeed");
        assert_eq!(bytes.len(), 42);
        assert_eq!(&bytes[38..42], &77u32.to_le_bytes());
    }

    #[test]
    fn test_end_of_central_directory_write() {
        let eocd = EndOfCentralDirectory {
            disk_number: 0,
            central_directory_disk: 0,
            entries_on_disk: 2,
            total_entries: 2,
            central_directory_size: 100,
            central_directory_offset: 200,
            comment_length: 0,
        };
        let mut out = Cursor::new(Vec::new());
        eocd.write(&mut out).expect("Test operation should succeed");
        assert_eq!(out.into_inner().len(), 18);
    }
}
