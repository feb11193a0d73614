//! ZIP container support for application archives
//!
//! Application archives are ZIP files whose entries are either stored or
//! deflated. They may be larger than memory and arrive as a plain byte
//! stream, possibly stitched together from several stored parts, so nothing
//! here seeks or looks at the central directory for entry data.
//!
//! # Key Features
//!
//! - **Indexing**: [`ArchiveIndexer`] makes one forward pass and records the
//!   byte extent of every entry's payload
//! - **Path safety**: absolute and traversing entry names are rejected
//!   before their content is read
//! - **Bounded inflation**: [`BoundedInflater`] stops a decompression bomb at
//!   the first chunk past its ceiling
//! - **Extent checks**: [`ExtentReader`] turns short or overlong payloads
//!   into errors instead of silent truncation
//! - **Building**: [`ArchiveBuilder`] writes deterministic deflate-only
//!   archives without seeking
//!
//! # Extents
//!
//! ```text
//! offset:  0            start_offset         end_offset
//!          [local header][payload.............][descriptor][next header]...
//! ```
//!
//! Reading `[start_offset, end_offset)` of the logical stream and decoding it
//! per [`CompressionMethod`] yields exactly the entry's content.
//!
//! # Usage Examples
//!
//! ```rust
//! use mtar_formats::archive::{ArchiveBuilder, ArchiveIndexer, BoundedInflater, DosDateTime};
//! use mtar_formats::FormatError;
//!
//! let mut builder = ArchiveBuilder::new(Vec::new(), DosDateTime::new(2024, 1, 1, 0, 0, 0));
//! builder.add_entry("web/readme.txt", b"hello")?;
//! let archive = builder.finish()?;
//!
//! let index = ArchiveIndexer::new().index(archive.as_slice())?;
//! let entry = index.find_entry("web/readme.txt").expect("entry is indexed");
//!
//! let mut payload = &archive[entry.start_offset as usize..entry.end_offset as usize];
//! let mut content = Vec::new();
//! BoundedInflater::new(Some(1024)).inflate(&mut payload, |chunk: &[u8]| -> Result<(), FormatError> {
//!     content.extend_from_slice(chunk);
//!     Ok(())
//! })?;
//! assert_eq!(content, b"hello");
//! # Ok::<(), FormatError>(())
//! ```

mod builder;
mod error;
mod header;
mod index;
mod indexer;
mod inflate;
mod path;
mod reader;


pub use builder::ArchiveBuilder;
pub use error::{FormatError, FormatResult, UnsafePathReason};
pub use header::{
    CentralDirectoryHeader, DataDescriptor, DosDateTime, EndOfCentralDirectory, LocalFileHeader,
    Zip64EndOfCentralDirectory, Zip64EndOfCentralDirectoryLocator, Zip64Sizes, zip64_extra_field,
};
pub use index::{ArchiveEntryDescriptor, ArchiveIndex, CompressionMethod, EntryMatch};
pub use indexer::ArchiveIndexer;
pub use inflate::BoundedInflater;
pub use path::validate_entry_name;
pub use reader::{ExtentReader, PositionedReader};

/// ZIP record constants
pub mod constants {
    pub use super::header::{
        CENTRAL_DIRECTORY_SIGNATURE, DATA_DESCRIPTOR_SIGNATURE,
        END_OF_CENTRAL_DIRECTORY_SIGNATURE, FLAG_DATA_DESCRIPTOR, FLAG_ENCRYPTED, FLAG_UTF8,
        LOCAL_FILE_HEADER_LEN, LOCAL_FILE_HEADER_SIGNATURE, METHOD_DEFLATED, METHOD_STORED,
        VERSION_DEFLATE, VERSION_ZIP64, ZIP64_END_OF_CENTRAL_DIRECTORY_LOCATOR_SIGNATURE,
        ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE, ZIP64_EXTRA_FIELD_ID,
    };
}
