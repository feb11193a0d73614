//! Raw deflate decompression with an output ceiling

use crate::archive::error::FormatError;
use flate2::{Decompress, FlushDecompress, Status};
use std::io::BufRead;

/// Streaming raw-deflate decoder that refuses to produce more than a ceiling
///
/// Input is pulled through [`BufRead::fill_buf`] and only the bytes the
/// decoder actually used are consumed, so the reader is left positioned on
/// the first byte after the deflate stream. This is how the indexer finds the
/// true end of an entry whose compressed size is deferred to a trailing data
/// descriptor.
///
/// Output is handed to the sink in chunks of at most
/// [`CHUNK_SIZE`](Self::CHUNK_SIZE) bytes. The ceiling is checked before every
/// chunk, so the sink never sees a byte past the limit.
pub struct BoundedInflater {
    decompress: Decompress,
    ceiling: Option<u64>,
    chunk: Vec<u8>,
}

impl BoundedInflater {
    /// Maximum size of one chunk handed to the sink
    pub const CHUNK_SIZE: usize = 8 * 1024;

    /// Create an inflater; `None` disables the ceiling
    pub fn new(ceiling: Option<u64>) -> Self {
        Self {
            decompress: Decompress::new(false),
            ceiling,
            chunk: vec![0u8; Self::CHUNK_SIZE],
        }
    }

    /// Configured ceiling
    pub const fn ceiling(&self) -> Option<u64> {
        self.ceiling
    }

    /// Decompressed bytes produced so far
    pub fn produced(&self) -> u64 {
        self.decompress.total_out()
    }

    /// Compressed bytes consumed so far
    pub fn consumed(&self) -> u64 {
        self.decompress.total_in()
    }

    /// Inflate one complete deflate stream from `input` into `sink`
    ///
    /// Returns the number of decompressed bytes on logical completion. Fails
    /// with [`FormatError::TruncatedDeflateStream`] if the input ends first
    /// and with [`FormatError::DecompressedSizeExceeded`] before any chunk
    /// that would cross the ceiling. Errors returned by the sink are passed
    /// through unchanged.
    pub fn inflate<R, E, F>(&mut self, input: &mut R, mut sink: F) -> Result<u64, E>
    where
        R: BufRead + ?Sized,
        E: From<FormatError>,
        F: FnMut(&[u8]) -> Result<(), E>,
    {
        loop {
            let before_in = self.decompress.total_in();
            let before_out = self.decompress.total_out();

            let (status, at_eof) = {
                let available = input.fill_buf().map_err(FormatError::from)?;
                let at_eof = available.is_empty();
                // Never Finish: a short stream must surface as no progress
                let status = self
                    .decompress
                    .decompress(available, &mut self.chunk, FlushDecompress::None)
                    .map_err(|e| FormatError::Deflate(e.to_string()))?;
                (status, at_eof)
            };

            let used = (self.decompress.total_in() - before_in) as usize;
            let written = (self.decompress.total_out() - before_out) as usize;
            input.consume(used);

            if written > 0 {
                if let Some(limit) = self.ceiling {
                    if before_out + written as u64 > limit {
                        return Err(FormatError::DecompressedSizeExceeded { limit }.into());
                    }
                }
                sink(&self.chunk[..written])?;
            }

            if status == Status::StreamEnd {
                return Ok(self.produced());
            }
            if used == 0 && written == 0 {
                return Err(if at_eof {
                    FormatError::TruncatedDeflateStream
                } else {
                    FormatError::Deflate("decoder made no progress".to_string())
                }
                .into());
            }
        }
    }
}

impl std::fmt::Debug for BoundedInflater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedInflater")
            .field("ceiling", &self.ceiling)
            .field("produced", &self.produced())
            .field("consumed", &self.consumed())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::DeflateEncoder;
    use std::io::{BufReader, Cursor, Read, Write};

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn collect(inflater: &mut BoundedInflater, input: &[u8]) -> Result<Vec<u8>, FormatError> {
        let mut out = Vec::new();
        let mut reader = Cursor::new(input);
        inflater.inflate(&mut reader, |chunk: &[u8]| -> Result<(), FormatError> {
            out.extend_from_slice(chunk);
            Ok(())
        })?;
        Ok(out)
    }

    #[test]
    fn test_inflate_round_trip() {
        let data: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
        let compressed = deflate(&data);
        let mut inflater = BoundedInflater::new(None);
        let out = collect(&mut inflater, &compressed).unwrap();
        assert_eq!(out, data);
        assert_eq!(inflater.produced(), data.len() as u64);
        assert_eq!(inflater.consumed(), compressed.len() as u64);
    }

    #[test]
    fn test_inflate_stops_at_stream_end() {
        let mut input = deflate(b"hello");
        input.extend_from_slice(b"TRAILER");

        let mut reader = BufReader::with_capacity(3, Cursor::new(input));
        let mut inflater = BoundedInflater::new(None);
        let mut out = Vec::new();
        inflater
            .inflate(&mut reader, |chunk: &[u8]| -> Result<(), FormatError> {
                out.extend_from_slice(chunk);
                Ok(())
            })
            .unwrap();
        assert_eq!(out, b"hello");

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"TRAILER");
    }

    #[test]
    fn test_truncated_stream() {
        let data = vec![7u8; 10_000];
        let compressed = deflate(&data);
        let mut inflater = BoundedInflater::new(None);
        let err = collect(&mut inflater, &compressed[..compressed.len() / 2]).unwrap_err();
        assert!(matches!(err, FormatError::TruncatedDeflateStream));
        assert!(err.is_corrupted_stream());
    }

    #[test]
    fn test_empty_input_is_truncated() {
        let mut inflater = BoundedInflater::new(None);
        let err = collect(&mut inflater, &[]).unwrap_err();
        assert!(matches!(err, FormatError::TruncatedDeflateStream));
    }

    #[test]
    fn test_corrupt_stream() {
        // Block type 3 is reserved
        let mut inflater = BoundedInflater::new(None);
        let err = collect(&mut inflater, &[0xFF, 0xFF, 0xFF, 0xFF]).unwrap_err();
        assert!(matches!(err, FormatError::Deflate(_)));
    }

    #[test]
    fn test_ceiling_stops_bomb_early() {
        // 10 MiB of zeros compresses to a few KiB
        let data = vec![0u8; 10 * 1024 * 1024];
        let compressed = deflate(&data);
        let limit = 100_000;

        let mut delivered = 0u64;
        let mut inflater = BoundedInflater::new(Some(limit));
        let mut reader = Cursor::new(compressed.as_slice());
        let err = inflater
            .inflate(&mut reader, |chunk: &[u8]| -> Result<(), FormatError> {
                delivered += chunk.len() as u64;
                Ok(())
            })
            .unwrap_err();

        assert!(matches!(err, FormatError::DecompressedSizeExceeded { limit: 100_000 }));
        assert!(delivered <= limit);
        assert!(delivered > limit - BoundedInflater::CHUNK_SIZE as u64);
    }

    #[test]
    fn test_ceiling_equal_to_size_succeeds() {
        let data = vec![3u8; 20_000];
        let compressed = deflate(&data);
        let mut inflater = BoundedInflater::new(Some(20_000));
        assert_eq!(collect(&mut inflater, &compressed).unwrap().len(), 20_000);
    }

    #[test]
    fn test_sink_error_passes_through() {
        #[derive(Debug)]
        enum SinkError {
            Full,
            Format,
        }
        impl From<FormatError> for SinkError {
            fn from(_: FormatError) -> Self {
                Self::Format
            }
        }

        let compressed = deflate(&[1u8; 100]);
        let mut inflater = BoundedInflater::new(None);
        let mut reader = Cursor::new(compressed.as_slice());
        let err = inflater
            .inflate(&mut reader, |_chunk: &[u8]| Err(SinkError::Full))
            .unwrap_err();
        assert!(matches!(err, SinkError::Full));
        assert!(!matches!(err, SinkError::Format));
    }
}
