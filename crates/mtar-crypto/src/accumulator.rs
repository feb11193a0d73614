//! Incremental content digests

use crate::error::CryptoError;
use digest::Digest;
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use std::str::FromStr;

/// Hash function used for module digests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DigestAlgorithm {
    /// MD5, the digest recorded for deployed modules
    #[default]
    #[serde(rename = "MD5")]
    Md5,
    /// SHA-256
    #[serde(rename = "SHA-256")]
    Sha256,
}

impl DigestAlgorithm {
    /// Canonical algorithm name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Sha256 => "SHA-256",
        }
    }

    /// Digest length in bytes
    pub const fn output_len(self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha256 => 32,
        }
    }

    /// Check that a hex digest has the right length for this algorithm
    pub fn validate_hex(self, digest: &str) -> Result<(), CryptoError> {
        let expected = self.output_len() * 2;
        if digest.len() != expected {
            return Err(CryptoError::InvalidDigestLength {
                expected,
                actual: digest.len(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MD5" => Ok(Self::Md5),
            "SHA-256" | "SHA256" => Ok(Self::Sha256),
            _ => Err(CryptoError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

#[derive(Clone)]
enum Hasher {
    Md5(Md5),
    Sha256(Sha256),
}

/// Incremental hash over byte chunks
///
/// The final digest depends only on the concatenation of all chunks passed to
/// [`update`](Self::update), never on how the input was split. Finalizing
/// consumes the accumulator, so a digest can be produced at most once.
#[derive(Clone)]
pub struct DigestAccumulator {
    algorithm: DigestAlgorithm,
    hasher: Hasher,
    bytes_processed: u64,
}

impl DigestAccumulator {
    /// Create an empty accumulator
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        let hasher = match algorithm {
            DigestAlgorithm::Md5 => Hasher::Md5(Md5::new()),
            DigestAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
        };
        Self {
            algorithm,
            hasher,
            bytes_processed: 0,
        }
    }

    /// Algorithm this accumulator hashes with
    pub const fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Number of bytes folded in so far
    pub const fn bytes_processed(&self) -> u64 {
        self.bytes_processed
    }

    /// Fold a chunk into the digest
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.hasher {
            Hasher::Md5(h) => h.update(data),
            Hasher::Sha256(h) => h.update(data),
        }
        self.bytes_processed += data.len() as u64;
    }

    /// Finish hashing and return the raw digest bytes
    pub fn finalize_bytes(self) -> Vec<u8> {
        match self.hasher {
            Hasher::Md5(h) => h.finalize().to_vec(),
            Hasher::Sha256(h) => h.finalize().to_vec(),
        }
    }

    /// Finish hashing and return the upper-case hex digest
    pub fn finalize(self) -> String {
        hex::encode_upper(self.finalize_bytes())
    }
}

impl fmt::Debug for DigestAccumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestAccumulator")
            .field("algorithm", &self.algorithm)
            .field("bytes_processed", &self.bytes_processed)
            .finish_non_exhaustive()
    }
}

/// Digest a complete buffer in one call
pub fn digest_hex(algorithm: DigestAlgorithm, data: &[u8]) -> String {
    let mut accumulator = DigestAccumulator::new(algorithm);
    accumulator.update(data);
    accumulator.finalize()
}
