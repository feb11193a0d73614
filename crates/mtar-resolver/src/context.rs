//! Per-operation resolution state

use crate::config::ConfigError;
use crate::error::{ResolveError, ResolveResult};
use mtar_crypto::{DigestAccumulator, DigestAlgorithm};
use std::collections::HashSet;

/// State threaded through one archive-processing operation
///
/// A context is owned by exactly one operation and passed by `&mut` to every
/// step, so independent operations can never share a counter. The byte
/// counter and digest only move after a chunk has passed the budget check;
/// a failed operation leaves the context at the last accepted chunk and the
/// caller discards it.
#[derive(Debug)]
pub struct ArchiveResolutionContext {
    prefix: String,
    max_allowed_bytes: u64,
    bytes_consumed: u64,
    digest: Option<DigestAccumulator>,
    already_delivered: HashSet<String>,
}

impl ArchiveResolutionContext {
    /// Create a context for the entries under `prefix`
    ///
    /// # Errors
    ///
    /// Returns error if `max_allowed_bytes` is zero
    pub fn new(prefix: impl Into<String>, max_allowed_bytes: u64) -> ResolveResult<Self> {
        if max_allowed_bytes == 0 {
            return Err(ConfigError::ZeroLimit {
                field: "max_allowed_bytes",
            }
            .into());
        }
        Ok(Self {
            prefix: prefix.into(),
            max_allowed_bytes,
            bytes_consumed: 0,
            digest: None,
            already_delivered: HashSet::new(),
        })
    }

    /// Also fold every accepted chunk into a digest
    pub fn with_digest(mut self, algorithm: DigestAlgorithm) -> Self {
        self.digest = Some(DigestAccumulator::new(algorithm));
        self
    }

    /// Entries the target platform already accepted in an earlier attempt
    pub fn with_already_delivered<I, T>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.already_delivered
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Module or entry prefix this operation works on
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Hard byte ceiling
    pub const fn max_allowed_bytes(&self) -> u64 {
        self.max_allowed_bytes
    }

    /// Bytes accepted so far
    pub const fn bytes_consumed(&self) -> u64 {
        self.bytes_consumed
    }

    /// Bytes that may still be accepted
    pub const fn remaining(&self) -> u64 {
        self.max_allowed_bytes - self.bytes_consumed
    }

    /// Whether a digest is being computed
    pub const fn has_digest(&self) -> bool {
        self.digest.is_some()
    }

    /// Names already delivered
    pub fn already_delivered(&self) -> &HashSet<String> {
        &self.already_delivered
    }

    /// Whether an entry was delivered in an earlier attempt
    pub fn is_delivered(&self, name: &str) -> bool {
        self.already_delivered.contains(name)
    }

    /// Record an entry as delivered
    pub fn mark_delivered(&mut self, name: impl Into<String>) {
        self.already_delivered.insert(name.into());
    }

    /// Accept a chunk of `entry`'s content against the budget
    ///
    /// Fails without touching the counter or digest if the chunk would take
    /// the total past the ceiling.
    pub fn account(&mut self, entry: &str, chunk: &[u8]) -> ResolveResult<()> {
        let next = self
            .bytes_consumed
            .checked_add(chunk.len() as u64)
            .filter(|next| *next <= self.max_allowed_bytes)
            .ok_or_else(|| ResolveError::SizeLimitExceeded {
                entry: entry.to_string(),
                limit: self.max_allowed_bytes,
            })?;
        self.bytes_consumed = next;
        if let Some(digest) = self.digest.as_mut() {
            digest.update(chunk);
        }
        Ok(())
    }

    /// Finalize the digest, returning upper-case hex
    ///
    /// The digest can be taken once; later calls fail with
    /// [`ResolveError::MissingDigest`].
    pub fn finish_digest(&mut self) -> ResolveResult<String> {
        self.digest
            .take()
            .map(DigestAccumulator::finalize)
            .ok_or(ResolveError::MissingDigest)
    }
}
