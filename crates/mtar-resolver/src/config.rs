//! Resolution limits and settings
//!
//! All limits are byte counts. A limit of zero is rejected when the
//! configuration is loaded; there is no "unlimited" setting.

use crate::context::ArchiveResolutionContext;
use crate::error::ResolveResult;
use crate::parts::PartsSequencer;
use mtar_crypto::DigestAlgorithm;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A byte limit is zero
    #[error("{field} must be greater than 0")]
    ZeroLimit {
        /// Name of the limit
        field: &'static str,
    },

    /// Part delimiter is empty
    #[error("part_delimiter must not be empty")]
    EmptyDelimiter,

    /// Configuration text is not valid JSON
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// Configuration file could not be read
    #[error("Could not read configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// Which configured budget an operation runs under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeLimit {
    /// Whole archive or module content
    Archive,
    /// Control files such as the manifest and deployment descriptor
    Descriptor,
    /// One resource or required-dependency parameter file
    ResourceFile,
    /// All external content resolved into one descriptor
    ResolvedExternalContent,
}

/// Limits and settings for archive resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Budget for module extraction and repackaging
    pub max_archive_size: u64,
    /// Budget for control files
    pub max_descriptor_size: u64,
    /// Budget for one parameter file
    pub max_resource_file_size: u64,
    /// Aggregate budget for resolved external content
    pub max_resolved_external_content_size: u64,
    /// Literal between an archive's name and its part number
    pub part_delimiter: String,
    /// Hash used for module digests
    pub digest_algorithm: DigestAlgorithm,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_archive_size: 4 * 1024 * 1024 * 1024, // 4 GiB
            max_descriptor_size: 1024 * 1024,         // 1 MiB
            max_resource_file_size: 1024 * 1024 * 1024, // 1 GiB
            max_resolved_external_content_size: 1024 * 1024, // 1 MiB
            part_delimiter: PartsSequencer::DEFAULT_DELIMITER.to_string(),
            digest_algorithm: DigestAlgorithm::Md5,
        }
    }
}

impl ResolverConfig {
    /// Create a configuration with default limits
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and validate a JSON configuration
    ///
    /// Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Set the archive budget
    pub fn with_max_archive_size(mut self, bytes: u64) -> Self {
        self.max_archive_size = bytes;
        self
    }

    /// Set the control file budget
    pub fn with_max_descriptor_size(mut self, bytes: u64) -> Self {
        self.max_descriptor_size = bytes;
        self
    }

    /// Set the parameter file budget
    pub fn with_max_resource_file_size(mut self, bytes: u64) -> Self {
        self.max_resource_file_size = bytes;
        self
    }

    /// Set the aggregate external content budget
    pub fn with_max_resolved_external_content_size(mut self, bytes: u64) -> Self {
        self.max_resolved_external_content_size = bytes;
        self
    }

    /// Set the part delimiter
    pub fn with_part_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.part_delimiter = delimiter.into();
        self
    }

    /// Set the digest algorithm
    pub fn with_digest_algorithm(mut self, algorithm: DigestAlgorithm) -> Self {
        self.digest_algorithm = algorithm;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = [
            ("max_archive_size", self.max_archive_size),
            ("max_descriptor_size", self.max_descriptor_size),
            ("max_resource_file_size", self.max_resource_file_size),
            (
                "max_resolved_external_content_size",
                self.max_resolved_external_content_size,
            ),
        ];
        if let Some(&(field, _)) = limits.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::ZeroLimit { field });
        }
        if self.part_delimiter.is_empty() {
            return Err(ConfigError::EmptyDelimiter);
        }
        Ok(())
    }

    /// Byte budget for a kind of operation
    pub const fn limit(&self, kind: SizeLimit) -> u64 {
        match kind {
            SizeLimit::Archive => self.max_archive_size,
            SizeLimit::Descriptor => self.max_descriptor_size,
            SizeLimit::ResourceFile => self.max_resource_file_size,
            SizeLimit::ResolvedExternalContent => self.max_resolved_external_content_size,
        }
    }

    /// Fresh context for one operation under the given budget
    pub fn context(
        &self,
        prefix: impl Into<String>,
        kind: SizeLimit,
    ) -> ResolveResult<ArchiveResolutionContext> {
        ArchiveResolutionContext::new(prefix, self.limit(kind))
    }

    /// Fresh module context under the archive budget that also computes a digest
    pub fn digest_context(
        &self,
        prefix: impl Into<String>,
    ) -> ResolveResult<ArchiveResolutionContext> {
        Ok(self
            .context(prefix, SizeLimit::Archive)?
            .with_digest(self.digest_algorithm))
    }

    /// Sequencer using the configured delimiter
    pub fn parts_sequencer(&self) -> PartsSequencer {
        PartsSequencer::new(self.part_delimiter.clone())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ResolverConfig::default();
        config.validate().unwrap();
        assert_eq!(config.max_archive_size, 4_294_967_296);
        assert_eq!(config.limit(SizeLimit::Descriptor), 1_048_576);
        assert_eq!(config.part_delimiter, ".part.");
    }

    #[test]
    fn test_zero_limit_rejected() {
        let err = ResolverConfig::default()
            .with_max_resource_file_size(0)
            .validate()
            .unwrap_err();
        assert_eq!(err.to_string(), "max_resource_file_size must be greater than 0");
    }

    #[test]
    fn test_empty_delimiter_rejected() {
        let err = ResolverConfig::default()
            .with_part_delimiter("")
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyDelimiter));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = ResolverConfig::from_json_str(
            r#"{ "max_archive_size": 2000, "digest_algorithm": "SHA-256" }"#,
        )
        .unwrap();
        assert_eq!(config.max_archive_size, 2000);
        assert_eq!(config.digest_algorithm, DigestAlgorithm::Sha256);
        assert_eq!(config.max_descriptor_size, 1_048_576);
    }

    #[test]
    fn test_json_zero_limit_rejected_at_load() {
        let err = ResolverConfig::from_json_str(r#"{ "max_descriptor_size": 0 }"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::ZeroLimit {
                field: "max_descriptor_size"
            }
        ));
        assert!(ResolverConfig::from_json_str(r#"{ "max_archive_size": -1 }"#).is_err());
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "part_delimiter": "._part_." }}"#).unwrap();
        let config = ResolverConfig::from_path(file.path()).unwrap();
        assert_eq!(config.part_delimiter, "._part_.");
        assert!(ResolverConfig::from_path("/nonexistent/mtar.json").is_err());
    }

    #[test]
    fn test_digest_context() {
        let ctx = ResolverConfig::default()
            .with_max_archive_size(10)
            .digest_context("web/")
            .unwrap();
        assert_eq!(ctx.max_allowed_bytes(), 10);
        assert!(ctx.has_digest());
    }
}
