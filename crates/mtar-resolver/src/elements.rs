//! Well-known archive elements
//!
//! Control files are read under the descriptor budget and parameter files
//! under the per-file resource budget. Content pulled in from external file
//! references shares one aggregate budget per descriptor.

use crate::config::{ResolverConfig, SizeLimit};
use crate::error::ResolveResult;
use crate::extractor::EntryExtractor;
use mtar_storage::BlobStore;
use std::collections::BTreeMap;
use tracing::debug;

/// Archive manifest
pub const MANIFEST_ENTRY: &str = "META-INF/MANIFEST.MF";

/// Deployment descriptor
pub const DEPLOYMENT_DESCRIPTOR_ENTRY: &str = "META-INF/mtad.yaml";

/// Read the archive manifest
pub fn extract_manifest<S: BlobStore + ?Sized>(
    config: &ResolverConfig,
    extractor: &EntryExtractor<'_, S>,
) -> ResolveResult<Vec<u8>> {
    extract_control_file(config, extractor, MANIFEST_ENTRY)
}

/// Read the deployment descriptor
pub fn extract_deployment_descriptor<S: BlobStore + ?Sized>(
    config: &ResolverConfig,
    extractor: &EntryExtractor<'_, S>,
) -> ResolveResult<Vec<u8>> {
    extract_control_file(config, extractor, DEPLOYMENT_DESCRIPTOR_ENTRY)
}

fn extract_control_file<S: BlobStore + ?Sized>(
    config: &ResolverConfig,
    extractor: &EntryExtractor<'_, S>,
    name: &str,
) -> ResolveResult<Vec<u8>> {
    let mut ctx = config.context(name, SizeLimit::Descriptor)?;
    let content = extractor.extract_bytes(&mut ctx, name)?;
    debug!("Read {} ({} bytes)", name, content.len());
    Ok(content)
}

/// Read a resource or required-dependency parameter file as JSON
pub fn extract_resource_parameters<S: BlobStore + ?Sized>(
    config: &ResolverConfig,
    extractor: &EntryExtractor<'_, S>,
    name: &str,
) -> ResolveResult<serde_json::Value> {
    let mut ctx = config.context(name, SizeLimit::ResourceFile)?;
    extractor.extract_json(&mut ctx, name)
}

/// Read files referenced from a descriptor under one shared budget
///
/// Duplicate names are read once.
pub fn extract_external_contents<S: BlobStore + ?Sized>(
    config: &ResolverConfig,
    extractor: &EntryExtractor<'_, S>,
    names: &[&str],
) -> ResolveResult<BTreeMap<String, Vec<u8>>> {
    let mut ctx = config.context("", SizeLimit::ResolvedExternalContent)?;
    let mut contents = BTreeMap::new();
    for name in names {
        if contents.contains_key(*name) {
            continue;
        }
        let content = extractor.extract_bytes(&mut ctx, name)?;
        contents.insert((*name).to_string(), content);
    }
    debug!(
        "Resolved {} external files ({} bytes)",
        contents.len(),
        ctx.bytes_consumed()
    );
    Ok(contents)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ResolveError;
    use crate::source::ArchiveSource;
    use mtar_formats::{ArchiveBuilder, ArchiveIndex, DosDateTime};
    use mtar_storage::{BlobId, MemoryBlobStore};
    use pretty_assertions::assert_eq;

    fn setup() -> (MemoryBlobStore, ArchiveSource, ArchiveIndex) {
        let mut builder = ArchiveBuilder::new(Vec::new(), DosDateTime::EPOCH);
        builder
            .add_entry(MANIFEST_ENTRY, b"Manifest-Version: 1.0\n")
            .unwrap();
        builder
            .add_entry(DEPLOYMENT_DESCRIPTOR_ENTRY, b"_schema-version: 3\n")
            .unwrap();
        builder
            .add_entry("config/db.json", br#"{"plan":"small"}"#)
            .unwrap();
        builder.add_entry("config/big.txt", &[b'x'; 600]).unwrap();
        let store = MemoryBlobStore::new();
        store.insert(BlobId::new("pkg"), builder.finish().unwrap());
        let source = ArchiveSource::single("pkg.mtar", "pkg");
        let index = source.index(&store).unwrap();
        (store, source, index)
    }

    #[test]
    fn test_control_files() {
        let (store, source, index) = setup();
        let extractor = EntryExtractor::new(&store, &source, &index);
        let config = ResolverConfig::default();
        assert_eq!(
            extract_manifest(&config, &extractor).unwrap(),
            b"Manifest-Version: 1.0\n"
        );
        assert_eq!(
            extract_deployment_descriptor(&config, &extractor).unwrap(),
            b"_schema-version: 3\n"
        );

        let tight = ResolverConfig::default().with_max_descriptor_size(4);
        assert!(extract_manifest(&tight, &extractor).unwrap_err().is_size_limit());
    }

    #[test]
    fn test_resource_parameters() {
        let (store, source, index) = setup();
        let extractor = EntryExtractor::new(&store, &source, &index);
        let value =
            extract_resource_parameters(&ResolverConfig::default(), &extractor, "config/db.json")
                .unwrap();
        assert_eq!(value["plan"], "small");
    }

    #[test]
    fn test_external_contents_share_budget() {
        let (store, source, index) = setup();
        let extractor = EntryExtractor::new(&store, &source, &index);
        let config = ResolverConfig::default().with_max_resolved_external_content_size(700);

        let contents = extract_external_contents(
            &config,
            &extractor,
            &["config/big.txt", "config/db.json", "config/big.txt"],
        )
        .unwrap();
        assert_eq!(contents.len(), 2);

        let config = config.with_max_resolved_external_content_size(610);
        let err =
            extract_external_contents(&config, &extractor, &["config/big.txt", "config/db.json"])
                .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::SizeLimitExceeded { ref entry, limit: 610 } if entry == "config/db.json"
        ));
    }
}
