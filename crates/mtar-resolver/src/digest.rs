//! Module content digests

use crate::context::ArchiveResolutionContext;
use crate::error::{ResolveError, ResolveResult};
use crate::extractor::EntryExtractor;
use mtar_formats::ArchiveEntryDescriptor;
use mtar_storage::BlobStore;
use tracing::debug;

/// Digest the content of every file of the context's module
///
/// The prefix may name a directory or a single file. Content is streamed
/// through the context's accumulator in stream order and discarded, so the
/// module's budget still applies.
///
/// # Errors
///
/// Returns [`ResolveError::MissingDigest`] if the context was created
/// without a digest algorithm.
pub fn calculate_module_digest<S: BlobStore + ?Sized>(
    ctx: &mut ArchiveResolutionContext,
    extractor: &EntryExtractor<'_, S>,
) -> ResolveResult<String> {
    if !ctx.has_digest() {
        return Err(ResolveError::MissingDigest);
    }
    let prefix = ctx.prefix().to_string();
    let digested = extractor.stream_files(
        ctx,
        &prefix,
        &mut |_: &ArchiveEntryDescriptor, _: &[u8]| -> ResolveResult<()> { Ok(()) },
    )?;
    let digest = ctx.finish_digest()?;
    debug!("Digest of {} over {} bytes: {}", prefix, digested, digest);
    Ok(digest)
}
