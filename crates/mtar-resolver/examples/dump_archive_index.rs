//! Print the entry table of an application archive on disk
//!
//! ```text
//! cargo run -p mtar-resolver --example dump_archive_index -- app.mtar
//! cargo run -p mtar-resolver --example dump_archive_index -- app.mtar --module web/
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use mtar_resolver::{
    ArchiveRepackager, ArchiveSource, EntryExtractor, EntryMatch, ResolverConfig, SizeLimit,
    calculate_module_digest,
};
use mtar_storage::FileSystemBlobStore;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Index an application archive and print its entries")]
struct Args {
    /// Archive file to index
    archive: PathBuf,

    /// Only show entries of this module, and print its digest
    #[arg(short, long)]
    module: Option<String>,

    /// JSON file with resolver limits
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Repackage the module next to the archive as <module>.out
    #[arg(long, requires = "module")]
    repackage: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => ResolverConfig::from_path(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ResolverConfig::default(),
    };

    let dir = args
        .archive
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), PathBuf::from);
    let file_name = args
        .archive
        .file_name()
        .and_then(|name| name.to_str())
        .context("archive path has no file name")?;

    let store = FileSystemBlobStore::open(&dir)?;
    let source = ArchiveSource::single(file_name, file_name);
    let index = source.index(&store)?;

    let entries: Vec<_> = match &args.module {
        None => index.iter().collect(),
        Some(module) => match index.resolve(module) {
            Some(EntryMatch::File(entry)) => vec![entry],
            Some(EntryMatch::Directory { files, .. }) => files,
            None => anyhow::bail!("no entry or directory named {module}"),
        },
    };

    println!("{:>12} {:>12} {:>9}  name", "start", "end", "method");
    for entry in &entries {
        let method = format!("{:?}", entry.compression_method);
        println!(
            "{:>12} {:>12} {:>9}  {}{}",
            entry.start_offset,
            entry.end_offset,
            method,
            entry.name,
            if entry.is_directory { " (dir)" } else { "" }
        );
    }
    println!("{} entries, {} bytes", entries.len(), index.total_length());

    if let Some(module) = &args.module {
        let extractor = EntryExtractor::new(&store, &source, &index);
        let mut ctx = config.digest_context(module.as_str())?;
        let digest = calculate_module_digest(&mut ctx, &extractor)?;
        println!(
            "{} {:?} digest: {} ({} bytes)",
            module,
            config.digest_algorithm,
            digest,
            ctx.bytes_consumed()
        );

        if args.repackage {
            let mut ctx = config.context(module.as_str(), SizeLimit::Archive)?;
            let repackaged = ArchiveRepackager::new(&store).repackage(&mut ctx, &source, &index)?;
            let target = format!("{}.out", module.trim_end_matches('/').replace('/', "_"));
            let id = repackaged.stage(&store, &target)?;
            println!("wrote {}", store.blob_path(&id)?.display());
        }
    }

    Ok(())
}
