//! itemctl - look up catalogue items through an identity cache

mod handler;

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use itemcache::IdentityCache;
use itemstore::{DataSource, FixedWidthFile, Item, MockSource, TsvFile};
use tracing::{info, warn};

use crate::handler::CommandHandler;

/// Layout of the backing source
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum SourceFormat {
    /// Tab-separated `code`, `name`, `price`
    Tsv,
    /// Header line, then a 10-column id followed by the name
    Fixed,
    /// Dummy item for every key, no file
    Mock,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Backing source format
    #[arg(short, long, value_enum, default_value_t = SourceFormat::Tsv)]
    format: SourceFormat,

    /// Backing file (ignored by the mock source)
    #[arg(short, long)]
    source: Option<PathBuf>,

    /// Load the whole source into the cache before any lookup
    #[arg(long)]
    pool: bool,

    /// Print results as JSON lines
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Look up items by key, in order
    Get {
        /// Keys to look up; repeat a key to see it served from the cache
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Check whether two keys resolve to the same instance (exit 1 if not)
    Same {
        /// First key
        first: String,
        /// Second key
        second: String,
    },
}

fn open_source(format: SourceFormat, path: Option<PathBuf>) -> Result<Box<dyn DataSource>> {
    let source: Box<dyn DataSource> = match (format, path) {
        (SourceFormat::Mock, _) => Box::new(MockSource::new()),
        (SourceFormat::Tsv, Some(path)) => Box::new(TsvFile::new(path)),
        (SourceFormat::Fixed, Some(path)) => Box::new(FixedWidthFile::new(path)),
        (format, None) => bail!("--source is required for the {:?} format", format),
    };
    Ok(source)
}

fn build_cache(source: Box<dyn DataSource>, pool: bool) -> Result<IdentityCache<String, Item>> {
    if !pool {
        return Ok(IdentityCache::from_source(source));
    }

    let cache = IdentityCache::from_pool(&source)?;
    if cache.is_empty() {
        warn!("Pool is empty; every lookup will be reported as not found");
    }
    info!("Pool loaded with {} items", cache.len());
    Ok(cache)
}

/// Execute the parsed command; false means the process should exit with 1
fn run<W: Write>(args: Args, out: &mut W) -> Result<bool> {
    let source = open_source(args.format, args.source)?;
    let handler = CommandHandler::new(build_cache(source, args.pool)?, args.json);

    match &args.command {
        Command::Get { keys } => handler.handle_get(keys, out),
        Command::Same { first, second } => handler.handle_same(first, second, out),
    }
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    info!("Source format: {:?}", args.format);
    if let Some(path) = &args.source {
        info!("Source file: {}", path.display());
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let ok = run(args, &mut out)?;

    if !ok {
        out.flush()?;
        std::process::exit(1);
    }
    Ok(())
}
