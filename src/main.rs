use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use static_packer::{MemoryStore, NoopHooks, PackConfig, PackHooks, Packer, RelativeUrlHooks};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Merge a compiled static site into bundles.
#[derive(Parser)]
#[command(name = "static-packer", version, about)]
struct Args {
    /// Project root holding the compiled files.
    #[arg(default_value = ".")]
    root: PathBuf,

    /// Configuration file, instead of pack.config.{json,yaml,yml} in the root.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Release directory, overriding `outputDir`.
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Write page-relative URLs for injected bundle tags.
    #[arg(long)]
    relative: bool,

    /// Log debug output.
    #[arg(short, long)]
    verbose: bool,

    /// Only log errors.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Disable colored log output.
    #[arg(long)]
    no_color: bool,
}

fn main() {
    let args = Args::parse();
    init_logger(args.verbose, args.quiet, args.no_color);

    if let Err(err) = run(&args) {
        error!("{err:#}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => PackConfig::from_path(path)?,
        None => PackConfig::discover(&args.root)?,
    };
    let out_dir = args
        .out
        .clone()
        .unwrap_or_else(|| config.output_path(&args.root));

    let store = MemoryStore::load_dir(&args.root, &config)?;
    info!("loaded {} files from {}", store.len(), args.root.display());

    let mut relative = RelativeUrlHooks;
    let mut noop = NoopHooks;
    let hooks: &mut dyn PackHooks = if args.relative { &mut relative } else { &mut noop };
    let run = Packer::new(&config)
        .run_with_hooks(store, hooks)
        .context("pack run failed")?;

    let written = run.store.write_to(&out_dir)?;
    info!(
        "{} bundles, {} files released to {}",
        run.bundles.len(),
        written,
        out_dir.display()
    );
    Ok(())
}

fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    let filter = if verbose {
        EnvFilter::new("static_packer=debug")
    } else if quiet {
        EnvFilter::new("static_packer=error")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("static_packer=info"))
    };

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_ansi(!no_color)
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
