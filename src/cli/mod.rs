//! CLI subcommand definitions and handlers.
//!
//! Uses clap derive to define the subcommand hierarchy:
//! - `clean [INPUT]` -- sanitize markup from a file or stdin
//! - `config show|path|schema` -- inspect configuration
//! - `version` -- print build/version info

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::config::{self, Config};
use crate::logging;
use crate::media::{AssetStore, DirAssetStore, MemoryAssetStore, OutputFormat, TracingProgress};
use crate::pipeline::{SanitizeReport, Sanitizer};

/// Sanitize pasted rich-text markup and localize its images.
#[derive(Parser, Debug)]
#[command(
    name = "pasteclean",
    version = env!("CARGO_PKG_VERSION"),
    about = "Sanitize pasted rich-text markup and localize its images"
)]
pub struct Cli {
    /// Config file (default: $PASTECLEAN_CONFIG or the platform config dir).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sanitize markup and store referenced images.
    Clean(CleanArgs),

    /// Inspect configuration.
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Print version, build date, and git commit information.
    Version,
}

#[derive(Args, Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanArgs {
    /// Input file; stdin when absent or "-".
    pub input: Option<PathBuf>,

    /// Output file; stdout when absent.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Directory stored images are written to.
    #[arg(long)]
    pub media_dir: Option<PathBuf>,

    /// Encoding of stored images.
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// JPEG quality (1-100).
    #[arg(long)]
    pub quality: Option<u32>,

    /// Keep image sources untouched.
    #[arg(long)]
    pub no_media: bool,

    /// Refuse images referenced by local path or file URL.
    #[arg(long)]
    pub deny_local_files: bool,

    /// Decode and store data: URIs too.
    #[arg(long)]
    pub store_inline_data: bool,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the fully loaded configuration as JSON.
    Show,

    /// Print the resolved configuration file path.
    Path,

    /// Print the JSON schema of the configuration file.
    Schema,
}

// ---------------------------------------------------------------------------
// Subcommand handlers
// ---------------------------------------------------------------------------

/// Run the `clean` subcommand.
pub fn handle_clean(
    config_path: Option<&Path>,
    args: &CleanArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut cfg = config::load_config(config_path)?;
    apply_clean_overrides(&mut cfg, args);
    logging::init_logging(&cfg.logging)?;

    let raw = read_input(args.input.as_deref())?;
    let report = run_clean(&cfg, &raw)?;

    for irregularity in &report.irregularities {
        tracing::debug!(%irregularity, "repaired markup");
    }
    tracing::info!(
        irregularities = report.irregularities.len(),
        images = report.media.len(),
        stored = report.stored().count(),
        failed = report.failures().count(),
        "sanitized input"
    );

    write_output(args.output.as_deref(), &report.html)?;
    Ok(())
}

/// Sanitize `raw` with the store configured in `cfg`.
pub fn run_clean(cfg: &Config, raw: &str) -> Result<SanitizeReport, Box<dyn std::error::Error>> {
    let store: Arc<dyn AssetStore> = if cfg.media.enabled {
        Arc::new(DirAssetStore::new(cfg.media.media_dir())?)
    } else {
        Arc::new(MemoryAssetStore::new())
    };
    let sanitizer = Sanitizer::from_config(cfg, store)?;
    Ok(sanitizer.sanitize_with(raw, &TracingProgress, &CancellationToken::new()))
}

/// Command-line flags take precedence over the config file.
pub fn apply_clean_overrides(cfg: &mut Config, args: &CleanArgs) {
    if let Some(dir) = &args.media_dir {
        cfg.media.media_dir = Some(dir.clone());
    }
    if let Some(format) = args.format {
        cfg.media.format = format;
    }
    if let Some(quality) = args.quality {
        cfg.media.jpeg_quality = quality;
    }
    if args.no_media {
        cfg.media.enabled = false;
    }
    if args.deny_local_files {
        cfg.media.allow_local_files = false;
    }
    if args.store_inline_data {
        cfg.media.store_inline_data = true;
    }
}

/// Run the `config show` subcommand.
pub fn handle_config_show(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let cfg = config::load_config(config_path)?;
    let pretty = serde_json::to_string_pretty(&cfg)?;
    println!("{}", pretty);
    Ok(())
}

/// Run the `config path` subcommand.
pub fn handle_config_path(config_path: Option<&Path>) {
    println!("{}", config::resolve_config_path(config_path).display());
}

/// Run the `config schema` subcommand.
pub fn handle_config_schema() -> Result<(), Box<dyn std::error::Error>> {
    let schema = config::schema::generate_config_schema();
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

/// Run the `version` subcommand.
pub fn handle_version() {
    println!("pasteclean {}", env!("CARGO_PKG_VERSION"));
    println!("  Build date: {}", env!("PASTECLEAN_BUILD_DATE"));
    println!("  Git commit: {}", env!("PASTECLEAN_GIT_HASH"));
    println!(
        "  Platform:   {} ({})",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_input(input: Option<&Path>) -> std::io::Result<String> {
    match input {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path),
        _ => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

fn write_output(output: Option<&Path>, html: &str) -> std::io::Result<()> {
    match output {
        Some(path) => std::fs::write(path, html),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(html.as_bytes())?;
            if !html.ends_with('\n') {
                stdout.write_all(b"\n")?;
            }
            stdout.flush()
        }
    }
}
