//! Command-line interface for signdeck.
//!
//! Provides commands for building the package, showing the resolved
//! configuration, and removing cached state.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{error, warn};

use crate::adapters::{Codec, FfmpegCodec, SignTownClient};
use crate::config::{self, BuildConfig, Direction, Directions};
use crate::core::{shutdown_channel, BuildReport, Orchestrator, ResponseCache};
use crate::domain::TargetFormat;

/// signdeck - Build an Anki package from the Sign Town handbook
#[derive(Parser, Debug)]
#[command(name = "signdeck")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Crawl the catalog, fetch media and write the package
    Build(BuildArgs),

    /// Show resolved configuration (debug)
    Config,

    /// Remove cached catalog responses
    Clean {
        /// Also remove downloaded and converted media
        #[arg(long)]
        media: bool,
    },
}

#[derive(clap::Args, Debug, Default)]
pub struct BuildArgs {
    /// Skip media downloads; media fields stay empty
    #[arg(long)]
    pub no_download: bool,

    /// Bundle downloaded videos as-is instead of converting them
    #[arg(long)]
    pub no_convert: bool,

    /// Media format to convert into
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Card directions to generate
    #[arg(long, value_enum)]
    pub direction: Option<DirectionArg>,

    /// Concurrent downloads and conversions
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Output archive path
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Path to the ffmpeg binary
    #[arg(long, env = "SIGNDECK_FFMPEG")]
    pub ffmpeg: Option<PathBuf>,

    /// Hide progress bars
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FormatArg {
    Avif,
    Webp,
}

impl From<FormatArg> for TargetFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Avif => TargetFormat::Avif,
            FormatArg::Webp => TargetFormat::Webp,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DirectionArg {
    /// Both card directions
    Both,

    /// Japanese word to sign
    JaToJsl,

    /// Sign to Japanese word
    JslToJa,
}

impl From<DirectionArg> for Directions {
    fn from(d: DirectionArg) -> Self {
        match d {
            DirectionArg::Both => Directions::both(),
            DirectionArg::JaToJsl => Directions::single(Direction::JaToJsl),
            DirectionArg::JslToJa => Directions::single(Direction::JslToJa),
        }
    }
}

impl BuildArgs {
    /// Apply flags on top of the loaded configuration
    pub fn apply(&self, config: &mut BuildConfig) {
        if self.no_download {
            config.download = false;
        }
        if self.no_convert {
            config.convert = false;
        }
        if let Some(format) = self.format {
            config.format = format.into();
        }
        if let Some(direction) = self.direction {
            config.directions = direction.into();
        }
        if let Some(jobs) = self.jobs {
            config.concurrency = jobs;
        }
        if let Some(ref output) = self.output {
            config.output = output.clone();
        }
        if let Some(ref ffmpeg) = self.ffmpeg {
            config.ffmpeg = Some(ffmpeg.clone());
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Build(args) => build(args).await,
            Commands::Config => show_config(),
            Commands::Clean { media } => clean(media).await,
        }
    }
}

async fn build(args: BuildArgs) -> Result<()> {
    let mut config = config::load_config()?;
    args.apply(&mut config);
    let config = Arc::new(config);

    let codec: Option<Arc<dyn Codec>> = if config.download && config.convert {
        Some(Arc::new(FfmpegCodec::locate(config.ffmpeg.as_deref())?))
    } else {
        None
    };

    let client = Arc::new(SignTownClient::new()?);

    let (tx, rx) = shutdown_channel();
    tokio::spawn(forward_interrupts(tx));

    let orchestrator = Orchestrator::new(config, client.clone(), client, codec).quiet(args.quiet);
    let report = orchestrator.run(rx).await?;

    print_report(&report);
    Ok(())
}

/// The first Ctrl-C asks the running stage to stop; a second one exits at once
async fn forward_interrupts(tx: watch::Sender<bool>) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    warn!("Interrupt received; stopping the build (press Ctrl-C again to exit now)");
    let _ = tx.send(true);

    if tokio::signal::ctrl_c().await.is_ok() {
        error!("Second interrupt received; exiting");
        std::process::exit(130);
    }
}

fn print_report(report: &BuildReport) {
    eprintln!();
    eprintln!(
        "{} categories, {} decks, {} notes, {} media files ({:.1}s)",
        report.categories,
        report.decks,
        report.notes,
        report.media_files,
        report.duration_ms as f64 / 1000.0
    );

    if !report.failed.is_empty() {
        eprintln!("{} signs without media:", report.failed.len());
        for item in &report.failed {
            eprintln!("  {} ({}): {}", item.sign_id, item.stage, item.reason);
        }
    }

    println!("{}", report.archive.display());
}

/// Show resolved configuration
fn show_config() -> Result<()> {
    let cfg = config::load_config()?;

    println!("signdeck configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Media:     {}", cfg.media_dir.display());
    println!("  Raw media: {}", cfg.raw_media_dir().display());
    println!("  Cache:     {}", cfg.cache_dir.display());
    println!("  Output:    {}", cfg.output.display());
    println!(
        "  Templates: {}",
        cfg.templates_dir
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(built-in)".to_string())
    );
    println!();
    println!("Catalog:");
    println!("  Base URL:      {}", cfg.base_url);
    println!("  Language:      {}", cfg.language);
    println!("  Sign language: {}", cfg.sign_language);
    println!("  Request delay: {}ms", cfg.request_delay.as_millis());
    println!();
    println!("Media:");
    println!("  Download:    {}", cfg.download);
    println!("  Convert:     {}", cfg.convert);
    println!("  Format:      {}", cfg.format);
    println!("  Concurrency: {}", cfg.concurrency);
    println!(
        "  ffmpeg:      {}",
        cfg.ffmpeg
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(search PATH)".to_string())
    );
    println!();
    println!("Package:");
    println!("  Deck prefix: {}", cfg.deck_prefix);
    println!("  Model name:  {}", cfg.model_name);
    let directions: Vec<&str> = cfg.directions.iter().map(|d| d.card_name()).collect();
    println!("  Directions:  {}", directions.join(", "));

    Ok(())
}

/// Remove the response cache, and optionally all media
async fn clean(media: bool) -> Result<()> {
    let cfg = config::load_config()?;

    ResponseCache::new(&cfg.cache_dir).clear().await?;
    eprintln!("Removed cache: {}", cfg.cache_dir.display());

    if media && cfg.media_dir.exists() {
        tokio::fs::remove_dir_all(&cfg.media_dir)
            .await
            .with_context(|| format!("Failed to remove media: {}", cfg.media_dir.display()))?;
        eprintln!("Removed media: {}", cfg.media_dir.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_build_flags_override_config() {
        let cli = Cli::parse_from([
            "signdeck",
            "build",
            "--no-convert",
            "--format",
            "webp",
            "--direction",
            "jsl-to-ja",
            "--jobs",
            "4",
            "--output",
            "/tmp/out.apkg",
        ]);
        let Commands::Build(args) = cli.command else {
            panic!("expected build command");
        };

        let mut config = BuildConfig::with_root(Path::new("/work"));
        args.apply(&mut config);

        assert!(config.download);
        assert!(!config.convert);
        assert_eq!(config.format, TargetFormat::Webp);
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.output, PathBuf::from("/tmp/out.apkg"));
        assert_eq!(
            config.directions.iter().copied().collect::<Vec<_>>(),
            vec![Direction::JslToJa]
        );
    }

    #[test]
    fn test_build_defaults_leave_config_alone() {
        let args = BuildArgs::default();
        let mut config = BuildConfig::with_root(Path::new("/work"));
        args.apply(&mut config);

        assert!(config.download && config.convert);
        assert_eq!(config.directions, Directions::both());
    }
}
