//! signdeck - Sign Town handbook to Anki package builder
//!
//! Crawls the Japanese Sign Language handbook catalog, downloads one video
//! per sign, converts it into a compact animated image, and writes an Anki
//! `.apkg` with one deck per category.
//!
//! # Architecture
//!
//! The build is a straight pipeline over explicit inputs:
//! - Catalog responses are memoized on disk, so reruns never refetch them
//! - Media already on disk is never fetched or converted again
//! - Per-sign media failures are reported and never abort the build
//!
//! # Modules
//!
//! - `adapters`: External system integrations (catalog site, ffmpeg)
//! - `core`: Pipeline stages (cache, crawler, acquirer, transcoder, assembler)
//! - `domain`: Data structures (Sign, Category, Note, Deck)
//! - `package`: Anki collection and archive writer
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Build the package with default settings
//! signdeck build
//!
//! # Cards only, no media
//! signdeck build --no-download
//!
//! # Drop cached catalog responses
//! signdeck clean
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod package;

// Re-export main types at crate root for convenience
pub use config::BuildConfig;
pub use core::{BuildReport, Orchestrator, PipelineError};
pub use domain::{Category, Note, Sign};
pub use package::Package;
