//! Core build pipeline.
//!
//! This module contains:
//! - ResponseCache: On-disk memoization of catalog payloads
//! - CatalogCrawler: Category and sign listing
//! - MediaAcquirer: Concurrent video downloads
//! - Transcoder: Video conversion through a codec
//! - PackageAssembler: Notes, decks and media manifest
//! - Orchestrator: Main execution engine
//! - shutdown: Interrupt flag observed by every stage

pub mod acquirer;
pub mod assembler;
pub mod cache;
pub mod crawler;
pub mod error;
pub mod orchestrator;
pub mod progress;
pub mod shutdown;
pub mod transcoder;

// Re-export commonly used types
pub use acquirer::{AcquireError, MediaAcquirer};
pub use assembler::PackageAssembler;
pub use cache::{CacheKey, CacheOrigin, ResponseCache};
pub use crawler::CatalogCrawler;
pub use error::PipelineError;
pub use orchestrator::{BuildReport, FailedItem, FailureStage, Orchestrator};
pub use shutdown::shutdown_channel;
pub use transcoder::{TranscodeError, TranscodeOutcome, Transcoder};
