//! End-to-end package build.
//!
//! Runs crawl, acquire, transcode, assemble and write in order from one
//! immutable [`BuildConfig`]. Fatal conditions abort before an archive is
//! written; per-sign media failures are collected into the [`BuildReport`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use super::acquirer::MediaAcquirer;
use super::assembler::PackageAssembler;
use super::cache::ResponseCache;
use super::crawler::CatalogCrawler;
use super::error::PipelineError;
use super::progress::{finish_stage, stage_bar};
use super::shutdown::is_shutdown;
use super::transcoder::Transcoder;
use crate::adapters::{CatalogReader, Codec, MediaFetcher};
use crate::config::BuildConfig;
use crate::domain::{LocalMediaAsset, MediaKind, Sign};
use crate::package::TemplateSet;

/// Pipeline stage a per-sign failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Download,
    Transcode,
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureStage::Download => write!(f, "download"),
            FailureStage::Transcode => write!(f, "transcode"),
        }
    }
}

/// A sign whose media could not be produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedItem {
    pub sign_id: String,
    pub stage: FailureStage,
    pub reason: String,
}

/// Summary of a finished build
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub archive: PathBuf,
    pub categories: usize,
    pub decks: usize,
    pub notes: usize,
    pub media_files: usize,
    pub failed: Vec<FailedItem>,
    pub duration_ms: u64,
}

/// Drives one package build
pub struct Orchestrator {
    config: Arc<BuildConfig>,
    reader: Arc<dyn CatalogReader>,
    fetcher: Arc<dyn MediaFetcher>,
    codec: Option<Arc<dyn Codec>>,
    quiet: bool,
    seed: Option<u64>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<BuildConfig>,
        reader: Arc<dyn CatalogReader>,
        fetcher: Arc<dyn MediaFetcher>,
        codec: Option<Arc<dyn Codec>>,
    ) -> Self {
        Self {
            config,
            reader,
            fetcher,
            codec,
            quiet: false,
            seed: None,
        }
    }

    /// Hide progress bars
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Fix the seed for model and deck ids
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Run the whole build. Setting `shutdown` to `true` stops whichever
    /// stage is running and fails the run before any archive is written.
    #[instrument(skip_all, fields(output = %self.config.output.display()))]
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<BuildReport> {
        let started = Instant::now();
        let config = &self.config;

        config.validate().map_err(PipelineError::from)?;
        let templates = TemplateSet::load(config.templates_dir.as_deref(), &config.directions)?;

        let transcoding = config.download && config.convert;
        let codec = match (&self.codec, transcoding) {
            (Some(codec), true) => Some(Arc::clone(codec)),
            (None, true) => return Err(PipelineError::CodecUnavailable.into()),
            (_, false) => None,
        };

        // Crawl
        let crawler = CatalogCrawler::new(
            Arc::clone(&self.reader),
            ResponseCache::new(&config.cache_dir),
            Arc::clone(config),
        )
        .with_shutdown(shutdown.clone());
        let categories = crawler.list_categories().await?;
        info!(categories = categories.len(), "Listed categories");

        let pb = stage_bar(categories.len(), "Catalog", self.quiet);
        let signs = crawler.crawl(&categories, &pb).await?;
        finish_stage(&pb, "Catalog");
        info!(signs = signs.len(), "Crawled catalog");

        // Media
        let mut failed = Vec::new();
        let media = if config.download {
            let transcoder = codec.map(|codec| {
                Transcoder::new(codec, &config.media_dir, config.workers())
                    .with_shutdown(shutdown.clone())
            });
            self.resolve_media(&signs, transcoder.as_ref(), shutdown.clone(), &mut failed)
                .await?
        } else {
            info!("Downloads disabled; media fields left empty");
            vec![None; signs.len()]
        };

        // Assemble and write
        if is_shutdown(&shutdown) {
            return Err(PipelineError::interrupted("package assembly").into());
        }
        let mut assembler = PackageAssembler::new(Arc::clone(config), templates);
        if let Some(seed) = self.seed {
            assembler = assembler.with_seed(seed);
        }
        let package = assembler.assemble(&signs, &media)?;
        package
            .write_to(&config.output)
            .with_context(|| format!("Failed to build {}", config.output.display()))?;

        if !failed.is_empty() {
            warn!(failed = failed.len(), "Some signs have no media");
        }

        Ok(BuildReport {
            archive: config.output.clone(),
            categories: categories.len(),
            decks: package.decks.len(),
            notes: package.note_count(),
            media_files: package.manifest.len(),
            failed,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Download and optionally transcode media for every sign.
    ///
    /// Returns one entry per sign, in sign order.
    async fn resolve_media(
        &self,
        signs: &[Sign],
        transcoder: Option<&Transcoder>,
        shutdown: watch::Receiver<bool>,
        failed: &mut Vec<FailedItem>,
    ) -> Result<Vec<Option<LocalMediaAsset>>> {
        let config = &self.config;
        let acquirer = MediaAcquirer::new(
            Arc::clone(&self.fetcher),
            config.raw_media_dir(),
            config.workers(),
            shutdown,
        );

        // Signs already converted need no download
        let already_converted = |sign: &Sign| {
            transcoder.is_some_and(|t| t.output_path(&sign.id.file_stem(), config.format).exists())
        };
        let (done, todo): (Vec<usize>, Vec<usize>) =
            (0..signs.len()).partition(|&i| already_converted(&signs[i]));
        if !done.is_empty() {
            info!(skipped = done.len(), "Media already converted");
        }

        let pending: Vec<Sign> = todo.iter().map(|&i| signs[i].clone()).collect();
        let pb = stage_bar(pending.len(), "Download", self.quiet);
        let outcomes = acquirer.acquire_all(&pending, &pb).await?;
        finish_stage(&pb, "Download");

        let mut raws: Vec<Option<LocalMediaAsset>> = vec![None; signs.len()];
        for &idx in &done {
            let sign = &signs[idx];
            raws[idx] = Some(LocalMediaAsset::new(
                sign.id.clone(),
                MediaKind::Raw,
                acquirer.destination(sign),
            ));
        }
        for (&idx, outcome) in todo.iter().zip(outcomes) {
            match outcome {
                Ok(asset) => raws[idx] = Some(asset),
                Err(e) => failed.push(FailedItem {
                    sign_id: signs[idx].id.to_string(),
                    stage: FailureStage::Download,
                    reason: e.to_string(),
                }),
            }
        }

        let Some(transcoder) = transcoder else {
            return Ok(raws);
        };

        let pb = stage_bar(raws.iter().flatten().count(), "Convert", self.quiet);
        let results = transcoder.transcode_all(&raws, config.format, &pb).await?;
        finish_stage(&pb, "Convert");

        let media = results
            .into_iter()
            .enumerate()
            .map(|(idx, result)| match result {
                Ok(asset) => asset,
                Err(e) => {
                    failed.push(FailedItem {
                        sign_id: signs[idx].id.to_string(),
                        stage: FailureStage::Transcode,
                        reason: e.to_string(),
                    });
                    None
                }
            })
            .collect();

        Ok(media)
    }
}
