//! Conversion of downloaded videos into the package's media format.
//!
//! Each conversion is one codec invocation. A missing input or an output
//! that already exists is a no-op. Failures are isolated to the asset that
//! caused them; a partial output is removed so the next run retries it.
//! An interrupt cancels running encodes, removes their outputs, and fails
//! the stage.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use super::error::PipelineError;
use super::shutdown::{never_shutdown, wait_for_shutdown};

use crate::adapters::{Codec, CodecError, EncodingProfile};
use crate::domain::{LocalMediaAsset, MediaKind, TargetFormat};

/// Per-asset conversion failures
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("Input has no file name: {}", .0.display())]
    InvalidInput(PathBuf),

    #[error("Failed to prepare {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("Interrupted")]
    Interrupted,
}

/// What a transcode call did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscodeOutcome {
    /// The codec produced a new file
    Encoded(LocalMediaAsset),

    /// The output was already on disk
    AlreadyPresent(LocalMediaAsset),

    /// There was nothing to convert
    SkippedMissingInput,
}

impl TranscodeOutcome {
    pub fn asset(&self) -> Option<&LocalMediaAsset> {
        match self {
            TranscodeOutcome::Encoded(asset) | TranscodeOutcome::AlreadyPresent(asset) => Some(asset),
            TranscodeOutcome::SkippedMissingInput => None,
        }
    }

    pub fn into_asset(self) -> Option<LocalMediaAsset> {
        match self {
            TranscodeOutcome::Encoded(asset) | TranscodeOutcome::AlreadyPresent(asset) => Some(asset),
            TranscodeOutcome::SkippedMissingInput => None,
        }
    }
}

/// Converts raw media with an external codec
pub struct Transcoder {
    codec: Arc<dyn Codec>,
    output_dir: PathBuf,
    workers: usize,
    shutdown: watch::Receiver<bool>,
}

impl Transcoder {
    pub fn new(codec: Arc<dyn Codec>, output_dir: impl Into<PathBuf>, workers: usize) -> Self {
        Self {
            codec,
            output_dir: output_dir.into(),
            workers: workers.max(1),
            shutdown: never_shutdown(),
        }
    }

    /// Cancel running encodes once `shutdown` turns `true`
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Where the converted form of `stem` is written
    pub fn output_path(&self, stem: &str, format: TargetFormat) -> PathBuf {
        self.output_dir.join(format!("{}.{}", stem, format.extension()))
    }

    /// Convert one raw asset into `format`
    pub async fn transcode(
        &self,
        raw: &LocalMediaAsset,
        format: TargetFormat,
    ) -> Result<TranscodeOutcome, TranscodeError> {
        let stem = raw
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| TranscodeError::InvalidInput(raw.path.clone()))?;
        let output = self.output_path(stem, format);
        let asset = LocalMediaAsset::new(raw.sign_id.clone(), MediaKind::Transcoded(format), &output);

        if output.exists() {
            debug!(sign_id = %raw.sign_id, path = %output.display(), "Transcoded media already present");
            return Ok(TranscodeOutcome::AlreadyPresent(asset));
        }

        if !raw.path.exists() {
            return Ok(TranscodeOutcome::SkippedMissingInput);
        }

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|source| TranscodeError::Io {
                path: self.output_dir.clone(),
                source,
            })?;

        let profile = EncodingProfile::for_format(format);
        let mut shutdown = self.shutdown.clone();
        let encoded = tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => Err(TranscodeError::Interrupted),
            result = self.codec.encode(&raw.path, &output, &profile) => result.map_err(TranscodeError::from),
        };

        match encoded {
            Ok(()) => Ok(TranscodeOutcome::Encoded(asset)),
            Err(e) => {
                remove_partial(&output).await;
                Err(e)
            }
        }
    }

    /// Convert many assets with bounded concurrency.
    ///
    /// The result is index-aligned with `raws`. Entries with no input come
    /// back as `Ok(None)`; failures are logged and returned in place. An
    /// interrupt fails the whole batch after every running encode has
    /// cleaned up.
    #[instrument(skip_all, fields(assets = raws.len(), workers = self.workers, format = %format))]
    pub async fn transcode_all(
        &self,
        raws: &[Option<LocalMediaAsset>],
        format: TargetFormat,
        progress: &ProgressBar,
    ) -> Result<Vec<Result<Option<LocalMediaAsset>, TranscodeError>>, PipelineError> {
        let mut slots: Vec<Result<Option<LocalMediaAsset>, TranscodeError>> =
            raws.iter().map(|_| Ok(None)).collect();

        let pending = raws
            .iter()
            .enumerate()
            .filter_map(|(idx, raw)| raw.as_ref().map(|raw| (idx, raw)));

        let mut jobs = stream::iter(pending)
            .map(|(idx, raw)| async move { (idx, raw, self.transcode(raw, format).await) })
            .buffer_unordered(self.workers);

        let mut interrupted = None;

        while let Some((idx, raw, result)) = jobs.next().await {
            progress.inc(1);
            match &result {
                Err(TranscodeError::Interrupted) => {
                    interrupted.get_or_insert_with(|| raw.sign_id.to_string());
                }
                Err(e) => {
                    warn!(sign_id = %raw.sign_id, input = %raw.path.display(), error = %e, "Transcode failed");
                }
                Ok(_) => {}
            }
            slots[idx] = result.map(TranscodeOutcome::into_asset);
        }

        if let Some(sign_id) = interrupted {
            return Err(PipelineError::interrupted(format!("conversion of sign {}", sign_id)));
        }

        Ok(slots)
    }
}

async fn remove_partial(path: &Path) {
    if path.exists() {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), error = %e, "Failed to remove partial output");
        }
    }
}
