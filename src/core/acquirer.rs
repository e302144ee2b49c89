//! Concurrent media acquisition.
//!
//! Downloads one video per sign into the raw media directory with a bounded
//! number of transfers in flight. A destination file that already exists is
//! taken as done; this at-most-once-per-run check is the only coordination
//! between runs, so two builds sharing a media directory at the same time
//! are unsupported.
//!
//! Transfers stream into `<dest>.part` and are renamed into place only when
//! complete. A failed transfer removes its partial file and is reported for
//! that sign alone. An interrupt removes the partial file and aborts the run.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use super::error::PipelineError;
use super::shutdown::wait_for_shutdown;
use crate::adapters::{FetchError, MediaFetcher};
use crate::domain::{LocalMediaAsset, MediaKind, Sign};

const DEFAULT_EXTENSION: &str = "mp4";

/// Per-sign download failures
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("Sign has no media URL")]
    NoUrl,

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Interrupted")]
    Interrupted,
}

/// File extension for a media URL (`mp4` when the URL has none)
pub fn url_extension(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .and_then(|name| {
            Path::new(&name)
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase)
        })
        .filter(|e| !e.is_empty() && e.len() <= 5 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// Downloads sign videos
pub struct MediaAcquirer {
    fetcher: Arc<dyn MediaFetcher>,
    dest_dir: PathBuf,
    workers: usize,
    shutdown: watch::Receiver<bool>,
}

impl MediaAcquirer {
    pub fn new(
        fetcher: Arc<dyn MediaFetcher>,
        dest_dir: impl Into<PathBuf>,
        workers: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            fetcher,
            dest_dir: dest_dir.into(),
            workers: workers.max(1),
            shutdown,
        }
    }

    /// Local path the sign's video is downloaded to
    pub fn destination(&self, sign: &Sign) -> PathBuf {
        self.dest_dir.join(format!(
            "{}.{}",
            sign.id.file_stem(),
            url_extension(&sign.video_url)
        ))
    }

    /// Download the video of one sign unless it is already on disk
    pub async fn acquire(&self, sign: &Sign) -> Result<LocalMediaAsset, AcquireError> {
        let dest = self.destination(sign);
        let asset = LocalMediaAsset::new(sign.id.clone(), MediaKind::Raw, &dest);

        if dest.exists() {
            debug!(sign_id = %sign.id, path = %dest.display(), "Media already present");
            return Ok(asset);
        }

        if sign.video_url.trim().is_empty() {
            return Err(AcquireError::NoUrl);
        }

        fs::create_dir_all(&self.dest_dir)
            .await
            .map_err(|source| AcquireError::Io {
                path: self.dest_dir.clone(),
                source,
            })?;

        let mut part = dest.clone().into_os_string();
        part.push(".part");
        let part = PathBuf::from(part);

        let result = match self.download(&sign.video_url, &part).await {
            Ok(bytes) => fs::rename(&part, &dest)
                .await
                .map(|_| bytes)
                .map_err(|source| AcquireError::Io {
                    path: dest.clone(),
                    source,
                }),
            Err(e) => Err(e),
        };

        match result {
            Ok(bytes) => {
                debug!(sign_id = %sign.id, bytes, "Downloaded media");
                Ok(asset)
            }
            Err(e) => {
                if part.exists() {
                    if let Err(err) = fs::remove_file(&part).await {
                        warn!(path = %part.display(), error = %err, "Failed to remove partial download");
                    }
                }
                Err(e)
            }
        }
    }

    async fn download(&self, url: &str, part: &Path) -> Result<u64, AcquireError> {
        let mut shutdown = self.shutdown.clone();
        let io_err = |source: std::io::Error| AcquireError::Io {
            path: part.to_path_buf(),
            source,
        };

        let mut body = tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => return Err(AcquireError::Interrupted),
            opened = self.fetcher.open(url) => opened?,
        };

        let mut file = File::create(part).await.map_err(io_err)?;
        let mut written = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => return Err(AcquireError::Interrupted),
                chunk = body.next() => match chunk {
                    Some(chunk) => {
                        let chunk = chunk?;
                        file.write_all(&chunk).await.map_err(io_err)?;
                        written += chunk.len() as u64;
                    }
                    None => break,
                },
            }
        }

        file.flush().await.map_err(io_err)?;
        Ok(written)
    }

    /// Download every sign's video with bounded concurrency.
    ///
    /// The returned vector is index-aligned with `signs` regardless of the
    /// order transfers finish in. Per-sign failures are logged and returned
    /// in place. An interrupt aborts the whole batch once every in-flight
    /// transfer has removed its partial file.
    #[instrument(skip_all, fields(signs = signs.len(), workers = self.workers))]
    pub async fn acquire_all(
        &self,
        signs: &[Sign],
        progress: &ProgressBar,
    ) -> Result<Vec<Result<LocalMediaAsset, AcquireError>>, PipelineError> {
        let mut slots: Vec<Option<Result<LocalMediaAsset, AcquireError>>> =
            signs.iter().map(|_| None).collect();

        let mut transfers = stream::iter(signs.iter().enumerate())
            .map(|(idx, sign)| async move { (idx, self.acquire(sign).await) })
            .buffer_unordered(self.workers);

        let mut interrupted = None;

        while let Some((idx, result)) = transfers.next().await {
            let sign = &signs[idx];
            progress.inc(1);

            match &result {
                Err(AcquireError::Interrupted) => {
                    interrupted.get_or_insert_with(|| sign.id.to_string());
                }
                Err(e) => {
                    warn!(sign_id = %sign.id, url = %sign.video_url, error = %e, "Media download failed");
                }
                Ok(_) => {}
            }

            slots[idx] = Some(result);
        }

        if let Some(sign_id) = interrupted {
            return Err(PipelineError::interrupted(format!("download of sign {}", sign_id)));
        }

        let outcomes: Vec<_> = slots.into_iter().flatten().collect();
        debug_assert_eq!(outcomes.len(), signs.len());
        Ok(outcomes)
    }
}
