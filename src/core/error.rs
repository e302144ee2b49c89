//! Fatal pipeline conditions.
//!
//! Any of these aborts the build before an archive is written. Per-item
//! failures have their own error types in the acquire and transcode stages
//! and never surface here (except an interrupt).

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Catalog page unreachable: {url}: {reason}")]
    CatalogUnreachable { url: String, reason: String },

    #[error("Unrecognized catalog payload for {what}: {reason}")]
    CatalogMalformed { what: String, reason: String },

    #[error("Codec tool not found (configure a path, install ffmpeg, or place it next to the executable)")]
    CodecUnavailable,

    #[error("Template unreadable: {}: {reason}", .path.display())]
    TemplateUnreadable { path: PathBuf, reason: String },

    #[error("Interrupted during {during}")]
    Interrupted { during: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PipelineError {
    pub fn malformed(what: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::CatalogMalformed {
            what: what.into(),
            reason: reason.to_string(),
        }
    }

    pub fn interrupted(during: impl Into<String>) -> Self {
        Self::Interrupted {
            during: during.into(),
        }
    }
}
