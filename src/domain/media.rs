//! Local media files produced by the acquire and transcode stages.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::catalog::CatalogId;

/// Encodings the transcoder can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetFormat {
    /// Animated AVIF (AV1)
    Avif,

    /// Animated WebP
    Webp,
}

impl Default for TargetFormat {
    fn default() -> Self {
        Self::Avif
    }
}

impl TargetFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            TargetFormat::Avif => "avif",
            TargetFormat::Webp => "webp",
        }
    }
}

impl std::fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

impl std::str::FromStr for TargetFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "avif" => Ok(TargetFormat::Avif),
            "webp" => Ok(TargetFormat::Webp),
            _ => anyhow::bail!("Unknown target format: {}", s),
        }
    }
}

/// Whether a file is the downloaded original or a transcoded derivative
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Raw,
    Transcoded(TargetFormat),
}

/// A media file on local disk that belongs to one sign
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalMediaAsset {
    pub sign_id: CatalogId,
    pub kind: MediaKind,
    pub path: PathBuf,
}

impl LocalMediaAsset {
    pub fn new(sign_id: CatalogId, kind: MediaKind, path: impl Into<PathBuf>) -> Self {
        Self {
            sign_id,
            kind,
            path: path.into(),
        }
    }

    /// File name as it will be referenced from note fields
    pub fn file_name(&self) -> Option<&str> {
        file_name_of(&self.path)
    }
}

pub(crate) fn file_name_of(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_format_from_str() {
        assert_eq!("avif".parse::<TargetFormat>().unwrap(), TargetFormat::Avif);
        assert_eq!("WEBP".parse::<TargetFormat>().unwrap(), TargetFormat::Webp);
        assert!("gif".parse::<TargetFormat>().is_err());
    }

    #[test]
    fn test_asset_file_name() {
        let asset = LocalMediaAsset::new(
            CatalogId::new("3"),
            MediaKind::Transcoded(TargetFormat::Avif),
            "/tmp/media/3.avif",
        );
        assert_eq!(asset.file_name(), Some("3.avif"));
    }
}
