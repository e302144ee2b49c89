//! Adapter interfaces for external systems.
//!
//! Adapters hide the three things the pipeline talks to outside the
//! process: the catalog site, the media host, and the codec tool. Each is a
//! trait so the pipeline can run against in-memory doubles.

pub mod ffmpeg;
pub mod sign_town;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::domain::TargetFormat;

pub use ffmpeg::FfmpegCodec;
pub use sign_town::{SignTownClient, USER_AGENT};

/// Reads a catalog page and returns its structured payload
#[async_trait]
pub trait CatalogReader: Send + Sync {
    /// Fetch `url` and return the page's data payload.
    ///
    /// Errors are fatal for the build: an unreachable page or one without a
    /// recognizable payload leaves the catalog structure unknown.
    async fn read(&self, url: &str) -> Result<serde_json::Value>;
}

/// Errors from opening or reading a remote media stream
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Server returned HTTP {0}")]
    Status(u16),
}

/// Body of a remote media file, chunk by chunk
pub type MediaStream = BoxStream<'static, Result<Bytes, FetchError>>;

/// Opens remote media for streaming
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn open(&self, url: &str) -> Result<MediaStream, FetchError>;
}

/// Fixed encoder settings for one target format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingProfile {
    pub format: TargetFormat,
    /// Encoder library name passed as `-vcodec`
    pub video_codec: &'static str,
    /// Constant quality factor (crf for AV1, quality for WebP)
    pub quality: u32,
    pub preset: &'static str,
    pub pixel_format: &'static str,
}

impl EncodingProfile {
    pub fn for_format(format: TargetFormat) -> Self {
        match format {
            TargetFormat::Avif => Self {
                format,
                video_codec: "libsvtav1",
                quality: 22,
                preset: "4",
                pixel_format: "yuv420p",
            },
            TargetFormat::Webp => Self {
                format,
                video_codec: "libwebp",
                quality: 75,
                preset: "default",
                pixel_format: "yuv420p",
            },
        }
    }
}

/// Errors from a single encode
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Failed to start codec: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Codec exited with {code}: {stderr}", code = describe_exit(.exit_code))]
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },
}

fn describe_exit(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

/// External encoder
#[async_trait]
pub trait Codec: Send + Sync {
    /// Human-readable codec name
    fn name(&self) -> &str;

    /// Encode `input` into `output` using `profile`
    async fn encode(
        &self,
        input: &Path,
        output: &Path,
        profile: &EncodingProfile,
    ) -> Result<(), CodecError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles_per_format() {
        let avif = EncodingProfile::for_format(TargetFormat::Avif);
        assert_eq!(avif.video_codec, "libsvtav1");
        assert_eq!(avif.quality, 22);
        assert_eq!(avif.preset, "4");

        let webp = EncodingProfile::for_format(TargetFormat::Webp);
        assert_eq!(webp.format, TargetFormat::Webp);
        assert_eq!(webp.video_codec, "libwebp");
    }

    #[test]
    fn test_codec_error_display() {
        let err = CodecError::Failed {
            exit_code: Some(1),
            stderr: "bad input".to_string(),
        };
        assert_eq!(err.to_string(), "Codec exited with 1: bad input");
    }
}
