//! ffmpeg codec adapter.
//!
//! Runs the `ffmpeg` binary as a subprocess, one process per encode.
//! The binary is located by, in order: an explicitly configured path, the
//! system `PATH`, then a copy bundled next to the signdeck executable or in
//! `~/bin`.
//!
//! Children run in their own process group and are killed when the encode
//! future is dropped, so cancellation is driven by the caller alone.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{Codec, CodecError, EncodingProfile};
use crate::core::PipelineError;
use crate::domain::TargetFormat;

#[cfg(windows)]
const BINARY_NAME: &str = "ffmpeg.exe";
#[cfg(not(windows))]
const BINARY_NAME: &str = "ffmpeg";

/// Codec backed by the ffmpeg CLI
#[derive(Debug, Clone)]
pub struct FfmpegCodec {
    binary_path: PathBuf,
}

impl FfmpegCodec {
    /// Locate ffmpeg, failing the build if no copy can be found
    pub fn locate(configured: Option<&Path>) -> Result<Self, PipelineError> {
        find_ffmpeg(configured)
            .map(|binary_path| Self { binary_path })
            .ok_or(PipelineError::CodecUnavailable)
    }

    /// Create an adapter for a known binary path
    pub fn with_binary_path(binary_path: impl Into<PathBuf>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }
}

/// Find an ffmpeg binary
fn find_ffmpeg(configured: Option<&Path>) -> Option<PathBuf> {
    // 1. Explicit path
    if let Some(path) = configured {
        return path.exists().then(|| path.to_path_buf());
    }

    // 2. System PATH
    if let Ok(path) = which::which("ffmpeg") {
        return Some(path);
    }

    // 3. Bundled fallbacks
    let mut candidates = Vec::new();
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        candidates.push(dir.join(BINARY_NAME));
    }
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join("bin").join(BINARY_NAME));
    }

    candidates.into_iter().find(|c| c.exists())
}

/// Command-line arguments for one encode
pub fn ffmpeg_args(input: &Path, output: &Path, profile: &EncodingProfile) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-y".into(),
        "-i".into(),
        input.as_os_str().to_owned(),
        "-vcodec".into(),
        profile.video_codec.into(),
    ];

    match profile.format {
        TargetFormat::Avif => {
            args.extend(
                [
                    "-crf".to_string(),
                    profile.quality.to_string(),
                    "-b:v".to_string(),
                    "0".to_string(),
                ]
                .map(OsString::from),
            );
        }
        TargetFormat::Webp => {
            args.extend(
                [
                    "-quality".to_string(),
                    profile.quality.to_string(),
                    "-loop".to_string(),
                    "0".to_string(),
                ]
                .map(OsString::from),
            );
        }
    }

    args.extend(
        [
            "-preset",
            profile.preset,
            "-pix_fmt",
            profile.pixel_format,
            "-an",
            "-loglevel",
            "error",
        ]
        .map(OsString::from),
    );
    args.push(output.as_os_str().to_owned());

    args
}

#[async_trait]
impl Codec for FfmpegCodec {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn encode(
        &self,
        input: &Path,
        output: &Path,
        profile: &EncodingProfile,
    ) -> Result<(), CodecError> {
        debug!(input = %input.display(), output = %output.display(), "Running ffmpeg");

        let mut command = Command::new(&self.binary_path);
        command
            .args(ffmpeg_args(input, output, profile))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group: a terminal Ctrl-C reaches signdeck only, which
        // then cancels the encode (and kills the child) itself.
        #[cfg(unix)]
        command.process_group(0);

        let result = command.output().await?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(CodecError::Failed {
                exit_code: result.status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(())
    }
}
