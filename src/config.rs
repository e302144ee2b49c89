//! Configuration for a package build.
//!
//! Configuration sources (highest priority first):
//! 1. Command-line flags (applied by the CLI on top of the loaded config)
//! 2. Environment variables (SIGNDECK_HOME, SIGNDECK_MEDIA_DIR, SIGNDECK_FFMPEG)
//! 3. Config file (.signdeck/config.yaml)
//! 4. Defaults (current directory)
//!
//! Config file discovery:
//! - Searches current directory and parents for .signdeck/config.yaml
//! - Paths in config file are relative to the config file's project root
//!
//! The result is an immutable [`BuildConfig`] that every pipeline component
//! receives explicitly; there is no process-wide configuration state.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::TargetFormat;

pub const DEFAULT_BASE_URL: &str = "https://handbook.sign.town";
pub const DEFAULT_TITLE: &str = "手話タウンハンドブック";

/// Invalid configuration values
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("At least one card direction must be selected")]
    NoDirections,

    #[error("Unknown card direction: {0}")]
    UnknownDirection(String),

    #[error("Concurrency must be at least 1")]
    NoWorkers,
}

/// Card direction (one presentation variant of the note model)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Japanese word on the front, sign video on the back
    JaToJsl,

    /// Sign video on the front, Japanese word on the back
    JslToJa,
}

impl Direction {
    pub fn card_name(&self) -> &'static str {
        match self {
            Direction::JaToJsl => "JA->JSL",
            Direction::JslToJa => "JSL->JA",
        }
    }

    /// Base name of the template files for this direction
    pub fn template_stem(&self) -> &'static str {
        match self {
            Direction::JaToJsl => "ja2jsl",
            Direction::JslToJa => "jsl2ja",
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, ConfigError> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "ja-to-jsl" | "ja2jsl" => Ok(Direction::JaToJsl),
            "jsl-to-ja" | "jsl2ja" => Ok(Direction::JslToJa),
            _ => Err(ConfigError::UnknownDirection(s.to_string())),
        }
    }
}

/// Non-empty, ordered, duplicate-free set of card directions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directions(Vec<Direction>);

impl Directions {
    pub fn new(directions: impl IntoIterator<Item = Direction>) -> Result<Self, ConfigError> {
        let mut unique = Vec::new();
        for direction in directions {
            if !unique.contains(&direction) {
                unique.push(direction);
            }
        }

        if unique.is_empty() {
            return Err(ConfigError::NoDirections);
        }

        Ok(Self(unique))
    }

    pub fn both() -> Self {
        Self(vec![Direction::JaToJsl, Direction::JslToJa])
    }

    pub fn single(direction: Direction) -> Self {
        Self(vec![direction])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Direction> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub catalog: Option<CatalogConfig>,
    #[serde(default)]
    pub media: Option<MediaConfig>,
    #[serde(default)]
    pub package: Option<PackageConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Media directory (relative to project root)
    pub media: Option<String>,
    /// Response cache directory (relative to project root)
    pub cache: Option<String>,
    /// Output archive path (relative to project root)
    pub output: Option<String>,
    /// Directory overriding the built-in card templates
    pub templates: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogConfig {
    pub base_url: Option<String>,
    pub language: Option<String>,
    pub sign_language: Option<String>,
    pub request_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaConfig {
    pub download: Option<bool>,
    pub convert: Option<bool>,
    pub format: Option<TargetFormat>,
    pub concurrency: Option<usize>,
    pub ffmpeg: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageConfig {
    pub deck_prefix: Option<String>,
    pub model_name: Option<String>,
    pub directions: Option<Vec<Direction>>,
}

/// Resolved, immutable configuration for one build
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Catalog site root
    pub base_url: String,
    /// Site language (also selects the definition language)
    pub language: String,
    /// Sign language code passed as `sl=`
    pub sign_language: String,
    /// Pause between catalog requests that reach the network
    pub request_delay: Duration,

    /// Directory holding downloaded and transcoded media
    pub media_dir: PathBuf,
    /// Directory holding cached catalog payloads
    pub cache_dir: PathBuf,
    /// Path of the archive to write
    pub output: PathBuf,
    /// Directory overriding built-in templates
    pub templates_dir: Option<PathBuf>,

    /// Download sign videos
    pub download: bool,
    /// Transcode downloaded videos into `format`
    pub convert: bool,
    pub format: TargetFormat,
    /// Worker budget for downloads and transcodes
    pub concurrency: usize,
    /// Explicit codec tool path
    pub ffmpeg: Option<PathBuf>,

    pub deck_prefix: String,
    pub model_name: String,
    pub directions: Directions,

    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl BuildConfig {
    /// Defaults rooted at `root`
    pub fn with_root(root: &Path) -> Self {
        let media_dir = root.join("collection.media");
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            language: "ja".to_string(),
            sign_language: "JSL".to_string(),
            request_delay: Duration::from_millis(200),
            cache_dir: media_dir.join(".cache"),
            media_dir,
            output: root.join(format!("{}.apkg", DEFAULT_TITLE)),
            templates_dir: None,
            download: true,
            convert: true,
            format: TargetFormat::default(),
            concurrency: 16,
            ffmpeg: None,
            deck_prefix: DEFAULT_TITLE.to_string(),
            model_name: "JSL".to_string(),
            directions: Directions::both(),
            config_file: None,
        }
    }

    /// Directory where untranscoded downloads are kept
    pub fn raw_media_dir(&self) -> PathBuf {
        self.media_dir.join("raw")
    }

    /// Catalog page listing every category
    pub fn categories_url(&self) -> String {
        format!(
            "{}/{}/collections?sl={}",
            self.base_url.trim_end_matches('/'),
            self.language,
            self.sign_language
        )
    }

    /// Catalog page listing the signs of one category
    pub fn category_url(&self, category_id: &str) -> String {
        format!(
            "{}/{}/collections/module/{}?sl={}",
            self.base_url.trim_end_matches('/'),
            self.language,
            category_id,
            self.sign_language
        )
    }

    /// Worker budget, never below one
    pub fn workers(&self) -> usize {
        self.concurrency.max(1)
    }

    /// Check values that cannot be enforced by their types alone
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.directions.is_empty() {
            return Err(ConfigError::NoDirections);
        }
        if self.concurrency == 0 {
            return Err(ConfigError::NoWorkers);
        }
        Ok(())
    }

    /// Move the media directory. The cache directory moves along unless it
    /// was already placed somewhere other than `<media>/.cache`.
    pub fn set_media_dir(&mut self, media_dir: PathBuf) {
        if self.cache_dir == self.media_dir.join(".cache") {
            self.cache_dir = media_dir.join(".cache");
        }
        self.media_dir = media_dir;
    }

    /// Apply environment overrides read through `var`
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(home) = var("SIGNDECK_HOME") {
            self.set_media_dir(PathBuf::from(home).join("collection.media"));
        }
        if let Some(media) = var("SIGNDECK_MEDIA_DIR") {
            self.set_media_dir(PathBuf::from(media));
        }
        if let Some(ffmpeg) = var("SIGNDECK_FFMPEG") {
            self.ffmpeg = Some(PathBuf::from(ffmpeg));
        }
    }

    fn apply_file(&mut self, file: ConfigFile, base_dir: &Path) -> Result<(), ConfigError> {
        if let Some(ref media) = file.paths.media {
            self.set_media_dir(resolve_path(base_dir, media));
        }
        if let Some(ref cache) = file.paths.cache {
            self.cache_dir = resolve_path(base_dir, cache);
        }
        if let Some(ref output) = file.paths.output {
            self.output = resolve_path(base_dir, output);
        }
        if let Some(ref templates) = file.paths.templates {
            self.templates_dir = Some(resolve_path(base_dir, templates));
        }

        if let Some(catalog) = file.catalog {
            if let Some(base_url) = catalog.base_url {
                self.base_url = base_url;
            }
            if let Some(language) = catalog.language {
                self.language = language;
            }
            if let Some(sign_language) = catalog.sign_language {
                self.sign_language = sign_language;
            }
            if let Some(delay) = catalog.request_delay_ms {
                self.request_delay = Duration::from_millis(delay);
            }
        }

        if let Some(media) = file.media {
            self.download = media.download.unwrap_or(self.download);
            self.convert = media.convert.unwrap_or(self.convert);
            self.format = media.format.unwrap_or(self.format);
            self.concurrency = media.concurrency.unwrap_or(self.concurrency);
            if let Some(ref ffmpeg) = media.ffmpeg {
                self.ffmpeg = Some(resolve_path(base_dir, ffmpeg));
            }
        }

        if let Some(package) = file.package {
            if let Some(prefix) = package.deck_prefix {
                self.deck_prefix = prefix;
            }
            if let Some(name) = package.model_name {
                self.model_name = name;
            }
            if let Some(directions) = package.directions {
                self.directions = Directions::new(directions)?;
            }
        }

        Ok(())
    }
}

/// Find config file by searching current directory and parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(".signdeck").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the project root
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Load configuration from the config file, environment and defaults,
/// searching for `.signdeck/config.yaml` upward from `start`
pub fn load_config_from(start: &Path) -> Result<BuildConfig> {
    let mut config = BuildConfig::with_root(start);

    let config_file = find_config_file(start);
    if let Some(ref config_path) = config_file {
        let file = load_config_file(config_path)?;

        // Base directory is the parent of .signdeck/ (i.e., grandparent of config.yaml)
        let base_dir = config_path
            .parent()
            .and_then(|p| p.parent())
            .unwrap_or(Path::new("."));

        config
            .apply_file(file, base_dir)
            .with_context(|| format!("Invalid config file: {}", config_path.display()))?;
    }
    config.config_file = config_file;

    config.apply_env(|name| std::env::var(name).ok());

    Ok(config)
}

/// Load configuration relative to the current directory
pub fn load_config() -> Result<BuildConfig> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    load_config_from(&cwd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = BuildConfig::with_root(Path::new("/work"));

        assert_eq!(config.media_dir, PathBuf::from("/work/collection.media"));
        assert_eq!(config.cache_dir, PathBuf::from("/work/collection.media/.cache"));
        assert_eq!(config.raw_media_dir(), PathBuf::from("/work/collection.media/raw"));
        assert_eq!(config.directions.len(), 2);
        assert!(config.download && config.convert);
        assert_eq!(config.workers(), 16);
    }

    #[test]
    fn test_catalog_urls() {
        let config = BuildConfig::with_root(Path::new("/work"));

        assert_eq!(
            config.categories_url(),
            "https://handbook.sign.town/ja/collections?sl=JSL"
        );
        assert_eq!(
            config.category_url("12"),
            "https://handbook.sign.town/ja/collections/module/12?sl=JSL"
        );
    }

    #[test]
    fn test_workers_never_zero() {
        let mut config = BuildConfig::with_root(Path::new("/work"));
        config.concurrency = 0;
        assert_eq!(config.workers(), 1);
        assert_eq!(config.validate(), Err(ConfigError::NoWorkers));
    }

    #[test]
    fn test_directions_rejects_empty() {
        assert_eq!(Directions::new(Vec::new()), Err(ConfigError::NoDirections));

        let single = Directions::new([Direction::JslToJa, Direction::JslToJa]).unwrap();
        assert_eq!(single.len(), 1);
    }

    #[test]
    fn test_direction_from_str() {
        assert_eq!("ja-to-jsl".parse::<Direction>().unwrap(), Direction::JaToJsl);
        assert_eq!("jsl_to_ja".parse::<Direction>().unwrap(), Direction::JslToJa);
        assert!("both".parse::<Direction>().is_err());
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join(".signdeck");
        std::fs::create_dir_all(&dir).unwrap();

        let config_path = dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1"
paths:
  media: ./media
  output: out/deck.apkg
catalog:
  request_delay_ms: 0
media:
  format: webp
  concurrency: 4
package:
  deck_prefix: JSL
  directions: [jsl_to_ja]
"#
        )
        .unwrap();

        let parsed = load_config_file(&config_path).unwrap();
        let mut config = BuildConfig::with_root(temp.path());
        config.apply_file(parsed, temp.path()).unwrap();

        assert_eq!(config.media_dir, temp.path().join("./media"));
        assert_eq!(config.cache_dir, temp.path().join("./media").join(".cache"));
        assert_eq!(config.output, temp.path().join("out/deck.apkg"));
        assert_eq!(config.request_delay, Duration::ZERO);
        assert_eq!(config.format, TargetFormat::Webp);
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.deck_prefix, "JSL");
        assert_eq!(
            config.directions.iter().copied().collect::<Vec<_>>(),
            vec![Direction::JslToJa]
        );
    }

    #[test]
    fn test_env_media_dir_keeps_configured_cache() {
        let file: ConfigFile = serde_yaml::from_str("paths:\n  cache: /srv/cache\n").unwrap();
        let mut config = BuildConfig::with_root(Path::new("/work"));
        config.apply_file(file, Path::new("/work")).unwrap();

        config.apply_env(|name| match name {
            "SIGNDECK_MEDIA_DIR" => Some("/data/media".to_string()),
            _ => None,
        });

        assert_eq!(config.media_dir, PathBuf::from("/data/media"));
        assert_eq!(config.cache_dir, PathBuf::from("/srv/cache"));
    }

    #[test]
    fn test_env_home_moves_derived_cache() {
        let mut config = BuildConfig::with_root(Path::new("/work"));

        config.apply_env(|name| match name {
            "SIGNDECK_HOME" => Some("/home/deck".to_string()),
            "SIGNDECK_FFMPEG" => Some("/opt/ffmpeg".to_string()),
            _ => None,
        });

        assert_eq!(config.media_dir, PathBuf::from("/home/deck/collection.media"));
        assert_eq!(config.cache_dir, PathBuf::from("/home/deck/collection.media/.cache"));
        assert_eq!(config.ffmpeg, Some(PathBuf::from("/opt/ffmpeg")));
    }

    #[test]
    fn test_config_file_with_no_directions_is_invalid() {
        let file: ConfigFile = serde_yaml::from_str("package:\n  directions: []\n").unwrap();
        let mut config = BuildConfig::with_root(Path::new("/work"));
        assert_eq!(
            config.apply_file(file, Path::new("/work")),
            Err(ConfigError::NoDirections)
        );
    }

    #[test]
    fn test_find_config_file_walks_up() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join(".signdeck");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.yaml"), "version: \"1\"\n").unwrap();

        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_config_file(&nested), Some(dir.join("config.yaml")));
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/./subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
