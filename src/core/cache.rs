//! On-disk memoization of catalog payloads.
//!
//! One pretty-printed JSON file per logical request. A file that exists is
//! an authoritative hit: there is no expiry and no checksum. Files are
//! written once, after a fully successful fetch, via a temp file and rename,
//! and are only ever removed (by `clean`), never rewritten.

use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::fs;
use tracing::debug;

use crate::domain::CatalogId;

/// Logical identity of a cached catalog request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// The category list
    Categories,

    /// The sign list of one category
    CategoryItems(CatalogId),
}

impl CacheKey {
    /// File name of the cache entry
    pub fn file_name(&self) -> String {
        match self {
            CacheKey::Categories => "categories.json".to_string(),
            CacheKey::CategoryItems(id) => format!("category-{}.json", id.file_stem()),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Categories => write!(f, "categories"),
            CacheKey::CategoryItems(id) => write!(f, "category {}", id),
        }
    }
}

/// Result of a cache lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOrigin {
    Hit,
    Fetched,
}

/// File-backed response cache
#[derive(Debug, Clone)]
pub struct ResponseCache {
    root: PathBuf,
}

impl ResponseCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.file_name())
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.path_for(key).exists()
    }

    /// Return the cached payload for `key`, or run `fetch` and persist its result.
    ///
    /// A failed fetch propagates and writes nothing.
    pub async fn fetch_or_load<F, Fut>(&self, key: &CacheKey, fetch: F) -> Result<(Value, CacheOrigin)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        let path = self.path_for(key);

        if path.exists() {
            debug!(%key, path = %path.display(), "Cache hit");
            let content = fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read cache entry: {}", path.display()))?;
            let value = serde_json::from_str(&content).with_context(|| {
                format!(
                    "Corrupt cache entry (delete it to refetch): {}",
                    path.display()
                )
            })?;
            return Ok((value, CacheOrigin::Hit));
        }

        let value = fetch().await?;
        self.store(&path, &value).await?;
        debug!(%key, path = %path.display(), "Cached response");

        Ok((value, CacheOrigin::Fetched))
    }

    async fn store(&self, path: &Path, value: &Value) -> Result<()> {
        fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to create cache directory: {}", self.root.display()))?;

        let content = serde_json::to_string_pretty(value)?;
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, content)
            .await
            .with_context(|| format!("Failed to write cache entry: {}", temp_path.display()))?;
        fs::rename(&temp_path, path)
            .await
            .with_context(|| format!("Failed to move cache entry into place: {}", path.display()))?;

        Ok(())
    }

    /// Remove every cache entry
    pub async fn clear(&self) -> Result<()> {
        if !self.root.exists() {
            return Ok(());
        }

        fs::remove_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to remove cache directory: {}", self.root.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_key_file_names() {
        assert_eq!(CacheKey::Categories.file_name(), "categories.json");
        assert_eq!(
            CacheKey::CategoryItems(CatalogId::new("12")).file_name(),
            "category-12.json"
        );

        let escaped = CacheKey::CategoryItems(CatalogId::new("../x")).file_name();
        assert!(escaped.starts_with("category-___x-"));
        assert!(escaped.ends_with(".json"));
        assert!(!escaped.contains('/'));
        assert_ne!(
            escaped,
            CacheKey::CategoryItems(CatalogId::new("___x")).file_name()
        );
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let temp = TempDir::new().unwrap();
        let cache = ResponseCache::new(temp.path().join("cache"));
        let key = CacheKey::Categories;

        let (value, origin) = cache
            .fetch_or_load(&key, || async { Ok(json!({"title": "あいさつ"})) })
            .await
            .unwrap();
        assert_eq!(origin, CacheOrigin::Fetched);
        assert_eq!(value["title"], "あいさつ");
        assert!(cache.contains(&key));

        let (value, origin) = cache
            .fetch_or_load(&key, || async { anyhow::bail!("must not fetch") })
            .await
            .unwrap();
        assert_eq!(origin, CacheOrigin::Hit);
        assert_eq!(value["title"], "あいさつ");
    }

    #[tokio::test]
    async fn test_non_ascii_is_written_verbatim() {
        let temp = TempDir::new().unwrap();
        let cache = ResponseCache::new(temp.path());
        let key = CacheKey::CategoryItems(CatalogId::new("1"));

        cache
            .fetch_or_load(&key, || async { Ok(json!({"def": "手話"})) })
            .await
            .unwrap();

        let content = std::fs::read_to_string(cache.path_for(&key)).unwrap();
        assert!(content.contains("手話"));
        assert!(content.contains('\n'), "entry should be pretty-printed");
    }

    #[tokio::test]
    async fn test_failed_fetch_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let cache = ResponseCache::new(temp.path());
        let key = CacheKey::Categories;

        let result = cache
            .fetch_or_load(&key, || async { anyhow::bail!("offline") })
            .await;

        assert!(result.is_err());
        assert!(!cache.contains(&key));
    }

    #[tokio::test]
    async fn test_clear() {
        let temp = TempDir::new().unwrap();
        let cache = ResponseCache::new(temp.path().join("cache"));
        let key = CacheKey::Categories;

        cache
            .fetch_or_load(&key, || async { Ok(json!([])) })
            .await
            .unwrap();
        cache.clear().await.unwrap();

        assert!(!cache.contains(&key));
        cache.clear().await.unwrap();
    }
}
