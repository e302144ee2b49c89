//! Catalog Crawler Integration Tests
//!
//! Tests for cache-backed crawling: ordering, category stamping, and
//! behavior on reruns and corrupt cache entries.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use indicatif::ProgressBar;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::watch;

use signdeck::adapters::CatalogReader;
use signdeck::config::BuildConfig;
use signdeck::core::{shutdown_channel, CacheKey, CatalogCrawler, PipelineError, ResponseCache};
use signdeck::domain::CatalogId;

/// Answers by URL suffix and counts reads
struct CountingReader {
    reads: AtomicUsize,
}

#[async_trait]
impl CatalogReader for CountingReader {
    async fn read(&self, url: &str) -> Result<Value> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        if url.contains("/collections/module/") {
            let id = url
                .rsplit('/')
                .next()
                .and_then(|s| s.split('?').next())
                .unwrap_or_default()
                .to_string();
            return Ok(json!({ "props": { "pageProps": { "moduleData": { "signList": [
                {
                    "id": format!("{}-a", id),
                    "signDefinitions": { "ja": [{ "def": "甲", "pos": "名詞" }, { "def": "乙" }] },
                    "defaultVideoUrl": "https://media.test/a.mp4"
                },
                {
                    "id": format!("{}-b", id),
                    "signDefinitions": { "ja": [{ "def": "丙", "pos": "動詞" }] },
                    "defaultVideoUrl": "https://media.test/b.mp4"
                }
            ] } } } }));
        }

        Ok(json!({ "props": { "pageProps": { "initialData": [
            { "id": 10, "title": "天気" },
            { "id": 20, "title": "食べ物" },
            { "id": 30, "title": "天気" }
        ] } } }))
    }
}

/// Requests shutdown on its second read
struct ShutdownReader {
    inner: CountingReader,
    shutdown: watch::Sender<bool>,
}

#[async_trait]
impl CatalogReader for ShutdownReader {
    async fn read(&self, url: &str) -> Result<Value> {
        if self.inner.reads.load(Ordering::SeqCst) == 1 {
            let _ = self.shutdown.send(true);
        }
        self.inner.read(url).await
    }
}

fn crawler(root: &std::path::Path, reader: Arc<CountingReader>) -> CatalogCrawler {
    let mut config = BuildConfig::with_root(root);
    config.request_delay = Duration::ZERO;
    let cache = ResponseCache::new(&config.cache_dir);
    CatalogCrawler::new(reader, cache, Arc::new(config))
}

#[tokio::test]
async fn test_crawl_preserves_catalog_order() {
    let temp = TempDir::new().unwrap();
    let reader = Arc::new(CountingReader { reads: AtomicUsize::new(0) });
    let crawler = crawler(temp.path(), reader.clone());

    let categories = crawler.list_categories().await.unwrap();
    let titles: Vec<&str> = categories.iter().map(|c| c.title.as_str()).collect();
    assert_eq!(titles, vec!["天気", "食べ物", "天気"]);

    let signs = crawler.crawl(&categories, &ProgressBar::hidden()).await.unwrap();
    let ids: Vec<&str> = signs.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["10-a", "10-b", "20-a", "20-b", "30-a", "30-b"]);

    // First definition wins; category attached from the listing
    assert_eq!(signs[0].definition, "甲");
    assert_eq!(signs[2].category_title(), "食べ物");
    assert_eq!(signs[4].category_id(), &CatalogId::new("30"));
    assert_eq!(reader.reads.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_second_crawl_reads_nothing() {
    let temp = TempDir::new().unwrap();
    let reader = Arc::new(CountingReader { reads: AtomicUsize::new(0) });

    let first = {
        let crawler = crawler(temp.path(), reader.clone());
        let categories = crawler.list_categories().await.unwrap();
        crawler.crawl(&categories, &ProgressBar::hidden()).await.unwrap()
    };
    let reads = reader.reads.load(Ordering::SeqCst);

    let crawler = crawler(temp.path(), reader.clone());
    let categories = crawler.list_categories().await.unwrap();
    let second = crawler.crawl(&categories, &ProgressBar::hidden()).await.unwrap();

    assert_eq!(reader.reads.load(Ordering::SeqCst), reads);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_corrupt_cache_entry_names_file() {
    let temp = TempDir::new().unwrap();
    let reader = Arc::new(CountingReader { reads: AtomicUsize::new(0) });
    let crawler = crawler(temp.path(), reader.clone());

    let cache = ResponseCache::new(temp.path().join("collection.media").join(".cache"));
    let path = cache.path_for(&CacheKey::Categories);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "{ not json").unwrap();

    let err = crawler.list_categories().await.unwrap_err();

    assert!(format!("{:#}", err).contains("categories.json"));
    assert_eq!(reader.reads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_interrupt_stops_crawl() {
    let temp = TempDir::new().unwrap();
    let (tx, rx) = shutdown_channel();
    let reader = Arc::new(ShutdownReader {
        inner: CountingReader { reads: AtomicUsize::new(0) },
        shutdown: tx,
    });

    let mut config = BuildConfig::with_root(temp.path());
    config.request_delay = Duration::ZERO;
    let cache = ResponseCache::new(&config.cache_dir);
    let crawler = CatalogCrawler::new(reader.clone(), cache, Arc::new(config)).with_shutdown(rx);

    let categories = crawler.list_categories().await.unwrap();
    let err = crawler
        .crawl(&categories, &ProgressBar::hidden())
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::Interrupted { .. })
    ));
    // Categories 20 and 30 are never requested
    assert_eq!(reader.inner.reads.load(Ordering::SeqCst), 2);
}
