//! Catalog crawler.
//!
//! Walks the category list, then each category's sign list, validating raw
//! payloads into typed entities. Every request goes through the response
//! cache, so a repeated crawl of an unchanged catalog touches the network
//! zero times. Any unrecognized payload is fatal, and so is an interrupt.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use indicatif::ProgressBar;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{info, instrument};

use super::cache::{CacheKey, CacheOrigin, ResponseCache};
use super::error::PipelineError;
use super::shutdown::{never_shutdown, wait_for_shutdown};
use crate::adapters::CatalogReader;
use crate::config::BuildConfig;
use crate::domain::{CatalogId, Category, Sign, SignRecord};

const CATEGORIES_POINTER: &str = "/props/pageProps/initialData";
const SIGN_LIST_POINTER: &str = "/props/pageProps/moduleData/signList";

#[derive(Debug, Deserialize)]
struct RawCategory {
    id: CatalogId,
    title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSign {
    id: CatalogId,
    sign_definitions: HashMap<String, Vec<RawDefinition>>,
    default_video_url: String,
}

#[derive(Debug, Deserialize)]
struct RawDefinition {
    def: String,
    #[serde(default)]
    pos: String,
}

/// Extract the category list from a catalog root payload
pub fn parse_categories(payload: &Value) -> Result<Vec<Category>, PipelineError> {
    let list = payload
        .pointer(CATEGORIES_POINTER)
        .ok_or_else(|| PipelineError::malformed("category list", "missing initialData"))?;

    let raw: Vec<RawCategory> = serde_json::from_value(list.clone())
        .map_err(|e| PipelineError::malformed("category list", e))?;

    Ok(raw
        .into_iter()
        .map(|c| Category {
            id: c.id,
            title: c.title,
        })
        .collect())
}

/// Extract the sign list from a category payload.
///
/// The first definition in `language` supplies the definition text and
/// part of speech.
pub fn parse_signs(
    payload: &Value,
    category: &Category,
    language: &str,
) -> Result<Vec<Sign>, PipelineError> {
    let what = format!("category {} ({})", category.id, category.title);

    let list = payload
        .pointer(SIGN_LIST_POINTER)
        .ok_or_else(|| PipelineError::malformed(&what, "missing moduleData.signList"))?;

    let raw: Vec<RawSign> = serde_json::from_value(list.clone())
        .map_err(|e| PipelineError::malformed(&what, e))?;

    raw.into_iter()
        .map(|sign| {
            let definition = sign
                .sign_definitions
                .get(language)
                .and_then(|defs| defs.first())
                .ok_or_else(|| {
                    PipelineError::malformed(
                        &what,
                        format!("sign {} has no '{}' definition", sign.id, language),
                    )
                })?;

            Ok(SignRecord {
                id: sign.id.clone(),
                definition: definition.def.clone(),
                pos: definition.pos.clone(),
                video_url: sign.default_video_url,
            }
            .place_in(category))
        })
        .collect()
}

/// Walks the remote catalog through the response cache
pub struct CatalogCrawler {
    reader: Arc<dyn CatalogReader>,
    cache: ResponseCache,
    config: Arc<BuildConfig>,
    shutdown: watch::Receiver<bool>,
}

impl CatalogCrawler {
    pub fn new(reader: Arc<dyn CatalogReader>, cache: ResponseCache, config: Arc<BuildConfig>) -> Self {
        Self {
            reader,
            cache,
            config,
            shutdown: never_shutdown(),
        }
    }

    /// Abandon the crawl once `shutdown` turns `true`
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    async fn load(&self, key: &CacheKey, url: String) -> Result<(Value, CacheOrigin)> {
        let reader = Arc::clone(&self.reader);
        self.cache
            .fetch_or_load(key, || async move { reader.read(&url).await })
            .await
    }

    /// List every category in catalog order
    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        let mut shutdown = self.shutdown.clone();
        let (payload, _) = tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => {
                return Err(PipelineError::interrupted("category listing").into());
            }
            loaded = self.load(&CacheKey::Categories, self.config.categories_url()) => loaded?,
        };

        Ok(parse_categories(&payload)?)
    }

    /// List the signs of one category, each stamped with the category
    pub async fn list_signs(&self, category: &Category) -> Result<Vec<Sign>> {
        Ok(self.list_signs_with_origin(category).await?.0)
    }

    async fn list_signs_with_origin(&self, category: &Category) -> Result<(Vec<Sign>, CacheOrigin)> {
        let key = CacheKey::CategoryItems(category.id.clone());
        let (payload, origin) = self
            .load(&key, self.config.category_url(category.id.as_str()))
            .await?;

        let signs = parse_signs(&payload, category, &self.config.language)?;
        Ok((signs, origin))
    }

    /// List the signs of every category, sequentially and in catalog order.
    ///
    /// Requests that reach the network are spaced by the configured delay;
    /// cache hits are not throttled.
    #[instrument(skip_all, fields(categories = categories.len()))]
    pub async fn crawl(&self, categories: &[Category], progress: &ProgressBar) -> Result<Vec<Sign>> {
        let mut shutdown = self.shutdown.clone();
        let mut signs = Vec::new();

        for (idx, category) in categories.iter().enumerate() {
            let (found, origin) = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => {
                    return Err(PipelineError::interrupted(format!("crawl of category {}", category.id)).into());
                }
                listed = self.list_signs_with_origin(category) => listed?,
            };

            info!(
                category = %category.title,
                signs = found.len(),
                cached = origin == CacheOrigin::Hit,
                "Loaded category"
            );
            signs.extend(found);
            progress.inc(1);

            let more = idx + 1 < categories.len();
            if more && origin == CacheOrigin::Fetched && !self.config.request_delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = wait_for_shutdown(&mut shutdown) => {
                        return Err(PipelineError::interrupted("crawl delay").into());
                    }
                    _ = tokio::time::sleep(self.config.request_delay) => {}
                }
            }
        }

        Ok(signs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn module_payload(signs: Value) -> Value {
        json!({"props": {"pageProps": {"moduleData": {"signList": signs}}}})
    }

    #[test]
    fn test_parse_categories() {
        let payload = json!({"props": {"pageProps": {"initialData": [
            {"id": 1, "title": "あいさつ", "extra": true},
            {"id": "2", "title": "家族"}
        ]}}});

        let categories = parse_categories(&payload).unwrap();
        assert_eq!(categories, vec![Category::new("1", "あいさつ"), Category::new("2", "家族")]);
    }

    #[test]
    fn test_parse_categories_malformed() {
        assert!(parse_categories(&json!({"props": {}})).is_err());
        assert!(parse_categories(&json!({"props": {"pageProps": {"initialData": {"id": 1}}}})).is_err());
    }

    #[test]
    fn test_parse_signs() {
        let category = Category::new("3", "数字");
        let payload = module_payload(json!([{
            "id": 10,
            "signDefinitions": {"ja": [{"def": "いち", "pos": "名詞"}, {"def": "ひとつ", "pos": "名詞"}]},
            "defaultVideoUrl": "https://cdn.example/10.mp4"
        }]));

        let signs = parse_signs(&payload, &category, "ja").unwrap();
        assert_eq!(signs.len(), 1);
        assert_eq!(signs[0].definition, "いち");
        assert_eq!(signs[0].pos, "名詞");
        assert_eq!(signs[0].category_title(), "数字");
        assert_eq!(signs[0].category_id().as_str(), "3");
    }

    #[test]
    fn test_parse_signs_empty_list_is_valid() {
        let category = Category::new("4", "空");
        let signs = parse_signs(&module_payload(json!([])), &category, "ja").unwrap();
        assert!(signs.is_empty());
    }

    #[test]
    fn test_parse_signs_missing_language_is_malformed() {
        let category = Category::new("3", "数字");
        let payload = module_payload(json!([{
            "id": 10,
            "signDefinitions": {"en": [{"def": "one"}]},
            "defaultVideoUrl": "https://cdn.example/10.mp4"
        }]));

        let err = parse_signs(&payload, &category, "ja").unwrap_err();
        assert!(matches!(err, PipelineError::CatalogMalformed { .. }));
    }

    #[test]
    fn test_parse_signs_missing_list_is_malformed() {
        let category = Category::new("3", "数字");
        assert!(parse_signs(&json!({"props": {"pageProps": {}}}), &category, "ja").is_err());
    }
}
