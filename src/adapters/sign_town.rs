//! HTTP client for the Sign Town handbook.
//!
//! Catalog pages are Next.js documents; the structured data lives in the
//! `<script id="__NEXT_DATA__">` element. Media files are plain HTTP
//! downloads streamed chunk by chunk.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

use super::{CatalogReader, FetchError, MediaFetcher, MediaStream};
use crate::core::PipelineError;

pub const USER_AGENT: &str = concat!("signdeck/", env!("CARGO_PKG_VERSION"));

const NEXT_DATA_SELECTOR: &str = "script#__NEXT_DATA__";

/// Reads catalog pages and streams media over HTTP
#[derive(Debug, Clone)]
pub struct SignTownClient {
    client: reqwest::Client,
}

impl SignTownClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// Create a client around an existing reqwest client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// Pull the `__NEXT_DATA__` JSON out of a page
pub fn extract_next_data(url: &str, html: &str) -> Result<Value> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(NEXT_DATA_SELECTOR)
        .map_err(|e| anyhow::anyhow!("Invalid selector {}: {}", NEXT_DATA_SELECTOR, e))?;

    let script = document
        .select(&selector)
        .next()
        .ok_or_else(|| PipelineError::malformed(url, "page has no __NEXT_DATA__ script"))?;

    let text = script.text().collect::<String>();
    let value = serde_json::from_str(text.trim())
        .map_err(|e| PipelineError::malformed(url, format!("__NEXT_DATA__ is not JSON: {}", e)))?;

    Ok(value)
}

#[async_trait]
impl CatalogReader for SignTownClient {
    async fn read(&self, url: &str) -> Result<Value> {
        debug!(%url, "Fetching catalog page");

        let unreachable = |reason: String| PipelineError::CatalogUnreachable {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| unreachable(e.to_string()))?
            .error_for_status()
            .map_err(|e| unreachable(e.to_string()))?;

        let html = response
            .text()
            .await
            .map_err(|e| unreachable(e.to_string()))?;

        extract_next_data(url, &html)
    }
}

#[async_trait]
impl MediaFetcher for SignTownClient {
    async fn open(&self, url: &str) -> Result<MediaStream, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| FetchError::Transport(e.to_string())))
            .boxed())
    }
}
