//! Evidence provider trait and built-in providers.
//!
//! Providers turn one search query into evidence items. They never fail:
//! HTTP errors, malformed payloads and missing credentials all degrade to an
//! empty list with a warning, so one bad call cannot sink a keyword set.

mod gemini;
mod offline;
mod perplexity;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use keywatch_shared::{EvidenceItem, KeywatchError, PipelineConfig, Result, SearchMode, SearchProvider};

use crate::region::host_of;

pub use gemini::GeminiProvider;
pub use offline::TestProvider;
pub use perplexity::PerplexityProvider;

/// User-Agent string for provider requests.
const USER_AGENT: &str = concat!("Keywatch/", env!("CARGO_PKG_VERSION"));

/// Snippets are clipped to this many characters.
const MAX_SNIPPET_CHARS: usize = 200;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A source of evidence for search queries.
#[async_trait]
pub trait EvidenceProvider: Send + Sync {
    /// Provider tag stamped on every item and used in cache keys.
    fn id(&self) -> &str;

    /// Run one query. Returns at most `max_results` items; never errors.
    async fn search(&self, query: &str, recency_months: u32, max_results: usize)
    -> Vec<EvidenceItem>;
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Union per-query results in order, keeping the first item seen per URL host.
pub fn merge_by_host(batches: impl IntoIterator<Item = Vec<EvidenceItem>>) -> Vec<EvidenceItem> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut merged = Vec::new();

    for item in batches.into_iter().flatten() {
        let key = host_of(&item.url).unwrap_or_else(|| item.url.trim().to_lowercase());
        if seen.insert(key) {
            merged.push(item);
        }
    }

    merged
}

/// Select the provider for a pipeline configuration. `None` when searching is off.
pub fn build_provider(config: &PipelineConfig) -> Result<Option<Arc<dyn EvidenceProvider>>> {
    let provider: Arc<dyn EvidenceProvider> = match config.search_mode {
        SearchMode::Off => return Ok(None),
        SearchMode::Test => Arc::new(TestProvider::new()),
        SearchMode::Shallow | SearchMode::Deep => {
            let client = http_client(config.timeout)?;
            match config.search_provider {
                SearchProvider::Perplexity => Arc::new(PerplexityProvider::new(
                    client,
                    api_key_from_env(&config.providers.perplexity_api_key_env),
                    &config.providers.perplexity_model,
                )),
                SearchProvider::Gemini => Arc::new(GeminiProvider::new(
                    client,
                    api_key_from_env(&config.providers.gemini_api_key_env),
                    &config.providers.gemini_model,
                )),
            }
        }
    };
    Ok(Some(provider))
}

/// Shared HTTP client for live providers.
pub fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| KeywatchError::Network(format!("failed to build HTTP client: {e}")))
}

fn api_key_from_env(var: &str) -> Option<String> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Some(key),
        _ => {
            warn!(env = %var, "provider API key not set, live searches will return nothing");
            None
        }
    }
}

/// Clip a snippet to [`MAX_SNIPPET_CHARS`] on a char boundary.
fn clip_snippet(snippet: &str) -> String {
    snippet.trim().chars().take(MAX_SNIPPET_CHARS).collect()
}

/// Article shape both live providers ask their model to return.
#[derive(Debug, Default, serde::Deserialize)]
struct Article {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    published_date: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

impl Article {
    fn into_item(self, provider: &str) -> Option<EvidenceItem> {
        let url = self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())?;
        let title = self.title.as_deref().unwrap_or_default().trim();
        let snippet = clip_snippet(self.snippet.as_deref().unwrap_or_default());
        let mut item = EvidenceItem::new(provider, url, title, snippet);
        item.published_date = self
            .published_date
            .filter(|d| !d.trim().is_empty())
            .or_else(|| self.date.filter(|d| !d.trim().is_empty()));
        Some(item)
    }
}

/// Accept either a bare JSON array of articles or `{"articles": [...]}`.
/// Elements that do not parse as an article are skipped.
fn parse_articles(value: serde_json::Value) -> Result<Vec<Article>> {
    let array = match value {
        serde_json::Value::Array(array) => array,
        serde_json::Value::Object(mut map) => match map.remove("articles") {
            Some(serde_json::Value::Array(array)) => array,
            Some(other) => {
                return Err(KeywatchError::parse(format!(
                    "expected article array, got {other}"
                )));
            }
            None => return Err(KeywatchError::parse("response object has no 'articles' key")),
        },
        other => {
            return Err(KeywatchError::parse(format!(
                "expected article array, got {other}"
            )));
        }
    };

    let articles = array
        .into_iter()
        .filter_map(|element| match serde_json::from_value::<Article>(element) {
            Ok(article) => Some(article),
            Err(e) => {
                debug!(error = %e, "skipping malformed article");
                None
            }
        })
        .collect();
    Ok(articles)
}
