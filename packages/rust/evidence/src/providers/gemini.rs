//! Gemini search-grounded provider.
//!
//! Search grounding cannot be combined with JSON response mode, so the model
//! is asked for JSON in the prompt and the reply is parsed leniently: the
//! outermost `{...}` block first, then bare URLs as a fallback.

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{Months, Utc};
use regex::Regex;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, instrument, warn};

use keywatch_shared::{EvidenceItem, KeywatchError, Result};

use super::{EvidenceProvider, parse_articles};
use crate::query::query_term;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const PROVIDER_ID: &str = "google";

static JSON_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"{}|\\^`\[\]]+"#).expect("valid regex"));

pub struct GeminiProvider {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(client: Client, api_key: Option<String>, model: &str) -> Self {
        Self {
            client,
            api_key,
            model: model.to_string(),
            base_url: DEFAULT_BASE_URL.into(),
        }
    }

    /// Point the provider at another host (mock servers, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn try_search(
        &self,
        api_key: &str,
        query: &str,
        recency_months: u32,
        max_results: usize,
    ) -> Result<Vec<EvidenceItem>> {
        let cutoff = Utc::now()
            .date_naive()
            .checked_sub_months(Months::new(recency_months))
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default();

        let prompt = format!(
            r#"Search for recent news articles matching: {query}
Only include articles published after {cutoff} (last {recency_months} months).

Return exactly {max_results} relevant news articles in strict JSON with no additional text:

{{"articles": [{{"url": "full article URL", "title": "article title", "snippet": "brief excerpt", "published_date": "YYYY-MM-DD"}}]}}

Focus on recent, credible news sources. Return only the JSON."#
        );

        let body = json!({
            "contents": [ { "parts": [ { "text": prompt } ] } ],
            "tools": [ { "google_search": {} } ],
            "generationConfig": { "temperature": 0.1 }
        });

        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| KeywatchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(KeywatchError::Provider(format!("HTTP {status}")));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| KeywatchError::parse(e.to_string()))?;

        let text = response_text(&payload)
            .ok_or_else(|| KeywatchError::parse("response has no candidate text"))?;

        let mut items = parse_reply(&text, query_term(query));
        items.truncate(max_results);
        Ok(items)
    }
}

/// Concatenate the text parts of the first candidate.
fn response_text(payload: &serde_json::Value) -> Option<String> {
    let parts = payload.pointer("/candidates/0/content/parts")?.as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    (!text.trim().is_empty()).then_some(text)
}

fn parse_reply(text: &str, term: &str) -> Vec<EvidenceItem> {
    let parsed = JSON_BLOCK_RE
        .find(text)
        .and_then(|m| serde_json::from_str::<serde_json::Value>(m.as_str()).ok())
        .and_then(|value| parse_articles(value).ok());

    match parsed {
        Some(articles) => articles
            .into_iter()
            .filter_map(|a| a.into_item(PROVIDER_ID))
            .collect(),
        None => {
            debug!("no JSON block in reply, falling back to URL extraction");
            urls_as_items(text, term)
        }
    }
}

fn urls_as_items(text: &str, term: &str) -> Vec<EvidenceItem> {
    URL_RE
        .find_iter(text)
        .take(3)
        .enumerate()
        .map(|(i, m)| {
            EvidenceItem::new(
                PROVIDER_ID,
                m.as_str().trim_end_matches(['.', ',', ')']),
                format!("Search result {} for {term}", i + 1),
                format!("Google search result about {term} from recent news coverage."),
            )
        })
        .collect()
}

#[async_trait]
impl EvidenceProvider for GeminiProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    #[instrument(skip_all, fields(provider = PROVIDER_ID, query = %query))]
    async fn search(&self, query: &str, recency_months: u32, max_results: usize) -> Vec<EvidenceItem> {
        let Some(api_key) = self.api_key.as_deref() else {
            warn!("no Google API key configured");
            return Vec::new();
        };
        if max_results == 0 {
            return Vec::new();
        }

        match self.try_search(api_key, query, recency_months, max_results).await {
            Ok(items) => {
                debug!(count = items.len(), "gemini search complete");
                items
            }
            Err(e) => {
                warn!(error = %e, "gemini search failed, returning no evidence");
                Vec::new()
            }
        }
    }
}
