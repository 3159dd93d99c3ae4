//! Perplexity Sonar search provider.

use async_trait::async_trait;
use chrono::{Days, Utc};
use reqwest::Client;
use serde_json::json;
use tracing::{debug, instrument, warn};

use keywatch_shared::{EvidenceItem, KeywatchError, Result};

use super::{EvidenceProvider, parse_articles};

const DEFAULT_BASE_URL: &str = "https://api.perplexity.ai";
const PROVIDER_ID: &str = "perplexity";

/// Dedicated search API returning a JSON article list through chat completions.
pub struct PerplexityProvider {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl PerplexityProvider {
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
            .checked_sub_days(Days::new(u64::from(recency_months) * 30))
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default();

        let prompt = format!(
            "Give me up to {max_results} recent web references within the last {recency_months} months \
             for the search: {query}. Return JSON with url, title, snippet, date. Focus on news, \
             regulatory updates and business developments since {cutoff}."
        );

        let body = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You are a research assistant. Return only valid JSON with an array of articles."
                },
                { "role": "user", "content": prompt }
            ],
            "max_tokens": 1000,
            "temperature": 0.1
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
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

        let content = payload
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| KeywatchError::parse("missing choices[0].message.content"))?;

        let articles = parse_articles(
            serde_json::from_str(content.trim()).map_err(|e| KeywatchError::parse(e.to_string()))?,
        )?;

        Ok(articles
            .into_iter()
            .filter_map(|a| a.into_item(PROVIDER_ID))
            .take(max_results)
            .collect())
    }
}

#[async_trait]
impl EvidenceProvider for PerplexityProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    #[instrument(skip_all, fields(provider = PROVIDER_ID, query = %query))]
    async fn search(&self, query: &str, recency_months: u32, max_results: usize) -> Vec<EvidenceItem> {
        let Some(api_key) = self.api_key.as_deref() else {
            warn!("no Perplexity API key configured");
            return Vec::new();
        };
        if max_results == 0 {
            return Vec::new();
        }

        match self.try_search(api_key, query, recency_months, max_results).await {
            Ok(items) => {
                debug!(count = items.len(), "perplexity search complete");
                items
            }
            Err(e) => {
                warn!(error = %e, "perplexity search failed, returning no evidence");
                Vec::new()
            }
        }
    }
}
