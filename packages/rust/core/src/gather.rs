//! Concurrent evidence gathering.
//!
//! One task per keyword, bounded by a semaphore. Each keyword's query variants
//! run concurrently and are merged back in query order, so results do not
//! depend on which provider call finished first.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use keywatch_evidence::{EvidenceProvider, build_queries, infer, merge_by_host};
use keywatch_shared::{EvidenceItem, KeywatchError, RegionScope, Result};

use crate::cache::{CacheKey, EvidenceCache};

/// One keyword to gather evidence for.
#[derive(Debug, Clone)]
pub struct GatherRequest {
    pub keyword: String,
    pub scope: RegionScope,
    /// Source-location rule that produced `scope`, if the keyword had one.
    pub source_override: Option<String>,
}

/// Settings shared by every keyword task.
#[derive(Debug, Clone)]
pub struct GatherSettings {
    pub sector: String,
    pub recency_months: u32,
    /// Items requested from the provider per query.
    pub per_query_results: usize,
    pub timeout: Duration,
    pub concurrency: usize,
}

/// Fans keywords out to the provider with caching and cancellation.
#[derive(Clone)]
pub struct Gatherer {
    provider: Arc<dyn EvidenceProvider>,
    cache: EvidenceCache,
    settings: Arc<GatherSettings>,
}

impl Gatherer {
    pub fn new(
        provider: Arc<dyn EvidenceProvider>,
        cache: EvidenceCache,
        settings: GatherSettings,
    ) -> Self {
        Self {
            provider,
            cache,
            settings: Arc::new(settings),
        }
    }

    /// Gather evidence for every request.
    ///
    /// Returns [`KeywatchError::Cancelled`] if `cancel` fires before all
    /// keywords finish; unfinished keywords write nothing to the cache.
    #[instrument(skip_all, fields(keywords = requests.len(), provider = self.provider.id()))]
    pub async fn gather_all(
        &self,
        requests: Vec<GatherRequest>,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, Vec<EvidenceItem>>> {
        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let mut handles = Vec::new();

        for request in requests {
            let gatherer = self.clone();
            let sem = semaphore.clone();
            let cancel = cancel.clone();

            handles.push(tokio::spawn(async move {
                let keyword = request.keyword.clone();
                let items = tokio::select! {
                    _ = cancel.cancelled() => None,
                    items = async {
                        let _permit = sem.acquire().await.ok()?;
                        Some(gatherer.gather_one(&request, &cancel).await)
                    } => items,
                };
                (keyword, items)
            }));
        }

        let mut gathered = HashMap::new();
        for handle in handles {
            match handle.await {
                Ok((keyword, Some(items))) => {
                    gathered.insert(keyword, items);
                }
                Ok((keyword, None)) => {
                    debug!(%keyword, "evidence gathering cancelled");
                }
                Err(e) => {
                    warn!(error = %e, "keyword task failed");
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(KeywatchError::Cancelled);
        }
        Ok(gathered)
    }

    /// Cache lookup, then every query variant, then region inference.
    async fn gather_one(&self, request: &GatherRequest, cancel: &CancellationToken) -> Vec<EvidenceItem> {
        let key = CacheKey {
            provider: self.provider.id(),
            keyword: &request.keyword,
            recency_months: self.settings.recency_months,
            scope: &request.scope,
            source_override: request.source_override.as_deref(),
        };

        if let Some(items) = self.cache.get(&key).await {
            return items;
        }

        let queries = build_queries(&request.keyword, &self.settings.sector, &request.scope);
        let batches = self.run_queries(&queries).await;

        let items: Vec<EvidenceItem> = merge_by_host(batches)
            .into_iter()
            .map(|mut item| {
                item.region_guess = infer(&item.url, &item.title, &item.snippet);
                item
            })
            .collect();

        debug!(
            keyword = %request.keyword,
            queries = queries.len(),
            items = items.len(),
            "evidence gathered"
        );

        if !cancel.is_cancelled() {
            self.cache.put(&key, &items).await;
        }
        items
    }

    /// Run each query concurrently; batches are returned in query order.
    ///
    /// Calls live in a `JoinSet`, so dropping this future aborts any still
    /// in flight.
    async fn run_queries(&self, queries: &[String]) -> Vec<Vec<EvidenceItem>> {
        let mut set = JoinSet::new();

        for (idx, query) in queries.iter().enumerate() {
            let provider = Arc::clone(&self.provider);
            let settings = Arc::clone(&self.settings);
            let query = query.clone();

            set.spawn(async move {
                let search = provider.search(&query, settings.recency_months, settings.per_query_results);
                let items = match tokio::time::timeout(settings.timeout, search).await {
                    Ok(items) => items,
                    Err(_) => {
                        warn!(%query, timeout_secs = settings.timeout.as_secs(), "provider call timed out");
                        Vec::new()
                    }
                };
                (idx, items)
            });
        }

        let mut batches = vec![Vec::new(); queries.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, items)) => batches[idx] = items,
                Err(e) => warn!(error = %e, "provider call failed"),
            }
        }
        batches
    }
}
