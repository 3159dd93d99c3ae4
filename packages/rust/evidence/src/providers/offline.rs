//! Deterministic offline provider.

use async_trait::async_trait;

use keywatch_shared::EvidenceItem;

use super::EvidenceProvider;
use crate::query::query_term;

const PROVIDER_ID: &str = "test";

/// Fixed publication date for generated items.
const TEST_PUBLISHED_DATE: &str = "2025-09-10";

/// Returns reproducible evidence without touching the network.
///
/// By default items are generated from the query's search term; with
/// [`TestProvider::with_items`] the same fixed items come back for every query.
#[derive(Debug, Clone, Default)]
pub struct TestProvider {
    fixed: Option<Vec<EvidenceItem>>,
}

impl TestProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `items` for every query. Provider tags are rewritten to `test`.
    pub fn with_items(items: Vec<EvidenceItem>) -> Self {
        let items = items
            .into_iter()
            .map(|mut item| {
                item.provider = PROVIDER_ID.into();
                item
            })
            .collect();
        Self { fixed: Some(items) }
    }

    fn generated(term: &str, max_results: usize) -> Vec<EvidenceItem> {
        let slug = term
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("-");
        let hosts = ["example.com", "example.org"];

        (0..max_results.min(hosts.len()))
            .map(|i| {
                EvidenceItem::new(
                    PROVIDER_ID,
                    format!("https://{}/news/{slug}-article-{}", hosts[i], i + 1),
                    format!("Test Article {}: {term} Industry Update", i + 1),
                    format!(
                        "This is a test evidence snippet about {term}. The article discusses recent \
                         developments and trends related to {term} in the current market environment."
                    ),
                )
                .published(TEST_PUBLISHED_DATE)
            })
            .collect()
    }
}

#[async_trait]
impl EvidenceProvider for TestProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    async fn search(&self, query: &str, _recency_months: u32, max_results: usize) -> Vec<EvidenceItem> {
        match &self.fixed {
            Some(items) => items.iter().take(max_results).cloned().collect(),
            None => Self::generated(query_term(query), max_results),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn generated_items_are_deterministic() {
        let provider = TestProvider::new();
        let a = provider.search("\"Car Insurance\" P&C", 3, 2).await;
        let b = provider.search("\"Car Insurance\" P&C", 3, 2).await;
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].url, "https://example.com/news/car-insurance-article-1");
        assert_eq!(a[1].url, "https://example.org/news/car-insurance-article-2");
        assert!(a.iter().all(|i| i.provider == "test"));
        assert!(a[0].title.contains("Car Insurance"));
    }

    #[tokio::test]
    async fn respects_max_results() {
        let provider = TestProvider::new();
        assert_eq!(provider.search("x", 3, 1).await.len(), 1);
        assert!(provider.search("x", 3, 0).await.is_empty());
    }

    #[tokio::test]
    async fn fixed_items_are_served_for_every_query() {
        let provider = TestProvider::with_items(vec![EvidenceItem::new(
            "other",
            "https://a.com",
            "A",
            "",
        )]);
        let items = provider.search("anything", 3, 5).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].provider, "test");
    }
}
