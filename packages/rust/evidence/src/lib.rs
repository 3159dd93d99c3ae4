//! Evidence gathering building blocks for Keywatch.
//!
//! Query construction, provider adapters, region inference, scoring and flag
//! generation. Everything here works on one keyword at a time; concurrency
//! and caching live in `keywatch-core`.

pub mod flags;
pub mod providers;
pub mod query;
pub mod region;
pub mod scoring;

pub use flags::{FlagContext, generate_flags};
pub use providers::{
    EvidenceProvider, GeminiProvider, PerplexityProvider, TestProvider, build_provider,
    http_client, merge_by_host,
};
pub use query::build_queries;
pub use region::{host_of, infer, scope_allows};
pub use scoring::{ScoreContext, ScoreSummary, parse_published_date, rank, score, score_summary};
