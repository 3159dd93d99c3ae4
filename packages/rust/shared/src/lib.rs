//! Shared types, error model, and configuration for Keywatch.
//!
//! This crate is the foundation depended on by all other Keywatch crates.
//! It provides:
//! - [`KeywatchError`], the unified error type
//! - Domain types ([`CategoryMap`], [`EvidenceItem`], [`Flag`], [`RegionScope`], [`RunId`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod scope;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CacheConfig, EvidenceConfig, GuardsConfig, IsolationMode, PipelineConfig,
    ProvidersConfig, RegionConfig, SearchMode, SearchProvider, config_dir, config_file_path,
    expand_home, init_config, load_config, load_config_from,
};
pub use error::{KeywatchError, Result};
pub use scope::{RegionMode, RegionScope, cctld_for, normalize_region_name};
pub use types::{
    Category, CategoryMap, EvidenceItem, Flag, FlagKind, FlagRecord, RunId, ScoreBreakdown,
    Severity, WeakEvidence,
};
