//! Pipeline orchestration for Keywatch.
//!
//! This crate ties the guardrails, the evidence cache and the evidence
//! building blocks together into one end-to-end run (`KeywordPipeline`).

pub mod cache;
pub mod gather;
pub mod pipeline;

pub use cache::{CacheKey, EvidenceCache};
pub use gather::{GatherRequest, GatherSettings, Gatherer};
pub use pipeline::{
    KeywordPipeline, PipelineInput, PipelineOutput, ProgressReporter, SilentProgress,
};
