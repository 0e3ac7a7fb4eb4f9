// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod ingest;
pub mod metrics;
pub mod pipeline;
pub mod rate_limit;
pub mod sentiment;
pub mod summary;

// ---- Re-exports for stable public API ----
pub use crate::api::create_router;
pub use crate::config::{ConfigError, Settings};
pub use crate::ingest::types::{FailureKind, ProviderError, Query, QueryMode, RawItem, SourceTag};
pub use crate::pipeline::{PipelineBuilder, PipelineStatus, ScoredItem, SentimentPipeline};
pub use crate::sentiment::{SentimentLabel, SentimentScorer};
pub use crate::summary::SentimentSummary;
