// src/ingest/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What the caller wants analyzed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// Free-text keyword or hashtag search.
    Keyword,
    /// Most recent posts of a single account.
    SubjectTimeline,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Query {
    pub mode: QueryMode,
    pub subject: String,
    pub count: u32,
    #[serde(default)]
    pub include_reposts: bool,
}

impl Query {
    pub fn keyword(subject: impl Into<String>, count: u32) -> Self {
        Self {
            mode: QueryMode::Keyword,
            subject: subject.into(),
            count,
            include_reposts: false,
        }
    }

    pub fn timeline(subject: impl Into<String>, count: u32) -> Self {
        Self {
            mode: QueryMode::SubjectTimeline,
            subject: subject.into(),
            count,
            include_reposts: false,
        }
    }

    pub fn with_reposts(mut self, include: bool) -> Self {
        self.include_reposts = include;
        self
    }

    /// Trim the subject, drop a leading `@` for timelines and clamp `count`
    /// into `1..=ceiling`.
    pub fn prepared(&self, ceiling: u32) -> Self {
        let mut subject = self.subject.trim();
        if self.mode == QueryMode::SubjectTimeline {
            subject = subject.trim_start_matches('@').trim_start();
        }
        Self {
            mode: self.mode,
            subject: subject.to_string(),
            count: self.count.clamp(1, ceiling.max(1)),
            include_reposts: self.include_reposts,
        }
    }
}

/// Which tier of the fallback chain produced an item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    Primary,
    Secondary,
    Synthetic,
}

impl SourceTag {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceTag::Primary => "primary",
            SourceTag::Secondary => "secondary",
            SourceTag::Synthetic => "synthetic",
        }
    }
}

impl std::fmt::Display for SourceTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One acquired post, as returned by a tier. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawItem {
    pub id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub source_tag: SourceTag,
}

/// Coarse classification of a provider failure; drives fallback behaviour.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Auth,
    RateLimited,
    NotFound,
    Transient,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Auth => "auth",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::NotFound => "not_found",
            FailureKind::Transient => "transient",
        }
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider rejected credentials: {0}")]
    Auth(String),

    #[error("provider rate limit hit")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("subject not found: {0}")]
    NotFound(String),

    #[error("provider call failed: {0}")]
    Transient(String),
}

impl ProviderError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ProviderError::Auth(_) => FailureKind::Auth,
            ProviderError::RateLimited { .. } => FailureKind::RateLimited,
            ProviderError::NotFound(_) => FailureKind::NotFound,
            ProviderError::Transient(_) => FailureKind::Transient,
        }
    }
}

/// A live data source. Implementations return items most-recent-first and
/// never more than `max_items`.
#[async_trait::async_trait]
pub trait LiveProvider: Send + Sync {
    async fn search_recent(
        &self,
        subject: &str,
        exclude_reposts: bool,
        max_items: u32,
    ) -> Result<Vec<RawItem>, ProviderError>;

    async fn subject_timeline(
        &self,
        subject: &str,
        include_reposts: bool,
        max_items: u32,
    ) -> Result<Vec<RawItem>, ProviderError>;

    /// Largest number of items a single call may return.
    fn per_call_max(&self) -> u32;

    /// Upstream HTTP requests one call in `mode` makes when it gets that far.
    fn requests_per_call(&self, _mode: QueryMode) -> u32 {
        1
    }

    fn name(&self) -> &'static str;
}
