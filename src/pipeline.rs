// src/pipeline.rs
//! Analysis pipeline entry: clamp the query, consult the result cache, fetch
//! through the fallback chain, then normalize and score every item.

use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{cache_key, CachedResult, ResultCache, MAX_TTL_SECS};
use crate::clock::{system_clock, SharedClock};
use crate::config::Settings;
use crate::ingest::fallback::{FallbackFetcher, LiveTier};
use crate::ingest::normalize_text;
use crate::ingest::providers::XApiProvider;
use crate::ingest::synthetic::SyntheticGenerator;
use crate::ingest::types::{LiveProvider, Query, RawItem, SourceTag};
use crate::rate_limit::RateLimiter;
use crate::sentiment::{SentimentLabel, SentimentScorer};

/// One analyzed post. Derived from a `RawItem`; never mutated afterwards.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScoredItem {
    pub id: String,
    pub raw_text: String,
    pub created_at: DateTime<Utc>,
    pub source_tag: SourceTag,
    pub normalized_text: String,
    pub subjectivity: f64,
    pub polarity: f64,
    pub sentiment_label: SentimentLabel,
    pub analyzed_at: DateTime<Utc>,
}

/// Read-only status for the presentation layer.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct PipelineStatus {
    pub demo_mode_forced: bool,
    pub has_valid_credentials: bool,
    pub is_rate_limited: bool,
    pub remaining_block_seconds: u64,
    pub total_live_calls: u64,
}

pub struct PipelineBuilder {
    settings: Settings,
    clock: SharedClock,
    live: Vec<LiveTier>,
    scorer: SentimentScorer,
    seed: Option<u64>,
}

impl PipelineBuilder {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            clock: system_clock(),
            live: Vec::new(),
            scorer: SentimentScorer::default(),
            seed: None,
        }
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Append a live tier; tiers are tried in the order they were added.
    pub fn live_tier(mut self, tag: SourceTag, provider: Arc<dyn LiveProvider>) -> Self {
        self.live.push(LiveTier::new(tag, provider));
        self
    }

    pub fn scorer(mut self, scorer: SentimentScorer) -> Self {
        self.scorer = scorer;
        self
    }

    /// Seed the synthetic generator.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> SentimentPipeline {
        let s = &self.settings;
        let limiter = Arc::new(RateLimiter::new(
            Duration::from_secs(s.min_call_spacing_secs),
            Duration::from_secs(s.rate_limit_block_secs),
        ));
        limiter.set_demo_mode(s.demo_mode);

        let synthetic = Arc::new(match self.seed {
            Some(seed) => {
                SyntheticGenerator::with_seed(s.synthetic_settings(), self.clock.clone(), seed)
            }
            None => SyntheticGenerator::new(s.synthetic_settings(), self.clock.clone()),
        });

        let ttl = ChronoDuration::seconds(s.cache_ttl_secs.min(MAX_TTL_SECS as u64) as i64);
        gauge!("cache_ttl_secs").set(s.cache_ttl_secs as f64);

        SentimentPipeline {
            ceiling: s.item_count_ceiling.max(1),
            has_valid_credentials: !self.live.is_empty(),
            fetcher: FallbackFetcher::new(self.live, synthetic, limiter),
            cache: ResultCache::new(ttl, self.clock.clone()),
            scorer: self.scorer,
            clock: self.clock,
        }
    }
}

pub struct SentimentPipeline {
    ceiling: u32,
    has_valid_credentials: bool,
    fetcher: FallbackFetcher,
    cache: ResultCache,
    scorer: SentimentScorer,
    clock: SharedClock,
}

impl SentimentPipeline {
    /// Wire live tiers from settings: primary first, then secondary, each
    /// only if enabled with credentials.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let mut builder = PipelineBuilder::new(settings.clone());
        for (tag, p) in [
            (SourceTag::Primary, &settings.primary),
            (SourceTag::Secondary, &settings.secondary),
        ] {
            if !p.is_usable() {
                continue;
            }
            let provider = XApiProvider::new(
                tag,
                &p.base_url,
                &p.bearer_token,
                p.per_call_max,
                Duration::from_secs(p.timeout_secs),
            )?;
            builder = builder.live_tier(tag, Arc::new(provider));
        }
        Ok(builder.build())
    }

    pub fn item_count_ceiling(&self) -> u32 {
        self.ceiling
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        self.fetcher.limiter()
    }

    pub fn set_demo_mode(&self, forced: bool) {
        self.rate_limiter().set_demo_mode(forced);
    }

    pub fn status(&self) -> PipelineStatus {
        let snap = self.rate_limiter().snapshot();
        PipelineStatus {
            demo_mode_forced: snap.demo_mode_forced,
            has_valid_credentials: self.has_valid_credentials,
            is_rate_limited: snap.is_rate_limited,
            remaining_block_seconds: snap.remaining_block_seconds,
            total_live_calls: snap.total_live_calls,
        }
    }

    /// Scored items for `query`. Served from cache while fresh; forced demo
    /// bypasses the cache in both directions. An empty result means every
    /// fetched item normalized to nothing.
    pub async fn analyze(&self, query: &Query) -> CachedResult {
        let t0 = std::time::Instant::now();
        let q = query.prepared(self.ceiling);
        let subject_id = anon_hash(&q.subject);

        let out = if self.rate_limiter().demo_mode_forced() {
            tracing::info!(target: "pipeline", subject = %subject_id, count = q.count, "demo analysis");
            Arc::new(self.compute(&q).await)
        } else {
            let key = cache_key(&q);
            match self.cache.get(&key) {
                Some(hit) => {
                    counter!("cache_hits_total").increment(1);
                    tracing::debug!(target: "cache", subject = %subject_id, "cache hit");
                    hit
                }
                None => {
                    counter!("cache_misses_total").increment(1);
                    tracing::info!(target: "pipeline", subject = %subject_id, count = q.count, mode = ?q.mode, "cache miss; analyzing");
                    let fresh = Arc::new(self.compute(&q).await);
                    self.cache.put(key, Arc::clone(&fresh));
                    fresh
                }
            }
        };

        histogram!("pipeline_analyze_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        out
    }

    async fn compute(&self, q: &Query) -> Vec<ScoredItem> {
        let raw = self.fetcher.fetch(q).await;
        let fetched = raw.len();
        let analyzed_at = self.clock.now();
        let items: Vec<ScoredItem> = raw
            .into_iter()
            .filter_map(|r| self.score_item(r, analyzed_at))
            .collect();
        if items.len() < fetched {
            tracing::debug!(
                target: "pipeline",
                dropped = fetched - items.len(),
                "items empty after normalization"
            );
        }
        items
    }

    fn score_item(&self, raw: RawItem, analyzed_at: DateTime<Utc>) -> Option<ScoredItem> {
        let normalized = normalize_text(&raw.text);
        if normalized.is_empty() {
            return None;
        }
        let s = self.scorer.score(&normalized);
        Some(ScoredItem {
            id: raw.id,
            raw_text: raw.text,
            created_at: raw.created_at,
            source_tag: raw.source_tag,
            normalized_text: normalized,
            subjectivity: s.subjectivity,
            polarity: s.polarity,
            sentiment_label: s.label,
            analyzed_at,
        })
    }
}

/// Short, stable digest for logging subjects without the raw string.
pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};

    fn demo_off() -> Settings {
        Settings {
            demo_mode: false,
            ..Settings::default()
        }
    }

    #[tokio::test]
    async fn no_live_tiers_means_synthetic_and_no_credentials() {
        let p = PipelineBuilder::new(demo_off()).seed(1).build();
        let status = p.status();
        assert!(!status.has_valid_credentials);
        assert!(!status.demo_mode_forced);

        let out = p.analyze(&Query::keyword("AI", 5)).await;
        assert_eq!(out.len(), 5);
        assert!(out.iter().all(|i| i.source_tag == SourceTag::Synthetic));
    }

    #[tokio::test]
    async fn count_is_clamped_before_fetching() {
        let settings = Settings {
            item_count_ceiling: 30,
            ..demo_off()
        };
        let p = PipelineBuilder::new(settings).seed(2).build();
        let out = p.analyze(&Query::keyword("AI", 10_000)).await;
        assert_eq!(out.len(), 30);
    }

    #[tokio::test]
    async fn analyzed_at_comes_from_the_clock() {
        let clock = Arc::new(ManualClock::starting_now());
        let p = PipelineBuilder::new(demo_off())
            .clock(clock.clone())
            .seed(3)
            .build();
        let out = p.analyze(&Query::timeline("@acme", 8)).await;
        assert!(out.iter().all(|i| i.analyzed_at == clock.now()));
    }

    #[tokio::test]
    async fn forced_demo_bypasses_cache() {
        let p = PipelineBuilder::new(Settings::default()).seed(4).build();
        assert!(p.status().demo_mode_forced);

        let a = p.analyze(&Query::keyword("AI", 5)).await;
        let b = p.analyze(&Query::keyword("AI", 5)).await;
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(p.cache().is_empty());
    }

    #[test]
    fn anon_hash_is_short_and_stable() {
        assert_eq!(anon_hash("AI"), anon_hash("AI"));
        assert_eq!(anon_hash("AI").len(), 12);
        assert_ne!(anon_hash("AI"), anon_hash("ai"));
    }

    #[test]
    fn latency_is_recorded_for_hits_and_misses() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let p = PipelineBuilder::new(demo_off()).seed(5).build();
        metrics::with_local_recorder(&recorder, || {
            rt.block_on(async {
                let a = p.analyze(&Query::keyword("AI", 5)).await;
                let b = p.analyze(&Query::keyword("AI", 5)).await;
                assert!(Arc::ptr_eq(&a, &b));
            })
        });

        let rendered = handle.render();
        assert!(
            rendered.contains("pipeline_analyze_ms_count 2"),
            "{rendered}"
        );
        assert!(rendered.contains("cache_hits_total 1"), "{rendered}");
        assert!(rendered.contains("cache_misses_total 1"), "{rendered}");
    }
}
