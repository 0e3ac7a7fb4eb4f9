// src/ingest/fallback.rs
//! Ordered fallback chain: primary → secondary → synthetic.
//!
//! Live tiers are consulted only while the rate limiter allows it and demo
//! mode is off. A failure or an empty answer moves on to the next tier; the
//! synthetic tier always answers, so `fetch` never fails.

use metrics::counter;
use std::sync::Arc;

use crate::ingest::synthetic::SyntheticGenerator;
use crate::ingest::types::{
    FailureKind, LiveProvider, ProviderError, Query, QueryMode, RawItem, SourceTag,
};
use crate::rate_limit::RateLimiter;

/// One live tier of the chain.
pub struct LiveTier {
    pub tag: SourceTag,
    pub provider: Arc<dyn LiveProvider>,
}

impl LiveTier {
    pub fn new(tag: SourceTag, provider: Arc<dyn LiveProvider>) -> Self {
        Self { tag, provider }
    }
}

/// How a single live tier attempt ended.
#[derive(Debug)]
enum Attempt {
    Served(Vec<RawItem>),
    Empty,
    Failed(ProviderError),
    Skipped,
}

pub struct FallbackFetcher {
    live: Vec<LiveTier>,
    synthetic: Arc<SyntheticGenerator>,
    limiter: Arc<RateLimiter>,
}

impl FallbackFetcher {
    /// `live` tiers are tried in the given order, before the synthetic tier.
    pub fn new(
        live: Vec<LiveTier>,
        synthetic: Arc<SyntheticGenerator>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            live,
            synthetic,
            limiter,
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn live_tier_count(&self) -> usize {
        self.live.len()
    }

    pub async fn fetch(&self, query: &Query) -> Vec<RawItem> {
        crate::ingest::ensure_metrics_described();

        if self.limiter.demo_mode_forced() {
            tracing::debug!(target: "fetch", "demo mode forced; skipping live tiers");
        } else {
            for tier in &self.live {
                match self.attempt(tier, query).await {
                    Attempt::Served(items) => {
                        counter!("fetch_tier_served_total", "tier" => tier.tag.as_str())
                            .increment(1);
                        tracing::info!(
                            target: "fetch",
                            tier = tier.tag.as_str(),
                            items = items.len(),
                            "live tier served"
                        );
                        return items;
                    }
                    Attempt::Empty => {
                        tracing::info!(target: "fetch", tier = tier.tag.as_str(), "live tier returned nothing");
                    }
                    Attempt::Failed(err) => {
                        let kind = err.kind();
                        counter!(
                            "fetch_provider_failures_total",
                            "tier" => tier.tag.as_str(),
                            "kind" => kind.as_str()
                        )
                        .increment(1);
                        tracing::warn!(
                            target: "fetch",
                            tier = tier.tag.as_str(),
                            kind = kind.as_str(),
                            error = %err,
                            "live tier failed"
                        );
                        if kind == FailureKind::RateLimited {
                            self.limiter.trigger_block(None);
                        }
                    }
                    Attempt::Skipped => {
                        tracing::debug!(target: "fetch", tier = tier.tag.as_str(), "live tier skipped; blocked");
                    }
                }
            }
        }

        let items = self.synthetic.generate(query);
        counter!("fetch_tier_served_total", "tier" => SourceTag::Synthetic.as_str()).increment(1);
        tracing::info!(target: "fetch", tier = "synthetic", items = items.len(), "synthetic tier served");
        items
    }

    async fn attempt(&self, tier: &LiveTier, query: &Query) -> Attempt {
        if !self.limiter.can_proceed().await {
            return Attempt::Skipped;
        }

        let max = query.count.min(tier.provider.per_call_max());
        self.limiter
            .record_calls(tier.provider.requests_per_call(query.mode));
        let res = match query.mode {
            QueryMode::Keyword => {
                tier.provider
                    .search_recent(&query.subject, !query.include_reposts, max)
                    .await
            }
            QueryMode::SubjectTimeline => {
                tier.provider
                    .subject_timeline(&query.subject, query.include_reposts, max)
                    .await
            }
        };

        match res {
            Ok(items) if items.is_empty() => Attempt::Empty,
            Ok(items) => Attempt::Served(
                items
                    .into_iter()
                    .take(max as usize)
                    .map(|mut it| {
                        it.source_tag = tier.tag;
                        it
                    })
                    .collect(),
            ),
            Err(e) => Attempt::Failed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ingest::synthetic::SyntheticSettings;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::{Duration, Instant};

    enum Script {
        Fail(fn() -> ProviderError),
        Items(usize),
    }

    struct Scripted {
        script: Script,
        calls: AtomicUsize,
        dispatched: Mutex<Vec<Instant>>,
        per_call_max: u32,
    }

    impl Scripted {
        fn new(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script,
                calls: AtomicUsize::new(0),
                dispatched: Mutex::new(Vec::new()),
                per_call_max: 100,
            })
        }

        fn answer(&self, max: u32) -> Result<Vec<RawItem>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.dispatched.lock().unwrap().push(Instant::now());
            match &self.script {
                Script::Fail(f) => Err(f()),
                Script::Items(n) => Ok((0..*n)
                    .map(|i| RawItem {
                        id: format!("live-{i}"),
                        text: format!("live post {i}"),
                        created_at: Utc::now(),
                        // tier tag is overwritten by the fetcher
                        source_tag: SourceTag::Primary,
                    })
                    .take(max as usize)
                    .collect()),
            }
        }
    }

    #[async_trait]
    impl LiveProvider for Scripted {
        async fn search_recent(
            &self,
            _subject: &str,
            _exclude_reposts: bool,
            max_items: u32,
        ) -> Result<Vec<RawItem>, ProviderError> {
            self.answer(max_items)
        }

        async fn subject_timeline(
            &self,
            _subject: &str,
            _include_reposts: bool,
            max_items: u32,
        ) -> Result<Vec<RawItem>, ProviderError> {
            self.answer(max_items)
        }

        fn per_call_max(&self) -> u32 {
            self.per_call_max
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn fetcher(
        primary: Arc<Scripted>,
        secondary: Arc<Scripted>,
    ) -> (FallbackFetcher, Arc<RateLimiter>) {
        let limiter = Arc::new(RateLimiter::default());
        let synthetic = Arc::new(SyntheticGenerator::with_seed(
            SyntheticSettings::default(),
            Arc::new(ManualClock::starting_now()),
            7,
        ));
        let f = FallbackFetcher::new(
            vec![
                LiveTier::new(SourceTag::Primary, primary),
                LiveTier::new(SourceTag::Secondary, secondary),
            ],
            synthetic,
            limiter.clone(),
        );
        (f, limiter)
    }

    fn transient() -> ProviderError {
        ProviderError::Transient("boom".into())
    }
    fn rate_limited() -> ProviderError {
        ProviderError::RateLimited {
            retry_after_secs: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn primary_serves_when_healthy() {
        let p = Scripted::new(Script::Items(4));
        let s = Scripted::new(Script::Items(9));
        let (f, limiter) = fetcher(p.clone(), s.clone());

        let items = f.fetch(&Query::keyword("AI", 20)).await;
        assert_eq!(items.len(), 4);
        assert!(items.iter().all(|i| i.source_tag == SourceTag::Primary));
        assert_eq!(s.calls.load(Ordering::SeqCst), 0);
        assert_eq!(limiter.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_primary_falls_to_secondary_without_blocking() {
        let p = Scripted::new(Script::Fail(transient));
        let s = Scripted::new(Script::Items(3));
        let (f, limiter) = fetcher(p, s);

        let items = f.fetch(&Query::keyword("AI", 20)).await;
        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|i| i.source_tag == SourceTag::Secondary));
        assert!(!limiter.is_blocked());
        assert_eq!(limiter.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_opens_block_window_and_later_fetches_skip_live() {
        let p = Scripted::new(Script::Fail(rate_limited));
        let s = Scripted::new(Script::Items(3));
        let (f, limiter) = fetcher(p.clone(), s.clone());

        let items = f.fetch(&Query::keyword("AI", 20)).await;
        assert_eq!(items.len(), 20);
        assert!(items.iter().all(|i| i.source_tag == SourceTag::Synthetic));
        assert!(limiter.is_blocked());
        assert_eq!(s.calls.load(Ordering::SeqCst), 0);

        // still inside the window: no live calls at all
        let again = f.fetch(&Query::keyword("AI", 20)).await;
        assert!(again.iter().all(|i| i.source_tag == SourceTag::Synthetic));
        assert_eq!(p.calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(900)).await;
        f.fetch(&Query::keyword("AI", 20)).await;
        assert_eq!(p.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_falls_to_synthetic() {
        let p = Scripted::new(Script::Fail(transient));
        let s = Scripted::new(Script::Fail(|| ProviderError::Auth("nope".into())));
        let (f, _) = fetcher(p, s);

        let items = f.fetch(&Query::keyword("AI", 20)).await;
        assert_eq!(items.len(), 20);
        assert!(items.iter().all(|i| i.source_tag == SourceTag::Synthetic));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_live_answer_counts_as_failure() {
        let p = Scripted::new(Script::Items(0));
        let s = Scripted::new(Script::Items(2));
        let (f, _) = fetcher(p, s);

        let items = f.fetch(&Query::timeline("acme", 10)).await;
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.source_tag == SourceTag::Secondary));
    }

    #[tokio::test(start_paused = true)]
    async fn live_items_are_capped_to_count() {
        let p = Scripted::new(Script::Items(50));
        let s = Scripted::new(Script::Items(0));
        let (f, _) = fetcher(p, s);
        assert_eq!(f.fetch(&Query::keyword("AI", 7)).await.len(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn forced_demo_never_touches_live_tiers() {
        let p = Scripted::new(Script::Items(5));
        let s = Scripted::new(Script::Items(5));
        let (f, limiter) = fetcher(p.clone(), s.clone());
        limiter.set_demo_mode(true);

        let items = f.fetch(&Query::keyword("AI", 12)).await;
        assert_eq!(items.len(), 12);
        assert!(items.iter().all(|i| i.source_tag == SourceTag::Synthetic));
        assert_eq!(p.calls.load(Ordering::SeqCst) + s.calls.load(Ordering::SeqCst), 0);
        assert_eq!(limiter.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_fetches_keep_live_calls_spaced() {
        let p = Scripted::new(Script::Items(3));
        let s = Scripted::new(Script::Items(3));
        let (f, limiter) = fetcher(p.clone(), s);
        let f = Arc::new(f);

        let handles: Vec<_> = (0..3)
            .map(|i| {
                let f = f.clone();
                tokio::spawn(async move { f.fetch(&Query::keyword(format!("q{i}"), 5)).await })
            })
            .collect();
        for h in handles {
            let items = h.await.unwrap();
            assert!(items.iter().all(|i| i.source_tag == SourceTag::Primary));
        }

        let mut at = p.dispatched.lock().unwrap().clone();
        at.sort();
        assert_eq!(at.len(), 3);
        for w in at.windows(2) {
            assert!(
                w[1] - w[0] >= limiter.min_spacing(),
                "dispatch gap {:?}",
                w[1] - w[0]
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeline_dispatch_counts_every_upstream_request() {
        struct TwoStep;
        #[async_trait]
        impl LiveProvider for TwoStep {
            async fn search_recent(
                &self,
                _: &str,
                _: bool,
                _: u32,
            ) -> Result<Vec<RawItem>, ProviderError> {
                Err(transient())
            }
            async fn subject_timeline(
                &self,
                _: &str,
                _: bool,
                _: u32,
            ) -> Result<Vec<RawItem>, ProviderError> {
                Err(transient())
            }
            fn per_call_max(&self) -> u32 {
                100
            }
            fn requests_per_call(&self, mode: QueryMode) -> u32 {
                match mode {
                    QueryMode::Keyword => 1,
                    QueryMode::SubjectTimeline => 2,
                }
            }
            fn name(&self) -> &'static str {
                "two-step"
            }
        }

        let limiter = Arc::new(RateLimiter::default());
        let f = FallbackFetcher::new(
            vec![LiveTier::new(SourceTag::Primary, Arc::new(TwoStep))],
            Arc::new(SyntheticGenerator::with_seed(
                SyntheticSettings::default(),
                Arc::new(ManualClock::starting_now()),
                9,
            )),
            limiter.clone(),
        );
        f.fetch(&Query::timeline("acme", 5)).await;
        assert_eq!(limiter.call_count(), 2);
        f.fetch(&Query::keyword("acme", 5)).await;
        assert_eq!(limiter.call_count(), 3);
    }
}
