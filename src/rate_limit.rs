// src/rate_limit.rs
//! Process-wide live-call throttle.
//!
//! Tracks when the last live provider call went out, how many have gone out,
//! and whether a rate-limit signal has put live calls on hold. One instance
//! is built at startup and shared (behind `Arc`) by every fetch.

use metrics::counter;
use serde::Serialize;
use std::sync::Mutex;
use tokio::time::{Duration, Instant};

pub const DEFAULT_MIN_SPACING: Duration = Duration::from_secs(2);
pub const DEFAULT_BLOCK_DURATION: Duration = Duration::from_secs(900);

/// Upper bounds for the configurable intervals; larger values are clamped.
pub const MAX_MIN_SPACING: Duration = Duration::from_secs(3_600);
pub const MAX_BLOCK_DURATION: Duration = Duration::from_secs(7 * 24 * 3_600);

#[derive(Debug, Default)]
struct RateLimitState {
    last_call_at: Option<Instant>,
    call_count: u64,
    blocked_until: Option<Instant>,
    demo_mode_forced: bool,
}

/// Read-only view of the limiter for status reporting.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct RateLimitSnapshot {
    pub demo_mode_forced: bool,
    pub is_rate_limited: bool,
    pub remaining_block_seconds: u64,
    pub total_live_calls: u64,
}

#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<RateLimitState>,
    min_spacing: Duration,
    block_duration: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_SPACING, DEFAULT_BLOCK_DURATION)
    }
}

impl RateLimiter {
    pub fn new(min_spacing: Duration, block_duration: Duration) -> Self {
        Self {
            state: Mutex::new(RateLimitState::default()),
            min_spacing: min_spacing.min(MAX_MIN_SPACING),
            block_duration: block_duration.min(MAX_BLOCK_DURATION),
        }
    }

    pub fn min_spacing(&self) -> Duration {
        self.min_spacing
    }

    pub fn block_duration(&self) -> Duration {
        self.block_duration
    }

    /// `false` while a block window is active. Otherwise reserves the next
    /// dispatch slot (at least `min_spacing` after the previous one), waits
    /// for it and returns `true`.
    ///
    /// The check and the reservation happen under one lock, so concurrent
    /// callers are spaced out rather than released together.
    pub async fn can_proceed(&self) -> bool {
        let slot = {
            let mut st = self.state.lock().expect("rate limiter mutex poisoned");
            let now = Instant::now();
            if st.blocked_until.is_some_and(|until| now < until) {
                return false;
            }
            let slot = st
                .last_call_at
                .and_then(|last| last.checked_add(self.min_spacing))
                .map_or(now, |next| next.max(now));
            st.last_call_at = Some(slot);
            slot
        };

        let wait = slot.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            tracing::debug!(
                target: "rate_limit",
                wait_ms = wait.as_millis() as u64,
                "spacing live call"
            );
            tokio::time::sleep_until(slot).await;
            // a block may have opened while we waited
            if self.is_blocked() {
                return false;
            }
        }
        true
    }

    /// Note that a live call was dispatched.
    pub fn record_call(&self) {
        self.record_calls(1);
    }

    /// Note `n` upstream requests made for one dispatch.
    pub fn record_calls(&self, n: u32) {
        let mut st = self.state.lock().expect("rate limiter mutex poisoned");
        st.call_count = st.call_count.saturating_add(u64::from(n));
        counter!("live_calls_total").increment(u64::from(n));
    }

    /// Suspend live calls for `duration` (or the configured default).
    pub fn trigger_block(&self, duration: Option<Duration>) {
        let d = duration
            .unwrap_or(self.block_duration)
            .min(MAX_BLOCK_DURATION);
        let mut st = self.state.lock().expect("rate limiter mutex poisoned");
        st.blocked_until = Some(Instant::now() + d);
        counter!("rate_limit_blocks_total").increment(1);
        tracing::warn!(
            target: "rate_limit",
            block_secs = d.as_secs(),
            "live calls blocked after rate-limit signal"
        );
    }

    pub fn set_demo_mode(&self, forced: bool) {
        let mut st = self.state.lock().expect("rate limiter mutex poisoned");
        if st.demo_mode_forced != forced {
            tracing::info!(target: "rate_limit", forced, "demo mode toggled");
        }
        st.demo_mode_forced = forced;
    }

    pub fn demo_mode_forced(&self) -> bool {
        self.state
            .lock()
            .expect("rate limiter mutex poisoned")
            .demo_mode_forced
    }

    pub fn is_blocked(&self) -> bool {
        self.remaining_block() > Duration::ZERO
    }

    pub fn remaining_block(&self) -> Duration {
        let st = self.state.lock().expect("rate limiter mutex poisoned");
        st.blocked_until
            .map(|until| until.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }

    pub fn call_count(&self) -> u64 {
        self.state
            .lock()
            .expect("rate limiter mutex poisoned")
            .call_count
    }

    pub fn snapshot(&self) -> RateLimitSnapshot {
        let st = self.state.lock().expect("rate limiter mutex poisoned");
        let remaining = st
            .blocked_until
            .map(|until| until.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO);
        RateLimitSnapshot {
            demo_mode_forced: st.demo_mode_forced,
            is_rate_limited: !remaining.is_zero(),
            // round up so a live block never reports 0s remaining
            remaining_block_seconds: remaining.as_secs()
                + u64::from(remaining.subsec_nanos() > 0),
            total_live_calls: st.call_count,
        }
    }
}
