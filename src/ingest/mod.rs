// src/ingest/mod.rs
pub mod fallback;
pub mod providers;
pub mod synthetic;
pub mod types;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use regex::Regex;

pub use fallback::FallbackFetcher;
pub use types::{FailureKind, LiveProvider, ProviderError, Query, QueryMode, RawItem, SourceTag};

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "fetch_tier_served_total",
            "Fetches answered, labelled by the tier that served them."
        );
        describe_counter!(
            "fetch_provider_failures_total",
            "Live provider failures by tier and failure kind."
        );
        describe_counter!("live_calls_total", "Live provider calls dispatched.");
        describe_counter!(
            "rate_limit_blocks_total",
            "Block windows opened after a rate-limit signal."
        );
        describe_counter!("cache_hits_total", "Analyses served from the result cache.");
        describe_counter!("cache_misses_total", "Analyses computed afresh.");
        describe_histogram!("pipeline_analyze_ms", "End-to-end analyze time in milliseconds.");
        describe_gauge!("cache_ttl_secs", "Configured result cache TTL in seconds.");
    });
}

fn re(cell: &'static OnceCell<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static normalizer regex"))
}

/// Strip the noise tokens of a social post: repost markers, `@mentions`,
/// the `#` of hashtags (word kept), links and line breaks. Whitespace runs
/// collapse to one space and the result is trimmed.
///
/// Idempotent: the passes are repeated until the text stops changing, so
/// markers exposed by an earlier removal (e.g. `@#name`) are caught too.
pub fn normalize_text(s: &str) -> String {
    let mut cur = normalize_pass(s);
    loop {
        let next = normalize_pass(&cur);
        if next == cur {
            return cur;
        }
        cur = next;
    }
}

fn normalize_pass(s: &str) -> String {
    static RE_REPOST: OnceCell<Regex> = OnceCell::new();
    static RE_MENTION: OnceCell<Regex> = OnceCell::new();
    static RE_LINK: OnceCell<Regex> = OnceCell::new();
    static RE_WS: OnceCell<Regex> = OnceCell::new();

    // 1) Repost prefix, including the "RT @user:" form
    let out = re(&RE_REPOST, r"\bRT\s+(?:@[A-Za-z0-9_]+:?\s*)?").replace_all(s, "");

    // 2) Links before mentions, so "https://x.com/@a" goes in one piece
    let out = re(&RE_LINK, r"https?://\S+").replace_all(&out, "");

    // 3) @mentions
    let out = re(&RE_MENTION, r"@[A-Za-z0-9_]+").replace_all(&out, "");

    // 4) Hashtag marker only
    let out = out.replace('#', "");

    // 5) Line breaks and whitespace runs
    let out = re(&RE_WS, r"\s+").replace_all(&out, " ");

    out.trim().to_string()
}
