// src/ingest/synthetic.rs
//! Terminal tier of the fallback chain: plausible generated posts.
//!
//! Keyword queries draw from three sentiment pools mixed 3:2:1
//! (positive:neutral:negative); timeline queries draw from a single pool of
//! account-voice templates. Every template carries its label, so the mix of
//! a generated batch is known up front.

use chrono::Duration;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

use crate::clock::SharedClock;
use crate::ingest::types::{Query, QueryMode, RawItem, SourceTag};
use crate::sentiment::SentimentLabel;
use crate::sentiment::SentimentLabel::{Negative, Neutral, Positive};

pub const DEFAULT_SYNTHETIC_CAP: u32 = 200;
pub const DEFAULT_RECENT_WINDOW_SECS: i64 = 48 * 3600;
pub const DEFAULT_WIDE_WINDOW_SECS: i64 = 30 * 24 * 3600;
/// Longest accepted recency window; larger settings are clamped.
pub const MAX_WINDOW_SECS: i64 = 365 * 24 * 3600;

/// Pool weights for keyword mode, in sixths.
const POSITIVE_SHARE: u32 = 3;
const NEUTRAL_SHARE: u32 = 2;
const NEGATIVE_SHARE: u32 = 1;

#[derive(Debug, Clone, Copy)]
pub struct Template {
    pub text: &'static str,
    pub label: SentimentLabel,
}

const fn t(text: &'static str, label: SentimentLabel) -> Template {
    Template { text, label }
}

static KEYWORD_POSITIVE: &[Template] = &[
    t("Really impressed with the latest {subject} update, the new features are amazing! #innovation", Positive),
    t("{subject} just keeps getting better. Great work by the whole team at {event} 🚀", Positive),
    t("Loving how {subject} made my workflow so much easier this week. Highly recommend!", Positive),
    t("RT @techdaily: {subject} adoption grew {pct}% this quarter, excellent momentum https://t.co/x1y2z3", Positive),
    t("Best session at {event} was the one on {subject}. Brilliant speakers and a fantastic crowd", Positive),
    t("Happy to see {subject} trending today, the community around it is wonderful #{tag}", Positive),
    t("Just tried {subject} for the first time and I am genuinely excited about it", Positive),
    t("With {followers} people following the {subject} story, the support has been incredible", Positive),
];

static KEYWORD_NEUTRAL: &[Template] = &[
    t("Reading up on {subject} before {event} next week. Any recommended sources?", Neutral),
    t("{subject} was mentioned {pct} times in today's panel at {event}", Neutral),
    t("Thread on how {subject} works under the hood 🧵 https://t.co/a9b8c7", Neutral),
    t("@analyst_feed what is the timeline for the {subject} rollout?", Neutral),
    t("Our team is evaluating {subject} this month #{tag}", Neutral),
    t("Survey results on {subject} usage will be published after {event}", Neutral),
];

static KEYWORD_NEGATIVE: &[Template] = &[
    t("Disappointed with {subject} lately, the last release feels slow and buggy", Negative),
    t("Not convinced {subject} lives up to the hype after {event}. Pretty bad demo", Negative),
    t("The {subject} outage today was terrible, {pct}% of requests failed for us #fail", Negative),
    t("Worried that {subject} is getting too expensive for small teams", Negative),
];

static TIMELINE_TEMPLATES: &[Template] = &[
    t("Thank you to our {followers} followers, we are thrilled to share what {subject} built next!", Positive),
    t("Excited to announce our new partnership ahead of {event} #{tag}", Positive),
    t("Great conversations at {event} today. Proud of the {subject} team!", Positive),
    t("Join us live at {event} for the latest product news https://t.co/q7w8e9", Neutral),
    t("Our quarterly update is now available on the {subject} blog", Neutral),
    t("RT @{subject}_support: Scheduled maintenance starts at 02:00 UTC", Neutral),
    t("We are aware of the issue affecting some users and we are sorry for the frustrating experience", Negative),
];

static EVENTS: &[&str] = &[
    "TechConf",
    "the product summit",
    "DevWeek",
    "the annual keynote",
    "Launch Day",
    "the community meetup",
];

static TAGS: &[&str] = &["tech", "AI", "future", "startup", "product", "news"];

/// A generated item together with the label of the pool it came from.
#[derive(Debug, Clone)]
pub struct SyntheticItem {
    pub item: RawItem,
    pub pool: SentimentLabel,
}

#[derive(Debug, Clone, Copy)]
pub struct SyntheticSettings {
    pub cap: u32,
    pub recent_window_secs: i64,
    pub wide_window_secs: i64,
}

impl Default for SyntheticSettings {
    fn default() -> Self {
        Self {
            cap: DEFAULT_SYNTHETIC_CAP,
            recent_window_secs: DEFAULT_RECENT_WINDOW_SECS,
            wide_window_secs: DEFAULT_WIDE_WINDOW_SECS,
        }
    }
}

pub struct SyntheticGenerator {
    settings: SyntheticSettings,
    clock: SharedClock,
    rng: Mutex<StdRng>,
}

impl SyntheticGenerator {
    pub fn new(settings: SyntheticSettings, clock: SharedClock) -> Self {
        Self {
            settings,
            clock,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Reproducible output for tests.
    pub fn with_seed(settings: SyntheticSettings, clock: SharedClock, seed: u64) -> Self {
        Self {
            settings,
            clock,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn cap(&self) -> u32 {
        self.settings.cap
    }

    pub fn generate(&self, query: &Query) -> Vec<RawItem> {
        self.generate_tagged(query)
            .into_iter()
            .map(|s| s.item)
            .collect()
    }

    /// `min(query.count, cap)` items, newest-first.
    pub fn generate_tagged(&self, query: &Query) -> Vec<SyntheticItem> {
        let n = query.count.min(self.settings.cap) as usize;
        let now = self.clock.now();
        let window = match query.mode {
            // keyword search only ever sees recent posts
            QueryMode::Keyword => self.settings.recent_window_secs,
            QueryMode::SubjectTimeline => self.settings.wide_window_secs,
        }
        .clamp(1, MAX_WINDOW_SECS);
        let subject = display_subject(query);

        let mut rng = self.rng.lock().expect("synthetic rng mutex poisoned");
        let batch: u32 = rng.random();

        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            let pool = match query.mode {
                QueryMode::Keyword => keyword_pool(&mut *rng),
                QueryMode::SubjectTimeline => TIMELINE_TEMPLATES,
            };
            let tpl = pick(&mut *rng, pool);
            let text = fill(tpl.text, &subject, &mut *rng);
            let age = rng.random_range(0..window);
            out.push(SyntheticItem {
                item: RawItem {
                    id: format!("synthetic-{batch:08x}-{i:04}"),
                    text,
                    created_at: now - Duration::seconds(age),
                    source_tag: SourceTag::Synthetic,
                },
                pool: tpl.label,
            });
        }
        drop(rng);

        out.sort_by(|a, b| b.item.created_at.cmp(&a.item.created_at));
        out
    }
}

fn display_subject(query: &Query) -> String {
    let s = query.subject.trim();
    if s.is_empty() {
        "this".to_string()
    } else {
        s.trim_start_matches('#').to_string()
    }
}

fn keyword_pool<R: Rng + ?Sized>(rng: &mut R) -> &'static [Template] {
    let total = POSITIVE_SHARE + NEUTRAL_SHARE + NEGATIVE_SHARE;
    let roll = rng.random_range(0..total);
    if roll < POSITIVE_SHARE {
        KEYWORD_POSITIVE
    } else if roll < POSITIVE_SHARE + NEUTRAL_SHARE {
        KEYWORD_NEUTRAL
    } else {
        KEYWORD_NEGATIVE
    }
}

fn pick<R: Rng + ?Sized>(rng: &mut R, pool: &'static [Template]) -> Template {
    pool[rng.random_range(0..pool.len())]
}

fn fill<R: Rng + ?Sized>(template: &str, subject: &str, rng: &mut R) -> String {
    let followers = rng.random_range(1_000u32..=500_000);
    let pct = rng.random_range(5u32..=60);
    let event = EVENTS[rng.random_range(0..EVENTS.len())];
    let tag = TAGS[rng.random_range(0..TAGS.len())];
    template
        .replace("{subject}", subject)
        .replace("{followers}", &format_thousands(followers))
        .replace("{pct}", &pct.to_string())
        .replace("{event}", event)
        .replace("{tag}", tag)
}

fn format_thousands(n: u32) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
