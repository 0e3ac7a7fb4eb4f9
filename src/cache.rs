// src/cache.rs
//! In-memory result cache with absolute TTL (no sliding refresh).
//!
//! Entries are keyed by a digest of the full query tuple, replaced whole on
//! recompute and evicted lazily when a read finds them expired.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::clock::SharedClock;
use crate::ingest::types::{Query, QueryMode};
use crate::pipeline::ScoredItem;

pub const DEFAULT_TTL_SECS: i64 = 600;
/// Longest accepted TTL; keeps `now + ttl` representable.
pub const MAX_TTL_SECS: i64 = 30 * 24 * 3600;

pub type CachedResult = Arc<Vec<ScoredItem>>;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CachedResult,
    expires_at: DateTime<Utc>,
}

/// Digest of (mode, subject, count, include_reposts).
pub fn cache_key(q: &Query) -> String {
    let mode = match q.mode {
        QueryMode::Keyword => "keyword",
        QueryMode::SubjectTimeline => "timeline",
    };
    let mut hasher = Sha256::new();
    hasher.update(mode.as_bytes());
    hasher.update([0u8]);
    hasher.update(q.subject.as_bytes());
    hasher.update([0u8]);
    hasher.update(q.count.to_be_bytes());
    hasher.update([u8::from(q.include_reposts)]);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(32);
    for b in digest.iter().take(16) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

pub struct ResultCache {
    ttl: Duration,
    clock: SharedClock,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResultCache {
    pub fn new(ttl: Duration, clock: SharedClock) -> Self {
        Self {
            ttl,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Live entry for `key`, if any. An expired entry is dropped on the way.
    pub fn get(&self, key: &str) -> Option<CachedResult> {
        let now = self.clock.now();
        let mut map = self.entries.lock().expect("result cache mutex poisoned");
        match map.get(key) {
            Some(e) if now < e.expires_at => Some(Arc::clone(&e.value)),
            Some(_) => {
                map.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store `value` under `key`, replacing any previous entry. Expired
    /// entries under other keys are swept on the way, so the map only holds
    /// queries seen within the last TTL.
    pub fn put(&self, key: String, value: CachedResult) {
        let now = self.clock.now();
        let expires_at = now + self.ttl;
        let mut map = self.entries.lock().expect("result cache mutex poisoned");
        map.retain(|_, e| now < e.expires_at);
        map.insert(key, CacheEntry { value, expires_at });
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .expect("result cache mutex poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .expect("result cache mutex poisoned")
            .clear();
    }
}
