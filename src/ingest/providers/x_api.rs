// src/ingest/providers/x_api.rs
//! Live provider speaking the X API v2 JSON shape (recent search + user
//! timeline). Used for both the primary and the secondary tier; they differ
//! only in base URL, token and per-call maximum.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header::RETRY_AFTER, StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;

use crate::ingest::types::{LiveProvider, ProviderError, QueryMode, RawItem, SourceTag};

/// The v2 endpoints refuse `max_results` below this.
const API_MIN_RESULTS: u32 = 10;

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    data: Vec<Post>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Post {
    id: String,
    text: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    title: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    detail: String,
}

#[derive(Debug, Deserialize)]
struct UserLookup {
    data: Option<User>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
struct User {
    id: String,
}

pub struct XApiProvider {
    tier: SourceTag,
    http: reqwest::Client,
    base_url: Url,
    bearer_token: String,
    per_call_max: u32,
}

impl XApiProvider {
    pub fn new(
        tier: SourceTag,
        base_url: &str,
        bearer_token: &str,
        per_call_max: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("social-sentiment/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .context("building provider http client")?;
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .with_context(|| format!("invalid provider base_url '{base_url}'"))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("provider base_url '{base_url}' cannot carry a path");
        }
        Ok(Self {
            tier,
            http,
            base_url,
            bearer_token: bearer_token.to_string(),
            per_call_max: per_call_max.max(1),
        })
    }

    pub fn tier(&self) -> SourceTag {
        self.tier
    }

    fn max_results_param(&self, max_items: u32) -> u32 {
        max_items.clamp(API_MIN_RESULTS, self.per_call_max.max(API_MIN_RESULTS))
    }

    /// `base_url` with `segments` appended, each percent-encoded as one
    /// path segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let url = self.endpoint(segments);
        let path = url.path().to_string();
        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.bearer_token)
            .query(query)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(format!("{} request: {e}", self.tier)))?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            return Err(classify_status(status, retry_after, &path));
        }

        resp.json::<T>()
            .await
            .map_err(|e| ProviderError::Transient(format!("{} decode: {e}", self.tier)))
    }

    async fn lookup_user_id(&self, username: &str) -> Result<String, ProviderError> {
        if !is_valid_handle(username) {
            return Err(ProviderError::NotFound(username.to_string()));
        }
        let lookup: UserLookup = self
            .get_json(&["2", "users", "by", "username", username], &[])
            .await?;
        match lookup.data {
            Some(u) => Ok(u.id),
            None => Err(errors_to_failure(&lookup.errors, username)),
        }
    }
}

#[async_trait]
impl LiveProvider for XApiProvider {
    async fn search_recent(
        &self,
        subject: &str,
        exclude_reposts: bool,
        max_items: u32,
    ) -> Result<Vec<RawItem>, ProviderError> {
        let mut q = format!("{subject} lang:en");
        if exclude_reposts {
            q.push_str(" -is:retweet");
        }
        let page: Page = self
            .get_json(
                &["2", "tweets", "search", "recent"],
                &[
                    ("query", q),
                    ("max_results", self.max_results_param(max_items).to_string()),
                    ("tweet.fields", "created_at".to_string()),
                ],
            )
            .await?;
        page_to_items(page, self.tier, max_items, subject)
    }

    async fn subject_timeline(
        &self,
        subject: &str,
        include_reposts: bool,
        max_items: u32,
    ) -> Result<Vec<RawItem>, ProviderError> {
        let user_id = self.lookup_user_id(subject).await?;
        let mut params = vec![
            ("max_results", self.max_results_param(max_items).to_string()),
            ("tweet.fields", "created_at".to_string()),
        ];
        if !include_reposts {
            params.push(("exclude", "retweets".to_string()));
        }
        let page: Page = self
            .get_json(&["2", "users", &user_id, "tweets"], &params)
            .await?;
        page_to_items(page, self.tier, max_items, subject)
    }

    fn per_call_max(&self) -> u32 {
        self.per_call_max
    }

    /// Timelines resolve the handle first, then list posts.
    fn requests_per_call(&self, mode: QueryMode) -> u32 {
        match mode {
            QueryMode::Keyword => 1,
            QueryMode::SubjectTimeline => 2,
        }
    }

    fn name(&self) -> &'static str {
        self.tier.as_str()
    }
}

/// Account handles are 1 to 15 of `[A-Za-z0-9_]`.
fn is_valid_handle(s: &str) -> bool {
    (1..=15).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

fn classify_status(status: StatusCode, retry_after: Option<u64>, what: &str) -> ProviderError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ProviderError::Auth(format!("{status} on {what}"))
        }
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
            retry_after_secs: retry_after,
        },
        StatusCode::NOT_FOUND => ProviderError::NotFound(what.to_string()),
        other => ProviderError::Transient(format!("{other} on {what}")),
    }
}

/// A 200 that carries only `errors` still means the call failed.
fn errors_to_failure(errors: &[ApiError], subject: &str) -> ProviderError {
    let not_found = errors
        .iter()
        .any(|e| e.title.contains("Not Found") || e.kind.ends_with("/resource-not-found"));
    if not_found {
        return ProviderError::NotFound(subject.to_string());
    }
    let detail = errors
        .first()
        .map(|e| format!("{}: {}", e.title, e.detail))
        .unwrap_or_else(|| "empty response".to_string());
    ProviderError::Transient(detail)
}

fn page_to_items(
    page: Page,
    tier: SourceTag,
    max_items: u32,
    subject: &str,
) -> Result<Vec<RawItem>, ProviderError> {
    if page.data.is_empty() && !page.errors.is_empty() {
        return Err(errors_to_failure(&page.errors, subject));
    }
    let now = Utc::now();
    Ok(page
        .data
        .into_iter()
        .take(max_items as usize)
        .map(|p| RawItem {
            id: format!("{}-{}", tier.as_str(), p.id),
            text: html_escape::decode_html_entities(&p.text).into_owned(),
            created_at: p.created_at.unwrap_or(now),
            source_tag: tier,
        })
        .collect())
}
