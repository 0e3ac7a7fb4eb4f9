// src/api.rs
//! HTTP surface for the presentation layer: analyze, status snapshot and
//! the demo-mode switch.

use axum::{
    extract::State,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::ingest::types::{Query, QueryMode};
use crate::pipeline::{PipelineStatus, ScoredItem, SentimentPipeline};
use crate::summary::SentimentSummary;

fn default_count() -> u32 {
    50
}

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<SentimentPipeline>,
}

impl AppState {
    pub fn new(pipeline: SentimentPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/analyze", post(analyze))
        .route("/status", get(status))
        .route("/demo-mode", put(set_demo_mode))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct AnalyzeReq {
    mode: QueryMode,
    subject: String,
    #[serde(default = "default_count")]
    count: u32,
    #[serde(default)]
    include_reposts: bool,
    /// Same as pressing "analyze" with the demo checkbox set.
    #[serde(default)]
    demo_mode: Option<bool>,
}

#[derive(Debug, Serialize)]
struct AnalyzeResp {
    subject: String,
    /// No content survived filtering; not an error.
    empty: bool,
    summary: SentimentSummary,
    status: PipelineStatus,
    items: Vec<ScoredItem>,
}

async fn analyze(State(state): State<AppState>, Json(body): Json<AnalyzeReq>) -> Json<AnalyzeResp> {
    if let Some(forced) = body.demo_mode {
        state.pipeline.set_demo_mode(forced);
    }
    let query = Query {
        mode: body.mode,
        subject: body.subject,
        count: body.count,
        include_reposts: body.include_reposts,
    };
    let subject = query.prepared(state.pipeline.item_count_ceiling()).subject;

    let result = state.pipeline.analyze(&query).await;
    let items: Vec<ScoredItem> = result.as_ref().clone();
    Json(AnalyzeResp {
        subject,
        empty: items.is_empty(),
        summary: SentimentSummary::from_items(&items),
        status: state.pipeline.status(),
        items,
    })
}

async fn status(State(state): State<AppState>) -> Json<PipelineStatus> {
    Json(state.pipeline.status())
}

#[derive(Debug, Deserialize)]
struct DemoModeReq {
    enabled: bool,
}

async fn set_demo_mode(
    State(state): State<AppState>,
    Json(body): Json<DemoModeReq>,
) -> Json<PipelineStatus> {
    state.pipeline.set_demo_mode(body.enabled);
    Json(state.pipeline.status())
}
