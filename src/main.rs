//! Social sentiment service: binary entrypoint.
//! Loads settings (fatal on bad credentials), builds the pipeline and serves
//! the Axum router.

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use social_sentiment::api::{create_router, AppState};
use social_sentiment::metrics::Metrics;
use social_sentiment::{SentimentPipeline, Settings};

/// Enable tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - PIPELINE_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("PIPELINE_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pipeline=info,fetch=info,cache=info,rate_limit=info,config=info,warn"));

    let json = std::env::var("PIPELINE_LOG_JSON").ok().as_deref() == Some("1");
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

fn debug_routes_enabled() -> bool {
    std::env::var("DEBUG_ROUTES").ok().as_deref() == Some("1")
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    enable_dev_tracing();

    // Recorder first, so gauges set while building the pipeline are kept.
    let metrics = if debug_routes_enabled() {
        Some(Metrics::init()?)
    } else {
        None
    };

    // Missing credentials for an enabled provider stop startup here.
    let settings = Settings::load_default().context("loading pipeline settings")?;
    let pipeline = SentimentPipeline::from_settings(settings).context("building pipeline")?;

    let mut router = create_router(AppState::new(pipeline));
    if let Some(m) = metrics {
        router = router.merge(m.router());
    }

    Ok(router.into())
}
