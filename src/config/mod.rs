// src/config/mod.rs
pub mod pipeline;

use std::path::PathBuf;
use thiserror::Error;

pub use pipeline::{ProviderSettings, Settings};

/// Configuration problems are fatal: they surface at startup, before any
/// query is processed, and are never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("PIPELINE_CONFIG_PATH points to non-existent path {}", .0.display())]
    MissingPath(PathBuf),

    #[error("reading config from {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parsing config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("{provider} provider is enabled but has no credentials (set {var})")]
    MissingCredential {
        provider: &'static str,
        var: &'static str,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
