// src/config/pipeline.rs
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{env, fs};

use super::ConfigError;
use crate::ingest::synthetic::{
    SyntheticSettings, DEFAULT_RECENT_WINDOW_SECS, DEFAULT_SYNTHETIC_CAP,
    DEFAULT_WIDE_WINDOW_SECS, MAX_WINDOW_SECS,
};
use crate::cache::MAX_TTL_SECS;
use crate::rate_limit::{MAX_BLOCK_DURATION, MAX_MIN_SPACING};

pub const DEFAULT_PIPELINE_CONFIG_PATH: &str = "config/pipeline.toml";
pub const ENV_PIPELINE_CONFIG_PATH: &str = "PIPELINE_CONFIG_PATH";

pub const ENV_PRIMARY_TOKEN: &str = "PRIMARY_BEARER_TOKEN";
pub const ENV_SECONDARY_TOKEN: &str = "SECONDARY_BEARER_TOKEN";

fn default_ceiling() -> u32 {
    200
}
fn default_cache_ttl() -> u64 {
    600
}
fn default_spacing() -> u64 {
    2
}
fn default_block() -> u64 {
    900
}
fn default_demo_mode() -> bool {
    true
}
fn default_base_url() -> String {
    "https://api.twitter.com".to_string()
}
fn default_per_call_max() -> u32 {
    100
}
fn default_timeout() -> u64 {
    10
}
fn default_synthetic_cap() -> u32 {
    DEFAULT_SYNTHETIC_CAP
}
fn default_recent_window() -> i64 {
    DEFAULT_RECENT_WINDOW_SECS
}
fn default_wide_window() -> i64 {
    DEFAULT_WIDE_WINDOW_SECS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// "ENV" means: read from PRIMARY_BEARER_TOKEN / SECONDARY_BEARER_TOKEN.
    #[serde(default)]
    pub bearer_token: String,
    #[serde(default = "default_per_call_max")]
    pub per_call_max: u32,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_base_url(),
            bearer_token: String::new(),
            per_call_max: default_per_call_max(),
            timeout_secs: default_timeout(),
        }
    }
}

impl ProviderSettings {
    pub fn is_usable(&self) -> bool {
        self.enabled && !self.bearer_token.trim().is_empty()
    }

    fn resolve_token(&mut self, name: &'static str, var: &'static str) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        if self.bearer_token.trim().eq_ignore_ascii_case("env") {
            self.bearer_token = env::var(var)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::MissingCredential { provider: name, var })?;
        }
        if self.bearer_token.trim().is_empty() {
            return Err(ConfigError::MissingCredential { provider: name, var });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticSection {
    #[serde(default = "default_synthetic_cap")]
    pub cap: u32,
    #[serde(default = "default_recent_window")]
    pub recent_window_secs: i64,
    #[serde(default = "default_wide_window")]
    pub wide_window_secs: i64,
}

impl Default for SyntheticSection {
    fn default() -> Self {
        Self {
            cap: default_synthetic_cap(),
            recent_window_secs: default_recent_window(),
            wide_window_secs: default_wide_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_ceiling")]
    pub item_count_ceiling: u32,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_spacing")]
    pub min_call_spacing_secs: u64,
    #[serde(default = "default_block")]
    pub rate_limit_block_secs: u64,
    /// Start with live tiers switched off.
    #[serde(default = "default_demo_mode")]
    pub demo_mode: bool,
    #[serde(default)]
    pub synthetic: SyntheticSection,
    #[serde(default)]
    pub primary: ProviderSettings,
    #[serde(default)]
    pub secondary: ProviderSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            item_count_ceiling: default_ceiling(),
            cache_ttl_secs: default_cache_ttl(),
            min_call_spacing_secs: default_spacing(),
            rate_limit_block_secs: default_block(),
            demo_mode: default_demo_mode(),
            synthetic: SyntheticSection::default(),
            primary: ProviderSettings::default(),
            secondary: ProviderSettings::default(),
        }
    }
}

impl Settings {
    /// Parse TOML, then apply env overrides, resolve credentials and validate.
    pub fn from_toml_str(s: &str, origin: &Path) -> Result<Self, ConfigError> {
        let cfg: Settings = toml::from_str(s).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            source: e,
        })?;
        cfg.finish()
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&content, path)
    }

    /// Load settings using env var + fallbacks:
    /// 1) $PIPELINE_CONFIG_PATH (must exist)
    /// 2) config/pipeline.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self, ConfigError> {
        if let Ok(p) = env::var(ENV_PIPELINE_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(ConfigError::MissingPath(pb));
            }
            return Self::load_from(&pb);
        }
        let default_p = PathBuf::from(DEFAULT_PIPELINE_CONFIG_PATH);
        if default_p.exists() {
            return Self::load_from(&default_p);
        }
        tracing::info!(target: "config", "no pipeline config file; using defaults");
        Settings::default().finish()
    }

    fn finish(mut self) -> Result<Self, ConfigError> {
        self.apply_env_overrides()?;
        self.primary.resolve_token("primary", ENV_PRIMARY_TOKEN)?;
        self.secondary.resolve_token("secondary", ENV_SECONDARY_TOKEN)?;
        self.validate()?;
        tracing::info!(
            target: "config",
            ceiling = self.item_count_ceiling,
            cache_ttl_secs = self.cache_ttl_secs,
            primary = self.primary.enabled,
            secondary = self.secondary.enabled,
            demo_mode = self.demo_mode,
            "pipeline settings loaded"
        );
        Ok(self)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(v) = env_num::<u32>("ITEM_COUNT_CEILING")? {
            self.item_count_ceiling = v;
        }
        if let Some(v) = env_num::<u64>("CACHE_TTL_SECS")? {
            self.cache_ttl_secs = v;
        }
        if let Some(v) = env_num::<u64>("MIN_CALL_SPACING_SECS")? {
            self.min_call_spacing_secs = v;
        }
        if let Some(v) = env_num::<u64>("RATE_LIMIT_BLOCK_SECS")? {
            self.rate_limit_block_secs = v;
        }
        if let Ok(raw) = env::var("DEMO_MODE") {
            self.demo_mode = parse_bool(&raw).ok_or_else(|| {
                ConfigError::Invalid(format!("DEMO_MODE must be a boolean, got '{raw}'"))
            })?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.item_count_ceiling == 0 {
            return Err(ConfigError::Invalid(
                "item_count_ceiling must be at least 1".into(),
            ));
        }
        if self.synthetic.cap == 0 {
            return Err(ConfigError::Invalid("synthetic.cap must be at least 1".into()));
        }
        if self.synthetic.recent_window_secs <= 0 || self.synthetic.wide_window_secs <= 0 {
            return Err(ConfigError::Invalid(
                "synthetic recency windows must be positive".into(),
            ));
        }
        if self.synthetic.recent_window_secs > MAX_WINDOW_SECS
            || self.synthetic.wide_window_secs > MAX_WINDOW_SECS
        {
            return Err(ConfigError::Invalid(format!(
                "synthetic recency windows must be at most {MAX_WINDOW_SECS}s"
            )));
        }
        if self.cache_ttl_secs > MAX_TTL_SECS as u64 {
            return Err(ConfigError::Invalid(format!(
                "cache_ttl_secs must be at most {MAX_TTL_SECS}"
            )));
        }
        if self.min_call_spacing_secs > MAX_MIN_SPACING.as_secs() {
            return Err(ConfigError::Invalid(format!(
                "min_call_spacing_secs must be at most {}",
                MAX_MIN_SPACING.as_secs()
            )));
        }
        if self.rate_limit_block_secs > MAX_BLOCK_DURATION.as_secs() {
            return Err(ConfigError::Invalid(format!(
                "rate_limit_block_secs must be at most {}",
                MAX_BLOCK_DURATION.as_secs()
            )));
        }
        for (name, p) in [("primary", &self.primary), ("secondary", &self.secondary)] {
            if p.enabled && p.per_call_max == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{name}.per_call_max must be at least 1"
                )));
            }
        }
        Ok(())
    }

    /// At least one live tier is enabled and holds a token.
    pub fn has_valid_credentials(&self) -> bool {
        self.primary.is_usable() || self.secondary.is_usable()
    }

    pub fn synthetic_settings(&self) -> SyntheticSettings {
        SyntheticSettings {
            cap: self.synthetic.cap,
            recent_window_secs: self.synthetic.recent_window_secs,
            wide_window_secs: self.synthetic.wide_window_secs,
        }
    }
}

fn env_num<T: std::str::FromStr>(var: &str) -> Result<Option<T>, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(format!("{var} must be a number, got '{raw}'"))),
        Err(_) => Ok(None),
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
