use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
    pub logging_level: Option<String>,
    pub frontend_dir_path: Option<String>,
    pub admin_user: Option<String>,
    pub admin_pass: Option<String>,
    pub db_busy_timeout_ms: Option<u64>,

    // Feature configs
    pub playout: Option<PlayoutConfig>,
    pub search: Option<SearchConfig>,
    pub payment: Option<PaymentConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct PlayoutConfig {
    pub inactivity_delay_ms: Option<u64>,
    pub max_track_duration_secs: Option<u64>,
    pub recovery_delay_ms: Option<u64>,
    // Storage retry knobs
    pub store_max_retries: Option<u32>,
    pub store_initial_backoff_ms: Option<u64>,
    pub store_max_backoff_ms: Option<u64>,
    pub store_backoff_multiplier: Option<f64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SearchConfig {
    /// YouTube Data API key. Without one, search always returns nothing.
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub results_limit: Option<usize>,
    pub admin_results_limit: Option<usize>,
    pub cache_ttl_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct PaymentConfig {
    pub access_token: Option<String>,
    pub base_url: Option<String>,
    /// Public URL of our `/webhook`, handed to the provider with every intent.
    pub notification_url: Option<String>,
    pub payer_email: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_items_per_order: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
