mod file_config;

pub use file_config::{FileConfig, PaymentConfig, PlayoutConfig, SearchConfig};

use crate::search::DEFAULT_YOUTUBE_BASE_URL;
use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;

pub const DEFAULT_MERCADO_PAGO_BASE_URL: &str = "https://api.mercadopago.com";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,
    pub admin_user: Option<String>,
    pub admin_pass: Option<String>,
    pub search_api_key: Option<String>,
    pub payment_access_token: Option<String>,
    pub payment_notification_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,
    pub admin: AdminCredentials,
    pub db_busy_timeout_ms: u64,

    // Feature configs (with defaults)
    pub playout: PlayoutSettings,
    pub search: SearchSettings,
    pub payment: PaymentSettings,
}

#[derive(Clone, PartialEq, Eq)]
pub struct AdminCredentials {
    pub user: String,
    pub pass: String,
}

impl std::fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("user", &self.user)
            .field("pass", &"<redacted>")
            .finish()
    }
}

impl Default for AdminCredentials {
    fn default() -> Self {
        Self {
            user: "admin".to_string(),
            pass: "admin".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreRetrySettings {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for StoreRetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 50,
            max_backoff_ms: 1000,
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayoutSettings {
    /// How long the queue must stay empty before the fallback catalog is materialized.
    pub inactivity_delay_ms: u64,
    /// Upper bound on a single track when the display never reports its end.
    pub max_track_duration_secs: u64,
    pub recovery_delay_ms: u64,
    pub store_retry: StoreRetrySettings,
}

impl Default for PlayoutSettings {
    fn default() -> Self {
        Self {
            inactivity_delay_ms: 5000,
            max_track_duration_secs: 300,
            recovery_delay_ms: 5000,
            store_retry: StoreRetrySettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub results_limit: usize,
    pub admin_results_limit: usize,
    pub cache_ttl_secs: u64,
    pub timeout_secs: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_YOUTUBE_BASE_URL.to_string(),
            results_limit: 6,
            admin_results_limit: 5,
            cache_ttl_secs: 86400, // 24 hours
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentSettings {
    pub access_token: Option<String>,
    pub base_url: String,
    pub notification_url: Option<String>,
    pub payer_email: String,
    pub timeout_secs: u64,
    pub max_items_per_order: usize,
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            access_token: None,
            base_url: DEFAULT_MERCADO_PAGO_BASE_URL.to_string(),
            notification_url: None,
            payer_email: "pagador@email.com".to_string(),
            timeout_secs: 15,
            max_items_per_order: 10,
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        // TOML overrides CLI for each field
        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        // Validate db_dir exists
        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);
        if port == metrics_port {
            bail!("port and metrics_port must differ (both are {})", port);
        }

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let frontend_dir_path = file
            .frontend_dir_path
            .or_else(|| cli.frontend_dir_path.clone());

        let defaults = AdminCredentials::default();
        let admin = AdminCredentials {
            user: file
                .admin_user
                .or_else(|| cli.admin_user.clone())
                .unwrap_or(defaults.user),
            pass: file
                .admin_pass
                .or_else(|| cli.admin_pass.clone())
                .unwrap_or(defaults.pass),
        };
        if admin.user.is_empty() {
            bail!("admin_user must not be empty");
        }

        let db_busy_timeout_ms = file.db_busy_timeout_ms.unwrap_or(5000);

        // Playout settings - merge file config with defaults
        let playout_file = file.playout.unwrap_or_default();
        let playout_defaults = PlayoutSettings::default();
        let retry_defaults = playout_defaults.store_retry.clone();
        let playout = PlayoutSettings {
            inactivity_delay_ms: playout_file
                .inactivity_delay_ms
                .unwrap_or(playout_defaults.inactivity_delay_ms),
            max_track_duration_secs: playout_file
                .max_track_duration_secs
                .unwrap_or(playout_defaults.max_track_duration_secs),
            recovery_delay_ms: playout_file
                .recovery_delay_ms
                .unwrap_or(playout_defaults.recovery_delay_ms),
            store_retry: StoreRetrySettings {
                max_retries: playout_file
                    .store_max_retries
                    .unwrap_or(retry_defaults.max_retries),
                initial_backoff_ms: playout_file
                    .store_initial_backoff_ms
                    .unwrap_or(retry_defaults.initial_backoff_ms),
                max_backoff_ms: playout_file
                    .store_max_backoff_ms
                    .unwrap_or(retry_defaults.max_backoff_ms),
                backoff_multiplier: playout_file
                    .store_backoff_multiplier
                    .unwrap_or(retry_defaults.backoff_multiplier),
            },
        };
        if playout.max_track_duration_secs == 0 {
            bail!("playout.max_track_duration_secs must be greater than zero");
        }

        let search_file = file.search.unwrap_or_default();
        let search_defaults = SearchSettings::default();
        let search = SearchSettings {
            api_key: search_file
                .api_key
                .or_else(|| cli.search_api_key.clone())
                .filter(|key| !key.is_empty()),
            base_url: search_file.base_url.unwrap_or(search_defaults.base_url),
            results_limit: search_file
                .results_limit
                .unwrap_or(search_defaults.results_limit),
            admin_results_limit: search_file
                .admin_results_limit
                .unwrap_or(search_defaults.admin_results_limit),
            cache_ttl_secs: search_file
                .cache_ttl_secs
                .unwrap_or(search_defaults.cache_ttl_secs),
            timeout_secs: search_file
                .timeout_secs
                .unwrap_or(search_defaults.timeout_secs),
        };

        let payment_file = file.payment.unwrap_or_default();
        let payment_defaults = PaymentSettings::default();
        let payment = PaymentSettings {
            access_token: payment_file
                .access_token
                .or_else(|| cli.payment_access_token.clone())
                .filter(|token| !token.is_empty()),
            base_url: payment_file.base_url.unwrap_or(payment_defaults.base_url),
            notification_url: payment_file
                .notification_url
                .or_else(|| cli.payment_notification_url.clone()),
            payer_email: payment_file
                .payer_email
                .unwrap_or(payment_defaults.payer_email),
            timeout_secs: payment_file
                .timeout_secs
                .unwrap_or(payment_defaults.timeout_secs),
            max_items_per_order: payment_file
                .max_items_per_order
                .unwrap_or(payment_defaults.max_items_per_order),
        };
        if payment.max_items_per_order == 0 {
            bail!("payment.max_items_per_order must be greater than zero");
        }

        Ok(Self {
            db_dir,
            port,
            metrics_port,
            logging_level,
            frontend_dir_path,
            admin,
            db_busy_timeout_ms,
            playout,
            search,
            payment,
        })
    }

    pub fn jukebox_db_path(&self) -> PathBuf {
        self.db_dir.join("jukebox.db")
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
