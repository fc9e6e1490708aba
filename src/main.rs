use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use std::{fmt::Debug, path::PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use jukebox_server::config;
use jukebox_server::payment::{MercadoPagoClient, SettlementGate};
use jukebox_server::playout::PlayoutScheduler;
use jukebox_server::search::{SearchService, YouTubeSearchClient};
use jukebox_server::server::state::ServerState;
use jukebox_server::server::websocket::ConnectionManager;
use jukebox_server::server::{metrics, run_server, RequestsLoggingLevel, ServerConfig};
use jukebox_server::store::SqliteJukeboxStore;

const SEARCH_CACHE_PRUNE_INTERVAL: Duration = Duration::from_secs(60 * 60);

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

fn parse_dir(s: &str) -> Result<PathBuf, String> {
    let path = parse_path(s)?;
    if !path.exists() {
        return Err(format!("Directory does not exist: {}", s));
    }
    if !path.is_dir() {
        return Err(format!("Path is not a directory: {}", s));
    }
    Ok(path)
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding jukebox.db. Can also be specified in config file.
    #[clap(long, value_parser = parse_dir)]
    pub db_dir: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3000)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Path to the frontend directory to be statically served.
    #[clap(long)]
    pub frontend_dir_path: Option<String>,

    /// Admin panel user name.
    #[clap(long)]
    pub admin_user: Option<String>,

    /// Admin panel password.
    #[clap(long)]
    pub admin_pass: Option<String>,

    /// YouTube Data API key.
    #[clap(long)]
    pub search_api_key: Option<String>,

    /// Mercado Pago access token.
    #[clap(long)]
    pub payment_access_token: Option<String>,

    /// Public URL the payment provider should notify, usually ending in /webhook.
    #[clap(long)]
    pub payment_notification_url: Option<String>,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            db_dir: args.db_dir.clone(),
            port: args.port,
            metrics_port: args.metrics_port,
            logging_level: args.logging_level.clone(),
            frontend_dir_path: args.frontend_dir_path.clone(),
            admin_user: args.admin_user.clone(),
            admin_pass: args.admin_pass.clone(),
            search_api_key: args.search_api_key.clone(),
            payment_access_token: args.payment_access_token.clone(),
            payment_notification_url: args.payment_notification_url.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  db_dir: {:?}", app_config.db_dir);
    info!("  port: {}", app_config.port);
    info!("  metrics_port: {}", app_config.metrics_port);
    info!("  admin: {:?}", app_config.admin);
    info!(
        "  search: {}",
        if app_config.search.api_key.is_some() {
            "configured"
        } else {
            "no API key, searches return nothing"
        }
    );
    info!(
        "  payments: {}",
        if app_config.payment.access_token.is_some() {
            "configured"
        } else {
            "no access token, PIX creation will fail"
        }
    );

    let db_path = app_config.jukebox_db_path();
    if !db_path.exists() {
        info!("Creating new jukebox database at {:?}", db_path);
    }
    let store = Arc::new(SqliteJukeboxStore::new(
        &db_path,
        Duration::from_millis(app_config.db_busy_timeout_ms),
    )?);

    info!("Initializing metrics...");
    metrics::init_metrics();

    let shutdown_token = CancellationToken::new();
    let connections = Arc::new(ConnectionManager::new());

    let (scheduler, playout) = PlayoutScheduler::new(
        store.clone(),
        connections.clone(),
        &app_config.playout,
        shutdown_token.child_token(),
    );

    let youtube = YouTubeSearchClient::new(
        app_config.search.base_url.clone(),
        app_config.search.api_key.clone(),
        app_config.search.timeout_secs,
    )?;
    let search = Arc::new(SearchService::new(
        Arc::new(youtube),
        store.clone(),
        Duration::from_secs(app_config.search.cache_ttl_secs),
        app_config.search.results_limit,
    ));

    let payments = MercadoPagoClient::new(&app_config.payment)?;
    let settlement_gate = Arc::new(SettlementGate::new(
        Arc::new(payments),
        store.clone(),
        playout.clone(),
        app_config.payment.max_items_per_order,
    ));

    let pruning_search = search.clone();
    let pruning_token = shutdown_token.child_token();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SEARCH_CACHE_PRUNE_INTERVAL);
        loop {
            tokio::select! {
                _ = pruning_token.cancelled() => break,
                _ = ticker.tick() => {
                    let pruned = pruning_search.prune_cache();
                    if pruned > 0 {
                        info!("Pruned {} expired search cache entries", pruned);
                    }
                }
            }
        }
    });

    let server_config = ServerConfig {
        requests_logging_level: app_config.logging_level.clone(),
        port: app_config.port,
        metrics_port: app_config.metrics_port,
        frontend_dir_path: app_config.frontend_dir_path.clone(),
        admin: app_config.admin.clone(),
        admin_results_limit: app_config.search.admin_results_limit,
    };
    let state = ServerState::new(
        server_config,
        playout,
        connections,
        search,
        settlement_gate,
    );

    info!("Ready to serve at port {}!", app_config.port);

    tokio::select! {
        result = run_server(state, shutdown_token.child_token()) => {
            info!("Server stopped");
            shutdown_token.cancel();
            result
        },
        _ = scheduler.run() => {
            info!("Scheduler stopped");
            Ok(())
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown");
            shutdown_token.cancel();
            // Give the scheduler a moment to shut down gracefully
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        }
    }
}
