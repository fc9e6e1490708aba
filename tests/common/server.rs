//! Test server lifecycle management
//!
//! This module manages spawning and shutting down test HTTP servers.
//! Each test gets an isolated server with its own database and fake providers.

use super::constants::*;
use async_trait::async_trait;
use jukebox_server::config::{AdminCredentials, PlayoutSettings};
use jukebox_server::payment::{
    PaymentError, PaymentProvider, PaymentStatus, PixPayment, PixPaymentRequest, SettlementGate,
};
use jukebox_server::playout::PlayoutScheduler;
use jukebox_server::search::{MediaSearchProvider, SearchError, SearchResult, SearchService};
use jukebox_server::server::state::ServerState;
use jukebox_server::server::websocket::ConnectionManager;
use jukebox_server::server::{make_app, RequestsLoggingLevel, ServerConfig};
use jukebox_server::store::SqliteJukeboxStore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Search provider answering every query with two predictable hits.
#[derive(Default)]
pub struct FakeSearch {
    pub calls: AtomicUsize,
}

fn slug(query: &str) -> String {
    query.trim().to_lowercase().replace(' ', "-")
}

#[async_trait]
impl MediaSearchProvider for FakeSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((1..=limit.min(2))
            .map(|i| SearchResult {
                media_id: format!("{}-{}", slug(query), i),
                title: format!("{} ({})", query.trim(), i),
                channel: "Canal de Teste".into(),
                thumbnail: String::new(),
            })
            .collect())
    }
}

/// Payment provider whose payments stay pending until a test approves them.
#[derive(Default)]
pub struct FakePayments {
    next_id: AtomicUsize,
    statuses: Mutex<HashMap<String, PaymentStatus>>,
    pub fail_status_checks: AtomicBool,
    pub status_checks: AtomicUsize,
}

impl FakePayments {
    pub fn set_status(&self, payment_id: &str, status: PaymentStatus) {
        self.statuses
            .lock()
            .unwrap()
            .insert(payment_id.to_string(), status);
    }
}

#[async_trait]
impl PaymentProvider for FakePayments {
    async fn create_pix_payment(
        &self,
        request: &PixPaymentRequest,
    ) -> Result<PixPayment, PaymentError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let payment_id = format!("{}", 9000 + id);
        self.set_status(&payment_id, PaymentStatus::Pending);
        Ok(PixPayment {
            payment_id,
            qr_code: format!("pix:{}:{}", request.external_reference, request.amount_cents),
            qr_code_base64: "iVBORw0KGgo=".into(),
        })
    }

    async fn get_payment_status(&self, payment_id: &str) -> Result<PaymentStatus, PaymentError> {
        self.status_checks.fetch_add(1, Ordering::SeqCst);
        if self.fail_status_checks.load(Ordering::SeqCst) {
            return Err(PaymentError::Status {
                status: 503,
                body: "unavailable".into(),
            });
        }
        self.statuses
            .lock()
            .unwrap()
            .get(payment_id)
            .cloned()
            .ok_or(PaymentError::Status {
                status: 404,
                body: "not found".into(),
            })
    }
}

/// Test server instance with an isolated database
///
/// When dropped, the server and its scheduler shut down and temp resources are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// Direct database access for assertions
    pub store: Arc<SqliteJukeboxStore>,

    pub search: Arc<FakeSearch>,
    pub payments: Arc<FakePayments>,

    // Private fields - keep resources alive until drop
    _temp_db_dir: TempDir,
    shutdown: CancellationToken,
}

impl TestServer {
    /// Spawns a new test server on a random port
    ///
    /// # Panics
    ///
    /// Panics if the database cannot be created, the port cannot be bound or the
    /// server doesn't become ready within timeout.
    pub async fn spawn() -> Self {
        Self::spawn_with_frontend(None).await
    }

    pub async fn spawn_with_frontend(frontend_dir_path: Option<String>) -> Self {
        let temp_db_dir = TempDir::new().expect("Failed to create temp dir");
        let store = Arc::new(
            SqliteJukeboxStore::new(
                temp_db_dir.path().join("jukebox.db"),
                Duration::from_millis(1000),
            )
            .expect("Failed to open jukebox store"),
        );

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let shutdown = CancellationToken::new();
        let connections = Arc::new(ConnectionManager::new());

        let playout_settings = PlayoutSettings {
            inactivity_delay_ms: INACTIVITY_DELAY_MS,
            ..Default::default()
        };
        let (scheduler, playout) = PlayoutScheduler::new(
            store.clone(),
            connections.clone(),
            &playout_settings,
            shutdown.child_token(),
        );
        tokio::spawn(scheduler.run());

        let fake_search = Arc::new(FakeSearch::default());
        let search = Arc::new(SearchService::new(
            fake_search.clone(),
            store.clone(),
            Duration::from_secs(60),
            6,
        ));

        let payments = Arc::new(FakePayments::default());
        let gate = Arc::new(SettlementGate::new(
            payments.clone(),
            store.clone(),
            playout.clone(),
            MAX_ITEMS_PER_ORDER,
        ));

        let config = ServerConfig {
            requests_logging_level: RequestsLoggingLevel::None,
            port,
            metrics_port: 0,
            frontend_dir_path,
            admin: AdminCredentials {
                user: ADMIN_USER.into(),
                pass: ADMIN_PASS.into(),
            },
            admin_results_limit: 5,
        };
        let app = make_app(ServerState::new(config, playout, connections, search, gate));

        let server_shutdown = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(server_shutdown.cancelled_owned())
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            store,
            search: fake_search,
            payments,
            _temp_db_dir: temp_db_dir,
            shutdown,
        };

        server.wait_for_ready().await;

        server
    }

    /// Waits for the server to become ready by polling the /state endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/state", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
