use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::services::{ServeDir, ServeFile};

use super::metrics::metrics_handler;
use super::websocket::{ws_handler, ConnectionManager};
use super::{log_requests, require_admin, state::*, ServerConfig};
use crate::payment::{extract_payment_id, ConfirmOutcome, GateError, PaymentIntent, SettlementGate};
use crate::playout::PlayoutHandle;
use crate::search::SearchService;
use crate::store::SettlementItem;

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
    pub sessions: usize,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({"ok": false, "error": message.into()}))).into_response()
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
        sessions: state.ws_connection_manager.total_connections().await,
    };
    Json(stats)
}

#[derive(Deserialize, Debug)]
struct SearchParams {
    #[serde(default)]
    q: Option<String>,
}

async fn search(
    State(search): State<GuardedSearchService>,
    Query(params): Query<SearchParams>,
) -> Response {
    let query = params.q.unwrap_or_default();
    if query.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Parâmetro 'q' é obrigatório");
    }
    let results = search.search(&query).await;
    Json(json!({"ok": true, "results": results})).into_response()
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PaymentItemBody {
    #[serde(default)]
    media_id: String,
    #[serde(default)]
    title: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct CreatePaymentBody {
    #[serde(default)]
    items: Vec<PaymentItemBody>,
    /// In reais, as sent by the checkout page.
    #[serde(default)]
    amount: f64,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    correlation_id: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct CreatePaymentResponse {
    ok: bool,
    payment_id: String,
    qr_code: String,
    qr_code_base64: String,
}

fn amount_to_cents(amount: f64) -> i64 {
    if amount.is_finite() {
        (amount * 100.0).round() as i64
    } else {
        0
    }
}

impl From<CreatePaymentBody> for PaymentIntent {
    fn from(body: CreatePaymentBody) -> Self {
        PaymentIntent {
            items: body
                .items
                .into_iter()
                .map(|item| SettlementItem {
                    media_id: item.media_id.trim().to_string(),
                    title: item.title.trim().to_string(),
                })
                .collect(),
            amount_cents: amount_to_cents(body.amount),
            description: body.description.unwrap_or_default(),
            spoken_message: body.message,
            correlation_id: body.correlation_id.trim().to_string(),
        }
    }
}

async fn create_payment(
    State(gate): State<GuardedSettlementGate>,
    body: Result<Json<CreatePaymentBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };

    match gate.create_intent(body.into()).await {
        Ok(payment) => Json(CreatePaymentResponse {
            ok: true,
            payment_id: payment.payment_id,
            qr_code: payment.qr_code,
            qr_code_base64: payment.qr_code_base64,
        })
        .into_response(),
        Err(GateError::Invalid(message)) => error_response(StatusCode::BAD_REQUEST, message),
        Err(GateError::Provider(e)) => {
            error_response(StatusCode::BAD_GATEWAY, format!("Falha ao gerar o PIX: {}", e))
        }
        Err(e) => {
            error!("Could not record payment intent: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Erro interno")
        }
    }
}

/// Provider notifications. Anything other than a 2xx makes the provider retry later.
async fn webhook(
    State(gate): State<GuardedSettlementGate>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let Some(payment_id) = extract_payment_id(&body, &query) else {
        info!("Webhook without payment id, ignoring");
        return StatusCode::OK.into_response();
    };

    match gate.confirm(&payment_id).await {
        Ok(ConfirmOutcome::Settled { revenue_cents }) => {
            info!(
                "Payment {} settled, revenue now {} cents",
                payment_id, revenue_cents
            );
            StatusCode::OK.into_response()
        }
        Ok(outcome) => {
            info!("Webhook for payment {}: {:?}", payment_id, outcome);
            StatusCode::OK.into_response()
        }
        Err(e) => {
            warn!("Webhook for payment {} failed: {}", payment_id, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn get_state(State(playout): State<PlayoutHandle>) -> Response {
    match playout.snapshot().await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => {
            error!("Could not build state snapshot: {}", e);
            error_response(StatusCode::SERVICE_UNAVAILABLE, "Estado indisponível")
        }
    }
}

impl ServerState {
    pub fn new(
        config: ServerConfig,
        playout: PlayoutHandle,
        ws_connection_manager: Arc<ConnectionManager>,
        search: Arc<SearchService>,
        settlement_gate: Arc<SettlementGate>,
    ) -> ServerState {
        ServerState {
            config,
            start_time: Instant::now(),
            playout,
            ws_connection_manager,
            search,
            settlement_gate,
            hash: env!("GIT_HASH").to_owned(),
        }
    }
}

pub fn make_app(state: ServerState) -> Router {
    let api_routes: Router = Router::new()
        .route("/search", get(search))
        .route("/create-payment", post(create_payment))
        .route("/webhook", post(webhook))
        .route("/state", get(get_state))
        .route("/ws", get(ws_handler))
        .with_state(state.clone());

    let home_router: Router = match state.config.frontend_dir_path.clone() {
        Some(frontend_path) => {
            let admin_page = ServeFile::new(PathBuf::from(&frontend_path).join("admin.html"));
            let static_files_service =
                ServeDir::new(frontend_path).append_index_html_on_directories(true);
            Router::new()
                .route_service("/admin.html", admin_page)
                .route_layer(middleware::from_fn_with_state(
                    state.clone(),
                    require_admin,
                ))
                .fallback_service(static_files_service)
        }
        None => Router::new()
            .route("/", get(home))
            .with_state(state.clone()),
    };

    home_router
        .merge(api_routes)
        .layer(middleware::from_fn_with_state(state.clone(), log_requests))
}

fn make_metrics_app() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

async fn serve(listener: tokio::net::TcpListener, app: Router, shutdown: CancellationToken) -> Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

/// Serves the public app and the metrics endpoint until `shutdown` is cancelled.
pub async fn run_server(state: ServerState, shutdown: CancellationToken) -> Result<()> {
    let port = state.config.port;
    let metrics_port = state.config.metrics_port;
    let app = make_app(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    let metrics_listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", metrics_port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", metrics_port))?;
    info!("Listening on port {}, metrics on port {}", port, metrics_port);

    tokio::try_join!(
        serve(listener, app, shutdown.clone()),
        serve(metrics_listener, make_metrics_app(), shutdown),
    )?;
    Ok(())
}
