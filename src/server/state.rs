use axum::extract::FromRef;

use crate::payment::SettlementGate;
use crate::playout::PlayoutHandle;
use crate::search::SearchService;
use std::sync::Arc;
use std::time::Instant;

use super::websocket::ConnectionManager;
use super::ServerConfig;

pub type GuardedConnectionManager = Arc<ConnectionManager>;
pub type GuardedSearchService = Arc<SearchService>;
pub type GuardedSettlementGate = Arc<SettlementGate>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub playout: PlayoutHandle,
    pub ws_connection_manager: GuardedConnectionManager,
    pub search: GuardedSearchService,
    pub settlement_gate: GuardedSettlementGate,
    pub hash: String,
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

impl FromRef<ServerState> for PlayoutHandle {
    fn from_ref(input: &ServerState) -> Self {
        input.playout.clone()
    }
}

impl FromRef<ServerState> for GuardedConnectionManager {
    fn from_ref(input: &ServerState) -> Self {
        input.ws_connection_manager.clone()
    }
}

impl FromRef<ServerState> for GuardedSearchService {
    fn from_ref(input: &ServerState) -> Self {
        input.search.clone()
    }
}

impl FromRef<ServerState> for GuardedSettlementGate {
    fn from_ref(input: &ServerState) -> Self {
        input.settlement_gate.clone()
    }
}
