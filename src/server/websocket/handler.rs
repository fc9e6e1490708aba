//! WebSocket route handler.
//!
//! Handles WebSocket upgrade, message loop, and cleanup. Each message type is only
//! accepted from the roles allowed to send it.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{
    connection::SessionRole,
    messages::{admin, client, msg_types, player, system, ClientMessage, ServerMessage},
};
use crate::playout::{resolve_catalog_input, CatalogUpdate, PlayoutError, TrackEndReason};
use crate::server::http_layers::{is_admin_authorized, unauthorized_response};
use crate::server::state::ServerState;
use crate::store::NewQueueEntry;

pub const MAX_REACTION_CHARS: usize = 16;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    #[serde(default)]
    role: Option<String>,
}

#[derive(Debug, Error)]
enum CommandError {
    #[error("{0} is not allowed for this session")]
    Forbidden(String),

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Playout(#[from] PlayoutError),
}

impl CommandError {
    fn code(&self) -> &'static str {
        match self {
            CommandError::Forbidden(_) => "forbidden",
            CommandError::UnknownType(_) => "unknown_type",
            CommandError::Invalid(_) => "invalid_command",
            CommandError::Playout(PlayoutError::InvalidCommand(_)) => "invalid_command",
            CommandError::Playout(PlayoutError::Storage(_)) => "storage_error",
            CommandError::Playout(PlayoutError::Unavailable) => "unavailable",
        }
    }

    fn to_message(&self) -> ServerMessage {
        ServerMessage::error(self.code(), self.to_string())
    }
}

/// Which roles may send a given client message type. `None` for unknown types.
fn allowed_roles(msg_type: &str) -> Option<&'static [SessionRole]> {
    const ANYONE: &[SessionRole] = &[SessionRole::Display, SessionRole::Admin, SessionRole::Viewer];
    const DISPLAY: &[SessionRole] = &[SessionRole::Display];
    const ADMIN: &[SessionRole] = &[SessionRole::Admin];

    match msg_type {
        msg_types::PING | msg_types::REACTION => Some(ANYONE),
        msg_types::DISPLAY_READY
        | msg_types::DISPLAY_FINISHED
        | msg_types::DISPLAY_ERROR
        | msg_types::DISPLAY_HEARTBEAT => Some(DISPLAY),
        msg_types::ADMIN_GET_STATE
        | msg_types::ADMIN_SEARCH
        | msg_types::ADMIN_ADD_TO_QUEUE
        | msg_types::ADMIN_REMOVE_FROM_QUEUE
        | msg_types::ADMIN_CLEAR_QUEUE
        | msg_types::ADMIN_SAVE_FALLBACK_CATALOG
        | msg_types::ADMIN_SET_PROMO_TEXT
        | msg_types::ADMIN_SET_VOLUME
        | msg_types::ADMIN_PAUSE
        | msg_types::ADMIN_SKIP => Some(ADMIN),
        _ => None,
    }
}

fn decode<T: DeserializeOwned>(msg_type: &str, payload: serde_json::Value) -> Result<T, CommandError> {
    serde_json::from_value(payload)
        .map_err(|e| CommandError::Invalid(format!("Invalid {} payload: {}", msg_type, e)))
}

/// `display.finished` / `display.error` may arrive with no payload at all.
fn decode_track_ended(
    msg_type: &str,
    payload: serde_json::Value,
) -> Result<client::TrackEnded, CommandError> {
    if payload.is_null() {
        return Ok(client::TrackEnded::default());
    }
    decode(msg_type, payload)
}

fn validate_reaction(reaction: client::Reaction) -> Result<String, CommandError> {
    let emoji = reaction.emoji.trim().to_string();
    if emoji.is_empty() {
        return Err(CommandError::Invalid("reaction is empty".into()));
    }
    if emoji.chars().count() > MAX_REACTION_CHARS {
        return Err(CommandError::Invalid(format!(
            "reaction longer than {} characters",
            MAX_REACTION_CHARS
        )));
    }
    Ok(emoji)
}

fn server_version() -> String {
    format!("{}-{}", env!("CARGO_PKG_VERSION"), env!("GIT_HASH"))
}

/// WebSocket upgrade handler.
///
/// This is the route handler for `GET /ws?role=<display|admin|viewer>`. Admin sessions
/// must present the admin's basic auth credentials.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    State(state): State<ServerState>,
) -> Response {
    let role = match params.role.as_deref() {
        None | Some("") => SessionRole::Viewer,
        Some(raw) => match SessionRole::parse(&raw.to_ascii_lowercase()) {
            Some(role) => role,
            None => {
                warn!("WebSocket connection attempt with unknown role {:?}", raw);
                return (StatusCode::BAD_REQUEST, "Unknown session role").into_response();
            }
        },
    };

    if role == SessionRole::Admin && !is_admin_authorized(&headers, &state.config.admin) {
        warn!("Rejected unauthenticated admin WebSocket");
        return unauthorized_response();
    }

    debug!("WebSocket upgrade for role {}", role);
    ws.on_upgrade(move |socket| handle_socket(socket, role, state))
}

/// Handle an established WebSocket connection.
async fn handle_socket(socket: WebSocket, role: SessionRole, state: ServerState) {
    let connections = state.ws_connection_manager.clone();
    let (session_id, outgoing_rx) = connections.register(role).await;
    info!("WebSocket connected: session {} ({})", session_id, role);

    let (ws_sink, ws_stream) = socket.split();

    let connected_msg = ServerMessage::new(
        msg_types::CONNECTED,
        system::Connected {
            session_id: session_id.clone(),
            role,
            server_version: server_version(),
        },
    );

    let outgoing_handle = tokio::spawn(forward_outgoing(ws_sink, outgoing_rx, connected_msg));

    // Queued behind `connected`; sent by the scheduler so no newer broadcast can overtake it.
    if let Err(e) = state.playout.send_snapshot(&session_id).await {
        warn!("No initial snapshot for session {}: {}", session_id, e);
    }

    process_incoming(ws_stream, &session_id, role, &state).await;

    info!("WebSocket disconnected: session {} ({})", session_id, role);
    outgoing_handle.abort();
    connections.unregister(&session_id).await;
}

/// Forward messages from the outgoing channel to the WebSocket.
async fn forward_outgoing(
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut outgoing_rx: mpsc::UnboundedReceiver<ServerMessage>,
    initial_msg: ServerMessage,
) {
    if let Ok(json) = serde_json::to_string(&initial_msg) {
        if ws_sink.send(Message::Text(json.into())).await.is_err() {
            return;
        }
    }

    while let Some(msg) = outgoing_rx.recv().await {
        match serde_json::to_string(&msg) {
            Ok(json) => {
                if ws_sink.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                error!("Failed to serialize WebSocket message: {}", e);
            }
        }
    }
}

/// Process incoming messages from the WebSocket.
async fn process_incoming(
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    session_id: &str,
    role: SessionRole,
    state: &ServerState,
) {
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => {
                    let msg_type = msg.msg_type.clone();
                    if let Err(e) = handle_client_message(session_id, role, msg, state).await {
                        debug!("{} from session {} failed: {}", msg_type, session_id, e);
                        let _ = state
                            .ws_connection_manager
                            .send_to_session(session_id, e.to_message())
                            .await;
                    }
                }
                Err(e) => {
                    debug!("Failed to parse client message: {}", e);
                    let error_msg =
                        ServerMessage::error("parse_error", format!("Invalid message format: {}", e));
                    let _ = state
                        .ws_connection_manager
                        .send_to_session(session_id, error_msg)
                        .await;
                }
            },
            Ok(Message::Binary(_)) => {
                debug!("Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                debug!("Received close frame");
                break;
            }
            Err(e) => {
                debug!("WebSocket error: {}", e);
                break;
            }
        }
    }
}

async fn reply(state: &ServerState, session_id: &str, message: ServerMessage) {
    let _ = state
        .ws_connection_manager
        .send_to_session(session_id, message)
        .await;
}

/// Handle a parsed client message.
async fn handle_client_message(
    session_id: &str,
    role: SessionRole,
    msg: ClientMessage,
    state: &ServerState,
) -> Result<(), CommandError> {
    let msg_type = msg.msg_type.as_str();
    let allowed = allowed_roles(msg_type)
        .ok_or_else(|| CommandError::UnknownType(msg_type.to_string()))?;
    if !allowed.contains(&role) {
        return Err(CommandError::Forbidden(msg_type.to_string()));
    }

    let playout = &state.playout;
    match msg_type {
        msg_types::PING => reply(state, session_id, ServerMessage::empty(msg_types::PONG)).await,

        msg_types::DISPLAY_READY => playout.display_ready(session_id).await?,
        msg_types::DISPLAY_FINISHED | msg_types::DISPLAY_ERROR => {
            let ended = decode_track_ended(msg_type, msg.payload)?;
            let reason = if msg_type == msg_types::DISPLAY_ERROR {
                warn!(
                    "Display {} could not play {:?}: {}",
                    session_id,
                    ended.play_id,
                    ended.reason.as_deref().unwrap_or("no reason")
                );
                TrackEndReason::DisplayError
            } else {
                TrackEndReason::Finished
            };
            playout.track_ended(ended.play_id, reason).await?;
        }
        msg_types::DISPLAY_HEARTBEAT => debug!("Heartbeat from display {}", session_id),

        msg_types::REACTION => {
            let emoji = validate_reaction(decode(msg_type, msg.payload)?)?;
            state
                .ws_connection_manager
                .broadcast_to_roles(
                    &[SessionRole::Display],
                    ServerMessage::new(msg_types::PLAYER_REACTION, player::Reaction { emoji }),
                )
                .await;
        }

        msg_types::ADMIN_GET_STATE => playout.send_admin_state(session_id).await?,
        msg_types::ADMIN_SEARCH => {
            let search: client::Search = decode(msg_type, msg.payload)?;
            let results = state
                .search
                .search_uncached(&search.query, state.config.admin_results_limit)
                .await;
            reply(
                state,
                session_id,
                ServerMessage::new(msg_types::ADMIN_SEARCH_RESULTS, admin::SearchResults { results }),
            )
            .await;
        }
        msg_types::ADMIN_ADD_TO_QUEUE => {
            let add: client::AddToQueue = decode(msg_type, msg.payload)?;
            let entry = playout
                .enqueue(NewQueueEntry::admin(add.media_id.trim(), add.title.trim()))
                .await?;
            info!("Admin queued {:?} ({})", entry.title, entry.id);
        }
        msg_types::ADMIN_REMOVE_FROM_QUEUE => {
            let remove: client::RemoveFromQueue = decode(msg_type, msg.payload)?;
            if !playout.remove_entry(&remove.id).await? {
                debug!("Queue entry {} was already gone", remove.id);
            }
        }
        msg_types::ADMIN_CLEAR_QUEUE => {
            let removed = playout.clear_queue().await?;
            info!("Admin cleared {} queue entries", removed);
        }
        msg_types::ADMIN_SAVE_FALLBACK_CATALOG => {
            let save: client::SaveFallbackCatalog = decode(msg_type, msg.payload)?;
            match resolve_catalog_input(&state.search, save.items).await {
                CatalogUpdate::Replace(items) => playout.save_fallback_catalog(items).await?,
                CatalogUpdate::KeepPrevious => {
                    reply(
                        state,
                        session_id,
                        ServerMessage::new(
                            msg_types::ADMIN_ERROR,
                            admin::AdminError {
                                message: "Nenhuma música do catálogo foi encontrada; o catálogo anterior foi mantido.".into(),
                            },
                        ),
                    )
                    .await;
                }
            }
        }
        msg_types::ADMIN_SET_PROMO_TEXT => {
            let promo: client::SetPromoText = decode(msg_type, msg.payload)?;
            playout.set_promo_text(&promo.text).await?;
        }
        msg_types::ADMIN_SET_VOLUME => {
            let volume: client::SetVolume = decode(msg_type, msg.payload)?;
            playout.set_volume(volume.volume).await?;
        }
        msg_types::ADMIN_PAUSE => playout.toggle_pause().await?,
        msg_types::ADMIN_SKIP => playout.skip().await?,

        other => return Err(CommandError::UnknownType(other.to_string())),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StorageError;
    use serde_json::json;

    #[test]
    fn display_messages_are_display_only() {
        for msg_type in [
            msg_types::DISPLAY_READY,
            msg_types::DISPLAY_FINISHED,
            msg_types::DISPLAY_ERROR,
            msg_types::DISPLAY_HEARTBEAT,
        ] {
            let roles = allowed_roles(msg_type).unwrap();
            assert_eq!(roles, &[SessionRole::Display], "{}", msg_type);
        }
    }

    #[test]
    fn admin_commands_are_admin_only() {
        for msg_type in [
            msg_types::ADMIN_GET_STATE,
            msg_types::ADMIN_SKIP,
            msg_types::ADMIN_CLEAR_QUEUE,
            msg_types::ADMIN_SAVE_FALLBACK_CATALOG,
        ] {
            let roles = allowed_roles(msg_type).unwrap();
            assert!(roles.contains(&SessionRole::Admin));
            assert!(!roles.contains(&SessionRole::Viewer));
            assert!(!roles.contains(&SessionRole::Display));
        }
    }

    #[test]
    fn anyone_can_ping_and_react() {
        for msg_type in [msg_types::PING, msg_types::REACTION] {
            assert_eq!(allowed_roles(msg_type).unwrap().len(), 3);
        }
        assert!(allowed_roles("playback.hello").is_none());
        assert!(allowed_roles(msg_types::PLAYER_PLAY).is_none());
    }

    #[test]
    fn missing_track_end_payload_means_no_play_id() {
        let ended = decode_track_ended(msg_types::DISPLAY_FINISHED, serde_json::Value::Null).unwrap();
        assert_eq!(ended, client::TrackEnded::default());

        let ended = decode_track_ended(msg_types::DISPLAY_ERROR, json!({"playId": 4})).unwrap();
        assert_eq!(ended.play_id, Some(4));

        assert!(decode_track_ended(msg_types::DISPLAY_ERROR, json!({"playId": "x"})).is_err());
    }

    #[test]
    fn reactions_are_short() {
        let ok = validate_reaction(client::Reaction { emoji: " 🎉 ".into() }).unwrap();
        assert_eq!(ok, "🎉");

        assert!(validate_reaction(client::Reaction { emoji: "   ".into() }).is_err());
        assert!(validate_reaction(client::Reaction {
            emoji: "x".repeat(MAX_REACTION_CHARS + 1)
        })
        .is_err());
    }

    #[test]
    fn error_codes() {
        assert_eq!(CommandError::Forbidden("a".into()).code(), "forbidden");
        assert_eq!(CommandError::UnknownType("a".into()).code(), "unknown_type");
        assert_eq!(
            CommandError::from(PlayoutError::InvalidCommand("bad".into())).code(),
            "invalid_command"
        );
        assert_eq!(
            CommandError::from(PlayoutError::Storage(StorageError::Poisoned)).code(),
            "storage_error"
        );
        assert_eq!(CommandError::from(PlayoutError::Unavailable).code(), "unavailable");

        let message = serde_json::to_value(CommandError::Forbidden("admin.skip".into()).to_message())
            .unwrap();
        assert_eq!(message["type"], "error");
        assert_eq!(message["payload"]["code"], "forbidden");
    }
}
