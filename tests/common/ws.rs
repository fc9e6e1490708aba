//! WebSocket helpers for end-to-end tests
#![allow(dead_code)]

use super::constants::*;
use base64::{engine::general_purpose::STANDARD, Engine};
use futures::{SinkExt, StreamExt};
use http::header;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

fn ws_url(base_url: &str, role: &str) -> String {
    format!("{}/ws?role={}", base_url.replace("http://", "ws://"), role)
}

/// Attempts a connection, optionally with basic auth credentials.
pub async fn connect_ws_request(
    base_url: &str,
    role: &str,
    credentials: Option<(&str, &str)>,
) -> Result<WsStream, tungstenite::Error> {
    let mut request = ws_url(base_url, role)
        .into_client_request()
        .expect("Failed to build WebSocket request");
    if let Some((user, pass)) = credentials {
        let value = format!("Basic {}", STANDARD.encode(format!("{}:{}", user, pass)));
        request
            .headers_mut()
            .insert(header::AUTHORIZATION, value.parse().unwrap());
    }
    connect_async(request).await.map(|(ws, _)| ws)
}

/// Connects with the given role and consumes the `connected` and initial `state.update`.
pub async fn connect_ws(base_url: &str, role: &str) -> (WsStream, String) {
    let mut ws = connect_ws_request(base_url, role, None)
        .await
        .expect("Failed to connect to WebSocket");
    let session_id = read_handshake(&mut ws).await;
    (ws, session_id)
}

pub async fn connect_admin(base_url: &str) -> (WsStream, String) {
    let mut ws = connect_ws_request(base_url, "admin", Some((ADMIN_USER, ADMIN_PASS)))
        .await
        .expect("Failed to connect admin WebSocket");
    let session_id = read_handshake(&mut ws).await;
    (ws, session_id)
}

async fn read_handshake(ws: &mut WsStream) -> String {
    let connected = wait_for_message(ws, "connected")
        .await
        .expect("Should receive connected message");
    wait_for_message(ws, "state.update")
        .await
        .expect("Should receive initial state");
    session_id_of(&connected)
}

pub fn session_id_of(connected: &Value) -> String {
    connected["payload"]["sessionId"]
        .as_str()
        .expect("connected message without sessionId")
        .to_string()
}

pub async fn send_message(ws: &mut WsStream, msg_type: &str, payload: Value) {
    let text = json!({"type": msg_type, "payload": payload}).to_string();
    ws.send(Message::Text(text.into()))
        .await
        .expect("Failed to send WebSocket message");
}

/// Skips messages until one of `expected_type` arrives. `None` on timeout.
pub async fn wait_for_message(ws: &mut WsStream, expected_type: &str) -> Option<Value> {
    let result = timeout(Duration::from_millis(WS_MESSAGE_TIMEOUT_MS), async {
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                if let Ok(json) = serde_json::from_str::<Value>(&text) {
                    if json.get("type").and_then(|t| t.as_str()) == Some(expected_type) {
                        return Some(json);
                    }
                }
            }
        }
        None
    })
    .await;

    result.ok().flatten()
}
