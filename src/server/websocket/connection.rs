//! WebSocket connection manager.
//!
//! Tracks every connected session together with its role, and fans messages out to
//! displays, admins and viewers. Each session owns an unbounded outgoing channel so a slow
//! socket never stalls the sender; per-session delivery order equals send order.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use super::messages::ServerMessage;
use crate::server::metrics;

/// What kind of surface sits on the other end of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionRole {
    /// The shared screen that actually plays media.
    Display,
    Admin,
    /// A customer's browser.
    Viewer,
}

impl SessionRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionRole::Display => "display",
            SessionRole::Admin => "admin",
            SessionRole::Viewer => "viewer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "display" | "player" => Some(SessionRole::Display),
            "admin" => Some(SessionRole::Admin),
            "viewer" | "customer" => Some(SessionRole::Viewer),
            _ => None,
        }
    }
}

impl fmt::Display for SessionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct ConnectionEntry {
    sender: mpsc::UnboundedSender<ServerMessage>,
    role: SessionRole,
}

/// Error type for send operations.
#[derive(Debug, Clone, PartialEq)]
pub enum SendError {
    /// No session with this id is connected.
    NotConnected,
    /// The session's channel is closed (socket went away).
    Disconnected,
}

pub struct ConnectionManager {
    /// session_id -> connection entry
    connections: RwLock<HashMap<String, ConnectionEntry>>,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a new session and returns its id plus the receiver the caller should
    /// forward to the socket.
    pub async fn register(
        &self,
        role: SessionRole,
    ) -> (String, mpsc::UnboundedReceiver<ServerMessage>) {
        let session_id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut conns = self.connections.write().await;
        conns.insert(session_id.clone(), ConnectionEntry { sender: tx, role });
        metrics::set_ws_sessions(role, conns.values().filter(|c| c.role == role).count());

        (session_id, rx)
    }

    pub async fn unregister(&self, session_id: &str) {
        let mut conns = self.connections.write().await;
        if let Some(entry) = conns.remove(session_id) {
            let role = entry.role;
            metrics::set_ws_sessions(role, conns.values().filter(|c| c.role == role).count());
        }
    }

    pub async fn send_to_session(
        &self,
        session_id: &str,
        message: ServerMessage,
    ) -> Result<(), SendError> {
        let conns = self.connections.read().await;
        let entry = conns.get(session_id).ok_or(SendError::NotConnected)?;
        entry
            .sender
            .send(message)
            .map_err(|_| SendError::Disconnected)
    }

    /// Sends to every session whose role is in `roles`. Returns count of failed sends.
    pub async fn broadcast_to_roles(&self, roles: &[SessionRole], message: ServerMessage) -> usize {
        let conns = self.connections.read().await;
        let mut failed_count = 0;

        for entry in conns.values().filter(|entry| roles.contains(&entry.role)) {
            if entry.sender.send(message.clone()).is_err() {
                failed_count += 1;
            }
        }

        failed_count
    }

    /// Broadcast a message to every connected session. Returns count of failed sends.
    pub async fn broadcast_to_all(&self, message: ServerMessage) -> usize {
        let conns = self.connections.read().await;
        let mut failed_count = 0;

        for entry in conns.values() {
            if entry.sender.send(message.clone()).is_err() {
                failed_count += 1;
            }
        }

        failed_count
    }

    pub async fn is_connected(&self, session_id: &str) -> bool {
        self.connections.read().await.contains_key(session_id)
    }

    pub async fn session_count(&self, role: SessionRole) -> usize {
        let conns = self.connections.read().await;
        conns.values().filter(|entry| entry.role == role).count()
    }

    pub async fn total_connections(&self) -> usize {
        self.connections.read().await.len()
    }
}
