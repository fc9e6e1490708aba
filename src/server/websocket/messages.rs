//! WebSocket message types.
//!
//! Every message in either direction is a `{type, payload}` envelope. Payloads are carried
//! as JSON values and decoded per message type by the handler.

use serde::{Deserialize, Serialize};

/// Server -> Client message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerMessage {
    /// Message type identifier (e.g., "state.update", "player.play")
    #[serde(rename = "type")]
    pub msg_type: String,
    pub payload: serde_json::Value,
}

impl ServerMessage {
    pub fn new(msg_type: impl Into<String>, payload: impl Serialize) -> Self {
        Self {
            msg_type: msg_type.into(),
            payload: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        }
    }

    /// Create a server message with a null payload.
    pub fn empty(msg_type: impl Into<String>) -> Self {
        Self {
            msg_type: msg_type.into(),
            payload: serde_json::Value::Null,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(msg_types::ERROR, system::Error::new(code, message))
    }
}

/// Client -> Server message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Messages used by the WebSocket infrastructure itself.
pub mod system {
    use crate::server::websocket::connection::SessionRole;
    use serde::{Deserialize, Serialize};

    /// Sent immediately after the connection is established.
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    pub struct Connected {
        pub session_id: String,
        pub role: SessionRole,
        pub server_version: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct Error {
        pub code: String,
        pub message: String,
    }

    impl Error {
        pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
            Self {
                code: code.into(),
                message: message.into(),
            }
        }
    }
}

pub mod msg_types {
    // Server -> client
    pub const CONNECTED: &str = "connected";
    pub const PONG: &str = "pong";
    pub const ERROR: &str = "error";
    pub const STATE_UPDATE: &str = "state.update";
    pub const PLAYER_PLAY: &str = "player.play";
    pub const PLAYER_PAUSE: &str = "player.pause";
    pub const PLAYER_SET_VOLUME: &str = "player.set_volume";
    pub const PLAYER_INIT: &str = "player.init";
    pub const PROMO_UPDATE: &str = "promo.update";
    pub const PLAYER_NEW_ORDER: &str = "player.new_order";
    pub const PLAYER_REACTION: &str = "player.reaction";
    pub const PAYMENT_CONFIRMED: &str = "payment.confirmed";
    pub const ADMIN_REVENUE: &str = "admin.revenue";
    pub const ADMIN_CATALOG: &str = "admin.catalog";
    pub const ADMIN_SEARCH_RESULTS: &str = "admin.search_results";
    pub const ADMIN_ERROR: &str = "admin.error";

    // Client -> server
    pub const PING: &str = "ping";
    pub const DISPLAY_READY: &str = "display.ready";
    pub const DISPLAY_FINISHED: &str = "display.finished";
    pub const DISPLAY_ERROR: &str = "display.error";
    pub const DISPLAY_HEARTBEAT: &str = "display.heartbeat";
    pub const REACTION: &str = "reaction";
    pub const ADMIN_GET_STATE: &str = "admin.get_state";
    pub const ADMIN_SEARCH: &str = "admin.search";
    pub const ADMIN_ADD_TO_QUEUE: &str = "admin.add_to_queue";
    pub const ADMIN_REMOVE_FROM_QUEUE: &str = "admin.remove_from_queue";
    pub const ADMIN_CLEAR_QUEUE: &str = "admin.clear_queue";
    pub const ADMIN_SAVE_FALLBACK_CATALOG: &str = "admin.save_fallback_catalog";
    pub const ADMIN_SET_PROMO_TEXT: &str = "admin.set_promo_text";
    pub const ADMIN_SET_VOLUME: &str = "admin.set_volume";
    pub const ADMIN_PAUSE: &str = "admin.pause";
    pub const ADMIN_SKIP: &str = "admin.skip";
}

/// Payloads sent to displays.
pub mod player {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    #[serde(rename_all = "camelCase")]
    pub struct Play {
        pub play_id: u64,
        pub media_id: String,
        pub title: String,
        pub spoken_message: Option<String>,
    }

    /// Used for both `player.init` and `player.set_volume`.
    #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
    pub struct Volume {
        pub volume: u8,
        pub muted: bool,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct Promo {
        pub text: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct NewOrder {
        pub title: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct Reaction {
        pub emoji: String,
    }
}

/// Payloads sent to admin sessions, plus the customer-facing payment confirmation.
pub mod admin {
    use crate::search::SearchResult;
    use crate::store::FallbackCatalogItem;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    #[serde(rename_all = "camelCase")]
    pub struct Revenue {
        pub revenue_cents: i64,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct Catalog {
        pub items: Vec<FallbackCatalogItem>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct SearchResults {
        pub results: Vec<SearchResult>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct AdminError {
        pub message: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    #[serde(rename_all = "camelCase")]
    pub struct PaymentConfirmed {
        pub payment_id: String,
    }
}

/// Client -> server payloads.
pub mod client {
    use serde::{Deserialize, Serialize};

    /// Payload of `display.finished` and `display.error`.
    #[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
    #[serde(rename_all = "camelCase")]
    pub struct TrackEnded {
        #[serde(default)]
        pub play_id: Option<u64>,
        #[serde(default)]
        pub reason: Option<String>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct Reaction {
        pub emoji: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct Search {
        pub query: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    #[serde(rename_all = "camelCase")]
    pub struct AddToQueue {
        pub media_id: String,
        pub title: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct RemoveFromQueue {
        pub id: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    #[serde(rename_all = "camelCase")]
    pub struct CatalogInputItem {
        #[serde(default)]
        pub title: String,
        #[serde(default)]
        pub media_id: Option<String>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct SaveFallbackCatalog {
        pub items: Vec<CatalogInputItem>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct SetPromoText {
        pub text: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct SetVolume {
        pub volume: i64,
    }
}
