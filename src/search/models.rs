use serde::{Deserialize, Serialize};

pub const DEFAULT_CHANNEL: &str = "Canal Indefinido";

/// One media search hit, as shown to customers and admins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub media_id: String,
    pub title: String,
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default)]
    pub thumbnail: String,
}

fn default_channel() -> String {
    DEFAULT_CHANNEL.to_string()
}

/// Cache key for a free-text query.
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}
