use super::models::SearchResult;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search provider is not configured")]
    NotConfigured,

    #[error("search request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("search provider returned status {0}")]
    Status(u16),

    #[error("malformed search response: {0}")]
    Malformed(String),
}

/// External catalog of playable media, queried by free text.
#[async_trait]
pub trait MediaSearchProvider: Send + Sync {
    /// Returns at most `limit` results, best match first.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, SearchError>;
}
