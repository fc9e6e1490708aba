//! Media search: provider contract, YouTube client and the cached search service.

mod models;
mod provider;
mod service;
mod youtube;

pub use models::{normalize_query, SearchResult, DEFAULT_CHANNEL};
pub use provider::{MediaSearchProvider, SearchError};
pub use service::SearchService;
pub use youtube::{YouTubeSearchClient, DEFAULT_YOUTUBE_BASE_URL};
