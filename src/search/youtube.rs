//! HTTP client for the YouTube Data API v3 search endpoint.

use super::models::{SearchResult, DEFAULT_CHANNEL};
use super::provider::{MediaSearchProvider, SearchError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_YOUTUBE_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

pub struct YouTubeSearchClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl YouTubeSearchClient {
    pub fn new(base_url: String, api_key: Option<String>, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to create search HTTP client")?;

        let base_url = base_url.trim_end_matches('/').to_string();
        let api_key = api_key.filter(|k| !k.trim().is_empty());

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
    snippet: Option<Snippet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    title: Option<String>,
    channel_title: Option<String>,
    thumbnails: Option<Thumbnails>,
}

#[derive(Debug, Deserialize)]
struct Thumbnails {
    medium: Option<Thumbnail>,
    default: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

impl From<SearchResponse> for Vec<SearchResult> {
    fn from(response: SearchResponse) -> Self {
        response
            .items
            .into_iter()
            .filter_map(|item| {
                // Channels and playlists come back without a videoId.
                let media_id = item.id.video_id?;
                let snippet = item.snippet;
                let title = snippet
                    .as_ref()
                    .and_then(|s| s.title.clone())
                    .unwrap_or_else(|| media_id.clone());
                let channel = snippet
                    .as_ref()
                    .and_then(|s| s.channel_title.clone())
                    .unwrap_or_else(|| DEFAULT_CHANNEL.to_string());
                let thumbnail = snippet
                    .and_then(|s| s.thumbnails)
                    .and_then(|t| t.medium.or(t.default))
                    .map(|t| t.url)
                    .unwrap_or_default();
                Some(SearchResult {
                    media_id,
                    title,
                    channel,
                    thumbnail,
                })
            })
            .collect()
    }
}

#[async_trait]
impl MediaSearchProvider for YouTubeSearchClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, SearchError> {
        let api_key = self.api_key.as_deref().ok_or(SearchError::NotConfigured)?;
        let url = format!("{}/search", self.base_url);
        let max_results = limit.to_string();

        debug!("Searching media for {:?}", query);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("part", "snippet"),
                ("type", "video"),
                ("maxResults", max_results.as_str()),
                ("q", query),
                ("key", api_key),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::Status(response.status().as_u16()));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Malformed(e.to_string()))?;
        let mut results: Vec<SearchResult> = body.into();
        results.truncate(limit);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_videos_and_skips_channels() {
        let body: SearchResponse = serde_json::from_str(
            r#"{
                "items": [
                    {
                        "id": {"kind": "youtube#video", "videoId": "abc123"},
                        "snippet": {
                            "title": "Aquarela",
                            "channelTitle": "Toquinho",
                            "thumbnails": {
                                "default": {"url": "http://img/default.jpg"},
                                "medium": {"url": "http://img/medium.jpg"}
                            }
                        }
                    },
                    {
                        "id": {"kind": "youtube#channel", "channelId": "UC1"},
                        "snippet": {"title": "A channel"}
                    },
                    {
                        "id": {"kind": "youtube#video", "videoId": "def456"},
                        "snippet": {"title": "Sem canal"}
                    }
                ]
            }"#,
        )
        .unwrap();

        let results: Vec<SearchResult> = body.into();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].media_id, "abc123");
        assert_eq!(results[0].channel, "Toquinho");
        assert_eq!(results[0].thumbnail, "http://img/medium.jpg");
        assert_eq!(results[1].channel, DEFAULT_CHANNEL);
        assert_eq!(results[1].thumbnail, "");
    }

    #[test]
    fn missing_items_is_empty() {
        let body: SearchResponse = serde_json::from_str("{}").unwrap();
        let results: Vec<SearchResult> = body.into();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn search_without_api_key_is_not_configured() {
        let client =
            YouTubeSearchClient::new(DEFAULT_YOUTUBE_BASE_URL.to_string(), None, 5).unwrap();
        let err = client.search("samba", 3).await.unwrap_err();
        assert!(matches!(err, SearchError::NotConfigured));
    }
}
