use super::models::{normalize_query, SearchResult};
use super::provider::MediaSearchProvider;
use crate::server::metrics;
use crate::store::SearchCacheStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Best-effort media search with a durable cache keyed by normalized query text.
///
/// Provider and cache failures never propagate: callers get an empty list instead.
pub struct SearchService {
    provider: Arc<dyn MediaSearchProvider>,
    cache: Arc<dyn SearchCacheStore>,
    cache_ttl: Duration,
    results_limit: usize,
}

impl SearchService {
    pub fn new(
        provider: Arc<dyn MediaSearchProvider>,
        cache: Arc<dyn SearchCacheStore>,
        cache_ttl: Duration,
        results_limit: usize,
    ) -> Self {
        Self {
            provider,
            cache,
            cache_ttl,
            results_limit,
        }
    }

    fn cache_cutoff_ms(&self) -> i64 {
        Utc::now().timestamp_millis() - self.cache_ttl.as_millis() as i64
    }

    /// Customer search. Served from the cache when a fresh entry exists; only non-empty
    /// provider answers are cached.
    pub async fn search(&self, query: &str) -> Vec<SearchResult> {
        let term = normalize_query(query);
        if term.is_empty() {
            return Vec::new();
        }

        match self.cache.get_cached_search(&term, self.cache_cutoff_ms()) {
            Ok(Some(results)) => {
                metrics::record_search_cache(true);
                debug!("Search cache hit for {:?}", term);
                return results;
            }
            Ok(None) => metrics::record_search_cache(false),
            Err(e) => warn!("Search cache read failed for {:?}: {}", term, e),
        }

        let results = self.search_uncached(&term, self.results_limit).await;
        if !results.is_empty() {
            if let Err(e) = self.cache.put_cached_search(&term, &results) {
                warn!("Search cache write failed for {:?}: {}", term, e);
            }
        }
        results
    }

    /// Goes straight to the provider. Used by the admin panel.
    pub async fn search_uncached(&self, query: &str, limit: usize) -> Vec<SearchResult> {
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return Vec::new();
        }
        match self.provider.search(query, limit).await {
            Ok(results) => results,
            Err(e) => {
                warn!("Media search for {:?} failed: {}", query, e);
                Vec::new()
            }
        }
    }

    /// Best match for a title, used to resolve fallback catalog entries saved without a
    /// media id.
    pub async fn resolve_title(&self, title: &str) -> Option<SearchResult> {
        self.search_uncached(title, 1).await.into_iter().next()
    }

    /// Removes cache rows older than the TTL.
    pub fn prune_cache(&self) -> usize {
        match self.cache.prune_search_cache(self.cache_cutoff_ms()) {
            Ok(removed) => removed,
            Err(e) => {
                warn!("Search cache prune failed: {}", e);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchError;
    use crate::store::SqliteJukeboxStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeProvider {
        calls: AtomicUsize,
        fail: bool,
        empty: bool,
    }

    #[async_trait]
    impl MediaSearchProvider for FakeProvider {
        async fn search(
            &self,
            query: &str,
            limit: usize,
        ) -> Result<Vec<SearchResult>, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SearchError::Status(503));
            }
            if self.empty {
                return Ok(Vec::new());
            }
            Ok((0..limit)
                .map(|i| SearchResult {
                    media_id: format!("{}-{}", query, i),
                    title: format!("{} #{}", query, i),
                    channel: "Fake".to_string(),
                    thumbnail: String::new(),
                })
                .collect())
        }
    }

    fn service(provider: Arc<FakeProvider>, ttl: Duration) -> SearchService {
        let store = Arc::new(SqliteJukeboxStore::in_memory().unwrap());
        SearchService::new(provider, store, ttl, 6)
    }

    #[tokio::test]
    async fn repeated_query_is_served_from_cache() {
        let provider = Arc::new(FakeProvider::default());
        let service = service(provider.clone(), Duration::from_secs(3600));

        let first = service.search("Samba").await;
        let second = service.search("  samba ").await;

        assert_eq!(first.len(), 6);
        assert_eq!(first, second);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entries_are_refetched() {
        let provider = Arc::new(FakeProvider::default());
        let service = service(provider.clone(), Duration::ZERO);

        service.search("samba").await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        service.search("samba").await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_results_are_not_cached() {
        let provider = Arc::new(FakeProvider {
            empty: true,
            ..Default::default()
        });
        let service = service(provider.clone(), Duration::from_secs(3600));

        assert!(service.search("nothing").await.is_empty());
        assert!(service.search("nothing").await.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn provider_failure_yields_empty_list() {
        let provider = Arc::new(FakeProvider {
            fail: true,
            ..Default::default()
        });
        let service = service(provider, Duration::from_secs(3600));

        assert!(service.search("samba").await.is_empty());
        assert!(service.resolve_title("samba").await.is_none());
    }

    #[tokio::test]
    async fn blank_query_skips_provider() {
        let provider = Arc::new(FakeProvider::default());
        let service = service(provider.clone(), Duration::from_secs(3600));

        assert!(service.search("   ").await.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn resolve_title_takes_top_result() {
        let provider = Arc::new(FakeProvider::default());
        let service = service(provider, Duration::from_secs(3600));

        let top = service.resolve_title("aquarela").await.unwrap();
        assert_eq!(top.media_id, "aquarela-0");
    }
}
