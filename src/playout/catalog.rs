//! Turning an admin's fallback catalog submission into storable items.

use crate::search::SearchService;
use crate::server::websocket::messages::client::CatalogInputItem;
use crate::store::FallbackCatalogItem;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogUpdate {
    /// Store these items, replacing the current catalog (possibly with nothing).
    Replace(Vec<FallbackCatalogItem>),
    /// Items were submitted but none could be resolved; the current catalog stays.
    KeepPrevious,
}

/// Blank titles are skipped, items without a media id get the top search hit for their
/// title, and unresolvable items are dropped. An empty submission clears the catalog.
pub async fn resolve_catalog_input(
    search: &SearchService,
    input: Vec<CatalogInputItem>,
) -> CatalogUpdate {
    if input.is_empty() {
        return CatalogUpdate::Replace(Vec::new());
    }

    let submitted = input.len();
    let mut resolved = Vec::with_capacity(submitted);
    for item in input {
        let title = item.title.trim();
        if title.is_empty() {
            continue;
        }
        let media_id = item
            .media_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        match media_id {
            Some(media_id) => resolved.push(FallbackCatalogItem {
                title: title.to_string(),
                media_id,
            }),
            None => match search.resolve_title(title).await {
                Some(hit) => resolved.push(FallbackCatalogItem {
                    title: title.to_string(),
                    media_id: hit.media_id,
                }),
                None => warn!("No media found for fallback title {:?}, skipping", title),
            },
        }
    }

    if resolved.is_empty() {
        warn!(
            "None of the {} submitted fallback items resolved, keeping the current catalog",
            submitted
        );
        return CatalogUpdate::KeepPrevious;
    }
    info!(
        "Resolved {} of {} submitted fallback items",
        resolved.len(),
        submitted
    );
    CatalogUpdate::Replace(resolved)
}
