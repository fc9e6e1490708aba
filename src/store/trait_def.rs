use super::error::StorageError;
use super::models::{
    FallbackCatalogItem, JukeboxSettings, NewQueueEntry, PendingSettlement, QueueEntry,
    SettleResult,
};
use crate::search::SearchResult;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

pub trait QueueStore: Send + Sync {
    /// Appends one entry and returns it as stored.
    fn enqueue(&self, entry: NewQueueEntry) -> StorageResult<QueueEntry>;

    /// Appends several entries in a single transaction, keeping their relative order.
    fn enqueue_many(&self, entries: Vec<NewQueueEntry>) -> StorageResult<Vec<QueueEntry>>;

    /// Atomically removes and returns the entry that should play next.
    /// Returns Ok(None) if the queue is empty.
    fn dequeue_next(&self) -> StorageResult<Option<QueueEntry>>;

    /// Returns all entries in play order without removing them.
    fn peek_all(&self) -> StorageResult<Vec<QueueEntry>>;

    fn queue_len(&self) -> StorageResult<usize>;

    /// Returns false if no entry had this id.
    fn remove_entry(&self, id: &str) -> StorageResult<bool>;

    /// Removes every entry and returns how many were removed.
    fn clear_queue(&self) -> StorageResult<usize>;
}

pub trait FallbackCatalogStore: Send + Sync {
    fn get_fallback_catalog(&self) -> StorageResult<Vec<FallbackCatalogItem>>;

    /// Replaces the whole catalog. An empty slice leaves the catalog empty.
    fn replace_fallback_catalog(&self, items: &[FallbackCatalogItem]) -> StorageResult<()>;
}

pub trait SettlementStore: Send + Sync {
    /// Records a new pending intent. Fails if the payment id is already known.
    fn create_pending_settlement(&self, settlement: &PendingSettlement) -> StorageResult<()>;

    /// Returns Ok(None) if the payment id is unknown.
    fn get_settlement(&self, payment_id: &str) -> StorageResult<Option<PendingSettlement>>;

    /// Marks the intent settled, admits its entries as customer requests and credits its
    /// amount, all in one transaction. A second call for the same payment changes nothing.
    fn settle(&self, payment_id: &str) -> StorageResult<SettleResult>;
}

pub trait SettingsStore: Send + Sync {
    fn get_settings(&self) -> StorageResult<JukeboxSettings>;

    fn set_promo_text(&self, text: &str) -> StorageResult<()>;

    /// Stores the volume (clamped to 0..=100); muted follows volume == 0.
    fn set_volume(&self, volume: u8) -> StorageResult<JukeboxSettings>;
}

pub trait SearchCacheStore: Send + Sync {
    /// Returns cached results stored at or after `not_before_ms`.
    fn get_cached_search(
        &self,
        term: &str,
        not_before_ms: i64,
    ) -> StorageResult<Option<Vec<SearchResult>>>;

    fn put_cached_search(&self, term: &str, results: &[SearchResult]) -> StorageResult<()>;

    /// Drops entries stored before `not_before_ms`, returning how many were removed.
    fn prune_search_cache(&self, not_before_ms: i64) -> StorageResult<usize>;
}

/// Everything the jukebox persists.
pub trait JukeboxStore:
    QueueStore + FallbackCatalogStore + SettlementStore + SettingsStore + SearchCacheStore
{
}

impl<T> JukeboxStore for T where
    T: QueueStore + FallbackCatalogStore + SettlementStore + SettingsStore + SearchCacheStore
{
}
