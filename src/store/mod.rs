//! Durable jukebox state: the playback queue, the fallback catalog, payment settlements,
//! settings and the search cache.

mod error;
mod models;
mod retry_policy;
mod schema;
mod sqlite_store;
mod trait_def;

pub use error::StorageError;
pub use models::{
    FallbackCatalogItem, JukeboxSettings, NewQueueEntry, Origin, PendingSettlement, QueueEntry,
    SettleResult, SettlementItem, SettlementStatus, DEFAULT_PROMO_TEXT, DEFAULT_VOLUME,
};
pub use retry_policy::RetryPolicy;
pub use sqlite_store::SqliteJukeboxStore;
pub use trait_def::{
    FallbackCatalogStore, JukeboxStore, QueueStore, SearchCacheStore, SettingsStore,
    SettlementStore, StorageResult,
};
