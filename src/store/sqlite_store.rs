use super::error::StorageError;
use super::models::{
    FallbackCatalogItem, JukeboxSettings, NewQueueEntry, Origin, PendingSettlement, QueueEntry,
    SettleResult, SettlementItem, SettlementStatus, DEFAULT_PROMO_TEXT, DEFAULT_VOLUME,
};
use super::schema::JUKEBOX_VERSIONED_SCHEMAS;
use super::trait_def::{
    FallbackCatalogStore, QueueStore, SearchCacheStore, SettingsStore, SettlementStore,
    StorageResult,
};
use crate::search::SearchResult;
use crate::sqlite_persistence::{migrate_to_latest, read_schema_version};
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, types::Type, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

const SELECT_QUEUE: &str = "SELECT id, media_id, title, origin, spoken_message, priority_class, enqueued_at \
     FROM queue_entries ORDER BY priority_class DESC, enqueued_at ASC, rowid ASC";

const SETTINGS_ROW_ID: i64 = 1;

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub struct SqliteJukeboxStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJukeboxStore {
    /// Opens (creating or migrating as needed) the database at `db_path`.
    /// Lock contention waits at most `busy_timeout` before failing.
    pub fn new<P: AsRef<Path>>(db_path: P, busy_timeout: Duration) -> Result<Self> {
        let path = db_path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open jukebox database at {:?}", path))?;
        info!("Opened jukebox database at {:?}", path);
        Self::from_connection(conn, busy_timeout)
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, Duration::from_millis(100))
    }

    fn from_connection(mut conn: Connection, busy_timeout: Duration) -> Result<Self> {
        conn.busy_timeout(busy_timeout)?;
        conn.execute("PRAGMA foreign_keys = ON;", [])?;

        let latest = JUKEBOX_VERSIONED_SCHEMAS
            .last()
            .context("No jukebox schema defined")?;
        let raw_version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
        if raw_version == 0 {
            info!("Creating jukebox schema version {}", latest.version);
            latest.create(&conn)?;
        } else {
            let db_version = read_schema_version(&conn)?;
            let schema = JUKEBOX_VERSIONED_SCHEMAS
                .iter()
                .find(|s| s.version == db_version)
                .with_context(|| format!("Unknown jukebox database version {}", db_version))?;
            schema.validate(&conn).with_context(|| {
                format!(
                    "Jukebox database schema validation failed for version {}",
                    db_version
                )
            })?;
            if db_version < latest.version {
                info!(
                    "Migrating jukebox database from version {} to {}",
                    db_version, latest.version
                );
                let tx = conn.transaction()?;
                migrate_to_latest(&tx, JUKEBOX_VERSIONED_SCHEMAS, db_version)?;
                tx.commit()?;
            }
        }

        conn.execute(
            "INSERT OR IGNORE INTO jukebox_settings (id, promo_text, volume, muted, revenue_cents) \
             VALUES (?1, ?2, ?3, 1, 0)",
            params![SETTINGS_ROW_ID, DEFAULT_PROMO_TEXT, DEFAULT_VOLUME],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    fn row_to_queue_entry(row: &rusqlite::Row) -> rusqlite::Result<QueueEntry> {
        let origin_str: String = row.get(3)?;
        let origin = Origin::from_db_str(&origin_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                Type::Text,
                Box::new(StorageError::Corrupt(format!(
                    "unknown queue origin '{}'",
                    origin_str
                ))),
            )
        })?;
        Ok(QueueEntry {
            id: row.get(0)?,
            media_id: row.get(1)?,
            title: row.get(2)?,
            origin,
            spoken_message: row.get(4)?,
            priority_class: row.get(5)?,
            enqueued_at: row.get(6)?,
        })
    }

    /// Timestamps never run backwards relative to what is already queued, so FIFO order
    /// survives wall clock adjustments.
    fn next_enqueue_timestamp(conn: &Connection) -> rusqlite::Result<i64> {
        let latest: i64 = conn.query_row(
            "SELECT COALESCE(MAX(enqueued_at), 0) FROM queue_entries",
            [],
            |row| row.get(0),
        )?;
        Ok(now_ms().max(latest))
    }

    fn insert_entry(
        conn: &Connection,
        entry: NewQueueEntry,
        enqueued_at: i64,
    ) -> rusqlite::Result<QueueEntry> {
        let stored = QueueEntry {
            id: Uuid::new_v4().to_string(),
            priority_class: entry.origin.priority_class(),
            media_id: entry.media_id,
            title: entry.title,
            origin: entry.origin,
            spoken_message: entry.spoken_message,
            enqueued_at,
        };
        conn.execute(
            "INSERT INTO queue_entries (id, media_id, title, origin, spoken_message, priority_class, enqueued_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                stored.id,
                stored.media_id,
                stored.title,
                stored.origin.as_db_str(),
                stored.spoken_message,
                stored.priority_class,
                stored.enqueued_at,
            ],
        )?;
        Ok(stored)
    }

    fn load_settlement(
        conn: &Connection,
        payment_id: &str,
    ) -> StorageResult<Option<PendingSettlement>> {
        let row = conn
            .query_row(
                "SELECT correlation_id, amount_cents, description, spoken_message, status, created_at, settled_at \
                 FROM settlements WHERE payment_id = ?1",
                params![payment_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, Option<i64>>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((
            correlation_id,
            amount_cents,
            description,
            spoken_message,
            status,
            created_at,
            settled_at,
        )) = row
        else {
            return Ok(None);
        };

        let status = SettlementStatus::from_db_str(&status).ok_or_else(|| {
            StorageError::Corrupt(format!(
                "settlement {} has unknown status '{}'",
                payment_id, status
            ))
        })?;

        let mut stmt = conn.prepare(
            "SELECT media_id, title FROM settlement_items WHERE payment_id = ?1 ORDER BY position",
        )?;
        let items = stmt
            .query_map(params![payment_id], |row| {
                Ok(SettlementItem {
                    media_id: row.get(0)?,
                    title: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(PendingSettlement {
            payment_id: payment_id.to_string(),
            correlation_id,
            amount_cents,
            description,
            spoken_message,
            items,
            status,
            created_at,
            settled_at,
        }))
    }

    fn read_settings(conn: &Connection) -> StorageResult<JukeboxSettings> {
        let settings = conn.query_row(
            "SELECT promo_text, volume, muted, revenue_cents FROM jukebox_settings WHERE id = ?1",
            params![SETTINGS_ROW_ID],
            |row| {
                Ok(JukeboxSettings {
                    promo_text: row.get(0)?,
                    volume: row.get::<_, i64>(1)?.clamp(0, 100) as u8,
                    muted: row.get::<_, i64>(2)? != 0,
                    revenue_cents: row.get(3)?,
                })
            },
        )?;
        Ok(settings)
    }
}

impl QueueStore for SqliteJukeboxStore {
    fn enqueue(&self, entry: NewQueueEntry) -> StorageResult<QueueEntry> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let enqueued_at = Self::next_enqueue_timestamp(&tx)?;
        let stored = Self::insert_entry(&tx, entry, enqueued_at)?;
        tx.commit()?;
        debug!(
            "Enqueued {} ({:?}) as {}",
            stored.media_id, stored.origin, stored.id
        );
        Ok(stored)
    }

    fn enqueue_many(&self, entries: Vec<NewQueueEntry>) -> StorageResult<Vec<QueueEntry>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let enqueued_at = Self::next_enqueue_timestamp(&tx)?;
        let stored = entries
            .into_iter()
            .map(|entry| Self::insert_entry(&tx, entry, enqueued_at))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        tx.commit()?;
        Ok(stored)
    }

    fn dequeue_next(&self) -> StorageResult<Option<QueueEntry>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let next = tx
            .query_row(
                &format!("{} LIMIT 1", SELECT_QUEUE),
                [],
                Self::row_to_queue_entry,
            )
            .optional()?;
        if let Some(entry) = &next {
            tx.execute("DELETE FROM queue_entries WHERE id = ?1", params![entry.id])?;
        }
        tx.commit()?;
        Ok(next)
    }

    fn peek_all(&self) -> StorageResult<Vec<QueueEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(SELECT_QUEUE)?;
        let entries = stmt
            .query_map([], Self::row_to_queue_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn queue_len(&self) -> StorageResult<usize> {
        let conn = self.lock()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM queue_entries", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn remove_entry(&self, id: &str) -> StorageResult<bool> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM queue_entries WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    fn clear_queue(&self) -> StorageResult<usize> {
        let conn = self.lock()?;
        Ok(conn.execute("DELETE FROM queue_entries", [])?)
    }
}

impl FallbackCatalogStore for SqliteJukeboxStore {
    fn get_fallback_catalog(&self) -> StorageResult<Vec<FallbackCatalogItem>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT title, media_id FROM fallback_catalog ORDER BY position")?;
        let items = stmt
            .query_map([], |row| {
                Ok(FallbackCatalogItem {
                    title: row.get(0)?,
                    media_id: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    fn replace_fallback_catalog(&self, items: &[FallbackCatalogItem]) -> StorageResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM fallback_catalog", [])?;
        for (position, item) in items.iter().enumerate() {
            tx.execute(
                "INSERT INTO fallback_catalog (position, title, media_id) VALUES (?1, ?2, ?3)",
                params![position as i64, item.title, item.media_id],
            )?;
        }
        tx.commit()?;
        info!("Fallback catalog replaced with {} items", items.len());
        Ok(())
    }
}

impl SettlementStore for SqliteJukeboxStore {
    fn create_pending_settlement(&self, settlement: &PendingSettlement) -> StorageResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO settlements (payment_id, correlation_id, amount_cents, description, spoken_message, status, created_at, settled_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                settlement.payment_id,
                settlement.correlation_id,
                settlement.amount_cents,
                settlement.description,
                settlement.spoken_message,
                settlement.status.as_db_str(),
                settlement.created_at,
                settlement.settled_at,
            ],
        )?;
        for (position, item) in settlement.items.iter().enumerate() {
            tx.execute(
                "INSERT INTO settlement_items (payment_id, position, media_id, title) VALUES (?1, ?2, ?3, ?4)",
                params![settlement.payment_id, position as i64, item.media_id, item.title],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn get_settlement(&self, payment_id: &str) -> StorageResult<Option<PendingSettlement>> {
        let conn = self.lock()?;
        Self::load_settlement(&conn, payment_id)
    }

    fn settle(&self, payment_id: &str) -> StorageResult<SettleResult> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let Some(mut settlement) = Self::load_settlement(&tx, payment_id)? else {
            return Ok(SettleResult::UnknownPayment);
        };
        if settlement.status == SettlementStatus::Settled {
            return Ok(SettleResult::AlreadySettled);
        }

        let settled_at = now_ms();
        tx.execute(
            "UPDATE settlements SET status = ?2, settled_at = ?3 WHERE payment_id = ?1",
            params![
                payment_id,
                SettlementStatus::Settled.as_db_str(),
                settled_at
            ],
        )?;

        let enqueued_at = Self::next_enqueue_timestamp(&tx)?;
        let enqueued = settlement
            .queue_entries()
            .into_iter()
            .map(|entry| Self::insert_entry(&tx, entry, enqueued_at))
            .collect::<rusqlite::Result<Vec<_>>>()?;

        tx.execute(
            "UPDATE jukebox_settings SET revenue_cents = revenue_cents + ?2 WHERE id = ?1",
            params![SETTINGS_ROW_ID, settlement.amount_cents],
        )?;
        let revenue_cents: i64 = tx.query_row(
            "SELECT revenue_cents FROM jukebox_settings WHERE id = ?1",
            params![SETTINGS_ROW_ID],
            |row| row.get(0),
        )?;
        tx.commit()?;

        settlement.status = SettlementStatus::Settled;
        settlement.settled_at = Some(settled_at);
        Ok(SettleResult::Settled {
            settlement,
            enqueued,
            revenue_cents,
        })
    }
}

impl SettingsStore for SqliteJukeboxStore {
    fn get_settings(&self) -> StorageResult<JukeboxSettings> {
        let conn = self.lock()?;
        Self::read_settings(&conn)
    }

    fn set_promo_text(&self, text: &str) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE jukebox_settings SET promo_text = ?2 WHERE id = ?1",
            params![SETTINGS_ROW_ID, text],
        )?;
        Ok(())
    }

    fn set_volume(&self, volume: u8) -> StorageResult<JukeboxSettings> {
        let volume = volume.min(100);
        let conn = self.lock()?;
        conn.execute(
            "UPDATE jukebox_settings SET volume = ?2, muted = ?3 WHERE id = ?1",
            params![SETTINGS_ROW_ID, volume, volume == 0],
        )?;
        Self::read_settings(&conn)
    }
}

impl SearchCacheStore for SqliteJukeboxStore {
    fn get_cached_search(
        &self,
        term: &str,
        not_before_ms: i64,
    ) -> StorageResult<Option<Vec<SearchResult>>> {
        let conn = self.lock()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT results FROM search_cache WHERE term = ?1 AND created_at >= ?2",
                params![term, not_before_ms],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn put_cached_search(&self, term: &str, results: &[SearchResult]) -> StorageResult<()> {
        let json = serde_json::to_string(results)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO search_cache (term, results, created_at) VALUES (?1, ?2, ?3)",
            params![term, json, now_ms()],
        )?;
        Ok(())
    }

    fn prune_search_cache(&self, not_before_ms: i64) -> StorageResult<usize> {
        let conn = self.lock()?;
        Ok(conn.execute(
            "DELETE FROM search_cache WHERE created_at < ?1",
            params![not_before_ms],
        )?)
    }
}
