//! SQLite schema definitions for the jukebox database.
//!
//! One database file holds the playback queue, the fallback catalog, payment
//! settlements, the jukebox settings row and the search cache.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema,
};

// =============================================================================
// Version 1 - Queue, catalog, settlements, settings
// =============================================================================

/// Pending playback requests. Order is priority_class DESC, enqueued_at ASC, rowid ASC.
const QUEUE_ENTRIES_TABLE_V1: Table = Table {
    name: "queue_entries",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("media_id", &SqlType::Text, non_null = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("origin", &SqlType::Text, non_null = true),
        sqlite_column!("spoken_message", &SqlType::Text),
        sqlite_column!("priority_class", &SqlType::Integer, non_null = true),
        sqlite_column!("enqueued_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_queue_entries_order", "priority_class DESC, enqueued_at ASC")],
};

/// House playlist, replaced wholesale on every save.
const FALLBACK_CATALOG_TABLE_V1: Table = Table {
    name: "fallback_catalog",
    columns: &[
        sqlite_column!("position", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("media_id", &SqlType::Text, non_null = true),
    ],
    indices: &[],
};

const SETTLEMENTS_TABLE_V1: Table = Table {
    name: "settlements",
    columns: &[
        sqlite_column!("payment_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("correlation_id", &SqlType::Text, non_null = true),
        sqlite_column!("amount_cents", &SqlType::Integer, non_null = true),
        sqlite_column!("description", &SqlType::Text, non_null = true),
        sqlite_column!("spoken_message", &SqlType::Text),
        sqlite_column!(
            "status",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'pending'")
        ),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
        sqlite_column!("settled_at", &SqlType::Integer),
    ],
    indices: &[("idx_settlements_status", "status")],
};

const SETTLEMENT_ITEMS_TABLE_V1: Table = Table {
    name: "settlement_items",
    columns: &[
        sqlite_column!(
            "payment_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "settlements",
                foreign_column: "payment_id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
        sqlite_column!("media_id", &SqlType::Text, non_null = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
    ],
    indices: &[("idx_settlement_items_payment", "payment_id, position")],
};

/// Single-row table (id = 1) for jukebox-wide settings and the revenue counter.
const JUKEBOX_SETTINGS_TABLE_V1: Table = Table {
    name: "jukebox_settings",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("promo_text", &SqlType::Text, non_null = true),
        sqlite_column!(
            "volume",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("50")
        ),
        sqlite_column!(
            "muted",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("1")
        ),
        sqlite_column!(
            "revenue_cents",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[],
};

// =============================================================================
// Version 2 - Search cache
// =============================================================================

/// Normalized search term to serialized result list.
const SEARCH_CACHE_TABLE_V2: Table = Table {
    name: "search_cache",
    columns: &[
        sqlite_column!("term", &SqlType::Text, is_primary_key = true),
        sqlite_column!("results", &SqlType::Text, non_null = true),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_search_cache_created", "created_at")],
};

fn migrate_v1_to_v2(conn: &rusqlite::Connection) -> anyhow::Result<()> {
    SEARCH_CACHE_TABLE_V2.create(conn)
}

pub const JUKEBOX_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[
            QUEUE_ENTRIES_TABLE_V1,
            FALLBACK_CATALOG_TABLE_V1,
            SETTLEMENTS_TABLE_V1,
            SETTLEMENT_ITEMS_TABLE_V1,
            JUKEBOX_SETTINGS_TABLE_V1,
        ],
        migration: None,
    },
    VersionedSchema {
        version: 2,
        tables: &[
            QUEUE_ENTRIES_TABLE_V1,
            FALLBACK_CATALOG_TABLE_V1,
            SETTLEMENTS_TABLE_V1,
            SETTLEMENT_ITEMS_TABLE_V1,
            JUKEBOX_SETTINGS_TABLE_V1,
            SEARCH_CACHE_TABLE_V2,
        ],
        migration: Some(migrate_v1_to_v2),
    },
];
