use rusqlite::Connection;

use crate::error::StorageError;

pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
    ",
    )?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

// `items` keeps insertion order in its rowid; upserts go through
// ON CONFLICT DO UPDATE so a rewritten row keeps its position.
const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, unixepoch());

CREATE TABLE IF NOT EXISTS items (
    collection TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    expires_at INTEGER,
    PRIMARY KEY (collection, key)
);
CREATE INDEX IF NOT EXISTS idx_items_expiry ON items (collection, expires_at);

CREATE TABLE IF NOT EXISTS item_indexes (
    collection TEXT NOT NULL,
    index_name TEXT NOT NULL,
    index_value TEXT NOT NULL,
    key TEXT NOT NULL,
    PRIMARY KEY (collection, index_name, key)
);
CREATE INDEX IF NOT EXISTS idx_item_indexes_lookup
    ON item_indexes (collection, index_name, index_value);
";
