//! Durable local store.
//!
//! One SQLite connection behind a mutex: every mutation runs in a single
//! transaction that also appends its pending operations, so the local state
//! and the sync queue can never disagree.

mod catalog;
mod inventory;
pub(crate) mod queue;
mod subscribers;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS subscribers (
    id BLOB PRIMARY KEY,
    name TEXT NOT NULL,
    age INTEGER,
    weight REAL,
    height REAL,
    phone TEXT,
    notes TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS plan_groups (
    subscriber_id BLOB NOT NULL,
    plan TEXT NOT NULL,
    position INTEGER NOT NULL,
    title TEXT NOT NULL,
    items TEXT NOT NULL,
    PRIMARY KEY (subscriber_id, plan, position)
);
CREATE TABLE IF NOT EXISTS products (
    id BLOB PRIMARY KEY,
    name TEXT NOT NULL,
    quantity INTEGER NOT NULL CHECK (quantity >= 0),
    price REAL NOT NULL,
    category TEXT,
    description TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS sales (
    id BLOB PRIMARY KEY,
    buyer_name TEXT NOT NULL,
    product_id BLOB NOT NULL,
    product_name TEXT NOT NULL,
    quantity INTEGER NOT NULL,
    unit_price REAL NOT NULL,
    total_price REAL NOT NULL,
    notes TEXT,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS course_points (
    id BLOB PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS diet_items (
    id BLOB PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS pending_operations (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    op_id BLOB NOT NULL UNIQUE,
    kind TEXT NOT NULL,
    entity TEXT NOT NULL,
    entity_id BLOB NOT NULL,
    payload TEXT,
    queued_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS sync_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

const TABLES: [&str; 8] = [
    "subscribers",
    "plan_groups",
    "products",
    "sales",
    "course_points",
    "diet_items",
    "pending_operations",
    "sync_meta",
];

const LAST_SYNC_KEY: &str = "last_sync_at";

/// Local SQLite store used by the data-access layer
pub struct LocalStore {
    conn: Mutex<Connection>,
}

/// Number of stored records per entity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct EntityCounts {
    pub subscribers: u64,
    pub products: u64,
    pub sales: u64,
    pub course_points: u64,
    pub diet_items: u64,
}

impl EntityCounts {
    pub fn total(&self) -> u64 {
        self.subscribers + self.products + self.sales + self.course_points + self.diet_items
    }
}

impl LocalStore {
    /// Open the database at the given path and initialize tables if needed
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        tracing::debug!("opened local store at {}", path.display());
        Self::with_connection(conn)
    }

    /// Volatile store, used by tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::StorePoisoned)
    }

    /// Whether every table the data layer needs exists
    pub fn schema_ready(&self) -> Result<bool> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1")?;
        for table in TABLES {
            let found: i64 = stmt.query_row([table], |row| row.get(0))?;
            if found == 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn counts(&self) -> Result<EntityCounts> {
        let conn = self.conn()?;
        let count = |table: &str| -> Result<u64> {
            let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })?;
            Ok(n as u64)
        };
        Ok(EntityCounts {
            subscribers: count("subscribers")?,
            products: count("products")?,
            sales: count("sales")?,
            course_points: count("course_points")?,
            diet_items: count("diet_items")?,
        })
    }

    pub fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn()?;
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM sync_meta WHERE key = ?1",
                [LAST_SYNC_KEY],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value
            .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
            .map(|t| t.with_timezone(&Utc)))
    }

    pub fn set_last_sync_time(&self, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sync_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![LAST_SYNC_KEY, at.to_rfc3339()],
        )?;
        Ok(())
    }
}

/// Read a JSON-encoded TEXT column
pub(crate) fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
