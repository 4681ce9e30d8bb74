use chrono::Utc;
use gym_proto::{EntityKind, OperationKind, PendingOperation};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use uuid::Uuid;

use super::LocalStore;
use crate::error::{Error, Result};

/// Append an operation to the queue. Callers pass the transaction that
/// performs the matching local mutation.
pub(crate) fn push<T: Serialize>(
    conn: &Connection,
    kind: OperationKind,
    entity: EntityKind,
    entity_id: Uuid,
    payload: Option<&T>,
) -> Result<i64> {
    let payload = payload.map(serde_json::to_string).transpose()?;
    conn.execute(
        "INSERT INTO pending_operations (op_id, kind, entity, entity_id, payload, queued_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            Uuid::new_v4(),
            kind.as_str(),
            entity.as_str(),
            entity_id,
            payload,
            Utc::now()
        ],
    )?;
    let seq = conn.last_insert_rowid();
    tracing::trace!(seq, %kind, %entity, %entity_id, "queued operation");
    Ok(seq)
}

const COLUMNS: &str = "seq, op_id, kind, entity, entity_id, payload, queued_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<PendingOperation> {
    let kind: String = row.get(2)?;
    let entity: String = row.get(3)?;
    let payload: Option<String> = row.get(5)?;
    let conversion = |idx: usize, e: Box<dyn std::error::Error + Send + Sync>| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e)
    };
    Ok(PendingOperation {
        seq: row.get(0)?,
        op_id: row.get(1)?,
        kind: kind.parse().map_err(|e| conversion(2, Box::new(e)))?,
        entity: entity.parse().map_err(|e| conversion(3, Box::new(e)))?,
        entity_id: row.get(4)?,
        payload: payload
            .map(|p| serde_json::from_str(&p))
            .transpose()
            .map_err(|e| conversion(5, Box::new(e)))?,
        queued_at: row.get(6)?,
    })
}

impl LocalStore {
    pub fn pending_count(&self) -> Result<u64> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM pending_operations", [], |row| {
            row.get(0)
        })?;
        Ok(n as u64)
    }

    /// All queued operations, oldest first
    pub fn pending_operations(&self) -> Result<Vec<PendingOperation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM pending_operations ORDER BY seq"
        ))?;
        let rows = stmt.query_map([], from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    /// The oldest queued operation, if any
    pub fn next_pending(&self) -> Result<Option<PendingOperation>> {
        let conn = self.conn()?;
        let op = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM pending_operations ORDER BY seq LIMIT 1"),
                [],
                from_row,
            )
            .optional()?;
        Ok(op)
    }

    /// Drop an operation the remote has acknowledged
    pub fn acknowledge(&self, seq: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM pending_operations WHERE seq = ?1", [seq])?;
        Ok(())
    }
}
