use chrono::{DateTime, Utc};
use gym_proto::{ApplyOutcome, EntityKind, EntityRecord, OperationKind, PendingOperation};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("{kind} of {entity} {id} carries no payload")]
    MissingPayload {
        kind: OperationKind,
        entity: EntityKind,
        id: Uuid,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Server-side copy of every entity, plus the log of applied operations
/// that makes replays idempotent
#[derive(Clone)]
pub struct RemoteDb {
    pool: SqlitePool,
}

impl RemoteDb {
    pub async fn new(base_dir: &Path) -> Result<Self> {
        if !base_dir.exists() {
            std::fs::create_dir_all(base_dir)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(base_dir.join("gym.db"))
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS entities (
                entity TEXT NOT NULL,
                id BLOB NOT NULL,
                payload TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (entity, id)
            )"#,
        )
        .execute(&pool)
        .await?;
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS applied_operations (
                op_id BLOB PRIMARY KEY,
                device_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                entity TEXT NOT NULL,
                entity_id BLOB NOT NULL,
                applied_at TEXT NOT NULL
            )"#,
        )
        .execute(&pool)
        .await?;
        Ok(RemoteDb { pool })
    }

    /// Apply one replayed operation.
    ///
    /// An op_id seen before is a duplicate. A create for an id that already
    /// exists is a duplicate too. Updates overwrite the stored snapshot and
    /// deletes of missing ids succeed.
    pub async fn apply(&self, device_id: &str, op: &PendingOperation) -> Result<ApplyOutcome> {
        let mut tx = self.pool.begin().await?;

        let seen = sqlx::query("SELECT 1 FROM applied_operations WHERE op_id = ?")
            .bind(op.op_id)
            .fetch_optional(&mut *tx)
            .await?;
        if seen.is_some() {
            return Ok(ApplyOutcome::Duplicate);
        }

        let now = Utc::now();
        let outcome = match op.kind {
            OperationKind::Create | OperationKind::Update => {
                let payload = op.payload.as_ref().ok_or(StoreError::MissingPayload {
                    kind: op.kind,
                    entity: op.entity,
                    id: op.entity_id,
                })?;
                let payload = serde_json::to_string(payload)?;
                let exists = sqlx::query("SELECT 1 FROM entities WHERE entity = ? AND id = ?")
                    .bind(op.entity.as_str())
                    .bind(op.entity_id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .is_some();
                if op.kind == OperationKind::Create && exists {
                    ApplyOutcome::Duplicate
                } else {
                    sqlx::query(
                        r#"INSERT INTO entities (entity, id, payload, updated_at)
                           VALUES (?, ?, ?, ?)
                           ON CONFLICT(entity, id) DO UPDATE SET
                               payload = excluded.payload,
                               updated_at = excluded.updated_at"#,
                    )
                    .bind(op.entity.as_str())
                    .bind(op.entity_id)
                    .bind(payload)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                    ApplyOutcome::Applied
                }
            }
            OperationKind::Delete => {
                sqlx::query("DELETE FROM entities WHERE entity = ? AND id = ?")
                    .bind(op.entity.as_str())
                    .bind(op.entity_id)
                    .execute(&mut *tx)
                    .await?;
                ApplyOutcome::Applied
            }
        };

        sqlx::query(
            "INSERT INTO applied_operations (op_id, device_id, kind, entity, entity_id, applied_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(op.op_id)
        .bind(device_id)
        .bind(op.kind.as_str())
        .bind(op.entity.as_str())
        .bind(op.entity_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(outcome)
    }

    pub async fn list(&self, entity: EntityKind) -> Result<Vec<EntityRecord>> {
        let rows = sqlx::query(
            "SELECT id, payload, updated_at FROM entities WHERE entity = ? ORDER BY updated_at",
        )
        .bind(entity.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                let payload: String = row.get("payload");
                Ok(EntityRecord {
                    entity,
                    id: row.get::<Uuid, _>("id"),
                    payload: serde_json::from_str(&payload)?,
                    updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
                })
            })
            .collect()
    }

    pub async fn applied_count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM applied_operations")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }
}
