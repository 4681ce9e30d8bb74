use chrono::Utc;
use gym_proto::OperationKind;
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use super::{queue, LocalStore};
use crate::error::{Error, Result};
use crate::models::{CatalogForm, CatalogItem, CatalogKind};

fn from_row(row: &Row<'_>) -> rusqlite::Result<CatalogItem> {
    Ok(CatalogItem {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: row.get(3)?,
    })
}

impl LocalStore {
    pub fn list_catalog(&self, kind: CatalogKind) -> Result<Vec<CatalogItem>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT id, name, description, created_at FROM {} ORDER BY name COLLATE NOCASE",
            kind.table()
        ))?;
        let rows = stmt.query_map([], from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    pub fn insert_catalog(&self, kind: CatalogKind, form: CatalogForm) -> Result<CatalogItem> {
        form.validate()?;
        let item = form.into_record(Uuid::new_v4(), Utc::now());
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            &format!(
                "INSERT INTO {} (id, name, description, created_at) VALUES (?1, ?2, ?3, ?4)",
                kind.table()
            ),
            params![item.id, item.name, item.description, item.created_at],
        )?;
        queue::push(&tx, OperationKind::Create, kind.entity(), item.id, Some(&item))?;
        tx.commit()?;
        Ok(item)
    }

    pub fn update_catalog(&self, kind: CatalogKind, id: Uuid, form: CatalogForm) -> Result<CatalogItem> {
        form.validate()?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let existing = tx
            .query_row(
                &format!(
                    "SELECT id, name, description, created_at FROM {} WHERE id = ?1",
                    kind.table()
                ),
                [id],
                from_row,
            )
            .optional()?
            .ok_or(Error::NotFound {
                entity: kind.entity(),
                id,
            })?;
        let item = form.into_record(id, existing.created_at);
        tx.execute(
            &format!(
                "UPDATE {} SET name = ?2, description = ?3 WHERE id = ?1",
                kind.table()
            ),
            params![item.id, item.name, item.description],
        )?;
        queue::push(&tx, OperationKind::Update, kind.entity(), id, Some(&item))?;
        tx.commit()?;
        Ok(item)
    }

    pub fn delete_catalog(&self, kind: CatalogKind, id: Uuid) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let removed = tx.execute(&format!("DELETE FROM {} WHERE id = ?1", kind.table()), [id])?;
        if removed == 0 {
            return Err(Error::NotFound {
                entity: kind.entity(),
                id,
            });
        }
        queue::push::<()>(&tx, OperationKind::Delete, kind.entity(), id, None)?;
        tx.commit()?;
        Ok(())
    }
}
