use chrono::Utc;
use gym_proto::{EntityKind, OperationKind};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{json_column, queue, LocalStore};
use crate::error::{Error, Result};
use crate::models::{PlanGroup, PlanKind, Subscriber, SubscriberForm, SubscriberWithGroups};

const COLUMNS: &str = "id, name, age, weight, height, phone, notes, created_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Subscriber> {
    Ok(Subscriber {
        id: row.get(0)?,
        name: row.get(1)?,
        age: row.get(2)?,
        weight: row.get(3)?,
        height: row.get(4)?,
        phone: row.get(5)?,
        notes: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn find(conn: &Connection, id: Uuid) -> Result<Option<Subscriber>> {
    let subscriber = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM subscribers WHERE id = ?1"),
            [id],
            from_row,
        )
        .optional()?;
    Ok(subscriber)
}

fn load_groups(conn: &Connection, id: Uuid, plan: PlanKind) -> Result<Vec<PlanGroup>> {
    let mut stmt = conn.prepare(
        "SELECT title, items FROM plan_groups
         WHERE subscriber_id = ?1 AND plan = ?2 ORDER BY position",
    )?;
    let rows = stmt.query_map(params![id, plan.as_str()], |row| {
        Ok(PlanGroup {
            title: row.get(0)?,
            items: json_column(row, 1)?,
        })
    })?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
}

fn write_groups(conn: &Connection, record: &SubscriberWithGroups) -> Result<()> {
    let id = record.subscriber.id;
    conn.execute("DELETE FROM plan_groups WHERE subscriber_id = ?1", [id])?;
    let mut stmt = conn.prepare(
        "INSERT INTO plan_groups (subscriber_id, plan, position, title, items)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for (plan, groups) in [
        (PlanKind::Course, &record.course_groups),
        (PlanKind::Diet, &record.diet_groups),
    ] {
        for (position, group) in groups.iter().enumerate() {
            stmt.execute(params![
                id,
                plan.as_str(),
                position as i64,
                group.title,
                serde_json::to_string(&group.items)?
            ])?;
        }
    }
    Ok(())
}

fn write_subscriber(conn: &Connection, s: &Subscriber) -> Result<()> {
    conn.execute(
        "INSERT INTO subscribers (id, name, age, weight, height, phone, notes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            age = excluded.age,
            weight = excluded.weight,
            height = excluded.height,
            phone = excluded.phone,
            notes = excluded.notes,
            updated_at = excluded.updated_at",
        params![
            s.id,
            s.name,
            s.age,
            s.weight,
            s.height,
            s.phone,
            s.notes,
            s.created_at,
            s.updated_at
        ],
    )?;
    Ok(())
}

fn not_found(id: Uuid) -> Error {
    Error::NotFound {
        entity: EntityKind::Subscriber,
        id,
    }
}

impl LocalStore {
    pub fn list_subscribers(&self) -> Result<Vec<Subscriber>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM subscribers ORDER BY created_at DESC"
        ))?;
        let rows = stmt.query_map([], from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    pub fn subscriber_with_groups(&self, id: Uuid) -> Result<Option<SubscriberWithGroups>> {
        let conn = self.conn()?;
        let Some(subscriber) = find(&conn, id)? else {
            return Ok(None);
        };
        Ok(Some(SubscriberWithGroups {
            course_groups: load_groups(&conn, id, PlanKind::Course)?,
            diet_groups: load_groups(&conn, id, PlanKind::Diet)?,
            subscriber,
        }))
    }

    pub fn insert_subscriber(&self, form: SubscriberForm) -> Result<SubscriberWithGroups> {
        form.validate()?;
        let now = Utc::now();
        let record = form.into_record(Uuid::new_v4(), now, now);

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        write_subscriber(&tx, &record.subscriber)?;
        write_groups(&tx, &record)?;
        queue::push(
            &tx,
            OperationKind::Create,
            EntityKind::Subscriber,
            record.subscriber.id,
            Some(&record),
        )?;
        tx.commit()?;
        Ok(record)
    }

    pub fn update_subscriber(&self, id: Uuid, form: SubscriberForm) -> Result<SubscriberWithGroups> {
        form.validate()?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let existing = find(&tx, id)?.ok_or_else(|| not_found(id))?;
        let record = form.into_record(id, existing.created_at, Utc::now());
        write_subscriber(&tx, &record.subscriber)?;
        write_groups(&tx, &record)?;
        queue::push(
            &tx,
            OperationKind::Update,
            EntityKind::Subscriber,
            id,
            Some(&record),
        )?;
        tx.commit()?;
        Ok(record)
    }

    pub fn delete_subscriber(&self, id: Uuid) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let removed = tx.execute("DELETE FROM subscribers WHERE id = ?1", [id])?;
        if removed == 0 {
            return Err(not_found(id));
        }
        tx.execute("DELETE FROM plan_groups WHERE subscriber_id = ?1", [id])?;
        queue::push::<()>(&tx, OperationKind::Delete, EntityKind::Subscriber, id, None)?;
        tx.commit()?;
        Ok(())
    }
}
