use chrono::Utc;
use gym_proto::{EntityKind, OperationKind};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{queue, LocalStore};
use crate::error::{Error, Result};
use crate::models::{Product, ProductForm, Sale, SaleForm};

const PRODUCT_COLUMNS: &str =
    "id, name, quantity, price, category, description, created_at, updated_at";
const SALE_COLUMNS: &str =
    "id, buyer_name, product_id, product_name, quantity, unit_price, total_price, notes, created_at";

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        name: row.get(1)?,
        quantity: row.get(2)?,
        price: row.get(3)?,
        category: row.get(4)?,
        description: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn sale_from_row(row: &Row<'_>) -> rusqlite::Result<Sale> {
    Ok(Sale {
        id: row.get(0)?,
        buyer_name: row.get(1)?,
        product_id: row.get(2)?,
        product_name: row.get(3)?,
        quantity: row.get(4)?,
        unit_price: row.get(5)?,
        total_price: row.get(6)?,
        notes: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn find_product(conn: &Connection, id: Uuid) -> Result<Option<Product>> {
    let product = conn
        .query_row(
            &format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"),
            [id],
            product_from_row,
        )
        .optional()?;
    Ok(product)
}

fn find_sale(conn: &Connection, id: Uuid) -> Result<Option<Sale>> {
    let sale = conn
        .query_row(
            &format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1"),
            [id],
            sale_from_row,
        )
        .optional()?;
    Ok(sale)
}

fn write_product(conn: &Connection, p: &Product) -> Result<()> {
    conn.execute(
        "INSERT INTO products (id, name, quantity, price, category, description, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            quantity = excluded.quantity,
            price = excluded.price,
            category = excluded.category,
            description = excluded.description,
            updated_at = excluded.updated_at",
        params![
            p.id,
            p.name,
            p.quantity,
            p.price,
            p.category,
            p.description,
            p.created_at,
            p.updated_at
        ],
    )?;
    Ok(())
}

fn product_not_found(id: Uuid) -> Error {
    Error::NotFound {
        entity: EntityKind::Product,
        id,
    }
}

impl LocalStore {
    pub fn list_products(&self) -> Result<Vec<Product>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY name COLLATE NOCASE"
        ))?;
        let rows = stmt.query_map([], product_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    pub fn product(&self, id: Uuid) -> Result<Option<Product>> {
        let conn = self.conn()?;
        find_product(&conn, id)
    }

    pub fn insert_product(&self, form: ProductForm) -> Result<Product> {
        form.validate()?;
        let now = Utc::now();
        let product = form.into_record(Uuid::new_v4(), now, now);

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        write_product(&tx, &product)?;
        queue::push(
            &tx,
            OperationKind::Create,
            EntityKind::Product,
            product.id,
            Some(&product),
        )?;
        tx.commit()?;
        Ok(product)
    }

    pub fn update_product(&self, id: Uuid, form: ProductForm) -> Result<Product> {
        form.validate()?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let existing = find_product(&tx, id)?.ok_or_else(|| product_not_found(id))?;
        let product = form.into_record(id, existing.created_at, Utc::now());
        write_product(&tx, &product)?;
        queue::push(
            &tx,
            OperationKind::Update,
            EntityKind::Product,
            id,
            Some(&product),
        )?;
        tx.commit()?;
        Ok(product)
    }

    /// Remove a product. Past sales keep their snapshot of it.
    pub fn delete_product(&self, id: Uuid) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        if tx.execute("DELETE FROM products WHERE id = ?1", [id])? == 0 {
            return Err(product_not_found(id));
        }
        queue::push::<()>(&tx, OperationKind::Delete, EntityKind::Product, id, None)?;
        tx.commit()?;
        Ok(())
    }

    /// Sales, newest first
    pub fn list_sales(&self) -> Result<Vec<Sale>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SALE_COLUMNS} FROM sales ORDER BY created_at DESC"
        ))?;
        let rows = stmt.query_map([], sale_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    pub fn sale(&self, id: Uuid) -> Result<Option<Sale>> {
        let conn = self.conn()?;
        find_sale(&conn, id)
    }

    /// Record a sale and take its quantity out of stock.
    ///
    /// The stock decrement is a conditional update inside the same
    /// transaction as the sale row, so two sales can never oversell a
    /// product. Queues the sale create followed by the product update.
    pub fn record_sale(&self, form: SaleForm) -> Result<Sale> {
        form.validate()?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut product =
            find_product(&tx, form.product_id)?.ok_or_else(|| product_not_found(form.product_id))?;

        let now = Utc::now();
        let sale = form.into_record(Uuid::new_v4(), &product, now);
        let taken = tx.execute(
            "UPDATE products SET quantity = quantity - ?1, updated_at = ?2
             WHERE id = ?3 AND quantity >= ?1",
            params![sale.quantity, now, product.id],
        )?;
        if taken == 0 {
            return Err(Error::InsufficientStock {
                product_id: product.id,
                available: product.quantity,
                requested: sale.quantity,
            });
        }
        product.quantity -= sale.quantity;
        product.updated_at = now;

        tx.execute(
            &format!("INSERT INTO sales ({SALE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
            params![
                sale.id,
                sale.buyer_name,
                sale.product_id,
                sale.product_name,
                sale.quantity,
                sale.unit_price,
                sale.total_price,
                sale.notes,
                sale.created_at
            ],
        )?;
        queue::push(&tx, OperationKind::Create, EntityKind::Sale, sale.id, Some(&sale))?;
        queue::push(
            &tx,
            OperationKind::Update,
            EntityKind::Product,
            product.id,
            Some(&product),
        )?;
        tx.commit()?;
        tracing::debug!(sale = %sale.id, product = %product.id, left = product.quantity, "recorded sale");
        Ok(sale)
    }

    /// Delete a sale and put its quantity back in stock.
    /// Returns the removed sale.
    pub fn delete_sale(&self, id: Uuid) -> Result<Sale> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let sale = find_sale(&tx, id)?.ok_or(Error::NotFound {
            entity: EntityKind::Sale,
            id,
        })?;
        tx.execute("DELETE FROM sales WHERE id = ?1", [id])?;
        queue::push::<()>(&tx, OperationKind::Delete, EntityKind::Sale, id, None)?;

        match find_product(&tx, sale.product_id)? {
            Some(mut product) => {
                product.quantity += sale.quantity;
                product.updated_at = Utc::now();
                write_product(&tx, &product)?;
                queue::push(
                    &tx,
                    OperationKind::Update,
                    EntityKind::Product,
                    product.id,
                    Some(&product),
                )?;
            }
            None => tracing::warn!(
                sale = %id,
                product = %sale.product_id,
                "product of deleted sale no longer exists; stock not restored"
            ),
        }
        tx.commit()?;
        Ok(sale)
    }
}
