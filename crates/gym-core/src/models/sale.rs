use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{clean_optional, Product};
use crate::error::{Error, Result};

/// A point-of-sale record.
///
/// `product_name` and `unit_price` are snapshots taken when the sale is
/// recorded so invoices stay stable when the product changes later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    pub id: Uuid,
    pub buyer_name: String,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price: f64,
    pub total_price: f64,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleForm {
    pub buyer_name: String,
    pub product_id: Uuid,
    pub quantity: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

impl SaleForm {
    /// Checks that do not need the product; stock is checked by the store
    pub fn validate(&self) -> Result<()> {
        if self.buyer_name.trim().is_empty() {
            return Err(Error::validation("buyer_name", "buyer name is required"));
        }
        if self.quantity < 1 {
            return Err(Error::validation("quantity", "quantity must be at least 1"));
        }
        Ok(())
    }

    pub(crate) fn into_record(self, id: Uuid, product: &Product, now: DateTime<Utc>) -> Sale {
        Sale {
            id,
            buyer_name: self.buyer_name.trim().to_string(),
            product_id: product.id,
            product_name: product.name.clone(),
            quantity: self.quantity,
            unit_price: product.price,
            total_price: total_for(self.quantity, product.price),
            notes: clean_optional(self.notes),
            created_at: now,
        }
    }
}

/// Line total rounded to cents
pub fn total_for(quantity: i64, unit_price: f64) -> f64 {
    (quantity as f64 * unit_price * 100.0).round() / 100.0
}

impl Sale {
    pub fn matches(&self, term: &str) -> bool {
        super::matches_term(
            term,
            [
                Some(self.buyer_name.as_str()),
                Some(self.product_name.as_str()),
                self.notes.as_deref(),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_are_rounded_to_cents() {
        assert_eq!(total_for(3, 19.99), 59.97);
        assert_eq!(total_for(1, 0.1), 0.1);
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let form = SaleForm {
            buyer_name: "Noor".into(),
            product_id: Uuid::new_v4(),
            quantity: 0,
            notes: None,
        };
        assert!(matches!(
            form.validate(),
            Err(Error::Validation { field: "quantity", .. })
        ));
    }

    #[test]
    fn record_snapshots_product() {
        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4(),
            name: "Whey".into(),
            quantity: 10,
            price: 45.0,
            category: None,
            description: None,
            created_at: now,
            updated_at: now,
        };
        let sale = SaleForm {
            buyer_name: " Noor ".into(),
            product_id: product.id,
            quantity: 2,
            notes: Some("".into()),
        }
        .into_record(Uuid::new_v4(), &product, now);
        assert_eq!(sale.buyer_name, "Noor");
        assert_eq!(sale.product_name, "Whey");
        assert_eq!(sale.total_price, 90.0);
        assert_eq!(sale.notes, None);
    }
}
