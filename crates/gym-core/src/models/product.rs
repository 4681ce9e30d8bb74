use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::clean_optional;
use crate::error::{Error, Result};

/// An inventory item sold at the front desk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    /// Units in stock, never negative
    pub quantity: i64,
    pub price: f64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductForm {
    pub name: String,
    pub quantity: i64,
    pub price: f64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ProductForm {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("name", "product name is required"));
        }
        if self.quantity < 0 {
            return Err(Error::validation("quantity", "quantity cannot be negative"));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(Error::validation("price", "price must be a non-negative number"));
        }
        Ok(())
    }

    pub(crate) fn into_record(self, id: Uuid, created_at: DateTime<Utc>, now: DateTime<Utc>) -> Product {
        Product {
            id,
            name: self.name.trim().to_string(),
            quantity: self.quantity,
            price: self.price,
            category: clean_optional(self.category),
            description: clean_optional(self.description),
            created_at,
            updated_at: now,
        }
    }
}

impl Product {
    pub fn matches(&self, term: &str) -> bool {
        super::matches_term(
            term,
            [
                Some(self.name.as_str()),
                self.description.as_deref(),
                self.category.as_deref(),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(name: &str, quantity: i64, price: f64) -> ProductForm {
        ProductForm {
            name: name.into(),
            quantity,
            price,
            ..Default::default()
        }
    }

    #[test]
    fn validation_rules() {
        assert!(form("Shaker", 0, 0.0).validate().is_ok());
        assert!(matches!(
            form("", 1, 1.0).validate(),
            Err(Error::Validation { field: "name", .. })
        ));
        assert!(matches!(
            form("Shaker", -1, 1.0).validate(),
            Err(Error::Validation { field: "quantity", .. })
        ));
        assert!(matches!(
            form("Shaker", 1, f64::NAN).validate(),
            Err(Error::Validation { field: "price", .. })
        ));
    }

    #[test]
    fn search_covers_description_and_category() {
        let now = Utc::now();
        let mut product = form("Bar", 3, 2.5).into_record(Uuid::new_v4(), now, now);
        product.description = Some("High Protein snack".into());
        product.category = Some("Supplements".into());
        assert!(product.matches("protein"));
        assert!(product.matches("supp"));
        assert!(!product.matches("water"));
    }
}
