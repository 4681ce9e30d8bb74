//! Starter catalog and inventory for a fresh installation.

use serde::Serialize;

use crate::error::Result;
use crate::models::{CatalogForm, CatalogKind, ProductForm};
use crate::storage::LocalStore;

const COURSE_POINTS: &[(&str, &str)] = &[
    ("Bench press", "4 sets of 8-10 reps"),
    ("Squat", "5 sets of 5 reps"),
    ("Deadlift", "3 sets of 5 reps"),
    ("Pull-up", "3 sets to failure"),
    ("Overhead press", "4 sets of 8 reps"),
    ("Treadmill", "20 minutes steady pace"),
];

const DIET_ITEMS: &[(&str, &str)] = &[
    ("Oats", "80 g with milk"),
    ("Eggs", "3 whole eggs"),
    ("Chicken breast", "200 g grilled"),
    ("Rice", "150 g cooked"),
    ("Greek yogurt", "200 g"),
    ("Banana", "1 medium"),
];

const PRODUCTS: &[(&str, i64, f64, &str)] = &[
    ("Whey protein 2kg", 12, 45.0, "supplements"),
    ("Creatine monohydrate", 20, 18.5, "supplements"),
    ("Protein bar", 60, 2.5, "snacks"),
    ("Water bottle", 40, 1.0, "drinks"),
    ("Lifting gloves", 8, 15.0, "accessories"),
];

/// What a seeding run added
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub course_points: usize,
    pub diet_items: usize,
    pub products: usize,
}

impl SeedReport {
    pub fn is_empty(&self) -> bool {
        self.course_points + self.diet_items + self.products == 0
    }
}

/// Fill each empty catalog and an empty inventory with starter entries.
/// Non-empty collections are left alone. Inserts go through the queue like
/// any other write.
pub fn seed_if_empty(store: &LocalStore) -> Result<SeedReport> {
    let counts = store.counts()?;
    let mut report = SeedReport::default();

    if counts.course_points == 0 {
        for (name, description) in COURSE_POINTS {
            store.insert_catalog(CatalogKind::CoursePoints, CatalogForm::new(*name, Some(*description)))?;
        }
        report.course_points = COURSE_POINTS.len();
    }
    if counts.diet_items == 0 {
        for (name, description) in DIET_ITEMS {
            store.insert_catalog(CatalogKind::DietItems, CatalogForm::new(*name, Some(*description)))?;
        }
        report.diet_items = DIET_ITEMS.len();
    }
    if counts.products == 0 {
        for (name, quantity, price, category) in PRODUCTS {
            store.insert_product(ProductForm {
                name: name.to_string(),
                quantity: *quantity,
                price: *price,
                category: Some(category.to_string()),
                description: None,
            })?;
        }
        report.products = PRODUCTS.len();
    }

    if !report.is_empty() {
        tracing::info!(?report, "seeded sample data");
    }
    Ok(report)
}
