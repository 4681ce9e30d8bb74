//! Export-only JSON backup of the local store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::models::{CatalogItem, Product, Sale, Subscriber};

pub const BACKUP_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupDocument {
    pub metadata: BackupMetadata,
    pub data: BackupData,
    pub statistics: BackupStatistics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub created_at: DateTime<Utc>,
    pub version: String,
    pub gym_name: String,
    pub total_records: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupData {
    pub subscribers: Vec<Subscriber>,
    pub products: Vec<Product>,
    pub sales: Vec<Sale>,
    pub courses: Vec<CatalogItem>,
    #[serde(rename = "dietItems")]
    pub diet_items: Vec<CatalogItem>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupStatistics {
    pub subscribers: usize,
    pub products: usize,
    pub sales: usize,
    pub courses: usize,
    #[serde(rename = "dietItems")]
    pub diet_items: usize,
}

impl BackupDocument {
    pub fn new(gym_name: &str, data: BackupData, created_at: DateTime<Utc>) -> Self {
        let statistics = BackupStatistics {
            subscribers: data.subscribers.len(),
            products: data.products.len(),
            sales: data.sales.len(),
            courses: data.courses.len(),
            diet_items: data.diet_items.len(),
        };
        Self {
            metadata: BackupMetadata {
                created_at,
                version: BACKUP_VERSION.to_string(),
                gym_name: gym_name.to_string(),
                total_records: statistics.total(),
            },
            data,
            statistics,
        }
    }

    /// `gym-backup-YYYY-MM-DD.json`, dated by creation time
    pub fn file_name(&self) -> String {
        format!("gym-backup-{}.json", self.metadata.created_at.format("%Y-%m-%d"))
    }

    /// Write the document into `dir` and return the file path
    pub fn write_to_dir(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        tracing::info!(records = self.metadata.total_records, "backup written to {}", path.display());
        Ok(path)
    }
}

impl BackupStatistics {
    pub fn total(&self) -> usize {
        self.subscribers + self.products + self.sales + self.courses + self.diet_items
    }
}
