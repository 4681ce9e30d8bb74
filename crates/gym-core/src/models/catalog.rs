use chrono::{DateTime, Utc};
use gym_proto::EntityKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::clean_optional;
use crate::error::{Error, Result};

/// An entry of the exercise or diet catalog that plan groups draw from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub type CoursePoint = CatalogItem;
pub type DietItem = CatalogItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogKind {
    CoursePoints,
    DietItems,
}

impl CatalogKind {
    pub fn entity(&self) -> EntityKind {
        match self {
            CatalogKind::CoursePoints => EntityKind::CoursePoint,
            CatalogKind::DietItems => EntityKind::DietItem,
        }
    }

    pub(crate) fn table(&self) -> &'static str {
        match self {
            CatalogKind::CoursePoints => "course_points",
            CatalogKind::DietItems => "diet_items",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogForm {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl CatalogForm {
    pub fn new(name: impl Into<String>, description: Option<&str>) -> Self {
        Self {
            name: name.into(),
            description: description.map(str::to_string),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("name", "name is required"));
        }
        Ok(())
    }

    pub(crate) fn into_record(self, id: Uuid, created_at: DateTime<Utc>) -> CatalogItem {
        CatalogItem {
            id,
            name: self.name.trim().to_string(),
            description: clean_optional(self.description),
            created_at,
        }
    }
}
