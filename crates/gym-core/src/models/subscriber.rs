use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::clean_optional;
use crate::error::{Error, Result};

/// A gym member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub age: Option<u32>,
    /// Body weight in kilograms
    #[serde(default)]
    pub weight: Option<f64>,
    /// Height in centimetres
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Which plan a group belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    Course,
    Diet,
}

impl PlanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanKind::Course => "course",
            PlanKind::Diet => "diet",
        }
    }
}

/// A titled, ordered list of exercises or meals assigned to a subscriber
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlanGroup {
    pub title: String,
    #[serde(default)]
    pub items: Vec<String>,
}

impl PlanGroup {
    pub fn new(title: impl Into<String>, items: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            title: title.into(),
            items: items.into_iter().map(Into::into).collect(),
        }
    }

    fn cleaned(self) -> Self {
        Self {
            title: self.title.trim().to_string(),
            items: self
                .items
                .into_iter()
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect(),
        }
    }
}

/// The subscriber aggregate: the member plus both plan assignments.
/// This is also the payload replayed to the remote backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriberWithGroups {
    #[serde(flatten)]
    pub subscriber: Subscriber,
    #[serde(default)]
    pub course_groups: Vec<PlanGroup>,
    #[serde(default)]
    pub diet_groups: Vec<PlanGroup>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriberForm {
    pub name: String,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub course_groups: Vec<PlanGroup>,
    #[serde(default)]
    pub diet_groups: Vec<PlanGroup>,
}

impl SubscriberForm {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("name", "subscriber name is required"));
        }
        if self.age == Some(0) {
            return Err(Error::validation("age", "age must be a positive number"));
        }
        check_measure("weight", self.weight)?;
        check_measure("height", self.height)?;
        Ok(())
    }

    /// Build the stored aggregate; `created_at` is kept from the existing
    /// record on updates
    pub(crate) fn into_record(
        self,
        id: Uuid,
        created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> SubscriberWithGroups {
        SubscriberWithGroups {
            subscriber: Subscriber {
                id,
                name: self.name.trim().to_string(),
                age: self.age,
                weight: self.weight,
                height: self.height,
                phone: clean_optional(self.phone),
                notes: clean_optional(self.notes),
                created_at,
                updated_at: now,
            },
            course_groups: self.course_groups.into_iter().map(PlanGroup::cleaned).collect(),
            diet_groups: self.diet_groups.into_iter().map(PlanGroup::cleaned).collect(),
        }
    }
}

fn check_measure(field: &'static str, value: Option<f64>) -> Result<()> {
    match value {
        Some(v) if !v.is_finite() || v <= 0.0 => {
            Err(Error::validation(field, format!("{field} must be a positive number")))
        }
        _ => Ok(()),
    }
}

impl Subscriber {
    pub fn matches(&self, term: &str) -> bool {
        super::matches_term(term, [Some(self.name.as_str()), self.phone.as_deref()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_name_is_rejected() {
        let form = SubscriberForm {
            name: "  ".into(),
            ..Default::default()
        };
        assert!(matches!(
            form.validate(),
            Err(Error::Validation { field: "name", .. })
        ));
    }

    #[test]
    fn non_positive_measures_are_rejected() {
        let form = SubscriberForm {
            name: "Sam".into(),
            weight: Some(-3.0),
            ..Default::default()
        };
        assert!(matches!(
            form.validate(),
            Err(Error::Validation { field: "weight", .. })
        ));
    }

    #[test]
    fn record_drops_blank_plan_items() {
        let now = Utc::now();
        let form = SubscriberForm {
            name: " Sam ".into(),
            phone: Some("   ".into()),
            course_groups: vec![PlanGroup::new(" Day 1 ", ["Squat 5x5", " ", "Bench 3x8"])],
            ..Default::default()
        };
        let record = form.into_record(Uuid::new_v4(), now, now);
        assert_eq!(record.subscriber.name, "Sam");
        assert_eq!(record.subscriber.phone, None);
        assert_eq!(record.course_groups[0].title, "Day 1");
        assert_eq!(record.course_groups[0].items, vec!["Squat 5x5", "Bench 3x8"]);
    }

    #[test]
    fn aggregate_serializes_flat() {
        let now = Utc::now();
        let record = SubscriberForm {
            name: "Sam".into(),
            ..Default::default()
        }
        .into_record(Uuid::new_v4(), now, now);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["name"], "Sam");
        assert!(json["course_groups"].as_array().unwrap().is_empty());
    }
}
