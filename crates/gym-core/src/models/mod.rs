pub mod catalog;
pub mod product;
pub mod sale;
pub mod subscriber;

pub use catalog::{CatalogForm, CatalogItem, CatalogKind, CoursePoint, DietItem};
pub use product::{Product, ProductForm};
pub use sale::{Sale, SaleForm};
pub use subscriber::{PlanGroup, PlanKind, Subscriber, SubscriberForm, SubscriberWithGroups};

/// Case-insensitive substring match used by every local search.
/// A blank term matches everything.
pub fn matches_term<'a>(term: &str, fields: impl IntoIterator<Item = Option<&'a str>>) -> bool {
    let needle = term.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }
    fields
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&needle))
}

/// Trim optional free text, treating blank input as absent
pub(crate) fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
