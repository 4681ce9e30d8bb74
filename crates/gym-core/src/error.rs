use gym_proto::EntityKind;
use uuid::Uuid;

use crate::sync::remote::RemoteError;

/// Errors surfaced by the data-access layer
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input rejected before anything was written
    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: Uuid },

    #[error("requested quantity {requested} exceeds available stock {available} for product {product_id}")]
    InsufficientStock {
        product_id: Uuid,
        available: i64,
        requested: i64,
    },

    #[error("local store error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("local store is unavailable after a panic in another caller")]
    StorePoisoned,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sync failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("configuration error: {0:#}")]
    Config(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Error::Validation {
            field,
            message: message.into(),
        }
    }

    /// Whether the error came from bad input rather than from the system
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::Validation { .. } | Error::InsufficientStock { .. }
        )
    }
}
