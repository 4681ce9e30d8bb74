pub mod backup;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod facade;
pub mod models;
pub mod seed;
pub mod storage;
pub mod sync;

pub use error::{Error, Result};
pub use facade::{
    initialize_offline_support, DataAccess, DatabaseStatus, InventorySummary, LOW_STOCK_THRESHOLD,
};
pub use gym_proto::{EntityKind, OperationKind, PendingOperation};
pub use storage::{EntityCounts, LocalStore};
pub use sync::{DrainReport, SyncEngine};
