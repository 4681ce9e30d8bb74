//! Replay of the pending-operation queue against the remote backend.

pub mod remote;

use chrono::{DateTime, Utc};
use gym_proto::ApplyOutcome;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::storage::LocalStore;
use remote::RemoteBackend;

/// Result of one drain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Operations acknowledged by the remote during this drain
    pub replayed: usize,
    /// Acknowledgements that were duplicates of earlier deliveries
    pub duplicates: usize,
    /// Operations still queued when the drain returned
    pub remaining: u64,
    /// Why the drain stopped early, if it did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    /// The drain stopped because the server could not be reached, as opposed
    /// to the server refusing an operation
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub unreachable: bool,
}

impl DrainReport {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none() && self.remaining == 0
    }
}

pub struct SyncEngine {
    store: Arc<LocalStore>,
    remote: Arc<dyn RemoteBackend>,
    device_id: String,
    drain_lock: Mutex<()>,
}

impl SyncEngine {
    pub fn new(store: Arc<LocalStore>, remote: Arc<dyn RemoteBackend>, device_id: String) -> Self {
        Self {
            store,
            remote,
            device_id,
            drain_lock: Mutex::new(()),
        }
    }

    /// Replay queued operations oldest first.
    ///
    /// Each operation is dequeued only after the remote acknowledged it. The
    /// first remote failure stops the drain and leaves that operation and
    /// everything behind it queued for the next attempt; it is reported in
    /// [`DrainReport::failure`]. Only local store errors are returned as `Err`.
    pub async fn drain(&self) -> Result<DrainReport> {
        let _running = self.drain_lock.lock().await;
        let mut report = DrainReport::default();

        while let Some(op) = self.store.next_pending()? {
            match self.remote.apply(&self.device_id, &op).await {
                Ok(outcome) => {
                    self.store.acknowledge(op.seq)?;
                    report.replayed += 1;
                    if outcome == ApplyOutcome::Duplicate {
                        report.duplicates += 1;
                    }
                    tracing::debug!(seq = op.seq, kind = %op.kind, entity = %op.entity, ?outcome, "replayed operation");
                }
                Err(e) => {
                    report.remaining = self.store.pending_count()?;
                    tracing::warn!(
                        seq = op.seq,
                        remaining = report.remaining,
                        "sync stopped, operation kept for retry: {e}"
                    );
                    report.failure = Some(e.to_string());
                    report.unreachable = e.is_unreachable();
                    return Ok(report);
                }
            }
        }

        self.store.set_last_sync_time(Utc::now())?;
        if report.replayed > 0 {
            tracing::info!(
                replayed = report.replayed,
                duplicates = report.duplicates,
                "sync complete"
            );
        }
        Ok(report)
    }

    pub fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>> {
        self.store.last_sync_time()
    }
}

/// Drain whenever connectivity comes back, and periodically while online and
/// work is pending.
pub fn spawn_auto_sync(
    engine: Arc<SyncEngine>,
    mut online: watch::Receiver<bool>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut was_online = *online.borrow_and_update();
        let mut ticker = tokio::time::interval(interval);
        // the first tick fires immediately, picking up work left from the last run
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = online.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let now_online = *online.borrow_and_update();
                    if now_online && !was_online {
                        if let Err(e) = engine.drain().await {
                            tracing::error!("sync after reconnect failed: {e}");
                        }
                    }
                    was_online = now_online;
                }
                _ = ticker.tick() => {
                    if !*online.borrow() {
                        continue;
                    }
                    match engine.store.pending_count() {
                        Ok(0) => {}
                        Ok(_) => {
                            if let Err(e) = engine.drain().await {
                                tracing::error!("periodic sync failed: {e}");
                            }
                        }
                        Err(e) => tracing::error!("cannot read sync queue: {e}"),
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProductForm;
    use remote::MemoryRemote;

    fn setup(products: usize) -> (Arc<LocalStore>, Arc<MemoryRemote>, SyncEngine) {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        for i in 0..products {
            store
                .insert_product(ProductForm {
                    name: format!("item {i}"),
                    quantity: 1,
                    price: 1.0,
                    ..Default::default()
                })
                .unwrap();
        }
        let remote = Arc::new(MemoryRemote::new());
        let engine = SyncEngine::new(store.clone(), remote.clone(), "test-device".into());
        (store, remote, engine)
    }

    #[tokio::test]
    async fn full_drain_empties_queue_and_stamps_time() {
        let (store, remote, engine) = setup(3);
        assert_eq!(engine.last_sync_time().unwrap(), None);

        let report = engine.drain().await.unwrap();
        assert_eq!(report.replayed, 3);
        assert!(report.is_complete());
        assert_eq!(store.pending_count().unwrap(), 0);
        assert_eq!(remote.record_count(), 3);
        assert!(engine.last_sync_time().unwrap().is_some());
    }

    #[tokio::test]
    async fn failure_keeps_the_rest_of_the_queue() {
        let (store, remote, engine) = setup(4);
        remote.fail_after(2);

        let report = engine.drain().await.unwrap();
        assert_eq!(report.replayed, 2);
        assert_eq!(report.remaining, 2);
        assert!(report.failure.is_some());
        assert_eq!(store.pending_count().unwrap(), 2);
        assert_eq!(remote.record_count(), 2);
        assert_eq!(engine.last_sync_time().unwrap(), None);

        remote.clear_failures();
        let report = engine.drain().await.unwrap();
        assert_eq!(report.replayed, 2);
        assert!(report.is_complete());
        assert_eq!(store.pending_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn offline_remote_leaves_queue_untouched() {
        let (store, remote, engine) = setup(2);
        remote.set_offline(true);
        let report = engine.drain().await.unwrap();
        assert!(!report.is_complete());
        assert!(report.unreachable);
        assert_eq!(report.replayed, 0);
        assert_eq!(store.pending_count().unwrap(), 2);
        assert_eq!(remote.apply_calls(), 1);
    }

    #[tokio::test]
    async fn empty_queue_still_counts_as_synced() {
        let (_store, remote, engine) = setup(0);
        let report = engine.drain().await.unwrap();
        assert_eq!(report, DrainReport::default());
        assert_eq!(remote.apply_calls(), 0);
        assert!(engine.last_sync_time().unwrap().is_some());
    }
}
