use async_trait::async_trait;
use gym_core::config::SyncSettings;
use gym_core::models::{CatalogForm, PlanGroup, ProductForm, SaleForm, SubscriberForm};
use gym_core::sync::remote::{MemoryRemote, RemoteBackend, RemoteError};
use gym_core::{DataAccess, EntityKind, LocalStore, PendingOperation, SyncEngine};
use gym_proto::{ApplyOutcome, EntityRecord};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

fn settings() -> SyncSettings {
    SyncSettings {
        interval_seconds: 30,
        probe_interval_seconds: 1,
        debounce_millis: 200,
        ..Default::default()
    }
}

async fn start_with(remote: Arc<MemoryRemote>) -> DataAccess {
    let store = LocalStore::open_in_memory().unwrap();
    let remote: Arc<dyn RemoteBackend> = remote;
    DataAccess::start(store, Some(remote), "front-desk", &settings(), "Test Gym").await
}

async fn remote_ids(remote: &MemoryRemote, entity: EntityKind) -> BTreeSet<Uuid> {
    remote
        .fetch_all(entity)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect()
}

fn whey(quantity: i64) -> ProductForm {
    ProductForm {
        name: "Whey protein".into(),
        quantity,
        price: 35.0,
        category: Some("supplements".into()),
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn offline_work_reaches_the_remote_after_reconnect() {
    let remote = Arc::new(MemoryRemote::new());
    remote.set_offline(true);
    let data = start_with(remote.clone()).await;
    assert!(!data.is_online());

    // a day at the front desk without network
    let product = data.save_product(whey(10)).await.unwrap();
    let bar = data
        .save_product(ProductForm {
            name: "Protein bar".into(),
            quantity: 30,
            price: 2.0,
            ..Default::default()
        })
        .await
        .unwrap();
    let member = data
        .save_subscriber(SubscriberForm {
            name: "Layla".into(),
            phone: Some("0555 123 456".into()),
            course_groups: vec![PlanGroup::new("Legs", ["Squat", "Lunge"])],
            ..Default::default()
        })
        .await
        .unwrap();
    data.update_subscriber(
        member.subscriber.id,
        SubscriberForm {
            name: "Layla H.".into(),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let sale = data
        .save_sale(SaleForm {
            buyer_name: "Layla".into(),
            product_id: product.id,
            quantity: 3,
            notes: None,
        })
        .await
        .unwrap();
    data.save_sale(SaleForm {
        buyer_name: "Sami".into(),
        product_id: bar.id,
        quantity: 2,
        notes: Some("paid cash".into()),
    })
    .await
    .unwrap();
    data.delete_sale(sale.id).await.unwrap();
    data.delete_product(bar.id).await.unwrap();
    let squat = data
        .save_course_point(CatalogForm::new("Squat", None))
        .await
        .unwrap();
    data.save_diet_item(CatalogForm::new("Oats", Some("80 g")))
        .await
        .unwrap();
    data.delete_course_point(squat.id).await.unwrap();

    assert!(data.get_pending_operations_count().unwrap() > 0);
    assert_eq!(remote.record_count(), 0);
    assert_eq!(data.get_last_sync_time().unwrap(), None);

    let transitions = Arc::new(Mutex::new(Vec::new()));
    let sink = transitions.clone();
    let _sub = data.on_connection_change(move |online| sink.lock().unwrap().push(online));

    // network comes back; the probe notices and the replay worker drains
    remote.set_offline(false);
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert!(data.is_online());
    assert_eq!(*transitions.lock().unwrap(), vec![true]);
    assert_eq!(data.get_pending_operations_count().unwrap(), 0);
    assert!(data.get_last_sync_time().unwrap().is_some());

    let local_products: BTreeSet<_> = data.get_products().unwrap().iter().map(|p| p.id).collect();
    let local_sales: BTreeSet<_> = data.get_sales().unwrap().iter().map(|s| s.id).collect();
    let local_members: BTreeSet<_> = data.get_subscribers().unwrap().iter().map(|s| s.id).collect();
    let local_courses: BTreeSet<_> = data.get_course_points().unwrap().iter().map(|c| c.id).collect();
    let local_diet: BTreeSet<_> = data.get_diet_items().unwrap().iter().map(|d| d.id).collect();

    assert_eq!(remote_ids(&remote, EntityKind::Product).await, local_products);
    assert_eq!(remote_ids(&remote, EntityKind::Sale).await, local_sales);
    assert_eq!(remote_ids(&remote, EntityKind::Subscriber).await, local_members);
    assert_eq!(remote_ids(&remote, EntityKind::CoursePoint).await, local_courses);
    assert_eq!(remote_ids(&remote, EntityKind::DietItem).await, local_diet);

    // the remote holds the latest snapshot, stock included
    let records = remote.fetch_all(EntityKind::Product).await.unwrap();
    let whey_remote = records.iter().find(|r| r.id == product.id).unwrap();
    assert_eq!(whey_remote.payload["quantity"], 10);
    let members = remote.fetch_all(EntityKind::Subscriber).await.unwrap();
    assert_eq!(members[0].payload["name"], "Layla H.");
}

#[tokio::test]
async fn forced_sync_stops_at_first_failure_and_resumes() {
    let remote = Arc::new(MemoryRemote::new());
    remote.set_offline(true);
    let data = start_with(remote.clone()).await;

    for i in 0..5 {
        data.save_diet_item(CatalogForm::new(format!("meal {i}"), None))
            .await
            .unwrap();
    }
    assert_eq!(data.get_pending_operations_count().unwrap(), 5);

    remote.set_offline(false);
    remote.fail_after(3);
    let report = data.force_sync_with_server().await.unwrap();
    assert_eq!(report.replayed, 3);
    assert_eq!(report.remaining, 2);
    assert!(report.failure.is_some());
    assert_eq!(data.get_last_sync_time().unwrap(), None);

    let left: Vec<String> = data
        .pending_operations()
        .unwrap()
        .into_iter()
        .filter_map(|op| op.payload)
        .map(|p| p["name"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(left, ["meal 3", "meal 4"]);

    remote.clear_failures();
    let report = data.force_sync_with_server().await.unwrap();
    assert!(report.is_complete());
    assert_eq!(remote.record_count(), 5);
    assert!(data.get_last_sync_time().unwrap().is_some());
}

#[tokio::test]
async fn replaying_the_queue_twice_creates_no_duplicates() {
    let store = Arc::new(LocalStore::open_in_memory().unwrap());
    let product = store.insert_product(whey(4)).unwrap();
    store
        .record_sale(SaleForm {
            buyer_name: "Nadia".into(),
            product_id: product.id,
            quantity: 1,
            notes: None,
        })
        .unwrap();
    let queued = store.pending_operations().unwrap();

    let remote = Arc::new(MemoryRemote::new());
    let engine = SyncEngine::new(store.clone(), remote.clone(), "front-desk".into());
    engine.drain().await.unwrap();
    let after_first = remote.record_count();
    assert_eq!(after_first, 2);

    // a lost acknowledgement means the same operations arrive again
    for op in &queued {
        assert_eq!(
            remote.apply("front-desk", op).await.unwrap(),
            ApplyOutcome::Duplicate
        );
    }
    // even with the dedupe log gone, creates are recognised by entity id
    remote.forget_applied_ops();
    let create = &queued[0];
    assert_eq!(
        remote.apply("front-desk", create).await.unwrap(),
        ApplyOutcome::Duplicate
    );
    assert_eq!(remote.record_count(), after_first);
}

/// Records the local queue length every time an operation is applied
struct CountingRemote {
    inner: MemoryRemote,
    store: Arc<LocalStore>,
    seen: Mutex<Vec<u64>>,
}

#[async_trait]
impl RemoteBackend for CountingRemote {
    async fn health(&self) -> Result<(), RemoteError> {
        self.inner.health().await
    }

    async fn apply(
        &self,
        device_id: &str,
        op: &PendingOperation,
    ) -> Result<ApplyOutcome, RemoteError> {
        let pending = self.store.pending_count().unwrap();
        self.seen.lock().unwrap().push(pending);
        self.inner.apply(device_id, op).await
    }

    async fn fetch_all(&self, entity: EntityKind) -> Result<Vec<EntityRecord>, RemoteError> {
        self.inner.fetch_all(entity).await
    }
}

#[tokio::test]
async fn pending_count_strictly_decreases_during_a_drain() {
    let store = Arc::new(LocalStore::open_in_memory().unwrap());
    for i in 0..4 {
        store
            .insert_product(ProductForm {
                name: format!("product {i}"),
                quantity: 1,
                price: 1.0,
                ..Default::default()
            })
            .unwrap();
    }
    let remote = Arc::new(CountingRemote {
        inner: MemoryRemote::new(),
        store: store.clone(),
        seen: Mutex::new(Vec::new()),
    });
    let engine = SyncEngine::new(store.clone(), remote.clone(), "front-desk".into());

    let report = engine.drain().await.unwrap();
    assert_eq!(report.replayed, 4);
    assert_eq!(*remote.seen.lock().unwrap(), vec![4, 3, 2, 1]);
    assert_eq!(store.pending_count().unwrap(), 0);
}

#[tokio::test]
async fn store_survives_restart_with_queue_intact() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gym.db");
    {
        let store = LocalStore::open(&path).unwrap();
        store.insert_product(whey(2)).unwrap();
    }

    let store = LocalStore::open(&path).unwrap();
    assert_eq!(store.list_products().unwrap().len(), 1);
    assert_eq!(store.pending_count().unwrap(), 1);

    let remote = Arc::new(MemoryRemote::new());
    let remote_dyn: Arc<dyn RemoteBackend> = remote.clone();
    let data = DataAccess::start(store, Some(remote_dyn), "front-desk", &settings(), "Test Gym").await;
    let report = data.force_sync_with_server().await.unwrap();
    assert!(report.is_complete());
    assert_eq!(remote.record_count(), 1);
}
