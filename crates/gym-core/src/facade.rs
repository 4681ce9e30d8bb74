//! The data-access façade front ends talk to.
//!
//! Reads always come from the local store. Writes commit locally together
//! with their queue entries and then, when the remote is reachable, try to
//! drain the queue right away. A failed drain is logged and never undoes
//! the local write.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::backup::{BackupData, BackupDocument};
use crate::config::{Config, State, SyncSettings};
use crate::connectivity::{spawn_probe, ConnectivityMonitor, Subscription};
use crate::error::{Error, Result};
use crate::models::{
    CatalogForm, CatalogItem, CatalogKind, CoursePoint, DietItem, Product, ProductForm, Sale,
    SaleForm, Subscriber, SubscriberForm, SubscriberWithGroups,
};
use crate::seed::{seed_if_empty, SeedReport};
use crate::storage::{EntityCounts, LocalStore};
use crate::sync::remote::{HttpRemote, RemoteBackend};
use crate::sync::{spawn_auto_sync, DrainReport, SyncEngine};
use gym_proto::{EntityKind, PendingOperation};

/// Answer of [`DataAccess::check_database_initialization`]
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStatus {
    pub is_initialized: bool,
    pub counts: EntityCounts,
    pub pending_operations: u64,
}

/// Products at or below this many units count as low on stock
pub const LOW_STOCK_THRESHOLD: i64 = 5;

/// Answer of [`DataAccess::inventory_summary`]
#[derive(Debug, Clone, Serialize)]
pub struct InventorySummary {
    /// Sum of quantity times unit price over all products
    pub stock_value: f64,
    /// Sum of the totals of every recorded sale
    pub sales_revenue: f64,
    /// Products with at most [`LOW_STOCK_THRESHOLD`] units left, by name
    pub low_stock: Vec<Product>,
}

impl InventorySummary {
    pub fn compute(products: &[Product], sales: &[Sale]) -> Self {
        Self {
            stock_value: products.iter().map(|p| p.quantity as f64 * p.price).sum(),
            sales_revenue: sales.iter().map(|s| s.total_price).sum(),
            low_stock: products
                .iter()
                .filter(|p| p.quantity <= LOW_STOCK_THRESHOLD)
                .cloned()
                .collect(),
        }
    }
}

pub struct DataAccess {
    store: Arc<LocalStore>,
    monitor: Arc<ConnectivityMonitor>,
    engine: Option<Arc<SyncEngine>>,
    gym_name: String,
    tasks: Vec<JoinHandle<()>>,
}

/// Open the local store named by the config and start the background
/// machinery: reachability probe, debounced monitor and replay worker.
///
/// Without a `sync.server_url` the store works in local-only mode: writes
/// are still queued, the monitor stays offline and nothing is replayed.
pub async fn initialize_offline_support(config: &Config, state: &State) -> Result<DataAccess> {
    let path = config.database_path()?;
    let store = LocalStore::open(&path)?;

    let remote: Option<Arc<dyn RemoteBackend>> = match &config.sync.server_url {
        Some(url) => {
            tracing::info!("syncing with {url}");
            Some(Arc::new(HttpRemote::new(
                url,
                config.sync.api_token.clone(),
                config.sync.request_timeout(),
            )?))
        }
        None => {
            tracing::info!("no server configured, running in local-only mode");
            None
        }
    };

    Ok(DataAccess::start(store, remote, state.device_id(), &config.sync, &config.gym.name).await)
}

impl DataAccess {
    /// Wire an already opened store to an optional remote backend
    pub async fn start(
        store: LocalStore,
        remote: Option<Arc<dyn RemoteBackend>>,
        device_id: &str,
        settings: &SyncSettings,
        gym_name: &str,
    ) -> Self {
        let store = Arc::new(store);
        let mut tasks = Vec::new();

        let (monitor, engine) = match remote {
            Some(remote) => {
                let online = remote.health().await.is_ok();
                if !online {
                    tracing::warn!("server unreachable, starting offline");
                }
                let monitor = Arc::new(ConnectivityMonitor::new(online, settings.debounce()));
                let engine = Arc::new(SyncEngine::new(
                    store.clone(),
                    remote.clone(),
                    device_id.to_string(),
                ));
                tasks.push(spawn_probe(monitor.clone(), remote, settings.probe_interval()));
                tasks.push(spawn_auto_sync(engine.clone(), monitor.subscribe(), settings.interval()));
                (monitor, Some(engine))
            }
            None => (Arc::new(ConnectivityMonitor::new(false, settings.debounce())), None),
        };

        Self {
            store,
            monitor,
            engine,
            gym_name: gym_name.to_string(),
            tasks,
        }
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    pub fn is_local_only(&self) -> bool {
        self.engine.is_none()
    }

    async fn sync_after_write(&self) {
        let Some(engine) = &self.engine else {
            return;
        };
        if !self.monitor.is_online() {
            return;
        }
        if let Err(e) = engine.drain().await {
            tracing::warn!("sync after write failed: {e}");
        }
    }

    // Subscribers

    /// Newest first
    pub fn get_subscribers(&self) -> Result<Vec<Subscriber>> {
        self.store.list_subscribers()
    }

    pub fn get_subscriber_with_groups(&self, id: Uuid) -> Result<SubscriberWithGroups> {
        self.store
            .subscriber_with_groups(id)?
            .ok_or(Error::NotFound {
                entity: EntityKind::Subscriber,
                id,
            })
    }

    pub async fn save_subscriber(&self, form: SubscriberForm) -> Result<SubscriberWithGroups> {
        let record = self.store.insert_subscriber(form)?;
        self.sync_after_write().await;
        Ok(record)
    }

    pub async fn update_subscriber(
        &self,
        id: Uuid,
        form: SubscriberForm,
    ) -> Result<SubscriberWithGroups> {
        let record = self.store.update_subscriber(id, form)?;
        self.sync_after_write().await;
        Ok(record)
    }

    pub async fn delete_subscriber(&self, id: Uuid) -> Result<()> {
        self.store.delete_subscriber(id)?;
        self.sync_after_write().await;
        Ok(())
    }

    /// Match on name and phone
    pub fn search_subscribers(&self, term: &str) -> Result<Vec<Subscriber>> {
        let mut subscribers = self.store.list_subscribers()?;
        subscribers.retain(|s| s.matches(term));
        Ok(subscribers)
    }

    // Products

    /// Alphabetical by name
    pub fn get_products(&self) -> Result<Vec<Product>> {
        self.store.list_products()
    }

    pub fn get_product(&self, id: Uuid) -> Result<Product> {
        self.store.product(id)?.ok_or(Error::NotFound {
            entity: EntityKind::Product,
            id,
        })
    }

    pub async fn save_product(&self, form: ProductForm) -> Result<Product> {
        let product = self.store.insert_product(form)?;
        self.sync_after_write().await;
        Ok(product)
    }

    pub async fn update_product(&self, id: Uuid, form: ProductForm) -> Result<Product> {
        let product = self.store.update_product(id, form)?;
        self.sync_after_write().await;
        Ok(product)
    }

    pub async fn delete_product(&self, id: Uuid) -> Result<()> {
        self.store.delete_product(id)?;
        self.sync_after_write().await;
        Ok(())
    }

    /// Match on name, description and category
    pub fn search_products(&self, term: &str) -> Result<Vec<Product>> {
        let mut products = self.store.list_products()?;
        products.retain(|p| p.matches(term));
        Ok(products)
    }

    /// Stock value, sales revenue and the products running low
    pub fn inventory_summary(&self) -> Result<InventorySummary> {
        let products = self.store.list_products()?;
        let sales = self.store.list_sales()?;
        Ok(InventorySummary::compute(&products, &sales))
    }

    // Sales

    /// Newest first
    pub fn get_sales(&self) -> Result<Vec<Sale>> {
        self.store.list_sales()
    }

    pub fn get_sale(&self, id: Uuid) -> Result<Sale> {
        self.store.sale(id)?.ok_or(Error::NotFound {
            entity: EntityKind::Sale,
            id,
        })
    }

    /// Record a sale, taking its quantity out of stock
    pub async fn save_sale(&self, form: SaleForm) -> Result<Sale> {
        let sale = self.store.record_sale(form)?;
        self.sync_after_write().await;
        Ok(sale)
    }

    /// Delete a sale, putting its quantity back in stock
    pub async fn delete_sale(&self, id: Uuid) -> Result<Sale> {
        let sale = self.store.delete_sale(id)?;
        self.sync_after_write().await;
        Ok(sale)
    }

    /// Match on buyer, product name and notes
    pub fn search_sales(&self, term: &str) -> Result<Vec<Sale>> {
        let mut sales = self.store.list_sales()?;
        sales.retain(|s| s.matches(term));
        Ok(sales)
    }

    // Course points and diet items

    pub fn get_course_points(&self) -> Result<Vec<CoursePoint>> {
        self.store.list_catalog(CatalogKind::CoursePoints)
    }

    pub fn get_diet_items(&self) -> Result<Vec<DietItem>> {
        self.store.list_catalog(CatalogKind::DietItems)
    }

    pub async fn save_catalog_item(&self, kind: CatalogKind, form: CatalogForm) -> Result<CatalogItem> {
        let item = self.store.insert_catalog(kind, form)?;
        self.sync_after_write().await;
        Ok(item)
    }

    pub async fn update_catalog_item(
        &self,
        kind: CatalogKind,
        id: Uuid,
        form: CatalogForm,
    ) -> Result<CatalogItem> {
        let item = self.store.update_catalog(kind, id, form)?;
        self.sync_after_write().await;
        Ok(item)
    }

    pub async fn delete_catalog_item(&self, kind: CatalogKind, id: Uuid) -> Result<()> {
        self.store.delete_catalog(kind, id)?;
        self.sync_after_write().await;
        Ok(())
    }

    pub async fn save_course_point(&self, form: CatalogForm) -> Result<CoursePoint> {
        self.save_catalog_item(CatalogKind::CoursePoints, form).await
    }

    pub async fn update_course_point(&self, id: Uuid, form: CatalogForm) -> Result<CoursePoint> {
        self.update_catalog_item(CatalogKind::CoursePoints, id, form).await
    }

    pub async fn delete_course_point(&self, id: Uuid) -> Result<()> {
        self.delete_catalog_item(CatalogKind::CoursePoints, id).await
    }

    pub async fn save_diet_item(&self, form: CatalogForm) -> Result<DietItem> {
        self.save_catalog_item(CatalogKind::DietItems, form).await
    }

    pub async fn update_diet_item(&self, id: Uuid, form: CatalogForm) -> Result<DietItem> {
        self.update_catalog_item(CatalogKind::DietItems, id, form).await
    }

    pub async fn delete_diet_item(&self, id: Uuid) -> Result<()> {
        self.delete_catalog_item(CatalogKind::DietItems, id).await
    }

    // Offline status

    pub fn is_online(&self) -> bool {
        self.monitor.is_online()
    }

    pub fn on_connection_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.monitor.on_connection_change(callback)
    }

    pub fn connection_status(&self) -> watch::Receiver<bool> {
        self.monitor.subscribe()
    }

    pub fn get_pending_operations_count(&self) -> Result<u64> {
        self.store.pending_count()
    }

    pub fn pending_operations(&self) -> Result<Vec<PendingOperation>> {
        self.store.pending_operations()
    }

    /// When the queue was last emptied by a drain
    pub fn get_last_sync_time(&self) -> Result<Option<DateTime<Utc>>> {
        self.store.last_sync_time()
    }

    /// Drain now, whatever the monitor currently believes
    pub async fn force_sync_with_server(&self) -> Result<DrainReport> {
        let Some(engine) = &self.engine else {
            return Ok(DrainReport {
                remaining: self.store.pending_count()?,
                failure: Some("no server configured".to_string()),
                ..Default::default()
            });
        };
        let report = engine.drain().await?;
        // a drain that reached the server is as good as a health check,
        // even when the server refused an operation
        self.monitor.report(!report.unreachable);
        Ok(report)
    }

    // Initialization

    pub fn check_database_initialization(&self) -> Result<DatabaseStatus> {
        Ok(DatabaseStatus {
            is_initialized: self.store.schema_ready()?,
            counts: self.store.counts()?,
            pending_operations: self.store.pending_count()?,
        })
    }

    /// Seed empty catalogs and an empty inventory with starter data
    pub async fn initialize_database_with_sample_data(&self) -> Result<SeedReport> {
        let report = seed_if_empty(&self.store)?;
        if !report.is_empty() {
            self.sync_after_write().await;
        }
        Ok(report)
    }

    // Backup

    pub fn export_backup(&self) -> Result<BackupDocument> {
        let data = BackupData {
            subscribers: self.store.list_subscribers()?,
            products: self.store.list_products()?,
            sales: self.store.list_sales()?,
            courses: self.store.list_catalog(CatalogKind::CoursePoints)?,
            diet_items: self.store.list_catalog(CatalogKind::DietItems)?,
        };
        Ok(BackupDocument::new(&self.gym_name, data, Utc::now()))
    }

    /// Write `gym-backup-YYYY-MM-DD.json` into `dir`
    pub fn write_backup(&self, dir: &Path) -> Result<PathBuf> {
        self.export_backup()?.write_to_dir(dir)
    }
}

impl Drop for DataAccess {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::remote::{MemoryRemote, RemoteError};
    use async_trait::async_trait;
    use gym_proto::{ApplyOutcome, EntityRecord};
    use std::time::Duration;

    /// Answers health checks but refuses every operation
    struct RefusingRemote;

    #[async_trait]
    impl RemoteBackend for RefusingRemote {
        async fn health(&self) -> std::result::Result<(), RemoteError> {
            Ok(())
        }

        async fn apply(
            &self,
            _device_id: &str,
            _op: &PendingOperation,
        ) -> std::result::Result<ApplyOutcome, RemoteError> {
            Err(RemoteError::Rejected {
                status: 422,
                message: "payload does not match".into(),
            })
        }

        async fn fetch_all(
            &self,
            _entity: EntityKind,
        ) -> std::result::Result<Vec<EntityRecord>, RemoteError> {
            Ok(Vec::new())
        }
    }

    async fn local_only() -> DataAccess {
        let store = LocalStore::open_in_memory().unwrap();
        DataAccess::start(store, None, "test", &SyncSettings::default(), "Test Gym").await
    }

    fn whey() -> ProductForm {
        ProductForm {
            name: "Whey Protein".into(),
            quantity: 5,
            price: 30.0,
            description: Some("Vanilla flavour".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn local_only_mode_queues_but_never_syncs() {
        let data = local_only().await;
        assert!(data.is_local_only());
        assert!(!data.is_online());

        data.save_product(whey()).await.unwrap();
        assert_eq!(data.get_pending_operations_count().unwrap(), 1);

        let report = data.force_sync_with_server().await.unwrap();
        assert_eq!(report.remaining, 1);
        assert!(report.failure.is_some());
        assert_eq!(data.get_last_sync_time().unwrap(), None);
    }

    #[tokio::test]
    async fn oversell_is_rejected_and_stock_kept() {
        let data = local_only().await;
        let product = data.save_product(whey()).await.unwrap();
        let err = data
            .save_sale(SaleForm {
                buyer_name: "Karim".into(),
                product_id: product.id,
                quantity: 6,
                notes: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientStock { available: 5, requested: 6, .. }
        ));
        assert_eq!(data.get_product(product.id).unwrap().quantity, 5);
        assert!(data.get_sales().unwrap().is_empty());
        assert_eq!(data.get_pending_operations_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn product_search_is_case_insensitive() {
        let data = local_only().await;
        data.save_product(whey()).await.unwrap();
        data.save_product(ProductForm {
            name: "Shaker".into(),
            quantity: 2,
            price: 4.0,
            description: Some("Fits any protein powder".into()),
            ..Default::default()
        })
        .await
        .unwrap();
        data.save_product(ProductForm {
            name: "Towel".into(),
            quantity: 9,
            price: 3.0,
            ..Default::default()
        })
        .await
        .unwrap();

        let hits = data.search_products("protein").unwrap();
        let names: Vec<_> = hits.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Shaker", "Whey Protein"]);
        assert_eq!(data.search_products("  ").unwrap().len(), 3);
    }

    #[tokio::test]
    async fn missing_records_are_not_found() {
        let data = local_only().await;
        let id = Uuid::new_v4();
        assert!(matches!(
            data.get_sale(id),
            Err(Error::NotFound { entity: EntityKind::Sale, .. })
        ));
        assert!(matches!(
            data.delete_subscriber(id).await,
            Err(Error::NotFound { entity: EntityKind::Subscriber, .. })
        ));
        assert_eq!(data.get_pending_operations_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn status_and_backup_reflect_store_contents() {
        let data = local_only().await;
        let seeded = data.initialize_database_with_sample_data().await.unwrap();
        assert!(!seeded.is_empty());

        let status = data.check_database_initialization().unwrap();
        assert!(status.is_initialized);
        assert_eq!(status.counts.products as usize, seeded.products);
        assert_eq!(status.pending_operations, status.counts.total());

        let backup = data.export_backup().unwrap();
        assert_eq!(backup.metadata.gym_name, "Test Gym");
        assert_eq!(backup.metadata.total_records as u64, status.counts.total());
    }

    #[tokio::test]
    async fn writes_sync_immediately_while_online() {
        let remote = Arc::new(MemoryRemote::new());
        let store = LocalStore::open_in_memory().unwrap();
        let data = DataAccess::start(
            store,
            Some(remote.clone() as Arc<dyn RemoteBackend>),
            "test",
            &SyncSettings::default(),
            "Test Gym",
        )
        .await;
        assert!(data.is_online());

        data.save_course_point(CatalogForm::new("Plank", Some("3 x 60s")))
            .await
            .unwrap();
        assert_eq!(data.get_pending_operations_count().unwrap(), 0);
        assert_eq!(remote.record_count(), 1);
        assert!(data.get_last_sync_time().unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn refused_operation_keeps_the_link_online() {
        let store = LocalStore::open_in_memory().unwrap();
        store.insert_product(whey()).unwrap();
        let data = DataAccess::start(
            store,
            Some(Arc::new(RefusingRemote) as Arc<dyn RemoteBackend>),
            "test",
            &SyncSettings::default(),
            "Test Gym",
        )
        .await;
        assert!(data.is_online());

        let report = data.force_sync_with_server().await.unwrap();
        assert!(report.failure.is_some());
        assert!(!report.unreachable);
        assert_eq!(report.remaining, 1);

        // well past the debounce window, short of the next health probe
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(data.is_online());
    }

    #[tokio::test]
    async fn inventory_summary_totals_and_low_stock() {
        let data = local_only().await;
        let protein = data.save_product(whey()).await.unwrap();
        data.save_product(ProductForm {
            name: "Gloves".into(),
            quantity: 6,
            price: 15.0,
            ..Default::default()
        })
        .await
        .unwrap();
        data.save_product(ProductForm {
            name: "Chalk".into(),
            quantity: 0,
            price: 2.5,
            ..Default::default()
        })
        .await
        .unwrap();

        let before = data.inventory_summary().unwrap();
        assert_eq!(before.stock_value, 5.0 * 30.0 + 6.0 * 15.0);
        assert_eq!(before.sales_revenue, 0.0);
        let low: Vec<_> = before.low_stock.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(low, ["Chalk", "Whey Protein"]);

        data.save_sale(SaleForm {
            buyer_name: "Karim".into(),
            product_id: protein.id,
            quantity: 2,
            notes: None,
        })
        .await
        .unwrap();
        let after = data.inventory_summary().unwrap();
        assert_eq!(after.sales_revenue, 60.0);
        assert_eq!(after.stock_value, 3.0 * 30.0 + 6.0 * 15.0);
        assert_eq!(after.low_stock.len(), 2);
    }
}
