//! Wiring of stores, queue, engine, scheduler and facades into one context.

use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};

use crate::catalog::{CatalogService, CatalogServiceTrait, Category, PaymentMethod};
use crate::config::SyncConfig;
use crate::sync::{
    CacheRecord, Connectivity, DurableStore, EntityFacade, EntityFamily, MutationQueue,
    OperationConfirmed, OperationKind, OptimisticCache, QueueStatus, RemoteStore, SyncEngine,
    SyncEvent, SyncEventSink, SyncPassResult, SyncScheduler,
};
use crate::transactions::{Transaction, TransactionService, TransactionServiceTrait};

/// Keeps the optimistic caches in step with operations the engine confirmed.
pub struct CacheSyncEventSink {
    queue: Arc<MutationQueue>,
    transactions: Arc<OptimisticCache<Transaction>>,
    categories: Arc<OptimisticCache<Category>>,
    payment_methods: Arc<OptimisticCache<PaymentMethod>>,
}

impl CacheSyncEventSink {
    pub fn new(
        queue: Arc<MutationQueue>,
        transactions: Arc<OptimisticCache<Transaction>>,
        categories: Arc<OptimisticCache<Category>>,
        payment_methods: Arc<OptimisticCache<PaymentMethod>>,
    ) -> Self {
        Self {
            queue,
            transactions,
            categories,
            payment_methods,
        }
    }

    async fn apply<T: CacheRecord>(
        &self,
        cache: &OptimisticCache<T>,
        confirmed: &OperationConfirmed,
    ) -> crate::Result<()> {
        let (Some(record), Some(entity_id)) = (&confirmed.record, &confirmed.entity_id) else {
            return Ok(());
        };
        let previous_id = match confirmed.kind {
            OperationKind::Create => confirmed.local_id.as_deref(),
            OperationKind::Update => None,
            OperationKind::Delete | OperationKind::BulkRename => return Ok(()),
        };

        // Later queued writes still hold optimistic state newer than the record.
        if self.queue.has_queued_for(T::FAMILY, entity_id).await {
            if let Some(previous_id) = previous_id {
                cache.rekey(previous_id, entity_id)?;
                cache.persist().await;
            }
            return Ok(());
        }
        cache.adopt_remote(previous_id, record).await.map(|_| ())
    }
}

#[async_trait]
impl SyncEventSink for CacheSyncEventSink {
    async fn emit(&self, event: SyncEvent) {
        let SyncEvent::OperationConfirmed(confirmed) = event;
        let applied = match confirmed.entity_family {
            EntityFamily::Transaction => self.apply(&self.transactions, &confirmed).await,
            EntityFamily::Category => self.apply(&self.categories, &confirmed).await,
            EntityFamily::PaymentMethod => self.apply(&self.payment_methods, &confirmed).await,
        };
        if let Err(err) = applied {
            warn!(
                "[OfflineSync] Could not apply confirmed {} {} to cache: {}",
                confirmed.entity_family.as_str(),
                confirmed.kind.as_str(),
                err
            );
        }
    }
}

pub struct ServiceContext {
    pub config: SyncConfig,
    pub connectivity: Connectivity,
    pub sync_engine: Arc<SyncEngine>,
    pub sync_scheduler: Arc<SyncScheduler>,
    pub transaction_service: Arc<dyn TransactionServiceTrait>,
    pub catalog_service: Arc<dyn CatalogServiceTrait>,
}

impl ServiceContext {
    /// Builds the context. The offline queue is loaded from `store`; the
    /// caches stay empty until a facade's `load` runs.
    pub async fn initialize(
        config: SyncConfig,
        store: Arc<dyn DurableStore>,
        remote: Arc<dyn RemoteStore>,
        connectivity: Connectivity,
    ) -> Self {
        let queue = Arc::new(MutationQueue::load(Arc::clone(&store), config.retry_budget).await);

        let transactions = Arc::new(OptimisticCache::<Transaction>::new(Arc::clone(&store)));
        let categories = Arc::new(OptimisticCache::<Category>::new(Arc::clone(&store)));
        let payment_methods = Arc::new(OptimisticCache::<PaymentMethod>::new(Arc::clone(&store)));

        let event_sink = Arc::new(CacheSyncEventSink::new(
            Arc::clone(&queue),
            Arc::clone(&transactions),
            Arc::clone(&categories),
            Arc::clone(&payment_methods),
        ));
        let sync_engine = Arc::new(
            SyncEngine::new(Arc::clone(&queue), Arc::clone(&remote), connectivity.clone())
                .with_event_sink(event_sink),
        );
        let sync_scheduler = Arc::new(SyncScheduler::new(
            Arc::clone(&sync_engine),
            config.sync_interval,
        ));

        let transaction_service: Arc<dyn TransactionServiceTrait> =
            Arc::new(TransactionService::new(EntityFacade::new(
                transactions,
                Arc::clone(&sync_engine),
                Arc::clone(&remote),
            )));
        let catalog_service: Arc<dyn CatalogServiceTrait> = Arc::new(CatalogService::new(
            EntityFacade::new(categories, Arc::clone(&sync_engine), Arc::clone(&remote)),
            EntityFacade::new(payment_methods, Arc::clone(&sync_engine), remote),
            Arc::clone(&transaction_service),
        ));

        info!(
            "[OfflineSync] Service context ready (retry budget {}, {} queued operation(s))",
            config.retry_budget,
            queue.len().await
        );

        Self {
            config,
            connectivity,
            sync_engine,
            sync_scheduler,
            transaction_service,
            catalog_service,
        }
    }

    pub fn transaction_service(&self) -> Arc<dyn TransactionServiceTrait> {
        Arc::clone(&self.transaction_service)
    }

    pub fn catalog_service(&self) -> Arc<dyn CatalogServiceTrait> {
        Arc::clone(&self.catalog_service)
    }

    pub fn sync_engine(&self) -> Arc<SyncEngine> {
        Arc::clone(&self.sync_engine)
    }

    /// Cold start of every collection, then the background triggers.
    pub async fn start(&self) -> crate::Result<()> {
        self.transaction_service.load_transactions().await?;
        self.catalog_service.load_categories().await?;
        self.catalog_service.load_payment_methods().await?;
        self.sync_scheduler.start().await;
        self.sync_scheduler.start_connectivity_listener().await;
        Ok(())
    }

    pub async fn shutdown(&self) {
        self.sync_scheduler.shutdown().await;
    }

    pub async fn sync_now(&self) -> SyncPassResult {
        self.sync_scheduler.trigger_now().await
    }

    pub async fn retry_all_quarantined(&self) -> SyncPassResult {
        self.sync_engine.retry_all_quarantined().await
    }

    pub async fn clear_quarantined(&self) -> usize {
        self.sync_engine.clear_quarantined().await
    }

    pub async fn sync_status(&self) -> QueueStatus {
        self.sync_engine.get_status().await
    }
}
