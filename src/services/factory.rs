use std::sync::Arc;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    db::DbPool,
    errors::ServiceError,
    events::EventSender,
    locks::StockKeyLocks,
    models::{
        Adjustment, BalanceSnapshot, MovementDocument, NewMovement, Observation, PostingOutcome,
        StockKey,
    },
    services::{
        master_data::{
            ItemMaster, LedgerTrackingValidator, LocationDirectory, MasterDataRepository,
            TrackingValidator,
        },
        stock_balance::BalanceStore,
        stock_ledger::{LedgerPage, LedgerRange, LedgerStore},
        stock_movement::MovementService,
        stock_posting::PostingEngine,
        stock_reconciliation::ReconciliationEngine,
        valuation::ValuationService,
    },
};

/// Factory for creating service instances with shared dependencies.
///
/// Every service built by one factory shares the same key locks, so postings made through any of
/// them are serialized per (tenant, item, location).
pub struct ServiceFactory {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
    config: Arc<AppConfig>,
    locks: StockKeyLocks,
    master_data: MasterDataRepository,
    items: Arc<dyn ItemMaster>,
    locations: Arc<dyn LocationDirectory>,
    tracking: Arc<dyn TrackingValidator>,
}

impl ServiceFactory {
    /// Creates a new service factory backed by the database master data.
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender, config: &AppConfig) -> Self {
        let master_data = MasterDataRepository::new(db_pool.clone());
        let tracking = Arc::new(LedgerTrackingValidator::new(db_pool.clone()));
        Self {
            items: Arc::new(master_data.clone()),
            locations: Arc::new(master_data.clone()),
            tracking,
            master_data,
            db_pool,
            event_sender,
            config: Arc::new(config.clone()),
            locks: StockKeyLocks::new(),
        }
    }

    /// Replaces the item master lookup.
    pub fn with_item_master(mut self, items: Arc<dyn ItemMaster>) -> Self {
        self.items = items;
        self
    }

    /// Replaces the location lookup.
    pub fn with_location_directory(mut self, locations: Arc<dyn LocationDirectory>) -> Self {
        self.locations = locations;
        self
    }

    /// Replaces the batch/serial validator.
    pub fn with_tracking_validator(mut self, tracking: Arc<dyn TrackingValidator>) -> Self {
        self.tracking = tracking;
        self
    }

    pub fn balance_store(&self) -> BalanceStore {
        BalanceStore::new(
            self.db_pool.clone(),
            self.event_sender.clone(),
            self.locks.clone(),
            self.items.clone(),
        )
    }

    pub fn ledger_store(&self) -> LedgerStore {
        LedgerStore::new(
            self.db_pool.clone(),
            self.locks.clone(),
            self.config.ledger_page_size,
        )
    }

    pub fn valuation_service(&self) -> ValuationService {
        ValuationService::new(self.db_pool.clone(), self.items.clone())
    }

    pub fn movement_service(&self) -> MovementService {
        MovementService::new(self.db_pool.clone())
    }

    pub fn posting_engine(&self) -> PostingEngine {
        PostingEngine::new(
            self.db_pool.clone(),
            self.event_sender.clone(),
            self.locks.clone(),
            self.items.clone(),
            self.locations.clone(),
            self.tracking.clone(),
            self.config.operation_timeout(),
        )
    }

    pub fn reconciliation_engine(&self) -> ReconciliationEngine {
        ReconciliationEngine::new(
            self.db_pool.clone(),
            self.event_sender.clone(),
            self.locks.clone(),
            self.items.clone(),
            self.locations.clone(),
            self.posting_engine(),
            self.config.reconciliation_epsilon,
        )
    }

    pub fn master_data(&self) -> MasterDataRepository {
        self.master_data.clone()
    }

    pub fn build(&self) -> StockServices {
        StockServices::new(self)
    }
}

/// Service container holding all service instances, plus the caller-facing operations.
#[derive(Clone)]
pub struct StockServices {
    pub balances: Arc<BalanceStore>,
    pub ledger: Arc<LedgerStore>,
    pub valuation: Arc<ValuationService>,
    pub movements: Arc<MovementService>,
    pub posting: Arc<PostingEngine>,
    pub reconciliation: Arc<ReconciliationEngine>,
    pub master_data: Arc<MasterDataRepository>,
    locks: StockKeyLocks,
    config: Arc<AppConfig>,
}

impl StockServices {
    /// Creates a new service container with all services initialized
    pub fn new(factory: &ServiceFactory) -> Self {
        Self {
            balances: Arc::new(factory.balance_store()),
            ledger: Arc::new(factory.ledger_store()),
            valuation: Arc::new(factory.valuation_service()),
            movements: Arc::new(factory.movement_service()),
            posting: Arc::new(factory.posting_engine()),
            reconciliation: Arc::new(factory.reconciliation_engine()),
            master_data: Arc::new(factory.master_data()),
            locks: factory.locks.clone(),
            config: factory.config.clone(),
        }
    }

    pub async fn create_draft(
        &self,
        tenant_id: Uuid,
        movement: NewMovement,
    ) -> Result<Uuid, ServiceError> {
        self.movements.create_draft(tenant_id, movement).await
    }

    pub async fn get_document(
        &self,
        tenant_id: Uuid,
        document_id: Uuid,
    ) -> Result<MovementDocument, ServiceError> {
        self.movements.get_document(tenant_id, document_id).await
    }

    pub async fn submit(
        &self,
        tenant_id: Uuid,
        document_id: Uuid,
    ) -> Result<PostingOutcome, ServiceError> {
        self.posting.submit(tenant_id, document_id).await
    }

    pub async fn cancel(
        &self,
        tenant_id: Uuid,
        document_id: Uuid,
    ) -> Result<PostingOutcome, ServiceError> {
        self.posting.cancel(tenant_id, document_id).await
    }

    pub async fn get_balance(
        &self,
        tenant_id: Uuid,
        item_code: &str,
        location_code: &str,
    ) -> Result<BalanceSnapshot, ServiceError> {
        self.balances
            .snapshot(&StockKey::new(tenant_id, item_code, location_code))
            .await
    }

    /// One page of a key's ledger. Page size falls back to, and is capped by, configuration.
    pub async fn query_ledger(
        &self,
        tenant_id: Uuid,
        item_code: &str,
        location_code: &str,
        range: LedgerRange,
        page: Option<u64>,
        per_page: Option<u64>,
    ) -> Result<LedgerPage, ServiceError> {
        self.ledger
            .query_range(
                &StockKey::new(tenant_id, item_code, location_code),
                range,
                page.unwrap_or(1),
                self.config.page_size(per_page),
            )
            .await
    }

    pub async fn reconcile(
        &self,
        tenant_id: Uuid,
        location_code: &str,
        observations: Vec<Observation>,
    ) -> Result<Vec<Adjustment>, ServiceError> {
        self.reconciliation
            .reconcile(tenant_id, location_code, observations)
            .await
    }

    /// The per-key locks every posting path takes. Holding a key here blocks submit, cancel and
    /// reconcile for that key.
    pub fn key_locks(&self) -> &StockKeyLocks {
        &self.locks
    }

    /// Drops idle per-key locks; returns how many were removed.
    pub fn prune_locks(&self) -> usize {
        let pruned = self.locks.prune();
        tracing::debug!(pruned, remaining = self.locks.len(), "stock key locks pruned");
        pruned
    }
}
