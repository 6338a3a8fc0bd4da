#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use stateset_stock_ledger::{
    config::AppConfig,
    db::{self, DbPool},
    entities::{stock_item::ValuationMethod, stock_movement::MovementKind},
    errors::ServiceError,
    events::{self, EventSender},
    models::{NewMovement, NewMovementLine, PostingOutcome, StockKey},
    services::{
        factory::{ServiceFactory, StockServices},
        master_data::{ItemDefinition, LocationDefinition},
    },
};
use uuid::Uuid;

/// Helper harness for running the stock services against an in-memory SQLite database.
pub struct TestApp {
    pub db: Arc<DbPool>,
    pub services: StockServices,
    pub config: AppConfig,
    pub tenant: Uuid,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        // One pooled connection keeps the in-memory database alive and shared.
        let mut cfg = AppConfig::new("sqlite::memory:".to_string(), "test".to_string());
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        adjust(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db = Arc::new(pool);

        let (event_sender, event_rx) = EventSender::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services = ServiceFactory::new(db.clone(), event_sender, &cfg).build();

        Self {
            db,
            services,
            config: cfg,
            tenant: Uuid::new_v4(),
            _event_task: event_task,
        }
    }

    pub fn key(&self, item_code: &str, location_code: &str) -> StockKey {
        StockKey::new(self.tenant, item_code, location_code)
    }

    pub async fn define_item(&self, definition: ItemDefinition) {
        self.services
            .master_data
            .upsert_item(self.tenant, definition)
            .await
            .expect("item saved");
    }

    pub async fn item(&self, item_code: &str, method: ValuationMethod) {
        self.define_item(ItemDefinition::new(item_code, method)).await;
    }

    pub async fn location(&self, location_code: &str) {
        self.services
            .master_data
            .upsert_location(self.tenant, LocationDefinition::active(location_code))
            .await
            .expect("location saved");
    }

    /// Creates and submits a one-document movement.
    pub async fn post(
        &self,
        kind: MovementKind,
        date: NaiveDate,
        lines: Vec<NewMovementLine>,
    ) -> Result<PostingOutcome, ServiceError> {
        let id = self
            .services
            .create_draft(self.tenant, NewMovement::new(kind, date, lines))
            .await?;
        self.services.submit(self.tenant, id).await
    }

    pub async fn receive(
        &self,
        item_code: &str,
        location_code: &str,
        quantity: Decimal,
        rate: Decimal,
        date: NaiveDate,
    ) -> PostingOutcome {
        self.post(
            MovementKind::Receipt,
            date,
            vec![NewMovementLine::incoming(item_code, location_code, quantity, rate)],
        )
        .await
        .expect("receipt posted")
    }

    pub async fn issue(
        &self,
        item_code: &str,
        location_code: &str,
        quantity: Decimal,
        date: NaiveDate,
    ) -> Result<PostingOutcome, ServiceError> {
        self.post(
            MovementKind::Issue,
            date,
            vec![NewMovementLine::outgoing(item_code, location_code, quantity)],
        )
        .await
    }

    pub async fn on_hand(&self, item_code: &str, location_code: &str) -> Decimal {
        self.services
            .get_balance(self.tenant, item_code, location_code)
            .await
            .expect("balance read")
            .on_hand
            .round_dp(6)
    }

    pub async fn rate(&self, item_code: &str, location_code: &str) -> Decimal {
        self.services
            .get_balance(self.tenant, item_code, location_code)
            .await
            .expect("balance read")
            .valuation_rate
            .round_dp(6)
    }
}

/// A day in January 2024.
pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).expect("valid date")
}

/// SQLite hands decimals back through f64.
pub fn round(value: Decimal) -> Decimal {
    value.round_dp(6)
}
