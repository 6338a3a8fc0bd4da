use crate::config::AppConfig;
use crate::errors::ServiceError;
use metrics::{counter, gauge, histogram};
use sea_orm::{
    ConnectOptions, Database, DatabaseConnection, DatabaseTransaction, DbErr, TransactionTrait,
};
use sea_orm_migration::MigratorTrait;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Connection pool shared by every store and engine.
pub type DbPool = DatabaseConnection;

/// Pool tuning, taken from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

/// Opens the pool. SQLite and Postgres URLs are both accepted.
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, ServiceError> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);

    gauge!("stock_ledger_db.max_connections", config.max_connections as f64);
    info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "opening stock ledger database pool"
    );

    Database::connect(options).await.map_err(|e| {
        error!(error = %e, "stock ledger database pool could not be opened");
        ServiceError::db_error(e)
    })
}

pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, ServiceError> {
    establish_connection_with_config(&DbConfig::from(cfg)).await
}

/// Runs the embedded migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<(), ServiceError> {
    info!("Running database migrations");
    let start = Instant::now();

    let result = crate::migrator::Migrator::up(pool, None)
        .await
        .map_err(ServiceError::db_error);

    let elapsed = start.elapsed();
    match &result {
        Ok(_) => info!(
            "Database migrations completed successfully in {:?}",
            elapsed
        ),
        Err(e) => error!("Database migrations failed after {:?}: {}", elapsed, e),
    }

    result
}

/// Checks if the database connection is active
pub async fn check_connection(pool: &DbPool) -> Result<(), ServiceError> {
    debug!("Checking database connection");
    let start = Instant::now();

    let result = pool.ping().await.map_err(ServiceError::db_error);

    let elapsed = start.elapsed();
    match &result {
        Ok(_) => {
            debug!("Database connection check successful in {:?}", elapsed);
            gauge!(
                "stock_ledger_db.connection_latency",
                elapsed.as_millis() as f64
            );
        }
        Err(e) => {
            error!(
                "Database connection check failed after {:?}: {}",
                elapsed, e
            );
            counter!("stock_ledger_db.connection_failures", 1);
        }
    }

    result
}

/// One database transaction with commit/rollback metrics.
///
/// Dropping an unfinished unit of work (an early `?` return or a timeout cancelling the
/// future) drops the inner transaction, which rolls it back.
pub struct UnitOfWork {
    txn: DatabaseTransaction,
    operation: &'static str,
    id: Uuid,
    started: Instant,
}

impl UnitOfWork {
    pub async fn begin(db: &DatabaseConnection, operation: &'static str) -> Result<Self, DbErr> {
        let txn = db.begin().await?;
        let id = Uuid::new_v4();
        debug!(transaction_id = %id, operation, "Starting database transaction");
        counter!("stock_ledger_db.transaction.started", 1, "operation" => operation);
        Ok(Self {
            txn,
            operation,
            id,
            started: Instant::now(),
        })
    }

    pub fn txn(&self) -> &DatabaseTransaction {
        &self.txn
    }

    pub async fn commit(self) -> Result<(), ServiceError> {
        let elapsed = self.started.elapsed();
        let operation = self.operation;
        let id = self.id;
        self.txn.commit().await.map_err(|e| {
            error!(transaction_id = %id, operation, error = %e, "Transaction commit failed");
            counter!("stock_ledger_db.transaction.rolled_back", 1, "operation" => operation);
            ServiceError::db_error(e)
        })?;
        histogram!("stock_ledger_db.transaction.duration", elapsed, "operation" => operation);
        counter!("stock_ledger_db.transaction.committed", 1, "operation" => operation);
        debug!(transaction_id = %id, operation, "Transaction committed successfully in {:?}", elapsed);
        Ok(())
    }

    pub async fn rollback(self) {
        let elapsed = self.started.elapsed();
        let operation = self.operation;
        let id = self.id;
        if let Err(e) = self.txn.rollback().await {
            error!(transaction_id = %id, operation, error = %e, "Transaction rollback failed");
        }
        counter!("stock_ledger_db.transaction.rolled_back", 1, "operation" => operation);
        warn!(transaction_id = %id, operation, "Transaction rolled back after {:?}", elapsed);
    }

    /// Commits on `Ok`, rolls back on `Err`.
    pub async fn finish<T>(self, result: Result<T, ServiceError>) -> Result<T, ServiceError> {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(e) => {
                self.rollback().await;
                Err(e)
            }
        }
    }
}
