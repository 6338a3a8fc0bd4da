use rust_decimal::Decimal;
use sea_orm::{ConnectionTrait, DatabaseConnection};
use std::sync::Arc;
use tracing::{instrument, warn};

use crate::entities::stock_item::ValuationMethod;
use crate::errors::ServiceError;
use crate::models::StockKey;
use crate::services::master_data::ItemMaster;
use crate::services::stock_ledger::LedgerStore;
use crate::valuation::{CostingPolicy, Valuation, ValuationEvent, ValuationState, ValuationWarning};

/// Replays ledger history through the item's costing policy.
#[derive(Clone)]
pub struct ValuationService {
    db_pool: Arc<DatabaseConnection>,
    items: Arc<dyn ItemMaster>,
}

impl ValuationService {
    pub fn new(db_pool: Arc<DatabaseConnection>, items: Arc<dyn ItemMaster>) -> Self {
        Self { db_pool, items }
    }

    async fn method(&self, key: &StockKey) -> Result<ValuationMethod, ServiceError> {
        self.items
            .item_settings(key.tenant_id, &key.item_code)
            .await?
            .map(|settings| settings.valuation_method)
            .ok_or_else(|| ServiceError::not_found(format!("item {}", key.item_code)))
    }

    /// Rate and value of withdrawing `quantity` now, without posting anything.
    #[instrument(skip(self))]
    pub async fn value_outgoing(
        &self,
        key: &StockKey,
        quantity: Decimal,
    ) -> Result<(Valuation, Option<ValuationWarning>), ServiceError> {
        let method = self.method(key).await?;
        let mut state = Self::replay_in(&*self.db_pool, key, method).await?;
        let valuation = state.withdraw(quantity);
        let warning = ValuationWarning::partial_match(key, &valuation);
        if let Some(warning) = &warning {
            warn!(%warning, "partial valuation");
        }
        Ok((valuation, warning))
    }

    /// Valuation rate of the stock currently held at the key.
    #[instrument(skip(self))]
    pub async fn current_rate(&self, key: &StockKey) -> Result<Decimal, ServiceError> {
        let method = self.method(key).await?;
        Ok(Self::replay_in(&*self.db_pool, key, method)
            .await?
            .current_rate())
    }

    /// Replays the key's chain, skipping every entry of documents that were cancelled.
    pub(crate) async fn replay_in<C: ConnectionTrait>(
        conn: &C,
        key: &StockKey,
        method: ValuationMethod,
    ) -> Result<ValuationState, ServiceError> {
        let chain = LedgerStore::chain_in(conn, key).await?;
        let cancelled = LedgerStore::cancelled_documents(&chain);
        let events = chain
            .iter()
            .filter(|entry| !cancelled.contains(&entry.causing_document()))
            .filter_map(ValuationEvent::from_entry);
        Ok(ValuationState::replay(method, events))
    }
}
