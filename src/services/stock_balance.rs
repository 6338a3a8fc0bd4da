//! Balance Store: one mutable row per (tenant, item, location).
//!
//! Every write path goes through [`BalanceStore::save_in`], which recomputes `available`,
//! `projected` and `stock_value` from the stored quantities in the same statement.

use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::OnConflict, ActiveModelTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    QuerySelect, Set,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::db::UnitOfWork;
use crate::entities::stock_balance;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::locks::StockKeyLocks;
use crate::models::{balance, BalanceField, BalanceSnapshot, StockKey};
use crate::services::master_data::ItemMaster;

#[derive(Clone)]
pub struct BalanceStore {
    db_pool: Arc<DatabaseConnection>,
    event_sender: EventSender,
    locks: StockKeyLocks,
    items: Arc<dyn ItemMaster>,
}

impl BalanceStore {
    pub fn new(
        db_pool: Arc<DatabaseConnection>,
        event_sender: EventSender,
        locks: StockKeyLocks,
        items: Arc<dyn ItemMaster>,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            locks,
            items,
        }
    }

    /// Current row for the key, if one was ever created.
    pub async fn get(&self, key: &StockKey) -> Result<Option<stock_balance::Model>, ServiceError> {
        Self::find_in(&*self.db_pool, key, false).await
    }

    /// Caller view of a balance; keys never touched read as all zeroes.
    #[instrument(skip(self))]
    pub async fn snapshot(&self, key: &StockKey) -> Result<BalanceSnapshot, ServiceError> {
        Ok(match self.get(key).await? {
            Some(model) => model.into(),
            None => BalanceSnapshot::zero(key),
        })
    }

    /// Returns the row for the key, creating a zeroed one on first access.
    #[instrument(skip(self))]
    pub async fn get_or_create(&self, key: &StockKey) -> Result<stock_balance::Model, ServiceError> {
        Self::get_or_create_in(&*self.db_pool, key, false).await
    }

    /// Adds `delta` to one stored quantity and recomputes the derived fields.
    #[instrument(skip(self))]
    pub async fn apply_delta(
        &self,
        key: &StockKey,
        field: BalanceField,
        delta: Decimal,
    ) -> Result<stock_balance::Model, ServiceError> {
        let _guards = self.locks.acquire([key.clone()]).await;
        let uow = UnitOfWork::begin(&self.db_pool, "balance_apply_delta").await?;
        let result = async {
            let mut current = Self::get_or_create_in(uow.txn(), key, true).await?;
            let slot = match field {
                BalanceField::OnHand => &mut current.on_hand,
                BalanceField::Reserved => &mut current.reserved,
                BalanceField::OnOrder => &mut current.on_order,
                BalanceField::Planned => &mut current.planned,
            };
            let updated = *slot + delta;
            if updated < Decimal::ZERO && !field.allows_negative() {
                return Err(ServiceError::validation(format!(
                    "{} of {} at {} would become {}",
                    field, key.item_code, key.location_code, updated
                )));
            }
            *slot = updated;
            Self::save_in(uow.txn(), current).await
        }
        .await;
        uow.finish(result).await
    }

    /// Earmarks `quantity` against the balance without touching on-hand.
    #[instrument(skip(self))]
    pub async fn reserve(
        &self,
        key: &StockKey,
        quantity: Decimal,
    ) -> Result<stock_balance::Model, ServiceError> {
        Self::require_positive(quantity)?;
        let settings = self
            .items
            .item_settings(key.tenant_id, &key.item_code)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("item {}", key.item_code)))?;

        let _guards = self.locks.acquire([key.clone()]).await;
        let uow = UnitOfWork::begin(&self.db_pool, "balance_reserve").await?;
        let result = async {
            let mut current = Self::get_or_create_in(uow.txn(), key, true).await?;
            if current.available < quantity && !settings.allows_negative_stock {
                return Err(ServiceError::InsufficientAvailable {
                    item_code: key.item_code.clone(),
                    location_code: key.location_code.clone(),
                    requested: quantity,
                    available: current.available,
                });
            }
            current.reserved += quantity;
            Self::save_in(uow.txn(), current).await
        }
        .await;
        let saved = uow.finish(result).await?;

        counter!("stock_ledger.reservations.reserved", 1);
        self.publish_reservation(key, quantity, &saved).await;
        Ok(saved)
    }

    /// Releases up to `quantity` of the reservation. Over-release clamps at zero.
    #[instrument(skip(self))]
    pub async fn release(
        &self,
        key: &StockKey,
        quantity: Decimal,
    ) -> Result<stock_balance::Model, ServiceError> {
        Self::require_positive(quantity)?;

        let _guards = self.locks.acquire([key.clone()]).await;
        let uow = UnitOfWork::begin(&self.db_pool, "balance_release").await?;
        let result = async {
            let mut current = Self::get_or_create_in(uow.txn(), key, true).await?;
            if quantity > current.reserved {
                warn!(
                    key = %key,
                    reserved = %current.reserved,
                    requested = %quantity,
                    "release exceeds reservation; clamping to zero"
                );
            }
            let released = quantity.min(current.reserved);
            current.reserved -= released;
            Self::save_in(uow.txn(), current).await.map(|saved| (saved, released))
        }
        .await;
        let (saved, released) = uow.finish(result).await?;

        counter!("stock_ledger.reservations.released", 1);
        self.publish_reservation(key, -released, &saved).await;
        Ok(saved)
    }

    async fn publish_reservation(&self, key: &StockKey, delta: Decimal, saved: &stock_balance::Model) {
        info!(key = %key, delta = %delta, reserved = %saved.reserved, "reservation changed");
        self.event_sender
            .publish(Event::ReservationChanged {
                tenant_id: key.tenant_id,
                item_code: key.item_code.clone(),
                location_code: key.location_code.clone(),
                delta,
                reserved: saved.reserved,
                timestamp: Utc::now(),
            })
            .await;
    }

    fn require_positive(quantity: Decimal) -> Result<(), ServiceError> {
        if quantity <= Decimal::ZERO {
            return Err(ServiceError::validation("quantity must be positive"));
        }
        Ok(())
    }

    pub(crate) async fn find_in<C: ConnectionTrait>(
        conn: &C,
        key: &StockKey,
        lock: bool,
    ) -> Result<Option<stock_balance::Model>, ServiceError> {
        let mut query = stock_balance::Entity::find_by_id((
            key.tenant_id,
            key.item_code.clone(),
            key.location_code.clone(),
        ));
        if lock {
            query = query.lock_exclusive();
        }
        query.one(conn).await.map_err(ServiceError::db_error)
    }

    /// Concurrent first access inserts at most one row: the loser's insert is a no-op.
    pub(crate) async fn get_or_create_in<C: ConnectionTrait>(
        conn: &C,
        key: &StockKey,
        lock: bool,
    ) -> Result<stock_balance::Model, ServiceError> {
        if let Some(existing) = Self::find_in(conn, key, lock).await? {
            return Ok(existing);
        }

        let now = Utc::now();
        let zeroed = stock_balance::ActiveModel {
            tenant_id: Set(key.tenant_id),
            item_code: Set(key.item_code.clone()),
            location_code: Set(key.location_code.clone()),
            on_hand: Set(Decimal::ZERO),
            reserved: Set(Decimal::ZERO),
            on_order: Set(Decimal::ZERO),
            planned: Set(Decimal::ZERO),
            available: Set(Decimal::ZERO),
            projected: Set(Decimal::ZERO),
            valuation_rate: Set(Decimal::ZERO),
            stock_value: Set(Decimal::ZERO),
            created_at: Set(now),
            updated_at: Set(now),
        };
        stock_balance::Entity::insert(zeroed)
            .on_conflict(
                OnConflict::columns([
                    stock_balance::Column::TenantId,
                    stock_balance::Column::ItemCode,
                    stock_balance::Column::LocationCode,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(conn)
            .await
            .map_err(ServiceError::db_error)?;

        Self::find_in(conn, key, lock).await?.ok_or_else(|| {
            ServiceError::InternalError(format!("balance row for {} vanished after insert", key))
        })
    }

    /// Persists the stored quantities and rate, recomputing the derived fields.
    pub(crate) async fn save_in<C: ConnectionTrait>(
        conn: &C,
        balance: stock_balance::Model,
    ) -> Result<stock_balance::Model, ServiceError> {
        let available = balance::available(balance.on_hand, balance.reserved);
        let projected = balance::projected(
            balance.on_hand,
            balance.on_order,
            balance.planned,
            balance.reserved,
        );
        let stock_value = balance::stock_value(balance.on_hand, balance.valuation_rate);

        let mut active: stock_balance::ActiveModel = balance.clone().into();
        active.on_hand = Set(balance.on_hand);
        active.reserved = Set(balance.reserved);
        active.on_order = Set(balance.on_order);
        active.planned = Set(balance.planned);
        active.available = Set(available);
        active.projected = Set(projected);
        active.valuation_rate = Set(balance.valuation_rate);
        active.stock_value = Set(stock_value);
        active.updated_at = Set(Utc::now());
        active.update(conn).await.map_err(ServiceError::db_error)
    }
}
