//! Brings balances in line with a physical count.
//!
//! Each counted item whose on-hand quantity differs from the count gets a single-line
//! `ReconciliationAdjustment` document, posted straight away. All adjustments for one call share a
//! unit of work.

use chrono::{NaiveTime, Utc};
use metrics::{counter, histogram};
use rust_decimal::Decimal;
use sea_orm::DatabaseConnection;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::db::UnitOfWork;
use crate::entities::stock_movement::MovementKind;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::locks::StockKeyLocks;
use crate::models::movement::validate_lines;
use crate::models::{
    Adjustment, BalanceSnapshot, MovementDocument, NewMovement, NewMovementLine, Observation,
    StockKey,
};
use crate::services::master_data::{ItemMaster, LocationDirectory};
use crate::services::stock_balance::BalanceStore;
use crate::services::stock_movement::MovementService;
use crate::services::stock_ledger::LedgerStore;
use crate::services::stock_posting::{not_before_tail, Posted, PostingEngine, PostingPlan};
use crate::services::valuation::ValuationService;
use crate::valuation::CostingPolicy;

/// A counted item that needs an adjustment, planned before the unit of work begins.
struct PendingAdjustment {
    key: StockKey,
    previous_qty: Decimal,
    actual_qty: Decimal,
    difference: Decimal,
    rate: Decimal,
    plan: PostingPlan,
}

#[derive(Clone)]
pub struct ReconciliationEngine {
    db_pool: Arc<DatabaseConnection>,
    event_sender: EventSender,
    locks: StockKeyLocks,
    items: Arc<dyn ItemMaster>,
    locations: Arc<dyn LocationDirectory>,
    posting: PostingEngine,
    epsilon: Decimal,
}

impl ReconciliationEngine {
    pub fn new(
        db_pool: Arc<DatabaseConnection>,
        event_sender: EventSender,
        locks: StockKeyLocks,
        items: Arc<dyn ItemMaster>,
        locations: Arc<dyn LocationDirectory>,
        posting: PostingEngine,
        epsilon: Decimal,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            locks,
            items,
            locations,
            posting,
            epsilon,
        }
    }

    /// Posts one adjustment per item whose count differs from on-hand by more than epsilon.
    /// Items within epsilon are skipped and not reported.
    #[instrument(skip(self, observations), fields(tenant_id = %tenant_id, observations = observations.len()))]
    pub async fn reconcile(
        &self,
        tenant_id: Uuid,
        location_code: &str,
        observations: Vec<Observation>,
    ) -> Result<Vec<Adjustment>, ServiceError> {
        let started = Instant::now();
        let adjusted = self
            .posting
            .bounded(
                "reconcile",
                self.reconcile_location(tenant_id, location_code, observations),
            )
            .await?;
        histogram!("stock_ledger.reconcile.duration", started.elapsed());

        let mut adjustments = Vec::with_capacity(adjusted.len());
        for (adjustment, posted) in adjusted {
            let direction = if adjustment.difference > Decimal::ZERO {
                "incoming"
            } else {
                "outgoing"
            };
            counter!("stock_ledger.reconciliation.adjustments", 1, "direction" => direction);
            info!(
                item_code = %adjustment.item_code,
                location_code = %adjustment.location_code,
                previous_qty = %adjustment.previous_qty,
                actual_qty = %adjustment.actual_qty,
                difference = %adjustment.difference,
                "stock reconciled"
            );

            self.posting.record_submitted(&posted).await;
            self.event_sender
                .publish(Event::StockReconciled {
                    tenant_id,
                    location_code: adjustment.location_code.clone(),
                    item_code: adjustment.item_code.clone(),
                    difference: adjustment.difference,
                    document_id: adjustment.document_id,
                    timestamp: Utc::now(),
                })
                .await;
            adjustments.push(adjustment);
        }
        Ok(adjustments)
    }

    fn validate_observations(observations: &[Observation]) -> Result<(), ServiceError> {
        let mut seen = HashSet::new();
        for observation in observations {
            observation.validate()?;
            if observation.actual_qty < Decimal::ZERO {
                return Err(ServiceError::validation(format!(
                    "counted quantity for {} is negative",
                    observation.item_code
                )));
            }
            if !seen.insert(observation.item_code.as_str()) {
                return Err(ServiceError::validation(format!(
                    "item {} was counted more than once",
                    observation.item_code
                )));
            }
        }
        Ok(())
    }

    async fn reconcile_location(
        &self,
        tenant_id: Uuid,
        location_code: &str,
        observations: Vec<Observation>,
    ) -> Result<Vec<(Adjustment, Posted)>, ServiceError> {
        Self::validate_observations(&observations)?;
        match self.locations.location(tenant_id, location_code).await? {
            None => {
                return Err(ServiceError::not_found(format!(
                    "location {}",
                    location_code
                )))
            }
            Some(location) if !location.active => {
                return Err(ServiceError::validation(format!(
                    "location {} is inactive",
                    location_code
                )))
            }
            Some(_) => {}
        }

        let keys: Vec<StockKey> = observations
            .iter()
            .map(|o| StockKey::new(tenant_id, &o.item_code, location_code))
            .collect();
        let _guards = self.locks.acquire(keys.iter().cloned()).await;

        let mut pending = Vec::new();
        for (observation, key) in observations.into_iter().zip(keys) {
            if let Some(adjustment) = self.plan_adjustment(key, observation).await? {
                pending.push(adjustment);
            }
        }
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let uow = UnitOfWork::begin(&self.db_pool, "stock_reconcile").await?;
        let result = async {
            let mut adjusted = Vec::with_capacity(pending.len());
            for adjustment in &pending {
                MovementService::insert_document_in(uow.txn(), &adjustment.plan.document).await?;
                let posted = PostingEngine::post_in(uow.txn(), &adjustment.plan).await?;
                adjusted.push((Self::describe(adjustment, &posted), posted));
            }
            Ok(adjusted)
        }
        .await;
        uow.finish(result).await
    }

    async fn plan_adjustment(
        &self,
        key: StockKey,
        observation: Observation,
    ) -> Result<Option<PendingAdjustment>, ServiceError> {
        let settings = self
            .items
            .item_settings(key.tenant_id, &key.item_code)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("item {}", key.item_code)))?;

        let previous_qty = BalanceStore::find_in(&*self.db_pool, &key, false)
            .await?
            .map(|balance| balance.on_hand)
            .unwrap_or(Decimal::ZERO);
        let difference = observation.actual_qty - previous_qty;
        if difference.abs() <= self.epsilon {
            debug!(key = %key, %difference, "count matches the books");
            return Ok(None);
        }

        let rate = match observation.rate {
            Some(rate) => rate,
            None => ValuationService::replay_in(&*self.db_pool, &key, settings.valuation_method)
                .await?
                .current_rate(),
        };

        let mut line = if difference > Decimal::ZERO {
            NewMovementLine::incoming(&key.item_code, &key.location_code, difference, rate)
        } else {
            NewMovementLine::outgoing(&key.item_code, &key.location_code, -difference)
        };
        line.batch_ref = observation.batch_ref;
        line.serial_refs = observation.serial_refs;

        let now = Utc::now();
        let (posting_date, posting_time) = not_before_tail(
            (now.date_naive(), NaiveTime::MIN),
            LedgerStore::latest_in(&*self.db_pool, &key)
                .await?
                .map(|entry| entry.posted_at()),
        );
        let movement = NewMovement::new(
            MovementKind::ReconciliationAdjustment,
            posting_date,
            vec![line],
        )
        .at(posting_time)
        .with_reference(&format!("count at {}", key.location_code));
        movement.validate()?;
        validate_lines(movement.kind, &movement.lines)?;

        let document = MovementDocument::draft(key.tenant_id, movement, now);
        let plan = self.posting.plan(document).await?;
        Ok(Some(PendingAdjustment {
            key,
            previous_qty,
            actual_qty: observation.actual_qty,
            difference,
            rate,
            plan,
        }))
    }

    fn describe(pending: &PendingAdjustment, posted: &Posted) -> Adjustment {
        // Outgoing adjustments are valued by the item's costing policy, not the supplied rate.
        let rate = posted
            .entries
            .first()
            .map(|entry| {
                if entry.is_incoming() {
                    entry.incoming_rate
                } else {
                    entry.outgoing_rate
                }
            })
            .unwrap_or(pending.rate);
        let balance = posted
            .outcome
            .balances
            .iter()
            .find(|snapshot| {
                snapshot.item_code == pending.key.item_code
                    && snapshot.location_code == pending.key.location_code
            })
            .cloned()
            .unwrap_or_else(|| BalanceSnapshot::zero(&pending.key));

        Adjustment {
            item_code: pending.key.item_code.clone(),
            location_code: pending.key.location_code.clone(),
            previous_qty: pending.previous_qty,
            actual_qty: pending.actual_qty,
            difference: pending.difference,
            rate,
            document_id: posted.header.id,
            balance,
            warnings: posted.outcome.warnings.clone(),
        }
    }
}
