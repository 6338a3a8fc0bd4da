//! Posting engine: `submit` and `cancel` for stock movement documents.
//!
//! Both run as one unit of work spanning the ledger and balance writes. Per-key locks are taken
//! before the transaction begins and held until it has committed or rolled back.

use chrono::{NaiveDate, NaiveTime, Utc};
use metrics::{counter, histogram};
use rust_decimal::Decimal;
use sea_orm::{ConnectionTrait, DatabaseConnection};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::db::UnitOfWork;
use crate::entities::stock_ledger_entry;
use crate::entities::stock_movement::{self, MovementStatus};
use crate::entities::stock_movement_line;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::locks::StockKeyLocks;
use crate::models::movement::validate_line_shape;
use crate::models::{BalanceSnapshot, CausingDocument, MovementDocument, PostingOutcome, StockKey};
use crate::services::master_data::{
    ItemMaster, ItemSettings, LocationDirectory, TrackingRequest, TrackingValidator,
};
use crate::services::stock_balance::BalanceStore;
use crate::services::stock_ledger::{LedgerStore, NewLedgerEntry};
use crate::services::stock_movement::MovementService;
use crate::services::valuation::ValuationService;
use crate::valuation::{CostingPolicy, Valuation, ValuationState, ValuationWarning};

/// A document line resolved against master data.
#[derive(Debug, Clone)]
pub(crate) struct PlannedLine {
    pub line: stock_movement_line::Model,
    pub settings: ItemSettings,
    pub source: Option<StockKey>,
    pub target: Option<StockKey>,
}

/// Everything `post_in` needs that must be read outside the unit of work.
#[derive(Debug, Clone)]
pub(crate) struct PostingPlan {
    pub document: MovementDocument,
    pub lines: Vec<PlannedLine>,
}

impl PostingPlan {
    fn settings_by_key(&self) -> BTreeMap<StockKey, ItemSettings> {
        let mut settings = BTreeMap::new();
        for planned in &self.lines {
            for key in planned.source.iter().chain(planned.target.iter()) {
                settings.insert(key.clone(), planned.settings);
            }
        }
        settings
    }
}

/// Result of a posting inside a unit of work, before anything is published.
#[derive(Debug, Clone)]
pub(crate) struct Posted {
    pub header: stock_movement::Model,
    pub entries: Vec<stock_ledger_entry::Model>,
    pub outcome: PostingOutcome,
}

#[derive(Clone)]
pub struct PostingEngine {
    db_pool: Arc<DatabaseConnection>,
    event_sender: EventSender,
    locks: StockKeyLocks,
    items: Arc<dyn ItemMaster>,
    locations: Arc<dyn LocationDirectory>,
    tracking: Arc<dyn TrackingValidator>,
    operation_timeout: Duration,
}

impl PostingEngine {
    pub fn new(
        db_pool: Arc<DatabaseConnection>,
        event_sender: EventSender,
        locks: StockKeyLocks,
        items: Arc<dyn ItemMaster>,
        locations: Arc<dyn LocationDirectory>,
        tracking: Arc<dyn TrackingValidator>,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            locks,
            items,
            locations,
            tracking,
            operation_timeout,
        }
    }

    /// Posts a draft: ledger entries for every line side, balance deltas, status `Submitted`.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, document_id = %document_id))]
    pub async fn submit(
        &self,
        tenant_id: Uuid,
        document_id: Uuid,
    ) -> Result<PostingOutcome, ServiceError> {
        let started = Instant::now();
        let posted = self
            .bounded("submit", self.submit_document(tenant_id, document_id))
            .await?;
        histogram!("stock_ledger.submit.duration", started.elapsed());

        self.record_submitted(&posted).await;
        Ok(posted.outcome)
    }

    /// Reverses a submitted document by appending compensating entries.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, document_id = %document_id))]
    pub async fn cancel(
        &self,
        tenant_id: Uuid,
        document_id: Uuid,
    ) -> Result<PostingOutcome, ServiceError> {
        let started = Instant::now();
        let posted = self
            .bounded("cancel", self.cancel_document(tenant_id, document_id))
            .await?;
        histogram!("stock_ledger.cancel.duration", started.elapsed());
        counter!("stock_ledger.documents.cancelled", 1, "kind" => posted.header.kind.to_string());

        info!(
            document_id = %posted.header.id,
            compensations = posted.entries.len(),
            "stock movement cancelled"
        );
        self.event_sender
            .publish(Event::StockMovementCancelled {
                tenant_id,
                document_id: posted.header.id,
                kind: posted.header.kind,
                entries: posted.entries.len(),
                timestamp: Utc::now(),
            })
            .await;
        Ok(posted.outcome)
    }

    /// Runs one operation under the configured time bound. Dropping the future rolls back any
    /// open unit of work and releases the key locks.
    pub(crate) async fn bounded<T, F>(&self, operation: &str, fut: F) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, ServiceError>>,
    {
        match tokio::time::timeout(self.operation_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                counter!("stock_ledger.operations.timed_out", 1, "operation" => operation.to_string());
                warn!(operation, timeout = ?self.operation_timeout, "operation timed out");
                Err(ServiceError::Timeout(format!(
                    "{} did not finish within {:?}",
                    operation, self.operation_timeout
                )))
            }
        }
    }

    pub(crate) async fn record_submitted(&self, posted: &Posted) {
        let header = &posted.header;
        counter!("stock_ledger.documents.submitted", 1, "kind" => header.kind.to_string());
        if !posted.outcome.warnings.is_empty() {
            counter!(
                "stock_ledger.valuation_warnings",
                posted.outcome.warnings.len() as u64
            );
        }

        info!(
            document_id = %header.id,
            kind = %header.kind,
            entries = posted.entries.len(),
            warnings = posted.outcome.warnings.len(),
            "stock movement submitted"
        );
        self.event_sender
            .publish(Event::StockMovementSubmitted {
                tenant_id: header.tenant_id,
                document_id: header.id,
                kind: header.kind,
                entries: posted.entries.len(),
                warnings: posted.outcome.warnings.len(),
                timestamp: Utc::now(),
            })
            .await;
    }

    async fn submit_document(
        &self,
        tenant_id: Uuid,
        document_id: Uuid,
    ) -> Result<Posted, ServiceError> {
        let document = MovementService::load_in(&*self.db_pool, tenant_id, document_id).await?;
        MovementService::require_status(&document.header, MovementStatus::Draft)?;

        let _guards = self.locks.acquire(document_keys(&document)).await;
        let plan = self.plan(document).await?;

        let uow = UnitOfWork::begin(&self.db_pool, "stock_submit").await?;
        let result = Self::post_in(uow.txn(), &plan).await;
        uow.finish(result).await
    }

    async fn cancel_document(
        &self,
        tenant_id: Uuid,
        document_id: Uuid,
    ) -> Result<Posted, ServiceError> {
        let document = MovementService::load_in(&*self.db_pool, tenant_id, document_id).await?;
        MovementService::require_status(&document.header, MovementStatus::Submitted)?;

        let _guards = self.locks.acquire(document_keys(&document)).await;
        let mut settings = HashMap::new();
        for line in &document.lines {
            if !settings.contains_key(&line.item_code) {
                let item = self.item_settings(tenant_id, &line.item_code).await?;
                settings.insert(line.item_code.clone(), item);
            }
        }

        let uow = UnitOfWork::begin(&self.db_pool, "stock_cancel").await?;
        let result = Self::reverse_in(uow.txn(), tenant_id, document_id, &settings).await;
        uow.finish(result).await
    }

    async fn item_settings(
        &self,
        tenant_id: Uuid,
        item_code: &str,
    ) -> Result<ItemSettings, ServiceError> {
        self.items
            .item_settings(tenant_id, item_code)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("item {}", item_code)))
    }

    async fn require_active_location(
        &self,
        tenant_id: Uuid,
        location_code: &str,
    ) -> Result<(), ServiceError> {
        match self.locations.location(tenant_id, location_code).await? {
            None => Err(ServiceError::not_found(format!("location {}", location_code))),
            Some(location) if !location.active => Err(ServiceError::validation(format!(
                "location {} is inactive",
                location_code
            ))),
            Some(_) => Ok(()),
        }
    }

    /// Resolves every line against master data and the tracking validator. Reads go through the
    /// pool, so this must run before the unit of work begins.
    pub(crate) async fn plan(&self, document: MovementDocument) -> Result<PostingPlan, ServiceError> {
        let header = &document.header;
        let mut items: HashMap<String, ItemSettings> = HashMap::new();
        let mut checked_locations: BTreeSet<String> = BTreeSet::new();
        let mut lines = Vec::with_capacity(document.lines.len());

        for line in &document.lines {
            let settings = match items.get(&line.item_code) {
                Some(settings) => *settings,
                None => {
                    let settings = self.item_settings(header.tenant_id, &line.item_code).await?;
                    items.insert(line.item_code.clone(), settings);
                    settings
                }
            };

            let direction = validate_line_shape(
                header.kind,
                line.line_no as usize,
                &line.item_code,
                line.source_location.as_deref(),
                line.target_location.as_deref(),
                line.rate,
            )?;

            for location in [&line.source_location, &line.target_location]
                .into_iter()
                .flatten()
            {
                if checked_locations.insert(location.clone()) {
                    self.require_active_location(header.tenant_id, location).await?;
                }
            }

            let request = TrackingRequest {
                tenant_id: header.tenant_id,
                item_code: line.item_code.clone(),
                settings,
                direction,
                source_location: line.source_location.clone(),
                quantity: line.quantity,
                batch_ref: line.batch_ref.clone(),
                serial_refs: line.serials(),
                posting_date: header.posting_date,
            };
            let verdict = self.tracking.validate(&request).await?;
            if !verdict.valid {
                return Err(ServiceError::validation(format!(
                    "line {} ({}): {}",
                    line.line_no,
                    line.item_code,
                    verdict
                        .reason
                        .unwrap_or_else(|| "batch/serial validation failed".to_string())
                )));
            }

            let key_at = |location: &Option<String>| {
                location
                    .as_deref()
                    .map(|code| StockKey::new(header.tenant_id, &line.item_code, code))
            };
            lines.push(PlannedLine {
                line: line.clone(),
                settings,
                source: key_at(&line.source_location),
                target: key_at(&line.target_location),
            });
        }

        Ok(PostingPlan { document, lines })
    }

    /// Posts a planned draft inside the caller's transaction.
    pub(crate) async fn post_in<C: ConnectionTrait>(
        conn: &C,
        plan: &PostingPlan,
    ) -> Result<Posted, ServiceError> {
        let header = &plan.document.header;
        let current = MovementService::load_for_update_in(conn, header.tenant_id, header.id).await?;
        MovementService::require_status(&current.header, MovementStatus::Draft)?;
        // Draft edits always write lines under fresh ids.
        let planned_lines: Vec<Uuid> = plan.lines.iter().map(|planned| planned.line.id).collect();
        let current_lines: Vec<Uuid> = current.lines.iter().map(|line| line.id).collect();
        if current.header.kind != header.kind
            || current.header.posted_at() != header.posted_at()
            || current_lines != planned_lines
        {
            return Err(ServiceError::Conflict(format!(
                "stock movement {} changed while it was being posted",
                header.id
            )));
        }
        let header = current.header;
        let (posting_date, posting_time) = header.posted_at();
        let settings = plan.settings_by_key();

        // Availability for every source key before anything is written.
        let mut outgoing: BTreeMap<StockKey, Decimal> = BTreeMap::new();
        for planned in &plan.lines {
            if let Some(key) = &planned.source {
                *outgoing.entry(key.clone()).or_default() += planned.line.quantity;
            }
        }
        for (key, requested) in &outgoing {
            let balance = BalanceStore::get_or_create_in(conn, key, true).await?;
            let allows_negative = settings
                .get(key)
                .map(|s| s.allows_negative_stock)
                .unwrap_or(false);
            if balance.on_hand < *requested && !allows_negative {
                return Err(ServiceError::InsufficientStock {
                    item_code: key.item_code.clone(),
                    location_code: key.location_code.clone(),
                    requested: *requested,
                    available: balance.on_hand,
                });
            }
        }

        // Outgoing sides are valued against the state before this document, in line order.
        let mut states: BTreeMap<StockKey, ValuationState> = BTreeMap::new();
        for key in outgoing.keys() {
            let method = settings
                .get(key)
                .map(|s| s.valuation_method)
                .ok_or_else(|| ServiceError::InternalError(format!("no settings for {}", key)))?;
            states.insert(key.clone(), ValuationService::replay_in(conn, key, method).await?);
        }
        let mut withdrawals: Vec<Option<Valuation>> = Vec::with_capacity(plan.lines.len());
        let mut warnings = Vec::new();
        for planned in &plan.lines {
            let valuation = match &planned.source {
                Some(key) => {
                    let state = states.get_mut(key).ok_or_else(|| {
                        ServiceError::InternalError(format!("no valuation state for {}", key))
                    })?;
                    let valuation = state.withdraw(planned.line.quantity);
                    if let Some(warning) = ValuationWarning::partial_match(key, &valuation) {
                        warn!(%warning, "partial valuation");
                        warnings.push(warning);
                    }
                    Some(valuation)
                }
                None => None,
            };
            withdrawals.push(valuation);
        }

        let causing = CausingDocument::stock_movement(header.id);
        let mut entries = Vec::new();
        let mut deltas: BTreeMap<StockKey, Decimal> = BTreeMap::new();
        for (planned, withdrawal) in plan.lines.iter().zip(&withdrawals) {
            let line = &planned.line;
            let entry = |key: &StockKey, quantity_delta, incoming_rate, outgoing_rate, value_delta| {
                NewLedgerEntry {
                    key: key.clone(),
                    posting_date,
                    posting_time,
                    quantity_delta,
                    incoming_rate,
                    outgoing_rate,
                    value_delta,
                    causing_document: causing.clone(),
                    line_id: Some(line.id),
                    batch_ref: line.batch_ref.clone(),
                    serial_refs: line.serials(),
                    cancelled: false,
                }
            };

            if let (Some(key), Some(valuation)) = (&planned.source, withdrawal) {
                let appended = LedgerStore::append_in(
                    conn,
                    entry(key, -line.quantity, Decimal::ZERO, valuation.rate, -valuation.value),
                )
                .await?;
                *deltas.entry(key.clone()).or_default() -= line.quantity;
                entries.push(appended);
            }

            if let Some(key) = &planned.target {
                let rate = line
                    .rate
                    .or_else(|| withdrawal.as_ref().map(|v| v.rate))
                    .unwrap_or(Decimal::ZERO);
                let appended = LedgerStore::append_in(
                    conn,
                    entry(key, line.quantity, rate, Decimal::ZERO, line.quantity * rate),
                )
                .await?;
                *deltas.entry(key.clone()).or_default() += line.quantity;
                entries.push(appended);
            }
        }

        let mut balances = Vec::with_capacity(deltas.len());
        for (key, delta) in &deltas {
            let method = settings
                .get(key)
                .map(|s| s.valuation_method)
                .ok_or_else(|| ServiceError::InternalError(format!("no settings for {}", key)))?;
            let state = ValuationService::replay_in(conn, key, method).await?;
            let mut balance = BalanceStore::get_or_create_in(conn, key, true).await?;
            balance.on_hand += *delta;
            balance.valuation_rate = state.current_rate();
            balances.push(BalanceSnapshot::from(BalanceStore::save_in(conn, balance).await?));
        }

        let header = MovementService::transition_in(conn, header, MovementStatus::Submitted).await?;
        Ok(Posted {
            outcome: PostingOutcome {
                document_id: header.id,
                status: header.status,
                balances,
                warnings,
            },
            header,
            entries,
        })
    }

    async fn reverse_in<C: ConnectionTrait>(
        conn: &C,
        tenant_id: Uuid,
        document_id: Uuid,
        settings: &HashMap<String, ItemSettings>,
    ) -> Result<Posted, ServiceError> {
        let current = MovementService::load_for_update_in(conn, tenant_id, document_id).await?;
        MovementService::require_status(&current.header, MovementStatus::Submitted)?;
        let header = current.header;

        let causing = CausingDocument::stock_movement(header.id);
        let originals: Vec<_> = LedgerStore::entries_for_document_in(conn, tenant_id, &causing)
            .await?
            .into_iter()
            .filter(|entry| !entry.cancelled)
            .collect();

        let mut entries = Vec::with_capacity(originals.len());
        let mut deltas: BTreeMap<StockKey, Decimal> = BTreeMap::new();
        for original in &originals {
            let key = original.key();
            let (posting_date, posting_time) = not_before_tail(
                original.posted_at(),
                LedgerStore::latest_in(conn, &key).await?.map(|e| e.posted_at()),
            );
            let appended = LedgerStore::append_in(
                conn,
                NewLedgerEntry {
                    key: key.clone(),
                    posting_date,
                    posting_time,
                    quantity_delta: -original.quantity_delta,
                    incoming_rate: original.outgoing_rate,
                    outgoing_rate: original.incoming_rate,
                    value_delta: -original.value_delta,
                    causing_document: causing.clone(),
                    line_id: original.line_id,
                    batch_ref: original.batch_ref.clone(),
                    serial_refs: original.serials(),
                    cancelled: true,
                },
            )
            .await?;
            *deltas.entry(key).or_default() -= original.quantity_delta;
            entries.push(appended);
        }

        let mut balances = Vec::with_capacity(deltas.len());
        for (key, delta) in &deltas {
            let item = settings.get(&key.item_code).ok_or_else(|| {
                ServiceError::InternalError(format!("no settings for {}", key.item_code))
            })?;
            let state = ValuationService::replay_in(conn, key, item.valuation_method).await?;
            let mut balance = BalanceStore::get_or_create_in(conn, key, true).await?;
            balance.on_hand += *delta;
            balance.valuation_rate = state.current_rate();
            if balance.on_hand < Decimal::ZERO && !item.allows_negative_stock {
                warn!(
                    key = %key,
                    on_hand = %balance.on_hand,
                    "cancellation left a negative balance"
                );
            }
            balances.push(BalanceSnapshot::from(BalanceStore::save_in(conn, balance).await?));
        }

        let header = MovementService::transition_in(conn, header, MovementStatus::Cancelled).await?;
        Ok(Posted {
            outcome: PostingOutcome {
                document_id: header.id,
                status: header.status,
                balances,
                warnings: Vec::new(),
            },
            header,
            entries,
        })
    }
}

/// Every stock key a document's lines touch.
pub(crate) fn document_keys(document: &MovementDocument) -> BTreeSet<StockKey> {
    let tenant_id = document.header.tenant_id;
    document
        .lines
        .iter()
        .flat_map(|line| {
            [&line.source_location, &line.target_location]
                .into_iter()
                .flatten()
                .map(move |location| StockKey::new(tenant_id, &line.item_code, location))
        })
        .collect()
}

/// Stamp for a system-generated entry: the preferred instant, moved up to the chain's tail when
/// it would precede it. Compensations prefer the original entry's instant, count adjustments the
/// start of the day, so neither blocks ordinary postings later that day.
pub(crate) fn not_before_tail(
    preferred: (NaiveDate, NaiveTime),
    latest: Option<(NaiveDate, NaiveTime)>,
) -> (NaiveDate, NaiveTime) {
    match latest {
        Some(latest) if latest > preferred => latest,
        _ => preferred,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::entities::stock_item::ValuationMethod;
    use crate::entities::stock_movement::MovementKind;
    use crate::models::{NewMovement, NewMovementLine, UpdateMovement};
    use crate::services::factory::{ServiceFactory, StockServices};
    use crate::services::master_data::{ItemDefinition, LocationDefinition};
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).expect("valid date")
    }

    async fn stocked_services() -> (Arc<DatabaseConnection>, StockServices, Uuid) {
        let mut cfg = AppConfig::new("sqlite::memory:".into(), "test".into());
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        let pool = crate::db::establish_connection_from_app_config(&cfg)
            .await
            .expect("sqlite connects");
        crate::db::run_migrations(&pool).await.expect("migrations run");
        let db = Arc::new(pool);

        let (event_sender, event_rx) = EventSender::channel(16);
        tokio::spawn(crate::events::process_events(event_rx));
        let services = ServiceFactory::new(db.clone(), event_sender, &cfg).build();

        let tenant = Uuid::new_v4();
        services
            .master_data
            .upsert_item(tenant, ItemDefinition::new("WIDGET", ValuationMethod::Fifo))
            .await
            .expect("item saved");
        services
            .master_data
            .upsert_location(tenant, LocationDefinition::active("WH-1"))
            .await
            .expect("location saved");
        (db, services, tenant)
    }

    fn receipt(quantity: Decimal) -> Vec<NewMovementLine> {
        vec![NewMovementLine::incoming("WIDGET", "WH-1", quantity, dec!(2))]
    }

    #[tokio::test]
    async fn lines_edited_after_planning_are_not_posted() {
        let (db, services, tenant) = stocked_services().await;
        let id = services
            .create_draft(
                tenant,
                NewMovement::new(MovementKind::Receipt, date(1), receipt(dec!(5))),
            )
            .await
            .expect("draft");
        let document = services.get_document(tenant, id).await.expect("document");
        let plan = services.posting.plan(document).await.expect("planned");

        services
            .movements
            .update_draft(
                tenant,
                id,
                UpdateMovement {
                    posting_date: date(1),
                    posting_time: None,
                    reference: None,
                    lines: receipt(dec!(9)),
                },
            )
            .await
            .expect("edited");

        let uow = UnitOfWork::begin(&db, "stock_submit").await.expect("begin");
        let result = PostingEngine::post_in(uow.txn(), &plan).await;
        assert_matches!(uow.finish(result).await, Err(ServiceError::Conflict(_)));

        let key = StockKey::new(tenant, "WIDGET", "WH-1");
        assert!(services.ledger.latest(&key).await.expect("ledger").is_none());
        let document = services.get_document(tenant, id).await.expect("document");
        assert_eq!(document.header.status, MovementStatus::Draft);

        services.submit(tenant, id).await.expect("edited draft posts");
        let posted = services.ledger.latest(&key).await.expect("ledger").expect("entry");
        assert_eq!(posted.quantity_delta.round_dp(6), dec!(9));
        assert_eq!(posted.line_id, Some(document.lines[0].id));
    }

    #[tokio::test]
    async fn stale_header_cannot_transition_twice() {
        let (db, services, tenant) = stocked_services().await;
        let id = services
            .create_draft(
                tenant,
                NewMovement::new(MovementKind::Receipt, date(1), receipt(dec!(1))),
            )
            .await
            .expect("draft");
        let stale = services.get_document(tenant, id).await.expect("document").header;

        let moved = MovementService::transition_in(&*db, stale.clone(), MovementStatus::Submitted)
            .await
            .expect("first transition");
        assert_eq!(moved.status, MovementStatus::Submitted);
        assert!(moved.submitted_at.is_some());

        assert_matches!(
            MovementService::transition_in(&*db, stale, MovementStatus::Submitted).await,
            Err(ServiceError::Conflict(_))
        );
    }

    #[test]
    fn generated_stamps_never_precede_the_tail() {
        let noon = NaiveTime::from_hms_opt(12, 0, 0).expect("valid time");
        assert_eq!(not_before_tail((date(5), noon), None), (date(5), noon));
        assert_eq!(
            not_before_tail((date(5), noon), Some((date(3), noon))),
            (date(5), noon)
        );
        assert_eq!(
            not_before_tail((date(5), noon), Some((date(5), noon))),
            (date(5), noon)
        );
        assert_eq!(
            not_before_tail((date(5), NaiveTime::MIN), Some((date(5), noon))),
            (date(5), noon)
        );
        assert_eq!(
            not_before_tail((date(5), noon), Some((date(9), NaiveTime::MIN))),
            (date(9), NaiveTime::MIN)
        );
    }

    #[test]
    fn document_keys_cover_both_sides_once() {
        let tenant = Uuid::new_v4();
        let movement = NewMovement::new(
            MovementKind::Repack,
            date(1),
            vec![
                NewMovementLine::transfer("WIDGET", "WH-1", "WH-2", dec!(2)),
                NewMovementLine::outgoing("WIDGET", "WH-1", dec!(1)),
                NewMovementLine::incoming("GADGET", "WH-1", dec!(1), dec!(4)),
            ],
        );
        let document = MovementDocument::draft(tenant, movement, Utc::now());
        let keys: Vec<_> = document_keys(&document).into_iter().collect();
        assert_eq!(
            keys,
            vec![
                StockKey::new(tenant, "GADGET", "WH-1"),
                StockKey::new(tenant, "WIDGET", "WH-1"),
                StockKey::new(tenant, "WIDGET", "WH-2"),
            ]
        );
    }
}
