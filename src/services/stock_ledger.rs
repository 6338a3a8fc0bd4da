//! Ledger Store: append-only quantity/value events per (tenant, item, location).
//!
//! Chains are ordered by (posting date, posting time, id). `balance_after` and `value_after` are
//! always derived here from the previous entry of the chain and never taken from the caller.

use chrono::{NaiveDate, NaiveTime, Utc};
use futures::stream::{self, Stream, TryStreamExt};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    NotSet, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::db::UnitOfWork;
use crate::entities::stock_ledger_entry::{self, Column};
use crate::errors::ServiceError;
use crate::locks::StockKeyLocks;
use crate::models::{CausingDocument, StockKey};

/// Entry to append. Chain fields are computed by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLedgerEntry {
    pub key: StockKey,
    pub posting_date: NaiveDate,
    pub posting_time: NaiveTime,
    pub quantity_delta: Decimal,
    pub incoming_rate: Decimal,
    pub outgoing_rate: Decimal,
    pub value_delta: Decimal,
    pub causing_document: CausingDocument,
    pub line_id: Option<Uuid>,
    pub batch_ref: Option<String>,
    pub serial_refs: Vec<String>,
    pub cancelled: bool,
}

/// Inclusive posting-date bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl LedgerRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self { from, to }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerPage {
    pub entries: Vec<stock_ledger_entry::Model>,
    pub page: u64,
    pub per_page: u64,
    pub total_items: u64,
    pub total_pages: u64,
}

type Cursor = (NaiveDate, NaiveTime, i64);

#[derive(Clone)]
pub struct LedgerStore {
    db_pool: Arc<DatabaseConnection>,
    locks: StockKeyLocks,
    batch_size: u64,
}

impl LedgerStore {
    pub fn new(db_pool: Arc<DatabaseConnection>, locks: StockKeyLocks, batch_size: u64) -> Self {
        Self {
            db_pool,
            locks,
            batch_size: batch_size.max(1),
        }
    }

    /// Appends one entry in its own unit of work.
    #[instrument(skip(self, entry), fields(key = %entry.key))]
    pub async fn append(
        &self,
        entry: NewLedgerEntry,
    ) -> Result<stock_ledger_entry::Model, ServiceError> {
        let _guards = self.locks.acquire([entry.key.clone()]).await;
        let uow = UnitOfWork::begin(&self.db_pool, "ledger_append").await?;
        let result = Self::append_in(uow.txn(), entry).await;
        uow.finish(result).await
    }

    /// Appends inside the caller's transaction. Entries may not precede the chain's tail.
    pub(crate) async fn append_in<C: ConnectionTrait>(
        conn: &C,
        entry: NewLedgerEntry,
    ) -> Result<stock_ledger_entry::Model, ServiceError> {
        let previous = Self::latest_in(conn, &entry.key).await?;
        if let Some(previous) = &previous {
            if (entry.posting_date, entry.posting_time) < previous.posted_at() {
                return Err(ServiceError::validation(format!(
                    "{} {} precedes the latest entry for {} at {} {}",
                    entry.posting_date,
                    entry.posting_time,
                    entry.key,
                    previous.posting_date,
                    previous.posting_time
                )));
            }
        }
        let (balance_before, value_before) = previous
            .map(|p| (p.balance_after, p.value_after))
            .unwrap_or((Decimal::ZERO, Decimal::ZERO));

        let serial_refs = if entry.serial_refs.is_empty() {
            None
        } else {
            Some(serde_json::json!(entry.serial_refs))
        };

        let model = stock_ledger_entry::ActiveModel {
            id: NotSet,
            tenant_id: Set(entry.key.tenant_id),
            item_code: Set(entry.key.item_code.clone()),
            location_code: Set(entry.key.location_code.clone()),
            posting_date: Set(entry.posting_date),
            posting_time: Set(entry.posting_time),
            quantity_delta: Set(entry.quantity_delta),
            balance_after: Set(balance_before + entry.quantity_delta),
            incoming_rate: Set(entry.incoming_rate),
            outgoing_rate: Set(entry.outgoing_rate),
            value_delta: Set(entry.value_delta),
            value_after: Set(value_before + entry.value_delta),
            causing_document_type: Set(entry.causing_document.document_type.clone()),
            causing_document_id: Set(entry.causing_document.document_id),
            line_id: Set(entry.line_id),
            batch_ref: Set(entry.batch_ref),
            serial_refs: Set(serial_refs),
            submitted: Set(true),
            cancelled: Set(entry.cancelled),
            created_at: Set(Utc::now()),
        }
        .insert(conn)
        .await
        .map_err(ServiceError::db_error)?;

        debug!(
            key = %entry.key,
            id = model.id,
            delta = %model.quantity_delta,
            balance_after = %model.balance_after,
            "ledger entry appended"
        );
        Ok(model)
    }

    fn key_query(key: &StockKey) -> Select<stock_ledger_entry::Entity> {
        stock_ledger_entry::Entity::find()
            .filter(Column::TenantId.eq(key.tenant_id))
            .filter(Column::ItemCode.eq(key.item_code.as_str()))
            .filter(Column::LocationCode.eq(key.location_code.as_str()))
    }

    fn chain_order(query: Select<stock_ledger_entry::Entity>) -> Select<stock_ledger_entry::Entity> {
        query
            .order_by_asc(Column::PostingDate)
            .order_by_asc(Column::PostingTime)
            .order_by_asc(Column::Id)
    }

    fn range_query(key: &StockKey, range: &LedgerRange) -> Select<stock_ledger_entry::Entity> {
        let mut query = Self::key_query(key);
        if let Some(from) = range.from {
            query = query.filter(Column::PostingDate.gte(from));
        }
        if let Some(to) = range.to {
            query = query.filter(Column::PostingDate.lte(to));
        }
        Self::chain_order(query)
    }

    /// One page (1-based) of the chain within `range`.
    #[instrument(skip(self))]
    pub async fn query_range(
        &self,
        key: &StockKey,
        range: LedgerRange,
        page: u64,
        per_page: u64,
    ) -> Result<LedgerPage, ServiceError> {
        if page == 0 {
            return Err(ServiceError::validation("page number must be greater than 0"));
        }
        if per_page == 0 {
            return Err(ServiceError::validation("page size must be greater than 0"));
        }

        let paginator = Self::range_query(key, &range).paginate(&*self.db_pool, per_page);
        let total_items = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let total_pages = paginator.num_pages().await.map_err(ServiceError::db_error)?;
        let entries = paginator
            .fetch_page(page - 1)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(LedgerPage {
            entries,
            page,
            per_page,
            total_items,
            total_pages,
        })
    }

    /// Lazily yields the chain within `range`, fetching in keyset-paginated batches.
    /// Each call starts again from the beginning of the range.
    pub fn stream_range(
        &self,
        key: StockKey,
        range: LedgerRange,
    ) -> impl Stream<Item = Result<stock_ledger_entry::Model, ServiceError>> + Send + '_ {
        let batch_size = self.batch_size;
        stream::try_unfold(
            (None::<Cursor>, false),
            move |(cursor, exhausted)| {
                let key = key.clone();
                async move {
                    if exhausted {
                        return Ok::<_, ServiceError>(None);
                    }
                    let rows = self.batch_after(&key, &range, cursor, batch_size).await?;
                    let Some(last) = rows.last() else {
                        return Ok(None);
                    };
                    let next = Some((last.posting_date, last.posting_time, last.id));
                    let exhausted = (rows.len() as u64) < batch_size;
                    Ok(Some((
                        stream::iter(rows.into_iter().map(Ok::<_, ServiceError>)),
                        (next, exhausted),
                    )))
                }
            },
        )
        .try_flatten()
    }

    async fn batch_after(
        &self,
        key: &StockKey,
        range: &LedgerRange,
        cursor: Option<Cursor>,
        limit: u64,
    ) -> Result<Vec<stock_ledger_entry::Model>, ServiceError> {
        let mut query = Self::range_query(key, range);
        if let Some((date, time, id)) = cursor {
            query = query.filter(
                Condition::any()
                    .add(Column::PostingDate.gt(date))
                    .add(
                        Condition::all()
                            .add(Column::PostingDate.eq(date))
                            .add(Column::PostingTime.gt(time)),
                    )
                    .add(
                        Condition::all()
                            .add(Column::PostingDate.eq(date))
                            .add(Column::PostingTime.eq(time))
                            .add(Column::Id.gt(id)),
                    ),
            );
        }
        query
            .limit(limit)
            .all(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)
    }

    /// `balance_after` of the latest entry posted on or before `date`, or zero.
    #[instrument(skip(self))]
    pub async fn balance_as_of(&self, key: &StockKey, date: NaiveDate) -> Result<Decimal, ServiceError> {
        let latest = Self::key_query(key)
            .filter(Column::PostingDate.lte(date))
            .order_by_desc(Column::PostingDate)
            .order_by_desc(Column::PostingTime)
            .order_by_desc(Column::Id)
            .one(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(latest.map(|e| e.balance_after).unwrap_or(Decimal::ZERO))
    }

    pub async fn latest(&self, key: &StockKey) -> Result<Option<stock_ledger_entry::Model>, ServiceError> {
        Self::latest_in(&*self.db_pool, key).await
    }

    pub(crate) async fn latest_in<C: ConnectionTrait>(
        conn: &C,
        key: &StockKey,
    ) -> Result<Option<stock_ledger_entry::Model>, ServiceError> {
        Self::key_query(key)
            .order_by_desc(Column::PostingDate)
            .order_by_desc(Column::PostingTime)
            .order_by_desc(Column::Id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Whole chain in posting order.
    pub(crate) async fn chain_in<C: ConnectionTrait>(
        conn: &C,
        key: &StockKey,
    ) -> Result<Vec<stock_ledger_entry::Model>, ServiceError> {
        Self::chain_order(Self::key_query(key))
            .all(conn)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Every entry caused by one document, in insertion order.
    pub async fn entries_for_document(
        &self,
        tenant_id: Uuid,
        document: &CausingDocument,
    ) -> Result<Vec<stock_ledger_entry::Model>, ServiceError> {
        Self::entries_for_document_in(&*self.db_pool, tenant_id, document).await
    }

    pub(crate) async fn entries_for_document_in<C: ConnectionTrait>(
        conn: &C,
        tenant_id: Uuid,
        document: &CausingDocument,
    ) -> Result<Vec<stock_ledger_entry::Model>, ServiceError> {
        stock_ledger_entry::Entity::find()
            .filter(Column::TenantId.eq(tenant_id))
            .filter(Column::CausingDocumentType.eq(document.document_type.as_str()))
            .filter(Column::CausingDocumentId.eq(document.document_id))
            .order_by_asc(Column::Id)
            .all(conn)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Documents whose effects on a chain were reversed.
    pub(crate) fn cancelled_documents(
        chain: &[stock_ledger_entry::Model],
    ) -> HashSet<CausingDocument> {
        chain
            .iter()
            .filter(|e| e.cancelled)
            .map(|e| e.causing_document())
            .collect()
    }
}
