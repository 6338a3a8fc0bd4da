use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::{CausingDocument, StockKey};

/// Immutable quantity/value event. The auto-increment `id` is the insertion sequence used to
/// order entries sharing a posting date and time.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_ledger_entries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub tenant_id: Uuid,
    pub item_code: String,
    pub location_code: String,
    pub posting_date: NaiveDate,
    pub posting_time: NaiveTime,
    pub quantity_delta: Decimal,
    pub balance_after: Decimal,
    pub incoming_rate: Decimal,
    pub outgoing_rate: Decimal,
    pub value_delta: Decimal,
    pub value_after: Decimal,
    pub causing_document_type: String,
    pub causing_document_id: Uuid,
    pub line_id: Option<Uuid>,
    pub batch_ref: Option<String>,
    pub serial_refs: Option<Json>,
    pub submitted: bool,
    pub cancelled: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn key(&self) -> StockKey {
        StockKey::new(self.tenant_id, &self.item_code, &self.location_code)
    }

    pub fn is_incoming(&self) -> bool {
        self.quantity_delta > Decimal::ZERO
    }

    pub fn causing_document(&self) -> CausingDocument {
        CausingDocument::new(&self.causing_document_type, self.causing_document_id)
    }

    pub fn posted_at(&self) -> (NaiveDate, NaiveTime) {
        (self.posting_date, self.posting_time)
    }

    pub fn serials(&self) -> Vec<String> {
        self.serial_refs
            .as_ref()
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default()
    }
}
