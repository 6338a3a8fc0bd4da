use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::{balance, StockKey};

/// One row per (tenant, item, location). `available`, `projected` and `stock_value` are cached
/// derivations and are rewritten on every update of the stored quantities.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_balances")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub tenant_id: Uuid,
    #[sea_orm(primary_key, auto_increment = false)]
    pub item_code: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub location_code: String,
    pub on_hand: Decimal,
    pub reserved: Decimal,
    pub on_order: Decimal,
    pub planned: Decimal,
    pub available: Decimal,
    pub projected: Decimal,
    pub valuation_rate: Decimal,
    pub stock_value: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn key(&self) -> StockKey {
        StockKey::new(self.tenant_id, &self.item_code, &self.location_code)
    }

    /// True when the cached columns agree with the stored quantities.
    pub fn is_consistent(&self) -> bool {
        self.available == balance::available(self.on_hand, self.reserved)
            && self.projected
                == balance::projected(self.on_hand, self.on_order, self.planned, self.reserved)
            && self.stock_value == balance::stock_value(self.on_hand, self.valuation_rate)
    }
}
