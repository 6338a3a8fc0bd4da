use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Valuation policy configured per item.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum ValuationMethod {
    #[sea_orm(string_value = "FIFO")]
    #[strum(serialize = "FIFO", ascii_case_insensitive)]
    Fifo,
    #[sea_orm(string_value = "LIFO")]
    #[strum(serialize = "LIFO", ascii_case_insensitive)]
    Lifo,
    #[sea_orm(string_value = "MovingAverage")]
    #[strum(serialize = "MovingAverage", ascii_case_insensitive)]
    MovingAverage,
}

/// Item master projection: only the settings that gate posting and valuation.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub tenant_id: Uuid,
    #[sea_orm(primary_key, auto_increment = false)]
    pub item_code: String,
    pub description: Option<String>,
    pub tracks_batch: bool,
    pub tracks_serial: bool,
    pub allows_negative_stock: bool,
    pub valuation_method: ValuationMethod,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
