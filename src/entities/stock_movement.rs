use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Kinds of stock movement documents.
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
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[strum(serialize_all = "snake_case")]
pub enum MovementKind {
    #[sea_orm(string_value = "receipt")]
    Receipt,
    #[sea_orm(string_value = "issue")]
    Issue,
    #[sea_orm(string_value = "transfer")]
    Transfer,
    #[sea_orm(string_value = "manufacture")]
    Manufacture,
    #[sea_orm(string_value = "repack")]
    Repack,
    #[sea_orm(string_value = "reconciliation_adjustment")]
    ReconciliationAdjustment,
}

/// Document lifecycle. Stored as its numeric code.
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
)]
#[sea_orm(rs_type = "i32", db_type = "Integer")]
pub enum MovementStatus {
    #[sea_orm(num_value = 0)]
    Draft,
    #[sea_orm(num_value = 1)]
    Submitted,
    #[sea_orm(num_value = 2)]
    Cancelled,
}

impl MovementStatus {
    pub fn can_transition_to(self, next: MovementStatus) -> bool {
        matches!(
            (self, next),
            (MovementStatus::Draft, MovementStatus::Submitted)
                | (MovementStatus::Submitted, MovementStatus::Cancelled)
        )
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub kind: MovementKind,
    pub posting_date: NaiveDate,
    pub posting_time: NaiveTime,
    pub status: MovementStatus,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::stock_movement_line::Entity")]
    Lines,
}

impl Related<super::stock_movement_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn posted_at(&self) -> (NaiveDate, NaiveTime) {
        (self.posting_date, self.posting_time)
    }
}
