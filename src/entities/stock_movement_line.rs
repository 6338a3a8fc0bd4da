use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movement_lines")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub movement_id: Uuid,
    pub line_no: i32,
    pub item_code: String,
    pub quantity: Decimal,
    pub rate: Option<Decimal>,
    pub source_location: Option<String>,
    pub target_location: Option<String>,
    pub batch_ref: Option<String>,
    pub serial_refs: Option<Json>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::stock_movement::Entity",
        from = "Column::MovementId",
        to = "super::stock_movement::Column::Id",
        on_delete = "Cascade"
    )]
    Movement,
}

impl Related<super::stock_movement::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Movement.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn serials(&self) -> Vec<String> {
        self.serial_refs
            .as_ref()
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default()
    }
}
