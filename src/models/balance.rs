use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::entities::stock_balance;
use crate::models::StockKey;

/// Stored quantity columns that `BalanceStore::apply_delta` may change.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum BalanceField {
    OnHand,
    Reserved,
    OnOrder,
    Planned,
}

impl BalanceField {
    /// Only on-hand may go below zero.
    pub fn allows_negative(self) -> bool {
        matches!(self, BalanceField::OnHand)
    }
}

pub fn available(on_hand: Decimal, reserved: Decimal) -> Decimal {
    on_hand - reserved
}

pub fn projected(on_hand: Decimal, on_order: Decimal, planned: Decimal, reserved: Decimal) -> Decimal {
    on_hand + on_order + planned - reserved
}

pub fn stock_value(on_hand: Decimal, valuation_rate: Decimal) -> Decimal {
    on_hand * valuation_rate
}

/// Caller-facing view of a balance row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub item_code: String,
    pub location_code: String,
    pub on_hand: Decimal,
    pub reserved: Decimal,
    pub on_order: Decimal,
    pub planned: Decimal,
    pub available: Decimal,
    pub projected: Decimal,
    pub valuation_rate: Decimal,
    pub stock_value: Decimal,
}

impl BalanceSnapshot {
    /// A key that was never posted to.
    pub fn zero(key: &StockKey) -> Self {
        Self {
            item_code: key.item_code.clone(),
            location_code: key.location_code.clone(),
            on_hand: Decimal::ZERO,
            reserved: Decimal::ZERO,
            on_order: Decimal::ZERO,
            planned: Decimal::ZERO,
            available: Decimal::ZERO,
            projected: Decimal::ZERO,
            valuation_rate: Decimal::ZERO,
            stock_value: Decimal::ZERO,
        }
    }
}

impl From<stock_balance::Model> for BalanceSnapshot {
    fn from(model: stock_balance::Model) -> Self {
        Self {
            item_code: model.item_code,
            location_code: model.location_code,
            on_hand: model.on_hand,
            reserved: model.reserved,
            on_order: model.on_order,
            planned: model.planned,
            available: model.available,
            projected: model.projected,
            valuation_rate: model.valuation_rate,
            stock_value: model.stock_value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn derived_quantities() {
        assert_eq!(available(dec!(10), dec!(4)), dec!(6));
        assert_eq!(available(dec!(-2), dec!(1)), dec!(-3));
        assert_eq!(projected(dec!(10), dec!(5), dec!(2), dec!(4)), dec!(13));
        assert_eq!(stock_value(dec!(5), dec!(15)), dec!(75));
    }

    #[test]
    fn only_on_hand_may_be_negative() {
        assert!(BalanceField::OnHand.allows_negative());
        assert!(!BalanceField::Reserved.allows_negative());
        assert!(!BalanceField::OnOrder.allows_negative());
        assert!(!BalanceField::Planned.allows_negative());
    }

    #[test]
    fn field_names_parse() {
        assert_eq!("on_order".parse::<BalanceField>().ok(), Some(BalanceField::OnOrder));
        assert_eq!(BalanceField::OnHand.to_string(), "on_hand");
    }
}
