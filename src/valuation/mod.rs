//! Stock valuation algorithms.
//!
//! Everything here is pure: the services feed ledger history in as [`ValuationEvent`]s, replay it
//! into a [`ValuationState`] and ask that state what a withdrawal costs. Nothing is persisted
//! between calls, so the result only depends on the history that was replayed.

mod moving_average;
mod queue;

pub use moving_average::MovingAverage;
pub use queue::{Layer, LayerQueue, QueueOrder};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::entities::{stock_item::ValuationMethod, stock_ledger_entry};
use crate::models::StockKey;

/// Decimal places kept on persisted valuation rates.
pub const RATE_PRECISION: u32 = 6;

pub fn round_rate(rate: Decimal) -> Decimal {
    rate.round_dp(RATE_PRECISION)
}

/// `value / quantity`, or zero when nothing was withdrawn.
pub fn rate_of(value: Decimal, quantity: Decimal) -> Decimal {
    if quantity.is_zero() {
        Decimal::ZERO
    } else {
        round_rate(value / quantity)
    }
}

/// One quantity movement as seen by a valuation policy. Quantities are magnitudes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValuationEvent {
    Incoming { quantity: Decimal, rate: Decimal },
    Outgoing { quantity: Decimal },
}

impl ValuationEvent {
    /// Zero-delta entries carry nothing to value.
    pub fn from_entry(entry: &stock_ledger_entry::Model) -> Option<Self> {
        if entry.quantity_delta > Decimal::ZERO {
            Some(ValuationEvent::Incoming {
                quantity: entry.quantity_delta,
                rate: entry.incoming_rate,
            })
        } else if entry.quantity_delta < Decimal::ZERO {
            Some(ValuationEvent::Outgoing {
                quantity: -entry.quantity_delta,
            })
        } else {
            None
        }
    }
}

/// Cost of one withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Valuation {
    pub quantity: Decimal,
    pub rate: Decimal,
    pub value: Decimal,
    /// Part of `quantity` no layer could cover; it was valued at zero.
    pub unmatched: Decimal,
}

impl Valuation {
    pub fn zero() -> Self {
        Self {
            quantity: Decimal::ZERO,
            rate: Decimal::ZERO,
            value: Decimal::ZERO,
            unmatched: Decimal::ZERO,
        }
    }

    pub fn is_partial(&self) -> bool {
        self.unmatched > Decimal::ZERO
    }
}

/// Reported next to a successful posting when history could not cover a withdrawal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValuationWarning {
    pub item_code: String,
    pub location_code: String,
    pub requested: Decimal,
    pub unmatched: Decimal,
}

impl ValuationWarning {
    pub fn partial_match(key: &StockKey, valuation: &Valuation) -> Option<Self> {
        valuation.is_partial().then(|| Self {
            item_code: key.item_code.clone(),
            location_code: key.location_code.clone(),
            requested: valuation.quantity,
            unmatched: valuation.unmatched,
        })
    }
}

impl fmt::Display for ValuationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} {} at {} had no incoming history and was valued at zero",
            self.unmatched, self.requested, self.item_code, self.location_code
        )
    }
}

/// Behaviour shared by the costing policies.
pub trait CostingPolicy {
    fn receive(&mut self, quantity: Decimal, rate: Decimal);

    fn withdraw(&mut self, quantity: Decimal) -> Valuation;

    /// Rate a balance holding the remaining stock should carry.
    fn current_rate(&self) -> Decimal;

    fn quantity(&self) -> Decimal;

    fn value(&self) -> Decimal;
}

/// Replayed valuation state for one stock key.
#[derive(Debug, Clone, PartialEq)]
pub enum ValuationState {
    Queue(LayerQueue),
    Average(MovingAverage),
}

impl ValuationState {
    pub fn new(method: ValuationMethod) -> Self {
        match method {
            ValuationMethod::Fifo => ValuationState::Queue(LayerQueue::new(QueueOrder::FirstIn)),
            ValuationMethod::Lifo => ValuationState::Queue(LayerQueue::new(QueueOrder::LastIn)),
            ValuationMethod::MovingAverage => ValuationState::Average(MovingAverage::default()),
        }
    }

    /// Replays history in posting order.
    pub fn replay<I>(method: ValuationMethod, events: I) -> Self
    where
        I: IntoIterator<Item = ValuationEvent>,
    {
        let mut state = Self::new(method);
        for event in events {
            state.apply(event);
        }
        state
    }

    /// Applies one event, returning the cost of an outgoing one.
    pub fn apply(&mut self, event: ValuationEvent) -> Option<Valuation> {
        match event {
            ValuationEvent::Incoming { quantity, rate } => {
                self.receive(quantity, rate);
                None
            }
            ValuationEvent::Outgoing { quantity } => Some(self.withdraw(quantity)),
        }
    }

    fn policy(&self) -> &dyn CostingPolicy {
        match self {
            ValuationState::Queue(queue) => queue,
            ValuationState::Average(average) => average,
        }
    }

    fn policy_mut(&mut self) -> &mut dyn CostingPolicy {
        match self {
            ValuationState::Queue(queue) => queue,
            ValuationState::Average(average) => average,
        }
    }
}

impl CostingPolicy for ValuationState {
    fn receive(&mut self, quantity: Decimal, rate: Decimal) {
        self.policy_mut().receive(quantity, rate)
    }

    fn withdraw(&mut self, quantity: Decimal) -> Valuation {
        if quantity <= Decimal::ZERO {
            return Valuation::zero();
        }
        self.policy_mut().withdraw(quantity)
    }

    fn current_rate(&self) -> Decimal {
        self.policy().current_rate()
    }

    fn quantity(&self) -> Decimal {
        self.policy().quantity()
    }

    fn value(&self) -> Decimal {
        self.policy().value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn incoming(quantity: Decimal, rate: Decimal) -> ValuationEvent {
        ValuationEvent::Incoming { quantity, rate }
    }

    fn outgoing(quantity: Decimal) -> ValuationEvent {
        ValuationEvent::Outgoing { quantity }
    }

    #[test]
    fn fifo_withdrawal_spans_layers() {
        let mut state = ValuationState::replay(
            ValuationMethod::Fifo,
            [incoming(dec!(5), dec!(10)), incoming(dec!(5), dec!(20))],
        );
        let valuation = state.withdraw(dec!(7));
        assert_eq!(valuation.value, dec!(90));
        assert_eq!(valuation.rate, dec!(12.857143));
        assert!(!valuation.is_partial());
        assert_eq!(state.quantity(), dec!(3));
        assert_eq!(state.current_rate(), dec!(20));
    }

    #[test]
    fn lifo_withdrawal_takes_newest_first() {
        let mut state = ValuationState::replay(
            ValuationMethod::Lifo,
            [incoming(dec!(5), dec!(10)), incoming(dec!(5), dec!(20))],
        );
        let valuation = state.withdraw(dec!(7));
        assert_eq!(valuation.value, dec!(120));
        assert_eq!(valuation.rate, dec!(17.142857));
        assert_eq!(state.current_rate(), dec!(10));
    }

    #[test]
    fn moving_average_blends_and_keeps_rate_on_withdrawal() {
        let mut state = ValuationState::replay(
            ValuationMethod::MovingAverage,
            [incoming(dec!(10), dec!(10)), incoming(dec!(10), dec!(20))],
        );
        assert_eq!(state.current_rate(), dec!(15));
        let valuation = state.withdraw(dec!(15));
        assert_eq!(valuation.rate, dec!(15));
        assert_eq!(valuation.value, dec!(225));
        assert_eq!(state.quantity(), dec!(5));
        assert_eq!(state.current_rate(), dec!(15));
    }

    #[test]
    fn replay_values_past_withdrawals_at_their_own_point() {
        let mut state = ValuationState::new(ValuationMethod::MovingAverage);
        state.apply(incoming(dec!(10), dec!(10)));
        let first = state.apply(outgoing(dec!(5))).expect("outgoing is valued");
        state.apply(incoming(dec!(5), dec!(30)));
        assert_eq!(first.rate, dec!(10));
        assert_eq!(state.current_rate(), dec!(20));
    }

    #[test]
    fn zero_quantity_withdrawal_has_zero_rate() {
        let mut state = ValuationState::replay(
            ValuationMethod::Fifo,
            [incoming(dec!(5), dec!(10))],
        );
        assert_eq!(state.withdraw(Decimal::ZERO), Valuation::zero());
        assert_eq!(rate_of(dec!(10), Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn warning_only_for_partial_matches() {
        let key = StockKey::new(uuid::Uuid::nil(), "WIDGET", "WH-1");
        let mut state = ValuationState::replay(ValuationMethod::Fifo, [incoming(dec!(2), dec!(4))]);
        let valuation = state.withdraw(dec!(5));
        let warning = ValuationWarning::partial_match(&key, &valuation).expect("partial");
        assert_eq!(warning.unmatched, dec!(3));
        assert!(warning.to_string().contains("WIDGET"));

        let mut state = ValuationState::replay(ValuationMethod::Fifo, [incoming(dec!(9), dec!(4))]);
        let valuation = state.withdraw(dec!(5));
        assert!(ValuationWarning::partial_match(&key, &valuation).is_none());
    }
}
