use rust_decimal::Decimal;

use super::{rate_of, CostingPolicy, Valuation};

/// Weighted moving average over the full history of a key.
///
/// When a withdrawal leaves the running quantity at or below zero both running totals reset,
/// so the next receipt starts a fresh average.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovingAverage {
    quantity: Decimal,
    value: Decimal,
}

impl MovingAverage {
    fn reset(&mut self) {
        self.quantity = Decimal::ZERO;
        self.value = Decimal::ZERO;
    }
}

impl CostingPolicy for MovingAverage {
    fn receive(&mut self, quantity: Decimal, rate: Decimal) {
        self.value += quantity * rate;
        self.quantity += quantity;
        if self.quantity <= Decimal::ZERO {
            self.reset();
        }
    }

    fn withdraw(&mut self, quantity: Decimal) -> Valuation {
        let rate = self.current_rate();
        let (value, unmatched) = if self.quantity <= Decimal::ZERO {
            (Decimal::ZERO, quantity)
        } else {
            // Unrounded share of the running value; `rate` is only what gets reported.
            (self.value * quantity / self.quantity, Decimal::ZERO)
        };

        self.value -= value;
        self.quantity -= quantity;
        if self.quantity <= Decimal::ZERO {
            self.reset();
        }

        Valuation {
            quantity,
            rate,
            value,
            unmatched,
        }
    }

    fn current_rate(&self) -> Decimal {
        if self.quantity <= Decimal::ZERO {
            Decimal::ZERO
        } else {
            rate_of(self.value, self.quantity)
        }
    }

    fn quantity(&self) -> Decimal {
        self.quantity
    }

    fn value(&self) -> Decimal {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn exhaustion_resets_the_average() {
        let mut average = MovingAverage::default();
        average.receive(dec!(10), dec!(10));
        average.withdraw(dec!(10));
        assert_eq!(average.quantity(), Decimal::ZERO);
        assert_eq!(average.value(), Decimal::ZERO);

        average.receive(dec!(4), dec!(30));
        assert_eq!(average.current_rate(), dec!(30));
    }

    #[test]
    fn withdrawing_from_nothing_is_unmatched() {
        let mut average = MovingAverage::default();
        let valuation = average.withdraw(dec!(3));
        assert_eq!(valuation.rate, Decimal::ZERO);
        assert_eq!(valuation.unmatched, dec!(3));
        assert_eq!(average.quantity(), Decimal::ZERO);
    }

    #[test]
    fn over_withdrawal_is_costed_at_the_running_rate() {
        let mut average = MovingAverage::default();
        average.receive(dec!(5), dec!(8));
        let valuation = average.withdraw(dec!(7));
        assert_eq!(valuation.value, dec!(56));
        assert!(!valuation.is_partial());
        assert_eq!(average.current_rate(), Decimal::ZERO);
    }

    #[test]
    fn uneven_withdrawals_take_an_exact_share_of_value() {
        let mut average = MovingAverage::default();
        average.receive(dec!(3), dec!(1));
        average.receive(dec!(3), dec!(2));
        average.receive(dec!(3), dec!(2));

        let first = average.withdraw(dec!(3));
        assert_eq!(first.rate, dec!(1.666667));
        assert_eq!(first.value, dec!(5));
        assert_eq!(average.value(), dec!(10));

        let rest = average.withdraw(dec!(6));
        assert_eq!(rest.value, dec!(10));
        assert_eq!(average.value(), Decimal::ZERO);
    }

    #[test]
    fn uneven_average_is_rounded() {
        let mut average = MovingAverage::default();
        average.receive(dec!(3), dec!(1));
        average.receive(dec!(3), dec!(2));
        average.receive(dec!(3), dec!(2));
        assert_eq!(average.current_rate(), dec!(1.666667));
    }
}
