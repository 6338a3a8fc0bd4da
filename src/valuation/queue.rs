use rust_decimal::Decimal;
use std::collections::VecDeque;

use super::{rate_of, CostingPolicy, Valuation};

/// Which end of the layer queue a withdrawal consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOrder {
    FirstIn,
    LastIn,
}

/// Remaining quantity of one incoming entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layer {
    pub quantity: Decimal,
    pub rate: Decimal,
}

/// FIFO / LIFO costing over incoming layers kept in posting order.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerQueue {
    order: QueueOrder,
    layers: VecDeque<Layer>,
}

impl LayerQueue {
    pub fn new(order: QueueOrder) -> Self {
        Self {
            order,
            layers: VecDeque::new(),
        }
    }

    pub fn order(&self) -> QueueOrder {
        self.order
    }

    pub fn layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter()
    }

    fn next_layer(&mut self) -> Option<&mut Layer> {
        match self.order {
            QueueOrder::FirstIn => self.layers.front_mut(),
            QueueOrder::LastIn => self.layers.back_mut(),
        }
    }

    fn drop_exhausted(&mut self) {
        match self.order {
            QueueOrder::FirstIn => {
                self.layers.pop_front();
            }
            QueueOrder::LastIn => {
                self.layers.pop_back();
            }
        }
    }
}

impl CostingPolicy for LayerQueue {
    fn receive(&mut self, quantity: Decimal, rate: Decimal) {
        if quantity > Decimal::ZERO {
            self.layers.push_back(Layer { quantity, rate });
        }
    }

    fn withdraw(&mut self, quantity: Decimal) -> Valuation {
        let mut remaining = quantity;
        let mut value = Decimal::ZERO;

        while remaining > Decimal::ZERO {
            let Some(layer) = self.next_layer() else {
                break;
            };
            let take = remaining.min(layer.quantity);
            value += take * layer.rate;
            layer.quantity -= take;
            remaining -= take;
            if layer.quantity.is_zero() {
                self.drop_exhausted();
            }
        }

        Valuation {
            quantity,
            rate: rate_of(value, quantity),
            value,
            unmatched: remaining,
        }
    }

    fn current_rate(&self) -> Decimal {
        rate_of(self.value(), self.quantity())
    }

    fn quantity(&self) -> Decimal {
        self.layers.iter().map(|layer| layer.quantity).sum()
    }

    fn value(&self) -> Decimal {
        self.layers
            .iter()
            .map(|layer| layer.quantity * layer.rate)
            .sum()
    }
}
