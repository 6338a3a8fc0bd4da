use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::stock_movement::MovementKind;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a sender together with the receiving end of a bounded channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Publishes an event for an already committed change. A failure is logged and dropped.
    pub async fn publish(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "event dropped after commit");
        }
    }
}

/// Changes committed by the stock ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    StockMovementSubmitted {
        tenant_id: Uuid,
        document_id: Uuid,
        kind: MovementKind,
        entries: usize,
        warnings: usize,
        timestamp: DateTime<Utc>,
    },
    StockMovementCancelled {
        tenant_id: Uuid,
        document_id: Uuid,
        kind: MovementKind,
        entries: usize,
        timestamp: DateTime<Utc>,
    },
    StockReconciled {
        tenant_id: Uuid,
        location_code: String,
        item_code: String,
        difference: Decimal,
        document_id: Uuid,
        timestamp: DateTime<Utc>,
    },
    ReservationChanged {
        tenant_id: Uuid,
        item_code: String,
        location_code: String,
        delta: Decimal,
        reserved: Decimal,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    pub fn tenant_id(&self) -> Uuid {
        match self {
            Event::StockMovementSubmitted { tenant_id, .. }
            | Event::StockMovementCancelled { tenant_id, .. }
            | Event::StockReconciled { tenant_id, .. }
            | Event::ReservationChanged { tenant_id, .. } => *tenant_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Event::StockMovementSubmitted { .. } => "stock_movement_submitted",
            Event::StockMovementCancelled { .. } => "stock_movement_cancelled",
            Event::StockReconciled { .. } => "stock_reconciled",
            Event::ReservationChanged { .. } => "reservation_changed",
        }
    }
}

/// Drains the channel, logging every event. Returns once all senders are dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::StockMovementSubmitted {
                document_id,
                kind,
                entries,
                warnings,
                ..
            } => {
                info!(
                    tenant_id = %event.tenant_id(),
                    document_id = %document_id,
                    kind = %kind,
                    entries,
                    warnings,
                    "stock movement submitted"
                );
            }
            Event::StockMovementCancelled {
                document_id,
                kind,
                entries,
                ..
            } => {
                info!(
                    tenant_id = %event.tenant_id(),
                    document_id = %document_id,
                    kind = %kind,
                    entries,
                    "stock movement cancelled"
                );
            }
            Event::StockReconciled {
                location_code,
                item_code,
                difference,
                document_id,
                ..
            } => {
                info!(
                    tenant_id = %event.tenant_id(),
                    location = %location_code,
                    item = %item_code,
                    difference = %difference,
                    document_id = %document_id,
                    "stock reconciled"
                );
            }
            Event::ReservationChanged {
                item_code,
                location_code,
                delta,
                reserved,
                ..
            } => {
                info!(
                    tenant_id = %event.tenant_id(),
                    item = %item_code,
                    location = %location_code,
                    delta = %delta,
                    reserved = %reserved,
                    "reservation changed"
                );
            }
        }
    }

    info!("Event processing loop stopped");
}
