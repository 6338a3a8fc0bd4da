//! Plain value types shared by the stores, the valuation engine and the posting services.

pub mod balance;
pub mod batch;
pub mod movement;

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub use balance::{BalanceField, BalanceSnapshot};
pub use movement::{
    Adjustment, LineDirection, MovementDocument, NewMovement, NewMovementLine, Observation,
    PostingOutcome, UpdateMovement,
};

/// Identifies one balance row and one ledger chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    pub tenant_id: Uuid,
    pub item_code: String,
    pub location_code: String,
}

impl StockKey {
    pub fn new(tenant_id: Uuid, item_code: &str, location_code: &str) -> Self {
        Self {
            tenant_id,
            item_code: item_code.to_string(),
            location_code: location_code.to_string(),
        }
    }
}

impl fmt::Display for StockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}@{}",
            self.tenant_id, self.item_code, self.location_code
        )
    }
}

/// Reference from a ledger entry back to the document that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CausingDocument {
    pub document_type: String,
    pub document_id: Uuid,
}

impl CausingDocument {
    pub const STOCK_MOVEMENT: &'static str = "StockMovement";

    pub fn new(document_type: &str, document_id: Uuid) -> Self {
        Self {
            document_type: document_type.to_string(),
            document_id,
        }
    }

    pub fn stock_movement(document_id: Uuid) -> Self {
        Self::new(Self::STOCK_MOVEMENT, document_id)
    }
}

impl fmt::Display for CausingDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.document_type, self.document_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_order_by_tenant_then_item_then_location() {
        let tenant = Uuid::nil();
        let mut keys = vec![
            StockKey::new(tenant, "B", "WH-1"),
            StockKey::new(tenant, "A", "WH-2"),
            StockKey::new(tenant, "A", "WH-1"),
        ];
        keys.sort();
        assert_eq!(keys[0], StockKey::new(tenant, "A", "WH-1"));
        assert_eq!(keys[2], StockKey::new(tenant, "B", "WH-1"));
    }

    #[test]
    fn causing_document_renders_type_and_id() {
        let doc = CausingDocument::stock_movement(Uuid::nil());
        assert_eq!(
            doc.to_string(),
            "StockMovement:00000000-0000-0000-0000-000000000000"
        );
    }
}
