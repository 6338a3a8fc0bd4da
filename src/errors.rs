use http::StatusCode;
use rust_decimal::Decimal;
use sea_orm::error::DbErr;
use serde::Serialize;
use uuid::Uuid;

use crate::entities::stock_movement::MovementStatus;

/// Errors surfaced by the stock ledger services.
///
/// Every variant aborts the current unit of work; nothing is committed when one of these is
/// returned from `submit`, `cancel` or `reconcile`.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Storage failure: {0}")]
    StorageFailure(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: document {document_id} is {status}, expected {expected}")]
    InvalidState {
        document_id: Uuid,
        status: MovementStatus,
        expected: MovementStatus,
    },

    #[error(
        "Insufficient stock: item {item_code} at {location_code} has {available} on hand, {requested} requested"
    )]
    InsufficientStock {
        item_code: String,
        location_code: String,
        requested: Decimal,
        available: Decimal,
    },

    #[error(
        "Insufficient available quantity: item {item_code} at {location_code} has {available} available, {requested} requested"
    )]
    InsufficientAvailable {
        item_code: String,
        location_code: String,
        requested: Decimal,
        available: Decimal,
    },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// The document changed under a concurrent writer; re-read and retry.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationFailed(err.to_string())
    }
}

pub trait IntoDbErr {
    fn into_db_err(self) -> DbErr;
}

impl IntoDbErr for DbErr {
    fn into_db_err(self) -> DbErr {
        self
    }
}

impl IntoDbErr for String {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self)
    }
}

impl IntoDbErr for &str {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self.to_string())
    }
}

impl ServiceError {
    /// Generic constructor that normalizes any supported database error input.
    pub fn db_error<E: IntoDbErr>(error: E) -> Self {
        ServiceError::StorageFailure(error.into_db_err())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::ValidationFailed(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ServiceError::NotFound(message.into())
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidState { .. } | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InsufficientStock { .. } | Self::InsufficientAvailable { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            Self::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::StorageFailure(_)
            | Self::EventError(_)
            | Self::InternalError(_)
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for callers that render their own messages.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidState { .. } => "invalid_state",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::InsufficientAvailable { .. } => "insufficient_available",
            Self::ValidationFailed(_) => "validation_failed",
            Self::Conflict(_) => "conflict",
            Self::Timeout(_) => "timeout",
            Self::StorageFailure(_) => "storage_failure",
            Self::EventError(_) | Self::InternalError(_) | Self::Other(_) => "internal_error",
        }
    }

    /// Returns the error message suitable for callers outside the service boundary.
    /// Storage and internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::StorageFailure(_) => "Storage failure".to_string(),
            Self::EventError(_) | Self::InternalError(_) | Self::Other(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// True when the error reflects a transient condition worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::StorageFailure(_) | Self::Conflict(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn service_error_status_code_mapping() {
        assert_eq!(
            ServiceError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::ValidationFailed("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InvalidState {
                document_id: Uuid::nil(),
                status: MovementStatus::Submitted,
                expected: MovementStatus::Draft,
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::InsufficientStock {
                item_code: "WIDGET".into(),
                location_code: "WH-1".into(),
                requested: dec!(5),
                available: dec!(2),
            }
            .status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::db_error("boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServiceError::Timeout("submit".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn quantity_errors_name_item_location_and_quantities() {
        let err = ServiceError::InsufficientStock {
            item_code: "WIDGET".into(),
            location_code: "WH-1".into(),
            requested: dec!(7),
            available: dec!(3),
        };
        let message = err.to_string();
        assert!(message.contains("WIDGET"));
        assert!(message.contains("WH-1"));
        assert!(message.contains('7'));
        assert!(message.contains('3'));
        assert_eq!(err.error_code(), "insufficient_stock");
    }

    #[test]
    fn response_message_hides_storage_details() {
        assert_eq!(
            ServiceError::db_error("connection reset by peer").response_message(),
            "Storage failure"
        );
        assert_eq!(
            ServiceError::InternalError("lock poisoned".into()).response_message(),
            "Internal server error"
        );
        assert_eq!(
            ServiceError::ValidationFailed("rate is required".into()).response_message(),
            "Validation failed: rate is required"
        );
    }

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(ServiceError::Timeout("cancel".into()).is_retryable());
        assert!(ServiceError::db_error("deadlock").is_retryable());
        assert!(ServiceError::Conflict("lines changed".into()).is_retryable());
        assert!(!ServiceError::ValidationFailed("x".into()).is_retryable());
    }
}
