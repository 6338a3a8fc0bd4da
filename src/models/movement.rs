use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::entities::{
    stock_movement::{self, MovementKind, MovementStatus},
    stock_movement_line,
};
use crate::errors::ServiceError;
use crate::models::BalanceSnapshot;
use crate::valuation::ValuationWarning;

fn validate_positive_quantity(value: &Decimal) -> Result<(), ValidationError> {
    if *value > Decimal::ZERO {
        Ok(())
    } else {
        Err(ValidationError::new("quantity must be positive"))
    }
}

fn validate_non_negative_rate(value: &Decimal) -> Result<(), ValidationError> {
    if *value >= Decimal::ZERO {
        Ok(())
    } else {
        Err(ValidationError::new("rate must be non-negative"))
    }
}

/// Which locations a line touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineDirection {
    Incoming,
    Outgoing,
    Transfer,
}

impl LineDirection {
    pub fn of(source: Option<&str>, target: Option<&str>) -> Option<Self> {
        match (source, target) {
            (Some(_), Some(_)) => Some(LineDirection::Transfer),
            (Some(_), None) => Some(LineDirection::Outgoing),
            (None, Some(_)) => Some(LineDirection::Incoming),
            (None, None) => None,
        }
    }

    pub fn has_source(self) -> bool {
        matches!(self, LineDirection::Outgoing | LineDirection::Transfer)
    }

    pub fn has_target(self) -> bool {
        matches!(self, LineDirection::Incoming | LineDirection::Transfer)
    }
}

/// Caller input for one document line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct NewMovementLine {
    #[validate(length(min = 1, max = 140, message = "item code must be 1-140 characters"))]
    pub item_code: String,
    #[validate(custom = "validate_positive_quantity")]
    pub quantity: Decimal,
    #[validate(custom = "validate_non_negative_rate")]
    pub rate: Option<Decimal>,
    pub source_location: Option<String>,
    pub target_location: Option<String>,
    pub batch_ref: Option<String>,
    #[serde(default)]
    pub serial_refs: Vec<String>,
}

impl NewMovementLine {
    pub fn incoming(item_code: &str, target: &str, quantity: Decimal, rate: Decimal) -> Self {
        Self {
            item_code: item_code.to_string(),
            quantity,
            rate: Some(rate),
            source_location: None,
            target_location: Some(target.to_string()),
            batch_ref: None,
            serial_refs: Vec::new(),
        }
    }

    pub fn outgoing(item_code: &str, source: &str, quantity: Decimal) -> Self {
        Self {
            item_code: item_code.to_string(),
            quantity,
            rate: None,
            source_location: Some(source.to_string()),
            target_location: None,
            batch_ref: None,
            serial_refs: Vec::new(),
        }
    }

    pub fn transfer(item_code: &str, source: &str, target: &str, quantity: Decimal) -> Self {
        Self {
            item_code: item_code.to_string(),
            quantity,
            rate: None,
            source_location: Some(source.to_string()),
            target_location: Some(target.to_string()),
            batch_ref: None,
            serial_refs: Vec::new(),
        }
    }

    pub fn with_batch(mut self, batch_ref: &str) -> Self {
        self.batch_ref = Some(batch_ref.to_string());
        self
    }

    pub fn with_serials<I, S>(mut self, serials: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.serial_refs = serials.into_iter().map(Into::into).collect();
        self
    }

    pub fn direction(&self) -> Option<LineDirection> {
        LineDirection::of(self.source_location.as_deref(), self.target_location.as_deref())
    }
}

/// Caller input for a new draft document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct NewMovement {
    pub kind: MovementKind,
    pub posting_date: NaiveDate,
    /// Midnight when omitted.
    pub posting_time: Option<NaiveTime>,
    #[validate(length(max = 140))]
    pub reference: Option<String>,
    #[validate(length(min = 1, message = "a document needs at least one line"))]
    pub lines: Vec<NewMovementLine>,
}

impl NewMovement {
    pub fn new(kind: MovementKind, posting_date: NaiveDate, lines: Vec<NewMovementLine>) -> Self {
        Self {
            kind,
            posting_date,
            posting_time: None,
            reference: None,
            lines,
        }
    }

    pub fn at(mut self, posting_time: NaiveTime) -> Self {
        self.posting_time = Some(posting_time);
        self
    }

    pub fn with_reference(mut self, reference: &str) -> Self {
        self.reference = Some(reference.to_string());
        self
    }
}

/// Replacement header fields and lines for a draft. The kind never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct UpdateMovement {
    pub posting_date: NaiveDate,
    pub posting_time: Option<NaiveTime>,
    #[validate(length(max = 140))]
    pub reference: Option<String>,
    #[validate(length(min = 1, message = "a document needs at least one line"))]
    pub lines: Vec<NewMovementLine>,
}

/// Validates every line and its shape for `kind`.
pub fn validate_lines(kind: MovementKind, lines: &[NewMovementLine]) -> Result<(), ServiceError> {
    for (index, line) in lines.iter().enumerate() {
        line.validate()?;
        validate_line_shape(
            kind,
            index + 1,
            &line.item_code,
            line.source_location.as_deref(),
            line.target_location.as_deref(),
            line.rate,
        )?;
    }
    Ok(())
}

/// Checks a line against the shape its document kind allows and returns its direction.
pub fn validate_line_shape(
    kind: MovementKind,
    line_no: usize,
    item_code: &str,
    source: Option<&str>,
    target: Option<&str>,
    rate: Option<Decimal>,
) -> Result<LineDirection, ServiceError> {
    let direction = LineDirection::of(source, target).ok_or_else(|| {
        ServiceError::validation(format!(
            "line {} ({}): a source or target location is required",
            line_no, item_code
        ))
    })?;

    if direction == LineDirection::Transfer && source == target {
        return Err(ServiceError::validation(format!(
            "line {} ({}): source and target location are the same",
            line_no, item_code
        )));
    }

    let allowed = match kind {
        MovementKind::Receipt => direction == LineDirection::Incoming,
        MovementKind::Issue => direction == LineDirection::Outgoing,
        MovementKind::Transfer => direction == LineDirection::Transfer,
        MovementKind::ReconciliationAdjustment => direction != LineDirection::Transfer,
        MovementKind::Manufacture | MovementKind::Repack => true,
    };
    if !allowed {
        return Err(ServiceError::validation(format!(
            "line {} ({}): {:?} line is not allowed on a {} document",
            line_no, item_code, direction, kind
        )));
    }

    if direction == LineDirection::Incoming && rate.is_none() {
        return Err(ServiceError::validation(format!(
            "line {} ({}): rate is required for an incoming line",
            line_no, item_code
        )));
    }

    Ok(direction)
}

/// A document header with its lines in line order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementDocument {
    pub header: stock_movement::Model,
    pub lines: Vec<stock_movement_line::Model>,
}

impl MovementDocument {
    /// Builds an unsaved draft with fresh ids. Input is assumed validated.
    pub fn draft(tenant_id: Uuid, movement: NewMovement, now: DateTime<Utc>) -> Self {
        let id = Uuid::new_v4();
        let header = stock_movement::Model {
            id,
            tenant_id,
            kind: movement.kind,
            posting_date: movement.posting_date,
            posting_time: movement.posting_time.unwrap_or(NaiveTime::MIN),
            status: MovementStatus::Draft,
            reference: movement.reference,
            created_at: now,
            updated_at: now,
            submitted_at: None,
            cancelled_at: None,
        };
        let lines = Self::draft_lines(id, movement.lines);
        Self { header, lines }
    }

    pub(crate) fn draft_lines(
        movement_id: Uuid,
        lines: Vec<NewMovementLine>,
    ) -> Vec<stock_movement_line::Model> {
        lines
            .into_iter()
            .enumerate()
            .map(|(index, line)| stock_movement_line::Model {
                id: Uuid::new_v4(),
                movement_id,
                line_no: index as i32 + 1,
                serial_refs: (!line.serial_refs.is_empty())
                    .then(|| serde_json::json!(line.serial_refs)),
                item_code: line.item_code,
                quantity: line.quantity,
                rate: line.rate,
                source_location: line.source_location,
                target_location: line.target_location,
                batch_ref: line.batch_ref,
            })
            .collect()
    }

    pub fn id(&self) -> Uuid {
        self.header.id
    }

    pub fn status(&self) -> MovementStatus {
        self.header.status
    }
}

/// Result of a successful submit or cancel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostingOutcome {
    pub document_id: Uuid,
    pub status: MovementStatus,
    pub balances: Vec<BalanceSnapshot>,
    pub warnings: Vec<ValuationWarning>,
}

/// One physically counted quantity handed to reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Observation {
    #[validate(length(min = 1, max = 140))]
    pub item_code: String,
    pub actual_qty: Decimal,
    #[validate(custom = "validate_non_negative_rate")]
    pub rate: Option<Decimal>,
    pub batch_ref: Option<String>,
    #[serde(default)]
    pub serial_refs: Vec<String>,
}

impl Observation {
    pub fn new(item_code: &str, actual_qty: Decimal) -> Self {
        Self {
            item_code: item_code.to_string(),
            actual_qty,
            rate: None,
            batch_ref: None,
            serial_refs: Vec::new(),
        }
    }

    pub fn with_rate(mut self, rate: Decimal) -> Self {
        self.rate = Some(rate);
        self
    }
}

/// Reconciliation result for one item whose count differed from the books.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adjustment {
    pub item_code: String,
    pub location_code: String,
    pub previous_qty: Decimal,
    pub actual_qty: Decimal,
    pub difference: Decimal,
    pub rate: Decimal,
    pub document_id: Uuid,
    pub balance: BalanceSnapshot,
    pub warnings: Vec<ValuationWarning>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    #[test]
    fn direction_follows_locations() {
        assert_eq!(LineDirection::of(Some("A"), Some("B")), Some(LineDirection::Transfer));
        assert_eq!(LineDirection::of(Some("A"), None), Some(LineDirection::Outgoing));
        assert_eq!(LineDirection::of(None, Some("B")), Some(LineDirection::Incoming));
        assert_eq!(LineDirection::of(None, None), None);
    }

    #[test]
    fn incoming_line_requires_rate() {
        let err = validate_line_shape(MovementKind::Receipt, 1, "WIDGET", None, Some("WH-1"), None);
        assert_matches!(err, Err(ServiceError::ValidationFailed(msg)) if msg.contains("rate"));
    }

    #[test]
    fn transfer_rate_is_optional() {
        let direction =
            validate_line_shape(MovementKind::Transfer, 1, "WIDGET", Some("WH-1"), Some("WH-2"), None);
        assert_matches!(direction, Ok(LineDirection::Transfer));
    }

    #[test]
    fn kind_restricts_line_shape() {
        assert_matches!(
            validate_line_shape(MovementKind::Issue, 1, "WIDGET", None, Some("WH-1"), Some(dec!(1))),
            Err(ServiceError::ValidationFailed(_))
        );
        assert_matches!(
            validate_line_shape(MovementKind::Repack, 1, "WIDGET", None, Some("WH-1"), Some(dec!(1))),
            Ok(LineDirection::Incoming)
        );
        assert_matches!(
            validate_line_shape(
                MovementKind::ReconciliationAdjustment,
                1,
                "WIDGET",
                Some("WH-1"),
                Some("WH-2"),
                None
            ),
            Err(ServiceError::ValidationFailed(_))
        );
    }

    #[test]
    fn same_location_transfer_is_rejected() {
        assert_matches!(
            validate_line_shape(MovementKind::Transfer, 2, "WIDGET", Some("WH-1"), Some("WH-1"), None),
            Err(ServiceError::ValidationFailed(msg)) if msg.contains("same")
        );
    }

    #[test]
    fn document_lines_are_checked_in_order() {
        let lines = vec![
            NewMovementLine::incoming("WIDGET", "WH-1", dec!(5), dec!(10)),
            NewMovementLine::outgoing("WIDGET", "WH-1", dec!(2)),
        ];
        assert_matches!(
            validate_lines(MovementKind::Receipt, &lines),
            Err(ServiceError::ValidationFailed(msg)) if msg.starts_with("line 2")
        );
        assert!(validate_lines(MovementKind::Repack, &lines).is_ok());
    }

    #[test]
    fn draft_numbers_lines_and_defaults_to_midnight() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).expect("valid date");
        let movement = NewMovement::new(
            MovementKind::Transfer,
            date,
            vec![
                NewMovementLine::transfer("WIDGET", "WH-1", "WH-2", dec!(3)),
                NewMovementLine::transfer("GADGET", "WH-1", "WH-2", dec!(1)).with_serials(["S1"]),
            ],
        );
        let document = MovementDocument::draft(Uuid::nil(), movement, Utc::now());
        assert_eq!(document.status(), MovementStatus::Draft);
        assert_eq!(document.header.posting_time, NaiveTime::MIN);
        assert_eq!(document.lines[1].line_no, 2);
        assert_eq!(document.lines[1].movement_id, document.id());
        assert_eq!(document.lines[1].serials(), vec!["S1".to_string()]);
        assert!(document.lines[0].serial_refs.is_none());
    }

    #[test]
    fn empty_document_is_invalid() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date");
        assert!(NewMovement::new(MovementKind::Receipt, date, vec![]).validate().is_err());
    }

    #[test]
    fn line_validation_rejects_non_positive_quantity() {
        let line = NewMovementLine::outgoing("WIDGET", "WH-1", dec!(0));
        assert!(line.validate().is_err());
        let line = NewMovementLine::incoming("WIDGET", "WH-1", dec!(2), dec!(-1));
        assert!(line.validate().is_err());
        let line = NewMovementLine::incoming("WIDGET", "WH-1", dec!(2), dec!(3.5));
        assert!(line.validate().is_ok());
    }
}
