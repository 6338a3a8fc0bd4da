//! Item, location and batch lookups the posting engine depends on.
//!
//! The engine only sees the [`ItemMaster`], [`LocationDirectory`] and [`TrackingValidator`]
//! traits; [`MasterDataRepository`] and [`LedgerTrackingValidator`] are the sea-orm backed
//! implementations wired by the service factory.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::entities::stock_item::{self, ValuationMethod};
use crate::entities::{stock_batch, stock_ledger_entry, stock_location};
use crate::errors::ServiceError;
use crate::models::{batch, LineDirection};

/// Item settings that gate posting and valuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSettings {
    pub tracks_batch: bool,
    pub tracks_serial: bool,
    pub allows_negative_stock: bool,
    pub valuation_method: ValuationMethod,
}

impl From<&stock_item::Model> for ItemSettings {
    fn from(model: &stock_item::Model) -> Self {
        Self {
            tracks_batch: model.tracks_batch,
            tracks_serial: model.tracks_serial,
            allows_negative_stock: model.allows_negative_stock,
            valuation_method: model.valuation_method,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationInfo {
    pub active: bool,
}

#[async_trait]
pub trait ItemMaster: Send + Sync {
    async fn item_settings(
        &self,
        tenant_id: Uuid,
        item_code: &str,
    ) -> Result<Option<ItemSettings>, ServiceError>;
}

#[async_trait]
pub trait LocationDirectory: Send + Sync {
    async fn location(
        &self,
        tenant_id: Uuid,
        location_code: &str,
    ) -> Result<Option<LocationInfo>, ServiceError>;
}

/// One line as presented to the batch/serial validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingRequest {
    pub tenant_id: Uuid,
    pub item_code: String,
    pub settings: ItemSettings,
    pub direction: LineDirection,
    pub source_location: Option<String>,
    pub quantity: Decimal,
    pub batch_ref: Option<String>,
    pub serial_refs: Vec<String>,
    pub posting_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingVerdict {
    pub valid: bool,
    pub reason: Option<String>,
    /// Batch quantity left at the source before this line, when a batch was checked.
    pub remaining_quantity: Option<Decimal>,
}

impl TrackingVerdict {
    pub fn valid() -> Self {
        Self {
            valid: true,
            reason: None,
            remaining_quantity: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
            remaining_quantity: None,
        }
    }

    fn with_remaining(mut self, remaining: Option<Decimal>) -> Self {
        self.remaining_quantity = remaining;
        self
    }
}

#[async_trait]
pub trait TrackingValidator: Send + Sync {
    async fn validate(&self, request: &TrackingRequest) -> Result<TrackingVerdict, ServiceError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ItemDefinition {
    #[validate(length(min = 1, max = 140))]
    pub item_code: String,
    pub description: Option<String>,
    pub tracks_batch: bool,
    pub tracks_serial: bool,
    pub allows_negative_stock: bool,
    pub valuation_method: ValuationMethod,
}

impl ItemDefinition {
    pub fn new(item_code: &str, valuation_method: ValuationMethod) -> Self {
        Self {
            item_code: item_code.to_string(),
            description: None,
            tracks_batch: false,
            tracks_serial: false,
            allows_negative_stock: false,
            valuation_method,
        }
    }

    pub fn allow_negative_stock(mut self) -> Self {
        self.allows_negative_stock = true;
        self
    }

    pub fn batch_tracked(mut self) -> Self {
        self.tracks_batch = true;
        self
    }

    pub fn serial_tracked(mut self) -> Self {
        self.tracks_serial = true;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LocationDefinition {
    #[validate(length(min = 1, max = 140))]
    pub location_code: String,
    pub name: Option<String>,
    pub active: bool,
}

impl LocationDefinition {
    pub fn active(location_code: &str) -> Self {
        Self {
            location_code: location_code.to_string(),
            name: None,
            active: true,
        }
    }

    pub fn inactive(location_code: &str) -> Self {
        Self {
            active: false,
            ..Self::active(location_code)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BatchDefinition {
    #[validate(length(min = 1, max = 140))]
    pub item_code: String,
    #[validate(length(min = 1, max = 140))]
    pub batch_id: String,
    pub manufacturing_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
}

/// sea-orm backed item/location/batch master data.
#[derive(Clone)]
pub struct MasterDataRepository {
    db_pool: Arc<DatabaseConnection>,
}

impl MasterDataRepository {
    pub fn new(db_pool: Arc<DatabaseConnection>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self, definition), fields(item = %definition.item_code))]
    pub async fn upsert_item(
        &self,
        tenant_id: Uuid,
        definition: ItemDefinition,
    ) -> Result<stock_item::Model, ServiceError> {
        definition.validate()?;
        let db = &*self.db_pool;
        let now = Utc::now();

        let existing = stock_item::Entity::find_by_id((tenant_id, definition.item_code.clone()))
            .one(db)
            .await
            .map_err(ServiceError::db_error)?;

        let saved = match existing {
            Some(model) => {
                let mut active: stock_item::ActiveModel = model.into();
                active.description = Set(definition.description);
                active.tracks_batch = Set(definition.tracks_batch);
                active.tracks_serial = Set(definition.tracks_serial);
                active.allows_negative_stock = Set(definition.allows_negative_stock);
                active.valuation_method = Set(definition.valuation_method);
                active.updated_at = Set(now);
                active.update(db).await.map_err(ServiceError::db_error)?
            }
            None => stock_item::ActiveModel {
                tenant_id: Set(tenant_id),
                item_code: Set(definition.item_code),
                description: Set(definition.description),
                tracks_batch: Set(definition.tracks_batch),
                tracks_serial: Set(definition.tracks_serial),
                allows_negative_stock: Set(definition.allows_negative_stock),
                valuation_method: Set(definition.valuation_method),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(db)
            .await
            .map_err(ServiceError::db_error)?,
        };

        info!(tenant_id = %tenant_id, item = %saved.item_code, method = %saved.valuation_method, "item saved");
        Ok(saved)
    }

    #[instrument(skip(self, definition), fields(location = %definition.location_code))]
    pub async fn upsert_location(
        &self,
        tenant_id: Uuid,
        definition: LocationDefinition,
    ) -> Result<stock_location::Model, ServiceError> {
        definition.validate()?;
        let db = &*self.db_pool;
        let now = Utc::now();

        let existing =
            stock_location::Entity::find_by_id((tenant_id, definition.location_code.clone()))
                .one(db)
                .await
                .map_err(ServiceError::db_error)?;

        let saved = match existing {
            Some(model) => {
                let mut active: stock_location::ActiveModel = model.into();
                active.name = Set(definition.name);
                active.active = Set(definition.active);
                active.updated_at = Set(now);
                active.update(db).await.map_err(ServiceError::db_error)?
            }
            None => stock_location::ActiveModel {
                tenant_id: Set(tenant_id),
                location_code: Set(definition.location_code),
                name: Set(definition.name),
                active: Set(definition.active),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(db)
            .await
            .map_err(ServiceError::db_error)?,
        };

        Ok(saved)
    }

    /// Registers a batch. Manufacturing must precede expiry when both are given.
    #[instrument(skip(self, definition), fields(item = %definition.item_code, batch = %definition.batch_id))]
    pub async fn register_batch(
        &self,
        tenant_id: Uuid,
        definition: BatchDefinition,
    ) -> Result<stock_batch::Model, ServiceError> {
        definition.validate()?;
        if !batch::dates_are_ordered(definition.manufacturing_date, definition.expiry_date) {
            return Err(ServiceError::validation(format!(
                "batch {} of {}: manufacturing date must be before expiry date",
                definition.batch_id, definition.item_code
            )));
        }

        let db = &*self.db_pool;
        let exists = stock_batch::Entity::find_by_id((
            tenant_id,
            definition.item_code.clone(),
            definition.batch_id.clone(),
        ))
        .one(db)
        .await
        .map_err(ServiceError::db_error)?;
        if exists.is_some() {
            return Err(ServiceError::validation(format!(
                "batch {} of {} is already registered",
                definition.batch_id, definition.item_code
            )));
        }

        stock_batch::ActiveModel {
            tenant_id: Set(tenant_id),
            item_code: Set(definition.item_code),
            batch_id: Set(definition.batch_id),
            manufacturing_date: Set(definition.manufacturing_date),
            expiry_date: Set(definition.expiry_date),
            created_at: Set(Utc::now()),
        }
        .insert(db)
        .await
        .map_err(ServiceError::db_error)
    }

    pub async fn get_item(
        &self,
        tenant_id: Uuid,
        item_code: &str,
    ) -> Result<Option<stock_item::Model>, ServiceError> {
        stock_item::Entity::find_by_id((tenant_id, item_code.to_string()))
            .one(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)
    }

    pub async fn get_batch(
        &self,
        tenant_id: Uuid,
        item_code: &str,
        batch_id: &str,
    ) -> Result<Option<stock_batch::Model>, ServiceError> {
        stock_batch::Entity::find_by_id((tenant_id, item_code.to_string(), batch_id.to_string()))
            .one(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)
    }
}

#[async_trait]
impl ItemMaster for MasterDataRepository {
    async fn item_settings(
        &self,
        tenant_id: Uuid,
        item_code: &str,
    ) -> Result<Option<ItemSettings>, ServiceError> {
        Ok(self
            .get_item(tenant_id, item_code)
            .await?
            .as_ref()
            .map(ItemSettings::from))
    }
}

#[async_trait]
impl LocationDirectory for MasterDataRepository {
    async fn location(
        &self,
        tenant_id: Uuid,
        location_code: &str,
    ) -> Result<Option<LocationInfo>, ServiceError> {
        let location =
            stock_location::Entity::find_by_id((tenant_id, location_code.to_string()))
                .one(&*self.db_pool)
                .await
                .map_err(ServiceError::db_error)?;
        Ok(location.map(|l| LocationInfo { active: l.active }))
    }
}

/// Default batch/serial rules, checked against the batch master and the ledger.
#[derive(Clone)]
pub struct LedgerTrackingValidator {
    db_pool: Arc<DatabaseConnection>,
}

impl LedgerTrackingValidator {
    pub fn new(db_pool: Arc<DatabaseConnection>) -> Self {
        Self { db_pool }
    }

    /// Net ledger quantity of one batch at one location.
    pub async fn batch_quantity(
        &self,
        tenant_id: Uuid,
        item_code: &str,
        location_code: &str,
        batch_ref: &str,
    ) -> Result<Decimal, ServiceError> {
        let entries = stock_ledger_entry::Entity::find()
            .filter(stock_ledger_entry::Column::TenantId.eq(tenant_id))
            .filter(stock_ledger_entry::Column::ItemCode.eq(item_code))
            .filter(stock_ledger_entry::Column::LocationCode.eq(location_code))
            .filter(stock_ledger_entry::Column::BatchRef.eq(batch_ref))
            .all(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(entries.iter().map(|e| e.quantity_delta).sum())
    }

    fn check_serials(request: &TrackingRequest) -> Option<TrackingVerdict> {
        if !request.settings.tracks_serial {
            return None;
        }
        let distinct: HashSet<&str> = request.serial_refs.iter().map(String::as_str).collect();
        if distinct.len() != request.serial_refs.len() {
            return Some(TrackingVerdict::invalid(format!(
                "{}: serial numbers must be unique",
                request.item_code
            )));
        }
        if Decimal::from(distinct.len()) != request.quantity {
            return Some(TrackingVerdict::invalid(format!(
                "{}: {} serial numbers given for quantity {}",
                request.item_code,
                distinct.len(),
                request.quantity
            )));
        }
        None
    }
}

#[async_trait]
impl TrackingValidator for LedgerTrackingValidator {
    async fn validate(&self, request: &TrackingRequest) -> Result<TrackingVerdict, ServiceError> {
        if let Some(verdict) = Self::check_serials(request) {
            return Ok(verdict);
        }

        if !request.settings.tracks_batch {
            return Ok(TrackingVerdict::valid());
        }

        let Some(batch_ref) = request.batch_ref.as_deref() else {
            return Ok(TrackingVerdict::invalid(format!(
                "{} is batch tracked and needs a batch",
                request.item_code
            )));
        };

        let batch = stock_batch::Entity::find_by_id((
            request.tenant_id,
            request.item_code.clone(),
            batch_ref.to_string(),
        ))
        .one(&*self.db_pool)
        .await
        .map_err(ServiceError::db_error)?;

        let Some(batch) = batch else {
            return Ok(TrackingVerdict::invalid(format!(
                "batch {} is not registered for {}",
                batch_ref, request.item_code
            )));
        };

        if batch.is_expired(request.posting_date) {
            return Ok(TrackingVerdict::invalid(format!(
                "batch {} of {} expired on {}",
                batch_ref,
                request.item_code,
                batch
                    .expiry_date
                    .map(|d| d.to_string())
                    .unwrap_or_default()
            )));
        }

        let Some(source) = request
            .source_location
            .as_deref()
            .filter(|_| request.direction.has_source())
        else {
            return Ok(TrackingVerdict::valid());
        };

        let remaining = self
            .batch_quantity(request.tenant_id, &request.item_code, source, batch_ref)
            .await?;
        if remaining < request.quantity && !request.settings.allows_negative_stock {
            return Ok(TrackingVerdict::invalid(format!(
                "batch {} of {} has {} left at {}, {} requested",
                batch_ref, request.item_code, remaining, source, request.quantity
            ))
            .with_remaining(Some(remaining)));
        }

        Ok(TrackingVerdict::valid().with_remaining(Some(remaining)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request(serials: &[&str], quantity: Decimal) -> TrackingRequest {
        TrackingRequest {
            tenant_id: Uuid::nil(),
            item_code: "PHONE".into(),
            settings: ItemSettings {
                tracks_batch: false,
                tracks_serial: true,
                allows_negative_stock: false,
                valuation_method: ValuationMethod::Fifo,
            },
            direction: LineDirection::Incoming,
            source_location: None,
            quantity,
            batch_ref: None,
            serial_refs: serials.iter().map(|s| s.to_string()).collect(),
            posting_date: NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date"),
        }
    }

    #[test]
    fn serial_count_must_match_quantity() {
        assert!(LedgerTrackingValidator::check_serials(&request(&["A", "B"], dec!(2))).is_none());
        let verdict = LedgerTrackingValidator::check_serials(&request(&["A"], dec!(2)))
            .expect("count mismatch");
        assert!(!verdict.valid);
    }

    #[test]
    fn duplicate_serials_are_invalid() {
        let verdict = LedgerTrackingValidator::check_serials(&request(&["A", "A"], dec!(2)))
            .expect("duplicates");
        assert!(verdict.reason.unwrap_or_default().contains("unique"));
    }

    #[test]
    fn untracked_items_ignore_serials() {
        let mut req = request(&["A"], dec!(5));
        req.settings.tracks_serial = false;
        assert!(LedgerTrackingValidator::check_serials(&req).is_none());
    }
}
