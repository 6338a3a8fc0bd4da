mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::NaiveDate;
use common::{day, TestApp};
use rust_decimal_macros::dec;
use stateset_stock_ledger::{
    entities::{stock_item::ValuationMethod, stock_movement::MovementKind},
    errors::ServiceError,
    events::EventSender,
    models::{NewMovement, NewMovementLine},
    services::{
        factory::ServiceFactory,
        master_data::{
            BatchDefinition, ItemDefinition, ItemMaster, ItemSettings, LocationDirectory,
            LocationInfo, TrackingRequest, TrackingValidator, TrackingVerdict,
        },
    },
};
use uuid::Uuid;

fn batch(item: &str, id: &str, made: NaiveDate, expires: NaiveDate) -> BatchDefinition {
    BatchDefinition {
        item_code: item.to_string(),
        batch_id: id.to_string(),
        manufacturing_date: Some(made),
        expiry_date: Some(expires),
    }
}

async fn setup() -> TestApp {
    let app = TestApp::new().await;
    app.define_item(ItemDefinition::new("SERUM", ValuationMethod::Fifo).batch_tracked())
        .await;
    app.define_item(ItemDefinition::new("PHONE", ValuationMethod::Fifo).serial_tracked())
        .await;
    app.location("WH-1").await;
    app.location("WH-2").await;
    app
}

#[tokio::test]
async fn batch_dates_must_be_ordered() {
    let app = setup().await;
    let master = &app.services.master_data;

    let reversed = master
        .register_batch(app.tenant, batch("SERUM", "B-0", day(10), day(10)))
        .await;
    assert_matches!(reversed, Err(ServiceError::ValidationFailed(message)) if message.contains("before expiry"));

    master
        .register_batch(app.tenant, batch("SERUM", "B-1", day(1), day(31)))
        .await
        .expect("batch registered");
    let duplicate = master
        .register_batch(app.tenant, batch("SERUM", "B-1", day(1), day(31)))
        .await;
    assert_matches!(duplicate, Err(ServiceError::ValidationFailed(_)));

    let stored = master
        .get_batch(app.tenant, "SERUM", "B-1")
        .await
        .expect("lookup")
        .expect("stored batch");
    assert_eq!(stored.days_to_expiry(day(21)), Some(10));
}

#[tokio::test]
async fn batch_tracked_items_need_a_registered_live_batch() {
    let app = setup().await;
    app.services
        .master_data
        .register_batch(app.tenant, batch("SERUM", "B-1", day(1), day(10)))
        .await
        .expect("batch registered");

    let missing = app
        .post(
            MovementKind::Receipt,
            day(2),
            vec![NewMovementLine::incoming("SERUM", "WH-1", dec!(5), dec!(3))],
        )
        .await;
    assert_matches!(missing, Err(ServiceError::ValidationFailed(message)) if message.contains("needs a batch"));

    let unknown = app
        .post(
            MovementKind::Receipt,
            day(2),
            vec![NewMovementLine::incoming("SERUM", "WH-1", dec!(5), dec!(3)).with_batch("B-9")],
        )
        .await;
    assert_matches!(unknown, Err(ServiceError::ValidationFailed(message)) if message.contains("not registered"));

    let expired = app
        .post(
            MovementKind::Receipt,
            day(11),
            vec![NewMovementLine::incoming("SERUM", "WH-1", dec!(5), dec!(3)).with_batch("B-1")],
        )
        .await;
    assert_matches!(expired, Err(ServiceError::ValidationFailed(message)) if message.contains("expired"));

    app.post(
        MovementKind::Receipt,
        day(2),
        vec![NewMovementLine::incoming("SERUM", "WH-1", dec!(5), dec!(3)).with_batch("B-1")],
    )
    .await
    .expect("receipt with live batch");
    assert_eq!(app.on_hand("SERUM", "WH-1").await, dec!(5));
}

#[tokio::test]
async fn outgoing_batch_quantity_is_limited_to_what_is_left() {
    let app = setup().await;
    let master = &app.services.master_data;
    master
        .register_batch(app.tenant, batch("SERUM", "B-1", day(1), day(30)))
        .await
        .expect("batch registered");
    master
        .register_batch(app.tenant, batch("SERUM", "B-2", day(1), day(30)))
        .await
        .expect("batch registered");

    app.post(
        MovementKind::Receipt,
        day(2),
        vec![
            NewMovementLine::incoming("SERUM", "WH-1", dec!(2), dec!(3)).with_batch("B-1"),
            NewMovementLine::incoming("SERUM", "WH-1", dec!(8), dec!(3)).with_batch("B-2"),
        ],
    )
    .await
    .expect("receipt");

    // Enough stock at the location, but not in this batch.
    let err = app
        .post(
            MovementKind::Issue,
            day(3),
            vec![NewMovementLine::outgoing("SERUM", "WH-1", dec!(3)).with_batch("B-1")],
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationFailed(message) if message.contains("B-1"));

    app.post(
        MovementKind::Transfer,
        day(3),
        vec![NewMovementLine::transfer("SERUM", "WH-1", "WH-2", dec!(2)).with_batch("B-1")],
    )
    .await
    .expect("whole batch moved");
    assert_eq!(app.on_hand("SERUM", "WH-1").await, dec!(8));
    assert_eq!(app.on_hand("SERUM", "WH-2").await, dec!(2));
}

#[tokio::test]
async fn serial_tracked_items_need_one_serial_per_unit() {
    let app = setup().await;

    let short = app
        .post(
            MovementKind::Receipt,
            day(1),
            vec![NewMovementLine::incoming("PHONE", "WH-1", dec!(2), dec!(300)).with_serials(["SN-1"])],
        )
        .await;
    assert_matches!(short, Err(ServiceError::ValidationFailed(_)));

    let duplicated = app
        .post(
            MovementKind::Receipt,
            day(1),
            vec![NewMovementLine::incoming("PHONE", "WH-1", dec!(2), dec!(300))
                .with_serials(["SN-1", "SN-1"])],
        )
        .await;
    assert_matches!(duplicated, Err(ServiceError::ValidationFailed(message)) if message.contains("unique"));

    app.post(
        MovementKind::Receipt,
        day(1),
        vec![NewMovementLine::incoming("PHONE", "WH-1", dec!(2), dec!(300))
            .with_serials(["SN-1", "SN-2"])],
    )
    .await
    .expect("serialized receipt");

    let page = app
        .services
        .query_ledger(
            app.tenant,
            "PHONE",
            "WH-1",
            stateset_stock_ledger::services::stock_ledger::LedgerRange::all(),
            None,
            None,
        )
        .await
        .expect("ledger");
    assert_eq!(page.entries[0].serials(), vec!["SN-1".to_string(), "SN-2".to_string()]);
}

struct EveryItemFifo;

#[async_trait]
impl ItemMaster for EveryItemFifo {
    async fn item_settings(
        &self,
        _tenant_id: Uuid,
        _item_code: &str,
    ) -> Result<Option<ItemSettings>, ServiceError> {
        Ok(Some(ItemSettings {
            tracks_batch: false,
            tracks_serial: false,
            allows_negative_stock: false,
            valuation_method: ValuationMethod::Fifo,
        }))
    }
}

struct EveryLocationActive;

#[async_trait]
impl LocationDirectory for EveryLocationActive {
    async fn location(
        &self,
        _tenant_id: Uuid,
        _location_code: &str,
    ) -> Result<Option<LocationInfo>, ServiceError> {
        Ok(Some(LocationInfo { active: true }))
    }
}

/// Caps every line at 100 units.
struct QuantityCap;

#[async_trait]
impl TrackingValidator for QuantityCap {
    async fn validate(&self, request: &TrackingRequest) -> Result<TrackingVerdict, ServiceError> {
        if request.quantity > dec!(100) {
            return Ok(TrackingVerdict::invalid("more than 100 units on one line"));
        }
        Ok(TrackingVerdict::valid())
    }
}

#[tokio::test]
async fn external_collaborators_replace_database_master_data() {
    let app = TestApp::new().await;
    let (event_sender, _event_rx) = EventSender::channel(16);
    let services = ServiceFactory::new(app.db.clone(), event_sender, &app.config)
        .with_item_master(Arc::new(EveryItemFifo))
        .with_location_directory(Arc::new(EveryLocationActive))
        .with_tracking_validator(Arc::new(QuantityCap))
        .build();

    // Neither the item nor the location exists in the database master data.
    let id = services
        .create_draft(
            app.tenant,
            NewMovement::new(
                MovementKind::Receipt,
                day(1),
                vec![NewMovementLine::incoming("ANY", "ANYWHERE", dec!(40), dec!(2))],
            ),
        )
        .await
        .expect("draft");
    services.submit(app.tenant, id).await.expect("receipt posted");
    assert_eq!(
        services
            .get_balance(app.tenant, "ANY", "ANYWHERE")
            .await
            .expect("balance")
            .on_hand
            .round_dp(6),
        dec!(40)
    );

    let id = services
        .create_draft(
            app.tenant,
            NewMovement::new(
                MovementKind::Receipt,
                day(2),
                vec![NewMovementLine::incoming("ANY", "ANYWHERE", dec!(101), dec!(2))],
            ),
        )
        .await
        .expect("draft");
    assert_matches!(
        services.submit(app.tenant, id).await,
        Err(ServiceError::ValidationFailed(message)) if message.contains("100 units")
    );
}
