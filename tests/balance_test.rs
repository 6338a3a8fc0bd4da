mod common;

use assert_matches::assert_matches;
use common::{day, round, TestApp};
use rust_decimal_macros::dec;
use stateset_stock_ledger::{
    entities::stock_item::ValuationMethod, errors::ServiceError, models::BalanceField,
};

async fn stocked() -> TestApp {
    let app = TestApp::new().await;
    app.item("WIDGET", ValuationMethod::Fifo).await;
    app.location("WH-1").await;
    app.receive("WIDGET", "WH-1", dec!(10), dec!(3), day(1)).await;
    app
}

#[tokio::test]
async fn first_access_creates_one_zeroed_row() {
    let app = TestApp::new().await;
    let key = app.key("WIDGET", "WH-1");
    let balances = &app.services.balances;

    assert!(balances.get(&key).await.expect("get").is_none());
    let (first, second) = tokio::join!(balances.get_or_create(&key), balances.get_or_create(&key));
    let first = first.expect("first access");
    let second = second.expect("second access");
    assert_eq!(first.key(), second.key());
    assert_eq!(round(first.on_hand), dec!(0));
    assert!(balances.get(&key).await.expect("get").is_some());
}

#[tokio::test]
async fn reservations_reduce_available_only() {
    let app = stocked().await;
    let key = app.key("WIDGET", "WH-1");
    let balances = &app.services.balances;

    let reserved = balances.reserve(&key, dec!(4)).await.expect("reserved");
    assert_eq!(round(reserved.on_hand), dec!(10));
    assert_eq!(round(reserved.reserved), dec!(4));
    assert_eq!(round(reserved.available), dec!(6));
    assert_eq!(round(reserved.stock_value), dec!(30));
    assert!(reserved.is_consistent());

    let err = balances.reserve(&key, dec!(7)).await.unwrap_err();
    assert_matches!(
        err,
        ServiceError::InsufficientAvailable { requested, available, .. }
            if requested == dec!(7) && round(available) == dec!(6)
    );
}

#[tokio::test]
async fn over_release_clamps_at_zero() {
    let app = stocked().await;
    let key = app.key("WIDGET", "WH-1");
    let balances = &app.services.balances;

    balances.reserve(&key, dec!(3)).await.expect("reserved");
    let released = balances.release(&key, dec!(5)).await.expect("released");
    assert_eq!(round(released.reserved), dec!(0));
    assert_eq!(round(released.available), dec!(10));

    assert_matches!(
        balances.release(&key, dec!(0)).await,
        Err(ServiceError::ValidationFailed(_))
    );
}

#[tokio::test]
async fn reserving_an_unknown_item_is_not_found() {
    let app = stocked().await;
    assert_matches!(
        app.services
            .balances
            .reserve(&app.key("GIZMO", "WH-1"), dec!(1))
            .await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn planning_fields_feed_projected_quantity() {
    let app = stocked().await;
    let key = app.key("WIDGET", "WH-1");
    let balances = &app.services.balances;

    balances
        .apply_delta(&key, BalanceField::OnOrder, dec!(5))
        .await
        .expect("on order");
    balances
        .apply_delta(&key, BalanceField::Planned, dec!(2))
        .await
        .expect("planned");
    let updated = balances.reserve(&key, dec!(1)).await.expect("reserved");
    assert_eq!(round(updated.projected), dec!(16));

    let negative = balances
        .apply_delta(&key, BalanceField::OnOrder, dec!(-6))
        .await;
    assert_matches!(negative, Err(ServiceError::ValidationFailed(_)));
    assert_eq!(
        round(balances.snapshot(&key).await.expect("snapshot").on_order),
        dec!(5)
    );
}
