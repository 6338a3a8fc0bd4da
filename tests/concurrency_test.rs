mod common;

use assert_matches::assert_matches;
use common::{day, round, TestApp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use stateset_stock_ledger::{
    entities::{stock_item::ValuationMethod, stock_movement::MovementKind},
    errors::ServiceError,
    models::{NewMovement, NewMovementLine},
    services::stock_ledger::LedgerRange,
};

#[tokio::test]
async fn concurrent_issues_never_oversell() {
    let app = TestApp::new().await;
    app.item("WIDGET", ValuationMethod::Fifo).await;
    app.location("WH-1").await;
    app.receive("WIDGET", "WH-1", dec!(10), dec!(5), day(1)).await;

    // Try 20 concurrent issues of 1 unit each, expect only 10 successes.
    let mut tasks = Vec::new();
    for _ in 0..20 {
        let services = app.services.clone();
        let tenant = app.tenant;
        tasks.push(tokio::spawn(async move {
            let id = services
                .create_draft(
                    tenant,
                    NewMovement::new(
                        MovementKind::Issue,
                        day(2),
                        vec![NewMovementLine::outgoing("WIDGET", "WH-1", dec!(1))],
                    ),
                )
                .await?;
            services.submit(tenant, id).await
        }));
    }

    let mut success = 0;
    for task in tasks {
        match task.await.expect("task completes") {
            Ok(_) => success += 1,
            Err(err) => assert_matches!(err, ServiceError::InsufficientStock { .. }),
        }
    }
    assert_eq!(success, 10, "exactly 10 issues should succeed; got {}", success);
    assert_eq!(app.on_hand("WIDGET", "WH-1").await, dec!(0));

    let page = app
        .services
        .query_ledger(app.tenant, "WIDGET", "WH-1", LedgerRange::all(), None, Some(50))
        .await
        .expect("ledger");
    assert_eq!(page.total_items, 11);
    let mut running = Decimal::ZERO;
    for entry in &page.entries {
        running += entry.quantity_delta;
        assert_eq!(round(entry.balance_after), round(running));
        assert!(round(entry.balance_after) >= Decimal::ZERO);
    }
}

#[tokio::test]
async fn disjoint_keys_post_side_by_side() {
    let app = TestApp::new().await;
    app.item("WIDGET", ValuationMethod::Fifo).await;
    app.item("GADGET", ValuationMethod::MovingAverage).await;
    app.location("WH-1").await;
    app.location("WH-2").await;

    let mut tasks = Vec::new();
    for (item, location) in [("WIDGET", "WH-1"), ("GADGET", "WH-2"), ("WIDGET", "WH-2")] {
        let services = app.services.clone();
        let tenant = app.tenant;
        tasks.push(tokio::spawn(async move {
            for d in 1..=3 {
                let id = services
                    .create_draft(
                        tenant,
                        NewMovement::new(
                            MovementKind::Receipt,
                            day(d),
                            vec![NewMovementLine::incoming(item, location, dec!(2), dec!(4))],
                        ),
                    )
                    .await?;
                services.submit(tenant, id).await?;
            }
            Ok::<_, ServiceError>(())
        }));
    }
    for task in tasks {
        task.await.expect("task completes").expect("receipts posted");
    }

    assert_eq!(app.on_hand("WIDGET", "WH-1").await, dec!(6));
    assert_eq!(app.on_hand("GADGET", "WH-2").await, dec!(6));
    assert_eq!(app.on_hand("WIDGET", "WH-2").await, dec!(6));
    assert_eq!(app.rate("GADGET", "WH-2").await, dec!(4));
}

#[tokio::test]
async fn idle_key_locks_are_pruned() {
    let app = TestApp::new().await;
    app.item("WIDGET", ValuationMethod::Fifo).await;
    app.location("WH-1").await;
    app.location("WH-2").await;
    app.receive("WIDGET", "WH-1", dec!(1), dec!(1), day(1)).await;
    app.receive("WIDGET", "WH-2", dec!(1), dec!(1), day(1)).await;

    assert_eq!(app.services.prune_locks(), 2);
    assert_eq!(app.services.prune_locks(), 0);
}
