mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{order, status, RecordingGateway};
use futures::future::join_all;
use orderdesk::status_queue::{StatusError, StatusQueue};
use orderdesk::steadfast::CourierError;
use orderdesk::view::OrderView;

#[tokio::test]
async fn lookups_run_one_at_a_time_in_submission_order() {
    let gw = RecordingGateway::with_delay(Duration::from_millis(5));
    for i in 1..=5 {
        gw.on_status(&format!("invoice:ORD-DR-100{i}"), status("in_review")).await;
    }
    let queue = StatusQueue::spawn(Arc::new(gw.clone()), OrderView::new());

    let pending: Vec<_> = (1..=5)
        .map(|i| queue.enqueue(order(&format!("ORD-DR-100{i}"), None)))
        .collect();
    let results = join_all(pending).await;

    assert!(results.iter().all(|r| r.as_deref().ok() == Some("in_review")));
    assert_eq!(
        gw.calls().await,
        vec![
            "invoice:ORD-DR-1001",
            "invoice:ORD-DR-1002",
            "invoice:ORD-DR-1003",
            "invoice:ORD-DR-1004",
            "invoice:ORD-DR-1005",
        ]
    );
    assert_eq!(gw.max_in_flight(), 1);
}

#[tokio::test]
async fn order_is_fixed_at_enqueue_not_at_await() {
    let gw = RecordingGateway::default();
    gw.on_status("invoice:A", status("pending")).await;
    gw.on_status("invoice:B", status("delivered")).await;
    let queue = StatusQueue::spawn(Arc::new(gw.clone()), OrderView::new());

    let a = queue.enqueue(order("A", None));
    let b = queue.enqueue(order("B", None));
    assert_eq!(b.await.unwrap(), "delivered");
    assert_eq!(a.await.unwrap(), "pending");
    assert_eq!(gw.calls().await, vec!["invoice:A", "invoice:B"]);
}

#[tokio::test]
async fn a_rejection_does_not_affect_its_neighbours() {
    let gw = RecordingGateway::default();
    gw.on_status("invoice:ORD-DR-1", status("delivered")).await;
    gw.on_status("invoice:ORD-DR-3", status("cancelled")).await;
    let queue = StatusQueue::spawn(Arc::new(gw.clone()), OrderView::new());

    let results = join_all(vec![
        queue.enqueue(order("ORD-DR-1", None)),
        queue.enqueue(order("ORD-DR-2", None)),
        queue.enqueue(order("ORD-DR-3", None)),
    ])
    .await;

    assert_eq!(results[0].as_deref().unwrap(), "delivered");
    assert!(results[1].is_err());
    assert_eq!(results[2].as_deref().unwrap(), "cancelled");
}

#[tokio::test]
async fn falls_back_to_tracking_code_exactly_once() {
    let gw = RecordingGateway::default();
    gw.on_status("tracking:SF77", status("partial_delivered")).await;
    let queue = StatusQueue::spawn(Arc::new(gw.clone()), OrderView::new());

    let got = queue.enqueue(order("ORD-DR-1005", Some("SF77"))).await.unwrap();
    assert_eq!(got, "partial_delivered");
    assert_eq!(gw.calls().await, vec!["invoice:ORD-DR-1005", "tracking:SF77"]);
}

#[tokio::test]
async fn double_failure_reports_the_identifier_error() {
    let gw = RecordingGateway::default();
    gw.on_status("invoice:ORD-DR-1006", Err(CourierError::api(404, "Invoice not found")))
        .await;
    gw.on_status("tracking:SF88", Err(CourierError::api(500, "Server error")))
        .await;
    let queue = StatusQueue::spawn(Arc::new(gw.clone()), OrderView::new());

    let err = queue
        .enqueue(order("ORD-DR-1006", Some("SF88")))
        .await
        .unwrap_err();
    match err {
        StatusError::Lookup(CourierError::Api { http_status, message }) => {
            assert_eq!(http_status, 404);
            assert_eq!(message, "Invoice not found");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(gw.calls().await.len(), 2);
}

#[tokio::test]
async fn order_without_tracking_code_rejects_and_leaves_view_alone() {
    let gw = RecordingGateway::default();
    let view = OrderView::new();
    let o = order("ORD-DR-1001", None);
    view.replace(vec![o.clone()]).await;
    let queue = StatusQueue::spawn(Arc::new(gw.clone()), view.clone());

    assert!(queue.enqueue(o.clone()).await.is_err());
    assert_eq!(gw.calls().await, vec!["invoice:ORD-DR-1001"]);
    let row = view.get(&o.doc_id).await.unwrap();
    assert_eq!(row.delivery_status, None);
}

#[tokio::test]
async fn success_is_written_into_the_view_even_if_caller_stops_waiting() {
    let gw = RecordingGateway::default();
    gw.on_status("invoice:ORD-DR-1", status("hold")).await;
    gw.on_status("invoice:ORD-DR-2", status("delivered")).await;
    let view = OrderView::new();
    let first = order("ORD-DR-1", None);
    let second = order("ORD-DR-2", None);
    view.replace(vec![first.clone(), second.clone()]).await;
    let queue = StatusQueue::spawn(Arc::new(gw.clone()), view.clone());

    drop(queue.enqueue(first.clone()));
    assert_eq!(queue.enqueue(second.clone()).await.unwrap(), "delivered");

    let rows = view.snapshot().await;
    assert_eq!(rows[0].delivery_status.as_deref(), Some("hold"));
    assert_eq!(rows[1].delivery_status.as_deref(), Some("delivered"));
}

#[tokio::test]
async fn shutdown_finishes_queued_work() {
    let gw = RecordingGateway::with_delay(Duration::from_millis(2));
    gw.on_status("invoice:X", status("delivered")).await;
    let view = OrderView::new();
    let x = order("X", None);
    view.replace(vec![x.clone()]).await;
    let queue = StatusQueue::spawn(Arc::new(gw.clone()), view.clone());

    let pending = queue.enqueue(x.clone());
    queue.shutdown().await;
    assert_eq!(pending.await.unwrap(), "delivered");
    assert_eq!(
        view.get(&x.doc_id).await.unwrap().delivery_status.as_deref(),
        Some("delivered")
    );
}
