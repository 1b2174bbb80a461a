use anyhow::Result;
use futures::future::join_all;
use tracing::{info, instrument, warn};

use crate::db::{self, Pool};
use crate::model::{map_delivery_status, Order, OrderPatch, OrderRow, OrderStatus};
use crate::status_queue::{StatusError, StatusQueue};
use crate::view::OrderView;

/// Outcome of checking a batch of orders through the queue.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    /// Order identifier paired with the lookup error.
    pub failures: Vec<(String, StatusError)>,
}

impl BatchReport {
    pub fn summary(&self) -> String {
        format!("{} of {} status checks succeeded", self.succeeded, self.total)
    }
}

/// Queue every order before awaiting any of them, so submission order
/// matches `orders`.
#[instrument(skip_all, fields(total = orders.len()))]
pub async fn check_all(queue: &StatusQueue, orders: Vec<Order>) -> BatchReport {
    let mut ids = Vec::with_capacity(orders.len());
    let mut pending = Vec::with_capacity(orders.len());
    for order in orders {
        ids.push(order.order_id.clone());
        pending.push(queue.enqueue(order));
    }
    let results = join_all(pending).await;

    let mut report = BatchReport {
        total: ids.len(),
        ..Default::default()
    };
    for (order_id, result) in ids.into_iter().zip(results) {
        match result {
            Ok(_) => report.succeeded += 1,
            Err(err) => report.failures.push((order_id, err)),
        }
    }
    info!(succeeded = report.succeeded, failed = report.failures.len(), "status batch finished");
    report
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub doc_id: String,
    pub order_id: String,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub delivery_status: String,
}

/// Rows whose fetched delivery status maps to a different order status.
///
/// Only promotions are planned. A confirmed order whose courier status maps
/// back to pending is logged and left alone.
pub fn plan_reconciliation(rows: &[OrderRow]) -> Vec<StatusChange> {
    let mut changes = Vec::new();
    for row in rows {
        let Some(delivery) = row.delivery_status.as_deref() else {
            continue;
        };
        let mapped = map_delivery_status(delivery);
        let current = row.order.status;
        if mapped == current {
            continue;
        }
        if current == OrderStatus::Confirmed {
            warn!(
                order_id = %row.order.order_id,
                delivery_status = delivery,
                "courier reports a pending state for a confirmed order; not downgrading"
            );
            continue;
        }
        changes.push(StatusChange {
            doc_id: row.order.doc_id.clone(),
            order_id: row.order.order_id.clone(),
            from: current,
            to: mapped,
            delivery_status: delivery.to_string(),
        });
    }
    changes
}

/// Write the planned changes in one batch, then mirror them into the view.
/// Returns the number of orders updated.
#[instrument(skip_all)]
pub async fn reconcile(pool: &Pool, view: &OrderView) -> Result<usize> {
    let changes = plan_reconciliation(&view.snapshot().await);
    if changes.is_empty() {
        info!("order statuses already match the courier");
        return Ok(0);
    }
    let updates: Vec<(String, OrderPatch)> = changes
        .iter()
        .map(|c| (c.doc_id.clone(), OrderPatch::status(c.to)))
        .collect();
    db::batch_update_orders(pool, &updates).await?;
    for change in &changes {
        view.set_status(&change.doc_id, change.to).await;
        info!(order_id = %change.order_id, from = %change.from, to = %change.to, "order status reconciled");
    }
    Ok(changes.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(order_id: &str, status: OrderStatus, delivery: Option<&str>) -> OrderRow {
        let now = Utc::now();
        OrderRow {
            order: Order {
                doc_id: format!("doc-{order_id}"),
                order_id: order_id.into(),
                name: "Rahim".into(),
                phone: "01712345678".into(),
                items: "T-shirt".into(),
                address: "Dhaka".into(),
                amount: 500.0,
                reference: String::new(),
                status,
                tracking_code: None,
                notes: String::new(),
                created_at: now,
                updated_at: now,
            },
            delivery_status: delivery.map(str::to_string),
        }
    }

    #[test]
    fn plans_only_rows_with_a_differing_mapped_status() {
        let rows = vec![
            row("ORD-DR-1001", OrderStatus::Pending, None),
            row("ORD-DR-1002", OrderStatus::Pending, Some("delivered")),
            row("ORD-DR-1003", OrderStatus::Confirmed, Some("delivered")),
            row("ORD-DR-1004", OrderStatus::Pending, Some("in_review")),
        ];
        let changes = plan_reconciliation(&rows);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].order_id, "ORD-DR-1002");
        assert_eq!(changes[0].to, OrderStatus::Confirmed);
    }

    #[test]
    fn confirmed_orders_are_not_downgraded() {
        let rows = vec![row("ORD-DR-1005", OrderStatus::Confirmed, Some("pending"))];
        assert!(plan_reconciliation(&rows).is_empty());
    }

    #[test]
    fn unknown_courier_status_keeps_pending_orders_pending() {
        let rows = vec![row("ORD-DR-1006", OrderStatus::Pending, Some("lost_in_space"))];
        assert!(plan_reconciliation(&rows).is_empty());
    }
}
