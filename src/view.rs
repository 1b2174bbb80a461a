//! In-memory page of orders shared between the controller and the status
//! queue worker. It is a cached copy of the store, not the source of truth.
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::model::{Order, OrderPatch, OrderRow, OrderStatus};

#[derive(Debug, Clone, Default)]
pub struct OrderView {
    rows: Arc<RwLock<Vec<OrderRow>>>,
}

impl OrderView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the page; delivery statuses from a previous page are dropped.
    pub async fn replace(&self, orders: Vec<Order>) {
        let rows = orders.into_iter().map(OrderRow::from).collect();
        *self.rows.write().await = rows;
    }

    pub async fn snapshot(&self) -> Vec<OrderRow> {
        self.rows.read().await.clone()
    }

    pub async fn orders(&self) -> Vec<Order> {
        self.rows
            .read()
            .await
            .iter()
            .map(|r| r.order.clone())
            .collect()
    }

    pub async fn get(&self, doc_id: &str) -> Option<OrderRow> {
        self.rows
            .read()
            .await
            .iter()
            .find(|r| r.order.doc_id == doc_id)
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// Record a fetched delivery status. Returns false when the order is no
    /// longer on the page.
    pub async fn set_delivery_status(&self, doc_id: &str, delivery_status: &str) -> bool {
        let mut rows = self.rows.write().await;
        match rows.iter_mut().find(|r| r.order.doc_id == doc_id) {
            Some(row) => {
                row.delivery_status = Some(delivery_status.to_string());
                true
            }
            None => false,
        }
    }

    pub async fn apply_patch(&self, doc_id: &str, patch: &OrderPatch) -> bool {
        let mut rows = self.rows.write().await;
        match rows.iter_mut().find(|r| r.order.doc_id == doc_id) {
            Some(row) => {
                patch.apply(&mut row.order);
                true
            }
            None => false,
        }
    }

    pub async fn set_status(&self, doc_id: &str, status: OrderStatus) -> bool {
        self.apply_patch(doc_id, &OrderPatch::status(status)).await
    }

    /// Put a new order at the top of the page.
    pub async fn prepend(&self, order: Order) {
        self.rows.write().await.insert(0, OrderRow::from(order));
    }

    pub async fn remove(&self, doc_id: &str) -> Option<OrderRow> {
        let mut rows = self.rows.write().await;
        let idx = rows.iter().position(|r| r.order.doc_id == doc_id)?;
        Some(rows.remove(idx))
    }
}
