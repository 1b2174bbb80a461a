//! Serialised delivery-status lookups.
//!
//! A single worker task owns the receiving end of an unbounded channel and
//! handles one lookup at a time in submission order, so the courier never
//! sees more than one status request in flight from this process no matter
//! how many callers ask at once.
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::model::Order;
use crate::steadfast::{CourierError, CourierGateway};
use crate::view::OrderView;

#[derive(Debug, Error)]
pub enum StatusError {
    #[error(transparent)]
    Lookup(#[from] CourierError),
    #[error("status queue is closed")]
    Closed,
}

/// Deferred lookup plus the channel that settles the caller's future.
struct StatusQueueItem {
    order: Order,
    reply: oneshot::Sender<Result<String, CourierError>>,
}

#[derive(Debug)]
pub struct StatusQueue {
    tx: mpsc::UnboundedSender<StatusQueueItem>,
    worker: JoinHandle<()>,
}

impl std::fmt::Debug for StatusQueueItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusQueueItem")
            .field("order_id", &self.order.order_id)
            .finish_non_exhaustive()
    }
}

impl StatusQueue {
    /// Start the worker. Successful lookups are written into `view`.
    pub fn spawn(gateway: Arc<dyn CourierGateway>, view: OrderView) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(drain(gateway, view, rx));
        Self { tx, worker }
    }

    /// Queue a status check for `order`.
    ///
    /// The position in the queue is fixed when this is called, not when the
    /// returned future is first polled. Dropping the future does not cancel
    /// the lookup; its view update still happens.
    pub fn enqueue(
        &self,
        order: Order,
    ) -> impl Future<Output = Result<String, StatusError>> + Send + 'static {
        let (reply, rx) = oneshot::channel();
        let order_id = order.order_id.clone();
        let sent = self.tx.send(StatusQueueItem { order, reply }).is_ok();
        debug!(order_id = %order_id, queued = sent, "status check enqueued");
        async move {
            if !sent {
                return Err(StatusError::Closed);
            }
            match rx.await {
                Ok(result) => result.map_err(StatusError::from),
                Err(_) => Err(StatusError::Closed),
            }
        }
    }

    /// Stop accepting work and wait for queued items to finish.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(err) = self.worker.await {
            warn!(?err, "status queue worker ended abnormally");
        }
    }
}

async fn drain(
    gateway: Arc<dyn CourierGateway>,
    view: OrderView,
    mut rx: mpsc::UnboundedReceiver<StatusQueueItem>,
) {
    while let Some(StatusQueueItem { order, reply }) = rx.recv().await {
        let result = lookup(gateway.as_ref(), &order).await;
        if let Ok(delivery_status) = &result {
            if !view.set_delivery_status(&order.doc_id, delivery_status).await {
                debug!(order_id = %order.order_id, "order left the page before its status arrived");
            }
        }
        // The caller may have stopped waiting.
        let _ = reply.send(result);
    }
    info!("status queue drained and closed");
}

/// Identifier first; on failure, one retry by tracking code when the order
/// has one. A double failure reports the identifier error.
#[instrument(skip_all, fields(order_id = %order.order_id))]
pub async fn lookup(gateway: &dyn CourierGateway, order: &Order) -> Result<String, CourierError> {
    let order_id = order.order_id.trim();
    let first = if order_id.is_empty() {
        CourierError::InvalidRequest("order has no identifier".into())
    } else {
        match gateway.status_by_invoice(order_id).await {
            Ok(resp) => return Ok(resp.delivery_status),
            Err(err) => err,
        }
    };
    let Some(code) = order.tracking_code() else {
        warn!(error = %first, "status lookup by identifier failed; no tracking code to fall back on");
        return Err(first);
    };
    match gateway.status_by_tracking_code(code).await {
        Ok(resp) => {
            info!(error = %first, "identifier lookup failed; resolved by tracking code");
            Ok(resp.delivery_status)
        }
        Err(second) => {
            warn!(error = %first, fallback_error = %second, "status lookup failed by identifier and tracking code");
            Err(first)
        }
    }
}
