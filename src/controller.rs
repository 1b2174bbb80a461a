//! Order list state and the operations behind every order-desk command.
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::balance::BalanceCache;
use crate::config::Config;
use crate::db::{self, Pool};
use crate::fraud::{self, BulkRatio, FraudError, FraudLookup, FraudReport};
use crate::model::{NewOrder, Order, OrderPatch, OrderRow, OrderStatus};
use crate::status_queue::{StatusError, StatusQueue};
use crate::steadfast::{classify_message, ConsignmentRequest, CourierError, CourierGateway, ErrorCategory};
use crate::sync::{self, BatchReport};
use crate::validation::{self, ValidationErrors};
use crate::view::OrderView;

#[derive(Debug, Error)]
pub enum DeskError {
    #[error("{}", describe_validation(.0))]
    Validation(BTreeMap<String, ValidationErrors>),
    #[error("invalid order: {0}")]
    InvalidOrder(#[from] ValidationErrors),
    #[error(transparent)]
    Courier(#[from] CourierError),
    #[error(transparent)]
    Status(#[from] StatusError),
    #[error(transparent)]
    Fraud(#[from] FraudError),
    #[error("orders sent to courier but not saved: {}", .sent.join(", "))]
    Persistence {
        sent: Vec<String>,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Store(#[from] anyhow::Error),
    #[error("order {0} not found")]
    NotFound(String),
    #[error("order {0} has neither an identifier nor a tracking code")]
    NoIdentifier(String),
    #[error("no orders selected")]
    NothingSelected,
}

fn describe_validation(errs: &BTreeMap<String, ValidationErrors>) -> String {
    let parts: Vec<String> = errs.iter().map(|(id, e)| format!("{id}: {e}")).collect();
    format!("validation failed: {}", parts.join(" | "))
}

/// Search text and status filter over the current page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub search: String,
    pub status: Option<OrderStatus>,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        if let Some(status) = self.status {
            if order.status != status {
                return false;
            }
        }
        let q = self.search.trim();
        if q.is_empty() {
            return true;
        }
        let lower = q.to_lowercase();
        order.name.to_lowercase().contains(&lower)
            || order.order_id.to_lowercase().contains(&lower)
            || order.phone.contains(q)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmedDispatch {
    pub doc_id: String,
    pub order_id: String,
    pub tracking_code: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedDispatch {
    pub order: Order,
    pub reason: String,
    pub category: ErrorCategory,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchOutcome {
    pub confirmed: Vec<ConfirmedDispatch>,
    pub failed: Vec<FailedDispatch>,
}

/// Orders on their way to the courier. After a submit only the failed ones
/// remain, ready to be fixed, discarded or retried.
#[derive(Debug, Clone)]
pub struct Dispatch {
    orders: Vec<Order>,
}

impl Dispatch {
    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn is_bulk(&self) -> bool {
        self.orders.len() > 1
    }

    pub fn is_closed(&self) -> bool {
        self.orders.is_empty()
    }

    /// Drop an order by identifier. Returns whether it was present.
    pub fn discard(&mut self, order_id: &str) -> bool {
        let before = self.orders.len();
        self.orders.retain(|o| o.order_id != order_id);
        self.orders.len() != before
    }

    /// Swap in an edited copy of an order, matched by document id.
    pub fn replace(&mut self, order: Order) -> bool {
        match self.orders.iter_mut().find(|o| o.doc_id == order.doc_id) {
            Some(slot) => {
                *slot = order;
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSettings {
    pub page_size: u32,
    pub balance_cache_seconds: u64,
}

impl ControllerSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            page_size: cfg.app.page_size,
            balance_cache_seconds: cfg.app.balance_cache_seconds,
        }
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            page_size: 10,
            balance_cache_seconds: 300,
        }
    }
}

pub struct OrderListController {
    pool: Pool,
    gateway: Arc<dyn CourierGateway>,
    fraud: Arc<dyn FraudLookup>,
    view: OrderView,
    queue: StatusQueue,
    balance: BalanceCache,
    page_size: u32,
    current_page: u32,
    total_pages: u32,
    total_orders: i64,
    filter: OrderFilter,
    selected: HashSet<String>,
}

impl OrderListController {
    /// Must be called inside a tokio runtime; the status queue worker is
    /// spawned here.
    pub fn new(
        pool: Pool,
        gateway: Arc<dyn CourierGateway>,
        fraud: Arc<dyn FraudLookup>,
        settings: ControllerSettings,
    ) -> Self {
        let view = OrderView::new();
        let queue = StatusQueue::spawn(gateway.clone(), view.clone());
        Self {
            pool,
            gateway,
            fraud,
            view,
            queue,
            balance: BalanceCache::new(settings.balance_cache_seconds),
            page_size: settings.page_size.max(1),
            current_page: 1,
            total_pages: 1,
            total_orders: 0,
            filter: OrderFilter::default(),
            selected: HashSet::new(),
        }
    }

    pub fn view(&self) -> &OrderView {
        &self.view
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn total_orders(&self) -> i64 {
        self.total_orders
    }

    pub fn filter(&self) -> &OrderFilter {
        &self.filter
    }

    pub fn set_filter(&mut self, filter: OrderFilter) {
        self.filter = filter;
    }

    #[instrument(skip(self))]
    pub async fn load_page(&mut self, page: u32) -> Result<(), DeskError> {
        let page = db::list_orders(&self.pool, page, self.page_size).await?;
        self.current_page = page.current_page;
        self.total_pages = page.total_pages;
        self.total_orders = page.total_orders;
        let ids: HashSet<&str> = page.orders.iter().map(|o| o.doc_id.as_str()).collect();
        self.selected.retain(|id| ids.contains(id.as_str()));
        self.view.replace(page.orders).await;
        Ok(())
    }

    /// Work on an explicit set of orders instead of a store page.
    pub async fn load_orders(&mut self, orders: Vec<Order>) {
        self.selected.clear();
        self.current_page = 1;
        self.total_pages = 1;
        self.total_orders = orders.len() as i64;
        self.view.replace(orders).await;
    }

    /// Rows of the current page that pass the filter, in page order.
    pub async fn filtered(&self) -> Vec<OrderRow> {
        self.view
            .snapshot()
            .await
            .into_iter()
            .filter(|r| self.filter.matches(&r.order))
            .collect()
    }

    /// Returns whether the order is selected afterwards.
    pub fn toggle_select(&mut self, doc_id: &str) -> bool {
        if self.selected.remove(doc_id) {
            false
        } else {
            self.selected.insert(doc_id.to_string());
            true
        }
    }

    /// Select every visible row, or clear them all if they already are.
    pub async fn select_all_visible(&mut self) {
        let visible: Vec<String> = self
            .filtered()
            .await
            .into_iter()
            .map(|r| r.order.doc_id)
            .collect();
        if !visible.is_empty() && visible.iter().all(|id| self.selected.contains(id)) {
            for id in &visible {
                self.selected.remove(id);
            }
        } else {
            self.selected.extend(visible);
        }
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    pub fn is_selected(&self, doc_id: &str) -> bool {
        self.selected.contains(doc_id)
    }

    pub async fn selected_orders(&self) -> Vec<Order> {
        self.view
            .orders()
            .await
            .into_iter()
            .filter(|o| self.selected.contains(&o.doc_id))
            .collect()
    }

    #[instrument(skip_all)]
    pub async fn create_order(&mut self, data: &NewOrder) -> Result<Order, DeskError> {
        validation::validate_new_order(data)?;
        let order = db::create_order(&self.pool, data).await?;
        self.total_orders += 1;
        if self.current_page == 1 {
            self.view.prepend(order.clone()).await;
        }
        info!(order_id = %order.order_id, "order created");
        Ok(order)
    }

    #[instrument(skip(self, patch))]
    pub async fn update_order(&mut self, doc_id: &str, patch: &OrderPatch) -> Result<(), DeskError> {
        validation::validate_patch(patch)?;
        if db::get_order(&self.pool, doc_id).await?.is_none() {
            return Err(DeskError::NotFound(doc_id.to_string()));
        }
        db::update_order(&self.pool, doc_id, patch).await?;
        self.view.apply_patch(doc_id, patch).await;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_order(&mut self, doc_id: &str) -> Result<(), DeskError> {
        if db::get_order(&self.pool, doc_id).await?.is_none() {
            return Err(DeskError::NotFound(doc_id.to_string()));
        }
        db::delete_order(&self.pool, doc_id).await?;
        self.view.remove(doc_id).await;
        self.selected.remove(doc_id);
        self.total_orders = (self.total_orders - 1).max(0);
        Ok(())
    }

    /// Queue a status check for one order on the page and wait for it.
    pub async fn check_status(&self, doc_id: &str) -> Result<String, DeskError> {
        let row = self
            .view
            .get(doc_id)
            .await
            .ok_or_else(|| DeskError::NotFound(doc_id.to_string()))?;
        let order = row.order;
        if order.order_id.trim().is_empty() && order.tracking_code().is_none() {
            return Err(DeskError::NoIdentifier(doc_id.to_string()));
        }
        Ok(self.queue.enqueue(order).await?)
    }

    pub async fn check_all_visible(&self) -> BatchReport {
        let orders = self.filtered().await.into_iter().map(|r| r.order).collect();
        sync::check_all(&self.queue, orders).await
    }

    pub async fn reconcile(&self) -> Result<usize, DeskError> {
        Ok(sync::reconcile(&self.pool, &self.view).await?)
    }

    /// Start a dispatch for one order, or for the selection when `doc_id`
    /// is `None`.
    pub async fn begin_dispatch(&self, doc_id: Option<&str>) -> Result<Dispatch, DeskError> {
        let orders = match doc_id {
            Some(id) => {
                let row = self
                    .view
                    .get(id)
                    .await
                    .ok_or_else(|| DeskError::NotFound(id.to_string()))?;
                vec![row.order]
            }
            None => self.selected_orders().await,
        };
        if orders.is_empty() {
            return Err(DeskError::NothingSelected);
        }
        Ok(Dispatch { orders })
    }

    /// Send the dispatch's orders to the courier and persist the accepted
    /// ones as confirmed. Nothing is sent when any order fails validation.
    #[instrument(skip_all, fields(orders = dispatch.orders.len()))]
    pub async fn submit(&mut self, dispatch: &mut Dispatch) -> Result<DispatchOutcome, DeskError> {
        if dispatch.is_closed() {
            return Err(DeskError::NothingSelected);
        }
        let mut invalid = BTreeMap::new();
        for order in &dispatch.orders {
            if let Err(errs) = validation::validate_for_dispatch(order) {
                invalid.insert(order.order_id.clone(), errs);
            }
        }
        if !invalid.is_empty() {
            return Err(DeskError::Validation(invalid));
        }

        let outcome = if dispatch.is_bulk() {
            self.send_bulk(&dispatch.orders).await?
        } else {
            self.send_single(&dispatch.orders[0]).await?
        };
        dispatch.orders = outcome.failed.iter().map(|f| f.order.clone()).collect();

        if outcome.confirmed.is_empty() {
            return Ok(outcome);
        }
        self.balance.invalidate().await;

        let updates: Vec<(String, OrderPatch)> = outcome
            .confirmed
            .iter()
            .map(|c| (c.doc_id.clone(), OrderPatch::confirmed_with(&c.tracking_code)))
            .collect();
        if let Err(source) = db::batch_update_orders(&self.pool, &updates).await {
            let sent: Vec<String> = outcome.confirmed.iter().map(|c| c.order_id.clone()).collect();
            warn!(?source, sent = ?sent, "courier accepted orders but saving them failed");
            return Err(DeskError::Persistence { sent, source });
        }
        for (doc_id, patch) in &updates {
            self.view.apply_patch(doc_id, patch).await;
            self.selected.remove(doc_id);
        }
        info!(
            confirmed = outcome.confirmed.len(),
            failed = outcome.failed.len(),
            "dispatch submitted"
        );
        Ok(outcome)
    }

    async fn send_single(&self, order: &Order) -> Result<DispatchOutcome, DeskError> {
        let req = ConsignmentRequest::from_order(order);
        let consignment = self.gateway.create_order(&req).await.map_err(|err| {
            warn!(order_id = %order.order_id, category = ?err.category(), "consignment rejected: {err}");
            err
        })?;
        let tracking_code = consignment.tracking_code.trim();
        if tracking_code.is_empty() {
            warn!(order_id = %order.order_id, "consignment accepted without a tracking code");
            return Err(CourierError::InvalidResponse("no tracking code".into()).into());
        }
        Ok(DispatchOutcome {
            confirmed: vec![ConfirmedDispatch {
                doc_id: order.doc_id.clone(),
                order_id: order.order_id.clone(),
                tracking_code: tracking_code.to_string(),
            }],
            failed: Vec::new(),
        })
    }

    async fn send_bulk(&self, orders: &[Order]) -> Result<DispatchOutcome, DeskError> {
        let reqs: Vec<ConsignmentRequest> = orders.iter().map(ConsignmentRequest::from_order).collect();
        let results = self.gateway.create_bulk_orders(&reqs).await?;

        let mut outcome = DispatchOutcome::default();
        for order in orders {
            let Some(result) = results.iter().find(|r| r.invoice == order.order_id) else {
                outcome.failed.push(FailedDispatch {
                    order: order.clone(),
                    reason: "No result returned for this order".into(),
                    category: ErrorCategory::Other,
                });
                continue;
            };
            match result.tracking_code().filter(|_| result.is_success()) {
                Some(code) => outcome.confirmed.push(ConfirmedDispatch {
                    doc_id: order.doc_id.clone(),
                    order_id: order.order_id.clone(),
                    tracking_code: code.to_string(),
                }),
                None => {
                    let reason = result.failure_reason();
                    let category = classify_message(&reason);
                    warn!(order_id = %order.order_id, ?category, reason = %reason, "bulk item rejected");
                    outcome.failed.push(FailedDispatch {
                        order: order.clone(),
                        reason,
                        category,
                    });
                }
            }
        }
        Ok(outcome)
    }

    pub async fn balance(&self) -> Result<f64, DeskError> {
        Ok(self
            .balance
            .get_or_fetch(self.gateway.as_ref(), Utc::now())
            .await?)
    }

    pub async fn fraud_check(&self, phone: &str) -> Result<FraudReport, DeskError> {
        Ok(self.fraud.check_phone(phone).await?)
    }

    /// Courier history summed over the distinct phones of the selection.
    pub async fn bulk_courier_ratio(&self) -> Result<Option<BulkRatio>, DeskError> {
        let mut seen = HashSet::new();
        let phones: Vec<String> = self
            .selected_orders()
            .await
            .into_iter()
            .map(|o| o.phone.trim().to_string())
            .filter(|p| !p.is_empty() && seen.insert(p.clone()))
            .collect();
        Ok(fraud::bulk_courier_ratio(self.fraud.as_ref(), &phones).await?)
    }

    /// Stop the status queue after pending checks finish.
    pub async fn shutdown(self) {
        self.queue.shutdown().await;
    }
}
