#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use orderdesk::db::{self, Pool};
use orderdesk::fraud::{FraudError, FraudLookup, FraudReport};
use orderdesk::model::{NewOrder, Order, OrderStatus};
use orderdesk::steadfast::{
    BulkItemResult, Consignment, ConsignmentRequest, CourierError, CourierGateway, StatusResponse,
};

type Scripted<T> = Arc<Mutex<VecDeque<Result<T, CourierError>>>>;

/// Courier double that replays scripted responses and records every call
/// as `kind:argument`.
#[derive(Clone, Default)]
pub struct RecordingGateway {
    status: Arc<Mutex<HashMap<String, VecDeque<Result<StatusResponse, CourierError>>>>>,
    creates: Scripted<Consignment>,
    bulks: Scripted<Vec<BulkItemResult>>,
    balances: Scripted<f64>,
    calls: Arc<Mutex<Vec<String>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl RecordingGateway {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    /// Script the next response for `key`, e.g. `invoice:ORD-DR-1001` or
    /// `tracking:SF123`. Unscripted lookups answer 404.
    pub async fn on_status(&self, key: &str, resp: Result<StatusResponse, CourierError>) {
        self.status
            .lock()
            .await
            .entry(key.to_string())
            .or_default()
            .push_back(resp);
    }

    pub async fn on_create(&self, resp: Result<Consignment, CourierError>) {
        self.creates.lock().await.push_back(resp);
    }

    pub async fn on_bulk(&self, resp: Result<Vec<BulkItemResult>, CourierError>) {
        self.bulks.lock().await.push_back(resp);
    }

    pub async fn on_balance(&self, resp: Result<f64, CourierError>) {
        self.balances.lock().await.push_back(resp);
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn status_call(&self, key: String) -> Result<StatusResponse, CourierError> {
        self.calls.lock().await.push(key.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        match self.delay {
            Some(d) => tokio::time::sleep(d).await,
            None => tokio::task::yield_now().await,
        }
        let resp = self
            .status
            .lock()
            .await
            .get_mut(&key)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(CourierError::api(404, "Consignment not found")));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        resp
    }
}

#[async_trait]
impl CourierGateway for RecordingGateway {
    async fn create_order(&self, req: &ConsignmentRequest) -> Result<Consignment, CourierError> {
        self.calls.lock().await.push(format!("create:{}", req.invoice));
        self.creates
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(CourierError::InvalidResponse("unscripted create".into())))
    }

    async fn create_bulk_orders(
        &self,
        reqs: &[ConsignmentRequest],
    ) -> Result<Vec<BulkItemResult>, CourierError> {
        self.calls.lock().await.push(format!("bulk:{}", reqs.len()));
        self.bulks
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(CourierError::InvalidResponse("unscripted bulk".into())))
    }

    async fn status_by_invoice(&self, invoice: &str) -> Result<StatusResponse, CourierError> {
        self.status_call(format!("invoice:{invoice}")).await
    }

    async fn status_by_consignment_id(&self, id: &str) -> Result<StatusResponse, CourierError> {
        self.status_call(format!("consignment:{id}")).await
    }

    async fn status_by_tracking_code(&self, code: &str) -> Result<StatusResponse, CourierError> {
        self.status_call(format!("tracking:{code}")).await
    }

    async fn balance(&self) -> Result<f64, CourierError> {
        self.calls.lock().await.push("balance".into());
        self.balances
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(CourierError::InvalidResponse("unscripted balance".into())))
    }
}

pub struct OfflineFraud;

#[async_trait]
impl FraudLookup for OfflineFraud {
    async fn check_phone(&self, _phone: &str) -> Result<FraudReport, FraudError> {
        Err(FraudError::Http(503))
    }
}

pub fn status(delivery_status: &str) -> Result<StatusResponse, CourierError> {
    Ok(StatusResponse {
        status: 200,
        delivery_status: delivery_status.to_string(),
    })
}

pub fn bulk_ok(invoice: &str, tracking_code: &str) -> BulkItemResult {
    BulkItemResult {
        invoice: invoice.to_string(),
        tracking_code: Some(tracking_code.to_string()),
        status: Some("success".into()),
        message: None,
    }
}

pub fn bulk_err(invoice: &str, message: &str) -> BulkItemResult {
    BulkItemResult {
        invoice: invoice.to_string(),
        tracking_code: None,
        status: Some("error".into()),
        message: Some(message.to_string()),
    }
}

pub fn consignment(invoice: &str, tracking_code: &str) -> Consignment {
    Consignment {
        consignment_id: Some(1424107),
        invoice: invoice.to_string(),
        tracking_code: tracking_code.to_string(),
        status: Some("in_review".into()),
        note: None,
    }
}

/// Order that only lives in memory.
pub fn order(order_id: &str, tracking_code: Option<&str>) -> Order {
    let now = Utc::now();
    Order {
        doc_id: format!("doc-{order_id}"),
        order_id: order_id.to_string(),
        name: "Rahim Uddin".into(),
        phone: "01712345678".into(),
        items: "Panjabi".into(),
        address: "House 7, Road 3, Dhanmondi".into(),
        amount: 1500.0,
        reference: String::new(),
        status: OrderStatus::Pending,
        tracking_code: tracking_code.map(str::to_string),
        notes: String::new(),
        created_at: now,
        updated_at: now,
    }
}

pub fn new_order(name: &str, phone: &str) -> NewOrder {
    NewOrder {
        name: name.to_string(),
        phone: phone.to_string(),
        items: "Kurti".into(),
        address: "Agrabad, Chattogram".into(),
        amount: 850.0,
        ..Default::default()
    }
}

pub async fn setup_pool() -> Pool {
    db::memory_pool().await.unwrap()
}

/// Store `n` valid orders; identifiers run from ORD-DR-1001.
pub async fn seed_orders(pool: &Pool, n: usize) -> Vec<Order> {
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let o = db::create_order(pool, &new_order(&format!("Customer {i}"), &format!("0171100000{i}")))
            .await
            .unwrap();
        out.push(o);
    }
    out
}
