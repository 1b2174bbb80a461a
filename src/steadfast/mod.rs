use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;

pub mod model;

pub use model::{BulkItemResult, Consignment, ConsignmentRequest, StatusResponse};
use model::{BalanceResp, CreateOrderResp};

/// Upper bound on consignments accepted by one bulk request.
pub const MAX_BULK_ORDERS: usize = 500;

#[derive(Debug, Error)]
pub enum CourierError {
    #[error("failed to reach courier: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{message}")]
    Api { http_status: u16, message: String },
    #[error("invalid courier response: {0}")]
    InvalidResponse(String),
    #[error("invalid courier request: {0}")]
    InvalidRequest(String),
    #[error("No orders to send")]
    EmptyBatch,
    #[error("Maximum {max} orders per request (got {got})")]
    BatchTooLarge { max: usize, got: usize },
}

/// User-facing bucket for a courier failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    DuplicateInvoice,
    InsufficientBalance,
    Network,
    Unauthorized,
    Other,
}

impl ErrorCategory {
    pub fn hint(&self) -> &'static str {
        match self {
            ErrorCategory::DuplicateInvoice => "This invoice was already sent to the courier",
            ErrorCategory::InsufficientBalance => "Courier account balance is too low",
            ErrorCategory::Network => "Could not reach the courier, check the connection",
            ErrorCategory::Unauthorized => "Courier rejected the API credentials",
            ErrorCategory::Other => "Courier request failed",
        }
    }
}

/// Classify a courier message by substring; the gateway has no error codes.
pub fn classify_message(message: &str) -> ErrorCategory {
    let m = message.to_ascii_lowercase();
    if m.contains("duplicate") || m.contains("already exist") || m.contains("invoice has been taken") {
        ErrorCategory::DuplicateInvoice
    } else if m.contains("insufficient") || m.contains("low balance") {
        ErrorCategory::InsufficientBalance
    } else if m.contains("unauthorized") || m.contains("unauthorised") {
        ErrorCategory::Unauthorized
    } else if m.contains("network") || m.contains("timed out") || m.contains("timeout") || m.contains("failed to fetch") {
        ErrorCategory::Network
    } else {
        ErrorCategory::Other
    }
}

impl CourierError {
    pub fn api(http_status: u16, message: impl Into<String>) -> Self {
        CourierError::Api {
            http_status,
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            CourierError::Transport(_) => ErrorCategory::Network,
            CourierError::Api { http_status: 401, .. } => ErrorCategory::Unauthorized,
            other => classify_message(&other.to_string()),
        }
    }

    /// HTTP status of an API rejection, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            CourierError::Api { http_status, .. } => Some(*http_status),
            CourierError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Which courier key a status lookup uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKey {
    Invoice,
    ConsignmentId,
    TrackingCode,
}

#[async_trait]
pub trait CourierGateway: Send + Sync {
    async fn create_order(&self, req: &ConsignmentRequest) -> Result<Consignment, CourierError>;

    async fn create_bulk_orders(
        &self,
        reqs: &[ConsignmentRequest],
    ) -> Result<Vec<BulkItemResult>, CourierError>;

    async fn status_by_invoice(&self, invoice: &str) -> Result<StatusResponse, CourierError>;

    async fn status_by_consignment_id(&self, id: &str) -> Result<StatusResponse, CourierError>;

    async fn status_by_tracking_code(&self, code: &str) -> Result<StatusResponse, CourierError>;

    async fn balance(&self) -> Result<f64, CourierError>;
}

/// Dispatch a status lookup on the chosen key.
pub async fn lookup_status(
    gateway: &dyn CourierGateway,
    key: StatusKey,
    value: &str,
) -> Result<StatusResponse, CourierError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CourierError::InvalidRequest("empty lookup value".into()));
    }
    match key {
        StatusKey::Invoice => gateway.status_by_invoice(value).await,
        StatusKey::ConsignmentId => gateway.status_by_consignment_id(value).await,
        StatusKey::TrackingCode => gateway.status_by_tracking_code(value).await,
    }
}

#[derive(Clone)]
pub struct SteadfastClient {
    http: Client,
    base_url: Url,
    api_key: String,
    secret_key: String,
}

impl fmt::Debug for SteadfastClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SteadfastClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl SteadfastClient {
    pub fn new(base_url: &str, api_key: String, secret_key: String) -> Result<Self, CourierError> {
        let base_url = Url::parse(base_url.trim())
            .map_err(|e| CourierError::InvalidRequest(format!("base url: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(CourierError::InvalidRequest(format!(
                "base url cannot carry paths: {base_url}"
            )));
        }
        let http = Client::builder()
            .user_agent("orderdesk/0.1")
            .no_proxy()
            .build()?;
        Ok(Self {
            http,
            base_url,
            api_key,
            secret_key,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self, CourierError> {
        Self::new(
            &cfg.steadfast.base_url,
            cfg.steadfast.api_key.clone(),
            cfg.steadfast.secret_key.clone(),
        )
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub fn build_request(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&Value>,
    ) -> Result<reqwest::Request, CourierError> {
        let mut rb = self
            .http
            .request(method, self.endpoint(segments))
            .header("Api-Key", &self.api_key)
            .header("Secret-Key", &self.secret_key)
            .header("Content-Type", "application/json");
        if let Some(body) = body {
            rb = rb.json(body);
        }
        Ok(rb.build()?)
    }

    async fn execute(&self, request: reqwest::Request) -> Result<(StatusCode, String), CourierError> {
        info!(method = %request.method(), url = %request.url(), "courier request");
        for (name, value) in request.headers() {
            let lower = name.as_str().to_ascii_lowercase();
            if lower == "api-key" || lower == "secret-key" {
                debug!("  {}: [REDACTED]", name);
            } else {
                debug!("  {}: {}", name, value.to_str().unwrap_or("[invalid]"));
            }
        }

        let res = self.http.execute(request).await?;
        let status = res.status();
        let body = res.text().await?;
        if status.is_success() {
            debug!(%status, body = %body, "courier response");
        } else {
            warn!(%status, body = %body, "courier returned error status");
        }
        Ok((status, body))
    }

    async fn get_status(&self, segments: &[&str]) -> Result<StatusResponse, CourierError> {
        let request = self.build_request(Method::GET, segments, None)?;
        let (status, body) = self.execute(request).await?;
        parse_envelope(status, &body, "Failed to get status")
    }
}

#[async_trait]
impl CourierGateway for SteadfastClient {
    async fn create_order(&self, req: &ConsignmentRequest) -> Result<Consignment, CourierError> {
        let body = serde_json::to_value(req)
            .map_err(|e| CourierError::InvalidRequest(e.to_string()))?;
        let request = self.build_request(Method::POST, &["create_order"], Some(&body))?;
        let (status, text) = self.execute(request).await?;
        let resp: CreateOrderResp =
            parse_envelope(status, &text, "Failed to create Steadfast order")?;
        info!(invoice = %resp.consignment.invoice, tracking = %resp.consignment.tracking_code, "consignment created");
        Ok(resp.consignment)
    }

    async fn create_bulk_orders(
        &self,
        reqs: &[ConsignmentRequest],
    ) -> Result<Vec<BulkItemResult>, CourierError> {
        let body = build_bulk_body(reqs)?;
        let request = self.build_request(
            Method::POST,
            &["create_order", "bulk-order"],
            Some(&body),
        )?;
        let (status, text) = self.execute(request).await?;
        let items = parse_bulk_response(status, &text)?;
        info!(sent = reqs.len(), returned = items.len(), "bulk consignments submitted");
        Ok(items)
    }

    async fn status_by_invoice(&self, invoice: &str) -> Result<StatusResponse, CourierError> {
        self.get_status(&["status_by_invoice", invoice]).await
    }

    async fn status_by_consignment_id(&self, id: &str) -> Result<StatusResponse, CourierError> {
        self.get_status(&["status_by_cid", id]).await
    }

    async fn status_by_tracking_code(&self, code: &str) -> Result<StatusResponse, CourierError> {
        self.get_status(&["status_by_trackingcode", code]).await
    }

    async fn balance(&self) -> Result<f64, CourierError> {
        let request = self.build_request(Method::GET, &["get_balance"], None)?;
        let (status, body) = self.execute(request).await?;
        let resp: BalanceResp = parse_envelope(status, &body, "Failed to get balance")?;
        Ok(resp.current_balance)
    }
}

/// Bulk body: the courier expects the array JSON-encoded inside a string.
pub fn build_bulk_body(reqs: &[ConsignmentRequest]) -> Result<Value, CourierError> {
    if reqs.is_empty() {
        return Err(CourierError::EmptyBatch);
    }
    if reqs.len() > MAX_BULK_ORDERS {
        return Err(CourierError::BatchTooLarge {
            max: MAX_BULK_ORDERS,
            got: reqs.len(),
        });
    }
    let data = serde_json::to_string(reqs)
        .map_err(|e| CourierError::InvalidRequest(e.to_string()))?;
    Ok(json!({ "data": data }))
}

fn rejection(http_status: StatusCode, body: &str, fallback: &str) -> CourierError {
    let text = body.trim();
    let message = if text.is_empty() { fallback } else { text };
    CourierError::api(http_status.as_u16(), message)
}

fn message_of(value: &Value) -> Option<&str> {
    value
        .get("message")
        .and_then(Value::as_str)
        .filter(|m| !m.trim().is_empty())
}

/// Decode a `{ "status": 200, ... }` envelope.
///
/// A body that is not JSON (the gateway sometimes answers "Unauthorized
/// Access" as plain text) becomes the error message verbatim.
pub fn parse_envelope<T: DeserializeOwned>(
    http_status: StatusCode,
    body: &str,
    fallback: &str,
) -> Result<T, CourierError> {
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return Err(rejection(http_status, body, fallback)),
    };
    let api_status = value.get("status").and_then(Value::as_i64);
    if !http_status.is_success() || api_status != Some(200) {
        let message = message_of(&value).unwrap_or(fallback);
        return Err(CourierError::api(http_status.as_u16(), message));
    }
    serde_json::from_value(value).map_err(|e| CourierError::InvalidResponse(e.to_string()))
}

/// The bulk endpoint answers with a bare array, or an object carrying the
/// array under `data` or `orders`.
pub fn parse_bulk_response(
    http_status: StatusCode,
    body: &str,
) -> Result<Vec<BulkItemResult>, CourierError> {
    const FALLBACK: &str = "Bulk order failed";
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return Err(rejection(http_status, body, FALLBACK)),
    };
    let items = if value.is_array() {
        Some(&value)
    } else {
        value
            .get("data")
            .filter(|v| v.is_array())
            .or_else(|| value.get("orders").filter(|v| v.is_array()))
    };
    match items {
        Some(items) => serde_json::from_value(items.clone())
            .map_err(|e| CourierError::InvalidResponse(e.to_string())),
        None => Err(CourierError::api(
            http_status.as_u16(),
            message_of(&value).unwrap_or(FALLBACK),
        )),
    }
}
