use serde::{Deserialize, Serialize};

use crate::model::Order;

/// One consignment as sent to the courier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsignmentRequest {
    pub invoice: String,
    pub recipient_name: String,
    pub recipient_phone: String,
    pub recipient_address: String,
    pub cod_amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternative_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_lot: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_type: Option<u8>,
}

impl ConsignmentRequest {
    /// Build the payload for an order, trimming text fields. An empty note
    /// falls back to `Order ID: <identifier>`.
    pub fn from_order(order: &Order) -> Self {
        let note = match order.notes.trim() {
            "" => format!("Order ID: {}", order.order_id),
            n => n.to_string(),
        };
        Self {
            invoice: order.order_id.clone(),
            recipient_name: order.name.trim().to_string(),
            recipient_phone: order.phone.trim().to_string(),
            recipient_address: order.address.trim().to_string(),
            cod_amount: order.amount,
            note: Some(note),
            item_description: Some(order.items.trim().to_string()),
            alternative_phone: None,
            recipient_email: None,
            total_lot: None,
            delivery_type: None,
        }
    }
}

/// Consignment returned by a successful single create.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Consignment {
    #[serde(default)]
    pub consignment_id: Option<i64>,
    pub invoice: String,
    pub tracking_code: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateOrderResp {
    pub consignment: Consignment,
}

/// Per-item outcome of a bulk create.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BulkItemResult {
    pub invoice: String,
    #[serde(default)]
    pub tracking_code: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl BulkItemResult {
    pub fn tracking_code(&self) -> Option<&str> {
        self.tracking_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some("success") && self.tracking_code().is_some()
    }

    pub fn failure_reason(&self) -> String {
        self.message
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .or(self.status.as_deref().filter(|s| !s.trim().is_empty()))
            .unwrap_or("Unknown error")
            .to_string()
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StatusResponse {
    pub status: i64,
    pub delivery_status: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub(crate) struct BalanceResp {
    pub current_balance: f64,
}
