use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted lifecycle status of an order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    Pending,
    Confirmed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Confirmed => "Confirmed",
        }
    }

    pub fn parse_status(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(OrderStatus::Pending),
            "Confirmed" => Some(OrderStatus::Confirmed),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Delivery state reported by the courier. Never persisted verbatim.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    PartialDelivered,
    DeliveredApprovalPending,
    PartialDeliveredApprovalPending,
    Cancelled,
    CancelledApprovalPending,
    Hold,
    InReview,
    Unknown,
    UnknownApprovalPending,
}

impl DeliveryStatus {
    pub const ALL: [DeliveryStatus; 11] = [
        DeliveryStatus::Pending,
        DeliveryStatus::Delivered,
        DeliveryStatus::PartialDelivered,
        DeliveryStatus::DeliveredApprovalPending,
        DeliveryStatus::PartialDeliveredApprovalPending,
        DeliveryStatus::Cancelled,
        DeliveryStatus::CancelledApprovalPending,
        DeliveryStatus::Hold,
        DeliveryStatus::InReview,
        DeliveryStatus::Unknown,
        DeliveryStatus::UnknownApprovalPending,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::PartialDelivered => "partial_delivered",
            DeliveryStatus::DeliveredApprovalPending => "delivered_approval_pending",
            DeliveryStatus::PartialDeliveredApprovalPending => {
                "partial_delivered_approval_pending"
            }
            DeliveryStatus::Cancelled => "cancelled",
            DeliveryStatus::CancelledApprovalPending => "cancelled_approval_pending",
            DeliveryStatus::Hold => "hold",
            DeliveryStatus::InReview => "in_review",
            DeliveryStatus::Unknown => "unknown",
            DeliveryStatus::UnknownApprovalPending => "unknown_approval_pending",
        }
    }

    pub fn parse_status(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL.into_iter().find(|d| d.as_str() == s)
    }

    /// Human-readable label shown next to an order.
    pub fn label(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "Pending",
            DeliveryStatus::Delivered => "Delivered",
            DeliveryStatus::PartialDelivered => "Partially Delivered",
            DeliveryStatus::DeliveredApprovalPending => "Delivered (Pending Approval)",
            DeliveryStatus::PartialDeliveredApprovalPending => {
                "Partially Delivered (Pending Approval)"
            }
            DeliveryStatus::Cancelled => "Cancelled",
            DeliveryStatus::CancelledApprovalPending => "Cancelled (Pending Approval)",
            DeliveryStatus::Hold => "Hold",
            DeliveryStatus::InReview => "In Review",
            DeliveryStatus::Unknown => "Unknown",
            DeliveryStatus::UnknownApprovalPending => "Unknown (Pending Approval)",
        }
    }

    pub fn order_status(&self) -> OrderStatus {
        match self {
            DeliveryStatus::Delivered
            | DeliveryStatus::PartialDelivered
            | DeliveryStatus::DeliveredApprovalPending
            | DeliveryStatus::PartialDeliveredApprovalPending => OrderStatus::Confirmed,
            _ => OrderStatus::Pending,
        }
    }
}

/// Map a raw courier delivery status to the local order status.
///
/// Total over all inputs: anything that is not a (partial) delivery,
/// including strings the courier may add later, maps to `Pending`.
pub fn map_delivery_status(raw: &str) -> OrderStatus {
    DeliveryStatus::parse_status(raw)
        .map(|d| d.order_status())
        .unwrap_or(OrderStatus::Pending)
}

/// Human label for a raw delivery status; unknown values are shown as-is.
pub fn delivery_label(raw: &str) -> String {
    DeliveryStatus::parse_status(raw)
        .map(|d| d.label().to_string())
        .unwrap_or_else(|| raw.to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    /// Store key, distinct from the human-readable `order_id`.
    pub doc_id: String,
    pub order_id: String,
    pub name: String,
    pub phone: String,
    pub items: String,
    pub address: String,
    pub amount: f64,
    pub reference: String,
    pub status: OrderStatus,
    pub tracking_code: Option<String>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn tracking_code(&self) -> Option<&str> {
        self.tracking_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

/// Fields supplied when creating an order. Identifier and timestamps are
/// assigned by the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NewOrder {
    pub name: String,
    pub phone: String,
    pub items: String,
    pub address: String,
    pub amount: f64,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub notes: String,
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderPatch {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub items: Option<String>,
    pub address: Option<String>,
    pub amount: Option<f64>,
    pub reference: Option<String>,
    pub status: Option<OrderStatus>,
    /// `Some(None)` clears the tracking code.
    pub tracking_code: Option<Option<String>>,
    pub notes: Option<String>,
}

impl OrderPatch {
    pub fn confirmed_with(tracking_code: &str) -> Self {
        Self {
            status: Some(OrderStatus::Confirmed),
            tracking_code: Some(Some(tracking_code.to_string())),
            ..Default::default()
        }
    }

    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn apply(&self, order: &mut Order) {
        if let Some(v) = &self.name {
            order.name = v.clone();
        }
        if let Some(v) = &self.phone {
            order.phone = v.clone();
        }
        if let Some(v) = &self.items {
            order.items = v.clone();
        }
        if let Some(v) = &self.address {
            order.address = v.clone();
        }
        if let Some(v) = self.amount {
            order.amount = v;
        }
        if let Some(v) = &self.reference {
            order.reference = v.clone();
        }
        if let Some(v) = self.status {
            order.status = v;
        }
        if let Some(v) = &self.tracking_code {
            order.tracking_code = v.clone();
        }
        if let Some(v) = &self.notes {
            order.notes = v.clone();
        }
    }
}

/// An order as held by the in-memory page, plus the last delivery status
/// fetched from the courier.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRow {
    pub order: Order,
    pub delivery_status: Option<String>,
}

impl From<Order> for OrderRow {
    fn from(order: Order) -> Self {
        Self {
            order,
            delivery_status: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total_orders: i64,
    pub current_page: u32,
    pub total_pages: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UserStatus {
    Verified,
    #[serde(rename = "Non-Verified")]
    NonVerified,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Verified => "Verified",
            UserStatus::NonVerified => "Non-Verified",
        }
    }

    pub fn parse_status(s: &str) -> Option<Self> {
        match s {
            "Verified" => Some(UserStatus::Verified),
            "Non-Verified" | "Non-verified" => Some(UserStatus::NonVerified),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Role {
    Admin,
    Moderator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Moderator => "Moderator",
        }
    }

    pub fn parse_role(s: &str) -> Option<Self> {
        match s {
            "Admin" => Some(Role::Admin),
            "Moderator" => Some(Role::Moderator),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub status: UserStatus,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
