//! Field validation run before any store write or courier call.
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

use crate::model::{NewOrder, Order, OrderPatch, User};

static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{11}$").expect("phone regex"));
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// All field errors found for one record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.errors.iter().map(ToString::to_string).collect();
        f.write_str(&parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

impl ValidationErrors {
    fn push(&mut self, field: &'static str, message: &'static str) {
        self.errors.push(FieldError { field, message });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&'static str> {
        self.errors
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.message)
    }

    fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

pub fn is_valid_phone(phone: &str) -> bool {
    PHONE_RE.is_match(phone.trim())
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email.trim())
}

fn check_required(errs: &mut ValidationErrors, field: &'static str, value: &str, msg: &'static str) {
    if value.trim().is_empty() {
        errs.push(field, msg);
    }
}

fn check_phone(errs: &mut ValidationErrors, phone: &str) {
    if phone.trim().is_empty() {
        errs.push("phone", "Phone number is required");
    } else if !is_valid_phone(phone) {
        errs.push("phone", "Phone number must be 11 digits");
    }
}

fn check_amount(errs: &mut ValidationErrors, amount: f64) {
    if !amount.is_finite() || amount < 0.0 {
        errs.push("amount", "Amount must be a positive number");
    }
}

pub fn validate_new_order(order: &NewOrder) -> Result<(), ValidationErrors> {
    let mut errs = ValidationErrors::default();
    check_required(&mut errs, "name", &order.name, "Customer name is required");
    check_phone(&mut errs, &order.phone);
    check_required(&mut errs, "items", &order.items, "Order items are required");
    check_required(&mut errs, "address", &order.address, "Address is required");
    check_amount(&mut errs, order.amount);
    errs.into_result()
}

/// Checks a user edit. Status and tracking code only change through
/// dispatch and reconciliation, so an edit may not touch them.
pub fn validate_patch(patch: &OrderPatch) -> Result<(), ValidationErrors> {
    let mut errs = ValidationErrors::default();
    if patch.status.is_some() {
        errs.push("status", "Status is set by the courier workflow");
    }
    if patch.tracking_code.is_some() {
        errs.push("tracking_code", "Tracking code is set by the courier workflow");
    }
    if let Some(name) = &patch.name {
        check_required(&mut errs, "name", name, "Customer name is required");
    }
    if let Some(phone) = &patch.phone {
        check_phone(&mut errs, phone);
    }
    if let Some(items) = &patch.items {
        check_required(&mut errs, "items", items, "Order items are required");
    }
    if let Some(address) = &patch.address {
        check_required(&mut errs, "address", address, "Address is required");
    }
    if let Some(amount) = patch.amount {
        check_amount(&mut errs, amount);
    }
    errs.into_result()
}

/// Checks an order is complete enough to hand to the courier.
pub fn validate_for_dispatch(order: &Order) -> Result<(), ValidationErrors> {
    let mut errs = ValidationErrors::default();
    check_required(&mut errs, "order_id", &order.order_id, "Order ID is required");
    check_required(&mut errs, "name", &order.name, "Customer name is required");
    check_phone(&mut errs, &order.phone);
    check_required(&mut errs, "items", &order.items, "Order items are required");
    check_required(&mut errs, "address", &order.address, "Address is required");
    check_amount(&mut errs, order.amount);
    errs.into_result()
}

pub fn validate_user(user: &User) -> Result<(), ValidationErrors> {
    let mut errs = ValidationErrors::default();
    check_required(&mut errs, "id", &user.id, "ID is required");
    check_required(&mut errs, "name", &user.name, "Name is required");
    if !is_valid_email(&user.email) {
        errs.push("email", "Invalid email format");
    }
    check_phone(&mut errs, &user.phone);
    errs.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_order() -> NewOrder {
        NewOrder {
            name: "Karim".into(),
            phone: "01812345678".into(),
            items: "2x T-shirt".into(),
            address: "Mirpur, Dhaka".into(),
            amount: 1200.0,
            ..Default::default()
        }
    }

    #[test]
    fn accepts_complete_order() {
        assert!(validate_new_order(&new_order()).is_ok());
    }

    #[test]
    fn phone_must_be_eleven_digits() {
        assert!(is_valid_phone(" 01812345678 "));
        assert!(!is_valid_phone("0181234567"));
        assert!(!is_valid_phone("+8801812345678"));
        assert!(!is_valid_phone("0181234567a"));

        let mut o = new_order();
        o.phone = "12345".into();
        let errs = validate_new_order(&o).unwrap_err();
        assert_eq!(errs.get("phone"), Some("Phone number must be 11 digits"));
    }

    #[test]
    fn collects_every_field_error() {
        let o = NewOrder {
            amount: -1.0,
            ..Default::default()
        };
        let errs = validate_new_order(&o).unwrap_err();
        for field in ["name", "phone", "items", "address", "amount"] {
            assert!(errs.get(field).is_some(), "missing {field}");
        }
        assert!(errs.to_string().contains("amount: Amount must be a positive number"));
    }

    #[test]
    fn rejects_nan_amount() {
        let mut o = new_order();
        o.amount = f64::NAN;
        assert!(validate_new_order(&o).is_err());
    }

    #[test]
    fn patch_checks_only_present_fields() {
        assert!(validate_patch(&OrderPatch::default()).is_ok());
        let patch = OrderPatch {
            phone: Some("abc".into()),
            ..Default::default()
        };
        assert!(validate_patch(&patch).unwrap_err().get("phone").is_some());
    }

    #[test]
    fn patch_may_not_touch_status_or_tracking_code() {
        let errs = validate_patch(&OrderPatch::status(crate::model::OrderStatus::Confirmed)).unwrap_err();
        assert_eq!(errs.get("status"), Some("Status is set by the courier workflow"));

        let clear = OrderPatch {
            tracking_code: Some(None),
            ..Default::default()
        };
        assert!(validate_patch(&clear).unwrap_err().get("tracking_code").is_some());

        let errs = validate_patch(&OrderPatch::confirmed_with("SF1")).unwrap_err();
        assert_eq!(errs.errors.len(), 2);
    }

    #[test]
    fn email_format() {
        assert!(is_valid_email("admin@shop.com"));
        assert!(!is_valid_email("admin@shop"));
        assert!(!is_valid_email("admin shop@x.com"));
    }
}
