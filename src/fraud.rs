//! Phone-number reputation lookups and courier success-ratio aggregation.
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::config::Config;

/// Couriers summed by the bulk ratio, in display order.
pub const COURIER_KEYS: [&str; 6] = ["pathao", "steadfast", "redx", "paperfly", "parceldex", "summary"];

#[derive(Debug, Error)]
pub enum FraudError {
    #[error("failed to reach fraud service: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Failed to check fraud status (HTTP {0})")]
    Http(u16),
    #[error("invalid fraud service response: {0}")]
    InvalidResponse(String),
    #[error("invalid fraud service url: {0}")]
    InvalidUrl(String),
    #[error("No phone numbers found.")]
    NoPhones,
}

/// Per-courier parcel history. Counts the service leaves null or sends as
/// strings read as numbers, or zero when unreadable.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct CourierStats {
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub total_parcel: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub success_parcel: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub cancelled_parcel: u64,
    #[serde(default, deserialize_with = "lenient_ratio")]
    pub success_ratio: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ReportFields {
    #[serde(default)]
    status: Option<Value>,
    #[serde(default, deserialize_with = "lenient_opt_count")]
    delivery_count: Option<u64>,
    #[serde(default, deserialize_with = "lenient_opt_ratio")]
    risk_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient_text")]
    last_delivery: Option<String>,
    #[serde(default, rename = "courierData")]
    courier_data: Option<HashMap<String, Value>>,
}

fn value_as_u64(v: &Value) -> Option<u64> {
    let whole = |f: f64| (f.is_finite() && f >= 0.0).then_some(f as u64);
    match v {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(whole)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>().ok().or_else(|| s.parse::<f64>().ok().and_then(whole))
        }
        _ => None,
    }
}

fn value_as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn lenient_count<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    Ok(value_as_u64(&Value::deserialize(d)?).unwrap_or(0))
}

fn lenient_ratio<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Ok(value_as_f64(&Value::deserialize(d)?).unwrap_or(0.0))
}

fn lenient_opt_count<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    Ok(value_as_u64(&Value::deserialize(d)?))
}

fn lenient_opt_ratio<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(value_as_f64(&Value::deserialize(d)?))
}

fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

/// Reputation report for one phone number. Unknown fields are kept in `raw`.
#[derive(Debug, Clone, PartialEq)]
pub struct FraudReport {
    pub phone: String,
    pub status: Option<String>,
    pub delivery_count: Option<u64>,
    pub risk_score: Option<f64>,
    pub last_delivery: Option<String>,
    pub courier_data: Option<HashMap<String, CourierStats>>,
    pub raw: Value,
}

impl FraudReport {
    pub fn from_value(phone: &str, raw: Value) -> Result<Self, FraudError> {
        let fields: ReportFields = serde_json::from_value(raw.clone())
            .map_err(|e| FraudError::InvalidResponse(e.to_string()))?;
        let status = fields.status.and_then(|s| match s {
            Value::String(s) => Some(s),
            Value::Null => None,
            other => Some(other.to_string()),
        });
        // Entries that are not objects carry no parcel history.
        let courier_data = match fields.courier_data {
            Some(entries) => {
                let mut couriers = HashMap::with_capacity(entries.len());
                for (key, value) in entries {
                    if value.is_object() {
                        let stats = CourierStats::deserialize(value)
                            .map_err(|e| FraudError::InvalidResponse(e.to_string()))?;
                        couriers.insert(key, stats);
                    }
                }
                Some(couriers)
            }
            None => None,
        };
        Ok(Self {
            phone: phone.to_string(),
            status,
            delivery_count: fields.delivery_count,
            risk_score: fields.risk_score,
            last_delivery: fields.last_delivery,
            courier_data,
            raw,
        })
    }
}

#[async_trait]
pub trait FraudLookup: Send + Sync {
    async fn check_phone(&self, phone: &str) -> Result<FraudReport, FraudError>;
}

#[derive(Clone)]
pub struct FraudClient {
    http: Client,
    url: Url,
    api_key: String,
}

impl fmt::Debug for FraudClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FraudClient")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl FraudClient {
    pub fn new(url: &str, api_key: String) -> Result<Self, FraudError> {
        let url = Url::parse(url.trim()).map_err(|e| FraudError::InvalidUrl(e.to_string()))?;
        let http = Client::builder()
            .user_agent("orderdesk/0.1")
            .no_proxy()
            .build()?;
        Ok(Self { http, url, api_key })
    }

    pub fn from_config(cfg: &Config) -> Result<Self, FraudError> {
        Self::new(&cfg.fraud.url, cfg.fraud.api_key.clone())
    }

    pub fn build_request(&self, phone: &str) -> Result<reqwest::Request, FraudError> {
        Ok(self
            .http
            .post(self.url.clone())
            .query(&[("phone", phone.trim())])
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .build()?)
    }
}

#[async_trait]
impl FraudLookup for FraudClient {
    #[instrument(skip_all)]
    async fn check_phone(&self, phone: &str) -> Result<FraudReport, FraudError> {
        let request = self.build_request(phone)?;
        info!(url = %self.url, "fraud lookup");
        let res = self.http.execute(request).await?;
        if !res.status().is_success() {
            let status = res.status();
            warn!(%status, "fraud service returned error status");
            return Err(FraudError::Http(status.as_u16()));
        }
        let raw: Value = res
            .json()
            .await
            .map_err(|e| FraudError::InvalidResponse(e.to_string()))?;
        FraudReport::from_value(phone, raw)
    }
}

/// Summed parcel counts for one courier across several phones.
#[derive(Debug, Clone, PartialEq)]
pub struct CourierTotals {
    pub key: &'static str,
    pub name: String,
    pub total_parcel: u64,
    pub success_parcel: u64,
    pub cancelled_parcel: u64,
    /// Plain sum of the per-phone ratios as reported.
    pub success_ratio_sum: f64,
}

impl CourierTotals {
    /// Success percentage over the summed parcels.
    pub fn success_ratio(&self) -> f64 {
        if self.total_parcel == 0 {
            0.0
        } else {
            self.success_parcel as f64 * 100.0 / self.total_parcel as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkRatio {
    pub couriers: Vec<CourierTotals>,
    pub checked_phones: Vec<String>,
}

impl BulkRatio {
    pub fn get(&self, key: &str) -> Option<&CourierTotals> {
        self.couriers.iter().find(|c| c.key == key)
    }
}

/// Sum courier stats over the reports that carry courier data. Every fixed
/// key is present in the output, zeroed when no report mentions it.
pub fn aggregate_courier_ratio<'a>(
    reports: impl IntoIterator<Item = &'a FraudReport>,
) -> Vec<CourierTotals> {
    let mut totals: Vec<CourierTotals> = COURIER_KEYS
        .iter()
        .map(|&key| CourierTotals {
            key,
            name: key.to_string(),
            total_parcel: 0,
            success_parcel: 0,
            cancelled_parcel: 0,
            success_ratio_sum: 0.0,
        })
        .collect();
    let mut named = [false; COURIER_KEYS.len()];

    for report in reports {
        let Some(data) = &report.courier_data else {
            continue;
        };
        for (i, t) in totals.iter_mut().enumerate() {
            let Some(stats) = data.get(t.key) else {
                continue;
            };
            if !named[i] {
                if let Some(name) = stats.name.as_deref().filter(|n| !n.is_empty()) {
                    t.name = name.to_string();
                    named[i] = true;
                }
            }
            t.total_parcel += stats.total_parcel;
            t.success_parcel += stats.success_parcel;
            t.cancelled_parcel += stats.cancelled_parcel;
            t.success_ratio_sum += stats.success_ratio;
        }
    }
    totals
}

/// Look phones up one after another and aggregate their courier history.
///
/// Failed lookups and reports without courier data are skipped. Returns
/// `None` when no phone produced data.
pub async fn bulk_courier_ratio(
    lookup: &dyn FraudLookup,
    phones: &[String],
) -> Result<Option<BulkRatio>, FraudError> {
    if phones.is_empty() {
        return Err(FraudError::NoPhones);
    }
    let mut reports = Vec::new();
    for phone in phones {
        match lookup.check_phone(phone).await {
            Ok(report) if report.courier_data.is_some() => reports.push(report),
            Ok(_) => info!(phone = %phone, "no courier data for phone"),
            Err(err) => warn!(?err, phone = %phone, "fraud lookup failed; skipping"),
        }
    }
    if reports.is_empty() {
        return Ok(None);
    }
    Ok(Some(BulkRatio {
        couriers: aggregate_courier_ratio(&reports),
        checked_phones: reports.iter().map(|r| r.phone.clone()).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn report(phone: &str, raw: Value) -> FraudReport {
        FraudReport::from_value(phone, raw).unwrap()
    }

    #[test]
    fn build_request_sets_bearer_and_phone() {
        let c = FraudClient::new("https://fraud.test/api/courier-check", "tok".into()).unwrap();
        let r = c.build_request(" 01712345678 ").unwrap();
        assert_eq!(r.method(), reqwest::Method::POST);
        assert_eq!(r.url().query(), Some("phone=01712345678"));
        assert_eq!(
            r.headers().get("Authorization").unwrap().to_str().unwrap(),
            "Bearer tok"
        );
    }

    #[test]
    fn report_parses_known_fields() {
        let r = report(
            "017",
            json!({
                "status": "safe",
                "delivery_count": 12,
                "risk_score": 8.5,
                "courierData": { "pathao": { "name": "Pathao", "total_parcel": 3, "success_parcel": 2 } },
                "extra": true
            }),
        );
        assert_eq!(r.status.as_deref(), Some("safe"));
        assert_eq!(r.delivery_count, Some(12));
        assert_eq!(r.courier_data.as_ref().unwrap()["pathao"].cancelled_parcel, 0);
        assert_eq!(r.raw["extra"], true);
    }

    #[test]
    fn null_counts_read_as_zero() {
        let r = report(
            "017",
            json!({
                "delivery_count": null,
                "risk_score": null,
                "courierData": {
                    "pathao": { "name": null, "total_parcel": null, "success_parcel": 2, "success_ratio": null },
                    "redx": null
                }
            }),
        );
        assert_eq!(r.delivery_count, None);
        assert_eq!(r.risk_score, None);
        let couriers = r.courier_data.as_ref().unwrap();
        let pathao = &couriers["pathao"];
        assert_eq!(pathao.name, None);
        assert_eq!(pathao.total_parcel, 0);
        assert_eq!(pathao.success_parcel, 2);
        assert_eq!(pathao.success_ratio, 0.0);
        assert!(!couriers.contains_key("redx"));
    }

    #[test]
    fn numeric_strings_are_read_as_numbers() {
        let r = report(
            "017",
            json!({
                "delivery_count": "12",
                "risk_score": " 8.5 ",
                "courierData": {
                    "steadfast": { "total_parcel": "10", "success_parcel": "7.0", "cancelled_parcel": "n/a", "success_ratio": "70" }
                }
            }),
        );
        assert_eq!(r.delivery_count, Some(12));
        assert_eq!(r.risk_score, Some(8.5));
        let sf = &r.courier_data.as_ref().unwrap()["steadfast"];
        assert_eq!(sf.total_parcel, 10);
        assert_eq!(sf.success_parcel, 7);
        assert_eq!(sf.cancelled_parcel, 0);
        assert_eq!(sf.success_ratio, 70.0);
    }

    #[test]
    fn aggregate_sums_fixed_keys_only() {
        let a = report(
            "a",
            json!({ "courierData": {
                "steadfast": { "name": "Steadfast", "total_parcel": 10, "success_parcel": 8, "cancelled_parcel": 2, "success_ratio": 80.0 },
                "summary": { "total_parcel": 10, "success_parcel": 8, "cancelled_parcel": 2, "success_ratio": 80.0 },
                "ecourier": { "total_parcel": 99 }
            }}),
        );
        let b = report(
            "b",
            json!({ "courierData": {
                "steadfast": { "total_parcel": 10, "success_parcel": 4, "cancelled_parcel": 6, "success_ratio": 40.0 }
            }}),
        );
        let totals = aggregate_courier_ratio([&a, &b]);
        assert_eq!(totals.len(), COURIER_KEYS.len());
        let sf = totals.iter().find(|t| t.key == "steadfast").unwrap();
        assert_eq!(sf.name, "Steadfast");
        assert_eq!(sf.total_parcel, 20);
        assert_eq!(sf.success_parcel, 12);
        assert_eq!(sf.cancelled_parcel, 8);
        assert!((sf.success_ratio_sum - 120.0).abs() < f64::EPSILON);
        assert!((sf.success_ratio() - 60.0).abs() < 1e-9);
        let redx = totals.iter().find(|t| t.key == "redx").unwrap();
        assert_eq!(redx.total_parcel, 0);
        assert_eq!(redx.success_ratio(), 0.0);
        assert!(totals.iter().all(|t| t.key != "ecourier"));
    }

    struct Scripted {
        answers: Mutex<HashMap<String, Result<Value, u16>>>,
    }

    #[async_trait]
    impl FraudLookup for Scripted {
        async fn check_phone(&self, phone: &str) -> Result<FraudReport, FraudError> {
            let answer = self.answers.lock().unwrap().remove(phone);
            match answer {
                Some(Ok(v)) => FraudReport::from_value(phone, v),
                Some(Err(code)) => Err(FraudError::Http(code)),
                None => Err(FraudError::Http(404)),
            }
        }
    }

    #[tokio::test]
    async fn bulk_skips_failures_and_empty_reports() {
        let mut answers = HashMap::new();
        answers.insert(
            "p1".to_string(),
            Ok(json!({ "courierData": { "pathao": { "total_parcel": 5, "success_parcel": 5 } } })),
        );
        answers.insert("p2".to_string(), Err(500));
        answers.insert("p3".to_string(), Ok(json!({ "status": "unknown" })));
        let lookup = Scripted {
            answers: Mutex::new(answers),
        };
        let phones = vec!["p1".to_string(), "p2".to_string(), "p3".to_string()];
        let ratio = bulk_courier_ratio(&lookup, &phones).await.unwrap().unwrap();
        assert_eq!(ratio.checked_phones, vec!["p1".to_string()]);
        assert_eq!(ratio.get("pathao").unwrap().total_parcel, 5);
    }

    #[tokio::test]
    async fn bulk_none_when_nothing_found_and_error_when_empty() {
        let lookup = Scripted {
            answers: Mutex::new(HashMap::new()),
        };
        assert!(bulk_courier_ratio(&lookup, &["x".to_string()])
            .await
            .unwrap()
            .is_none());
        assert!(matches!(
            bulk_courier_ratio(&lookup, &[]).await,
            Err(FraudError::NoPhones)
        ));
    }
}
