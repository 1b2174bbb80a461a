use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::steadfast::{CourierError, CourierGateway};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Entry {
    balance: f64,
    fetched_at: DateTime<Utc>,
}

/// Courier account balance, cached for a fixed time.
#[derive(Debug)]
pub struct BalanceCache {
    ttl: Duration,
    entry: Mutex<Option<Entry>>,
}

impl BalanceCache {
    pub fn new(ttl_seconds: u64) -> Self {
        // chrono panics past i64::MAX milliseconds.
        let secs = i64::try_from(ttl_seconds).unwrap_or(i64::MAX).min(i64::MAX / 1000);
        Self {
            ttl: Duration::seconds(secs),
            entry: Mutex::new(None),
        }
    }

    /// Cached balance when it was fetched less than the TTL before `now`,
    /// otherwise a fresh fetch. A failed fetch leaves the cache untouched.
    pub async fn get_or_fetch(
        &self,
        gateway: &dyn CourierGateway,
        now: DateTime<Utc>,
    ) -> Result<f64, CourierError> {
        let mut entry = self.entry.lock().await;
        if let Some(e) = *entry {
            if now.signed_duration_since(e.fetched_at) < self.ttl {
                debug!(balance = e.balance, "balance served from cache");
                return Ok(e.balance);
            }
        }
        let balance = gateway.balance().await?;
        *entry = Some(Entry {
            balance,
            fetched_at: now,
        });
        Ok(balance)
    }

    pub async fn invalidate(&self) {
        *self.entry.lock().await = None;
    }

    pub async fn cached(&self) -> Option<f64> {
        self.entry.lock().await.map(|e| e.balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steadfast::{BulkItemResult, Consignment, ConsignmentRequest, StatusResponse};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingGateway {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CourierGateway for CountingGateway {
        async fn create_order(&self, _: &ConsignmentRequest) -> Result<Consignment, CourierError> {
            unreachable!()
        }
        async fn create_bulk_orders(
            &self,
            _: &[ConsignmentRequest],
        ) -> Result<Vec<BulkItemResult>, CourierError> {
            unreachable!()
        }
        async fn status_by_invoice(&self, _: &str) -> Result<StatusResponse, CourierError> {
            unreachable!()
        }
        async fn status_by_consignment_id(&self, _: &str) -> Result<StatusResponse, CourierError> {
            unreachable!()
        }
        async fn status_by_tracking_code(&self, _: &str) -> Result<StatusResponse, CourierError> {
            unreachable!()
        }
        async fn balance(&self) -> Result<f64, CourierError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(1000.0 + n as f64)
        }
    }

    #[tokio::test]
    async fn serves_cached_value_until_ttl_or_invalidation() {
        let gw = CountingGateway {
            calls: AtomicUsize::new(0),
        };
        let cache = BalanceCache::new(300);
        let t0 = Utc::now();

        assert_eq!(cache.get_or_fetch(&gw, t0).await.unwrap(), 1000.0);
        assert_eq!(
            cache.get_or_fetch(&gw, t0 + Duration::seconds(299)).await.unwrap(),
            1000.0
        );
        assert_eq!(
            cache.get_or_fetch(&gw, t0 + Duration::seconds(300)).await.unwrap(),
            1001.0
        );

        cache.invalidate().await;
        assert_eq!(cache.cached().await, None);
        assert_eq!(
            cache.get_or_fetch(&gw, t0 + Duration::seconds(301)).await.unwrap(),
            1002.0
        );
        assert_eq!(gw.calls.load(Ordering::SeqCst), 3);
    }
}
