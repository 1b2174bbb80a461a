//! Dashboard figures over the whole store.
use anyhow::Result;
use tracing::instrument;

use crate::auth;
use crate::db::{self, OrderCounts, Pool, UserCounts};
use crate::model::{Order, User};

pub const RECENT_ORDERS: u32 = 5;

#[derive(Debug, Clone)]
pub struct DashboardStats {
    pub orders: OrderCounts,
    /// Only filled in for admins.
    pub users: Option<UserCounts>,
    /// Newest first.
    pub recent_orders: Vec<Order>,
}

#[instrument(skip_all, fields(viewer = %viewer.email))]
pub async fn dashboard(pool: &Pool, viewer: &User, recent: u32) -> Result<DashboardStats> {
    let orders = db::order_counts(pool).await?;
    let users = if auth::has_admin_permissions(viewer) {
        Some(db::user_counts(pool).await?)
    } else {
        None
    };
    let recent_orders = if recent == 0 {
        Vec::new()
    } else {
        db::list_orders(pool, 1, recent).await?.orders
    };
    Ok(DashboardStats {
        orders,
        users,
        recent_orders,
    })
}
