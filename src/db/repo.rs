use super::model::{parse_ts, ts};
use crate::model::{
    NewOrder, Order, OrderPage, OrderPatch, OrderStatus, Role, User, UserStatus,
};
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use std::str::FromStr;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{info, instrument};
use uuid::Uuid;

pub type Pool = SqlitePool;

pub const ORDER_ID_PREFIX: &str = "ORD-DR-";
pub const FIRST_ORDER_NUMBER: u64 = 1001;

const ORDER_COLUMNS: &str = "doc_id, order_id, name, phone, items, address, amount, reference, status, tracking_code, notes, created_at, updated_at";
const USER_COLUMNS: &str = "id, name, email, phone, status, role, created_at, updated_at";

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let options = SqliteConnectOptions::from_str(&normalized)
        .with_context(|| format!("invalid database url {normalized}"))?
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(options)
        .await
        .with_context(|| format!("failed to open order store at {normalized}"))?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// Single-connection in-memory store with migrations applied.
pub async fn memory_pool() -> Result<Pool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn order_from_row(row: &SqliteRow) -> Result<Order> {
    let status: String = row.get("status");
    Ok(Order {
        doc_id: row.get("doc_id"),
        order_id: row.get("order_id"),
        name: row.get("name"),
        phone: row.get("phone"),
        items: row.get("items"),
        address: row.get("address"),
        amount: row.get("amount"),
        reference: row.get("reference"),
        status: OrderStatus::parse_status(&status)
            .ok_or_else(|| anyhow!("unknown order status '{}'", status))?,
        tracking_code: row.get("tracking_code"),
        notes: row.get("notes"),
        created_at: parse_ts(&row.get::<String, _>("created_at"))?,
        updated_at: parse_ts(&row.get::<String, _>("updated_at"))?,
    })
}

fn user_from_row(row: &SqliteRow) -> Result<User> {
    let status: String = row.get("status");
    let role: String = row.get("role");
    Ok(User {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        phone: row.get("phone"),
        status: UserStatus::parse_status(&status)
            .ok_or_else(|| anyhow!("unknown user status '{}'", status))?,
        role: Role::parse_role(&role).ok_or_else(|| anyhow!("unknown role '{}'", role))?,
        created_at: parse_ts(&row.get::<String, _>("created_at"))?,
        updated_at: parse_ts(&row.get::<String, _>("updated_at"))?,
    })
}

/// Next number after the trailing numeric suffix of `last_id`, or the first
/// number when there is no usable previous identifier.
pub fn next_order_number(last_id: Option<&str>) -> u64 {
    last_id
        .and_then(|id| id.strip_prefix(ORDER_ID_PREFIX))
        .and_then(|n| n.trim().parse::<u64>().ok())
        .map(|n| n + 1)
        .unwrap_or(FIRST_ORDER_NUMBER)
}

/// Derive the next identifier from the most recently created order.
/// Two concurrent creators can read the same predecessor.
#[instrument(skip_all)]
pub async fn generate_order_id(pool: &Pool) -> Result<String> {
    let last: Option<String> = sqlx::query_scalar(
        "SELECT order_id FROM orders ORDER BY created_at DESC, rowid DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;
    Ok(format!(
        "{}{}",
        ORDER_ID_PREFIX,
        next_order_number(last.as_deref())
    ))
}

#[instrument(skip_all)]
pub async fn create_order(pool: &Pool, data: &NewOrder) -> Result<Order> {
    let order_id = generate_order_id(pool).await?;
    let now = Utc::now();
    let order = Order {
        doc_id: Uuid::new_v4().to_string(),
        order_id,
        name: data.name.trim().to_string(),
        phone: data.phone.trim().to_string(),
        items: data.items.trim().to_string(),
        address: data.address.trim().to_string(),
        amount: data.amount,
        reference: data.reference.trim().to_string(),
        status: OrderStatus::Pending,
        tracking_code: None,
        notes: data.notes.trim().to_string(),
        created_at: now,
        updated_at: now,
    };
    sqlx::query(
        "INSERT INTO orders (doc_id, order_id, name, phone, items, address, amount, reference, status, tracking_code, notes, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&order.doc_id)
    .bind(&order.order_id)
    .bind(&order.name)
    .bind(&order.phone)
    .bind(&order.items)
    .bind(&order.address)
    .bind(order.amount)
    .bind(&order.reference)
    .bind(order.status.as_str())
    .bind(&order.tracking_code)
    .bind(&order.notes)
    .bind(ts(order.created_at))
    .bind(ts(order.updated_at))
    .execute(pool)
    .await?;
    info!(order_id = %order.order_id, doc_id = %order.doc_id, "order created");
    Ok(order)
}

/// Newest-first page of orders. `page` is 1-based.
#[instrument(skip_all)]
pub async fn list_orders(pool: &Pool, page: u32, page_size: u32) -> Result<OrderPage> {
    let page = page.max(1);
    let page_size = page_size.max(1);
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(pool)
        .await?;
    let rows = sqlx::query(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?"
    ))
    .bind(i64::from(page_size))
    .bind(i64::from(page - 1) * i64::from(page_size))
    .fetch_all(pool)
    .await?;
    let orders = rows.iter().map(order_from_row).collect::<Result<Vec<_>>>()?;
    let total_pages = ((total.max(0) as u64).div_ceil(u64::from(page_size))).max(1) as u32;
    Ok(OrderPage {
        orders,
        total_orders: total,
        current_page: page,
        total_pages,
    })
}

#[instrument(skip_all)]
pub async fn list_all_orders(pool: &Pool) -> Result<Vec<Order>> {
    let rows = sqlx::query(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC, rowid DESC"
    ))
    .fetch_all(pool)
    .await?;
    rows.iter().map(order_from_row).collect()
}

#[instrument(skip_all)]
pub async fn get_order(pool: &Pool, doc_id: &str) -> Result<Option<Order>> {
    let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE doc_id = ?"))
        .bind(doc_id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(order_from_row).transpose()
}

#[instrument(skip_all)]
pub async fn find_order_by_order_id(pool: &Pool, order_id: &str) -> Result<Option<Order>> {
    let row = sqlx::query(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = ? LIMIT 1"
    ))
    .bind(order_id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(order_from_row).transpose()
}

/// Push the set fields of `patch` onto an UPDATE. Always bumps `updated_at`.
fn build_update<'a>(doc_id: &'a str, patch: &'a OrderPatch, now: String) -> QueryBuilder<'a, Sqlite> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE orders SET updated_at = ");
    qb.push_bind(now);
    if let Some(v) = &patch.name {
        qb.push(", name = ").push_bind(v.trim());
    }
    if let Some(v) = &patch.phone {
        qb.push(", phone = ").push_bind(v.trim());
    }
    if let Some(v) = &patch.items {
        qb.push(", items = ").push_bind(v.trim());
    }
    if let Some(v) = &patch.address {
        qb.push(", address = ").push_bind(v.trim());
    }
    if let Some(v) = patch.amount {
        qb.push(", amount = ").push_bind(v);
    }
    if let Some(v) = &patch.reference {
        qb.push(", reference = ").push_bind(v.trim());
    }
    if let Some(v) = patch.status {
        qb.push(", status = ").push_bind(v.as_str());
    }
    if let Some(v) = &patch.tracking_code {
        qb.push(", tracking_code = ").push_bind(v.as_deref());
    }
    if let Some(v) = &patch.notes {
        qb.push(", notes = ").push_bind(v.trim());
    }
    qb.push(" WHERE doc_id = ").push_bind(doc_id);
    qb
}

#[instrument(skip_all)]
pub async fn update_order(pool: &Pool, doc_id: &str, patch: &OrderPatch) -> Result<()> {
    let res = build_update(doc_id, patch, ts(Utc::now()))
        .build()
        .execute(pool)
        .await?;
    if res.rows_affected() == 0 {
        return Err(anyhow!("order {} not found", doc_id));
    }
    Ok(())
}

/// Apply several updates atomically: either every order is written or none.
#[instrument(skip_all)]
pub async fn batch_update_orders(pool: &Pool, updates: &[(String, OrderPatch)]) -> Result<()> {
    if updates.is_empty() {
        return Ok(());
    }
    let now = ts(Utc::now());
    let mut tx = pool.begin().await?;
    for (doc_id, patch) in updates {
        let res = build_update(doc_id, patch, now.clone())
            .build()
            .execute(&mut *tx)
            .await?;
        if res.rows_affected() == 0 {
            return Err(anyhow!("order {} not found", doc_id));
        }
    }
    tx.commit().await?;
    info!(count = updates.len(), "batch order update committed");
    Ok(())
}

#[instrument(skip_all)]
pub async fn delete_order(pool: &Pool, doc_id: &str) -> Result<()> {
    let res = sqlx::query("DELETE FROM orders WHERE doc_id = ?")
        .bind(doc_id)
        .execute(pool)
        .await?;
    if res.rows_affected() == 0 {
        return Err(anyhow!("order {} not found", doc_id));
    }
    Ok(())
}

/// Order totals across the whole store. Revenue sums confirmed orders only.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OrderCounts {
    pub total: i64,
    pub pending: i64,
    pub confirmed: i64,
    pub confirmed_revenue: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserCounts {
    pub total: i64,
    pub verified: i64,
}

#[instrument(skip_all)]
pub async fn order_counts(pool: &Pool) -> Result<OrderCounts> {
    let rows = sqlx::query(
        "SELECT status, COUNT(*) AS n, COALESCE(SUM(amount), 0.0) AS revenue FROM orders GROUP BY status",
    )
    .fetch_all(pool)
    .await?;
    let mut counts = OrderCounts::default();
    for row in &rows {
        let status: String = row.get("status");
        let n: i64 = row.get("n");
        counts.total += n;
        match OrderStatus::parse_status(&status) {
            Some(OrderStatus::Pending) => counts.pending += n,
            Some(OrderStatus::Confirmed) => {
                counts.confirmed += n;
                counts.confirmed_revenue = row.get("revenue");
            }
            None => return Err(anyhow!("unknown order status '{}'", status)),
        }
    }
    Ok(counts)
}

#[instrument(skip_all)]
pub async fn user_counts(pool: &Pool) -> Result<UserCounts> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS total, COALESCE(SUM(CASE WHEN status = ? THEN 1 ELSE 0 END), 0) AS verified FROM users",
    )
    .bind(UserStatus::Verified.as_str())
    .fetch_one(pool)
    .await?;
    Ok(UserCounts {
        total: row.get("total"),
        verified: row.get("verified"),
    })
}

#[instrument(skip_all)]
pub async fn create_user(
    pool: &Pool,
    name: &str,
    email: &str,
    phone: &str,
    role: Role,
    status: UserStatus,
) -> Result<User> {
    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4().to_string(),
        name: name.trim().to_string(),
        email: email.trim().to_ascii_lowercase(),
        phone: phone.trim().to_string(),
        status,
        role,
        created_at: now,
        updated_at: now,
    };
    sqlx::query(
        "INSERT INTO users (id, name, email, phone, status, role, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&user.id)
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.phone)
    .bind(user.status.as_str())
    .bind(user.role.as_str())
    .bind(ts(user.created_at))
    .bind(ts(user.updated_at))
    .execute(pool)
    .await?;
    Ok(user)
}

#[instrument(skip_all)]
pub async fn get_user_by_email(pool: &Pool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
        .bind(email.trim().to_ascii_lowercase())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(user_from_row).transpose()
}

#[instrument(skip_all)]
pub async fn list_users(pool: &Pool) -> Result<Vec<User>> {
    let rows = sqlx::query(&format!(
        "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC, rowid ASC"
    ))
    .fetch_all(pool)
    .await?;
    rows.iter().map(user_from_row).collect()
}

#[instrument(skip_all)]
pub async fn update_user_status(pool: &Pool, user_id: &str, status: UserStatus) -> Result<()> {
    let res = sqlx::query("UPDATE users SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(ts(Utc::now()))
        .bind(user_id)
        .execute(pool)
        .await?;
    if res.rows_affected() == 0 {
        return Err(anyhow!("user {} not found", user_id));
    }
    Ok(())
}

#[instrument(skip_all)]
pub async fn update_user_role(pool: &Pool, user_id: &str, role: Role) -> Result<()> {
    let res = sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
        .bind(role.as_str())
        .bind(ts(Utc::now()))
        .bind(user_id)
        .execute(pool)
        .await?;
    if res.rows_affected() == 0 {
        return Err(anyhow!("user {} not found", user_id));
    }
    Ok(())
}

#[instrument(skip_all)]
pub async fn delete_user(pool: &Pool, user_id: &str) -> Result<()> {
    let res = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(user_id)
        .execute(pool)
        .await?;
    if res.rows_affected() == 0 {
        return Err(anyhow!("user {} not found", user_id));
    }
    Ok(())
}
