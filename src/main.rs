use anyhow::{anyhow, bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use orderdesk::auth;
use orderdesk::config::{self, Config};
use orderdesk::controller::{ControllerSettings, DeskError, OrderFilter, OrderListController};
use orderdesk::db::{self, Pool};
use orderdesk::fraud::FraudClient;
use orderdesk::invoice;
use orderdesk::model::{delivery_label, NewOrder, Order, OrderPatch, OrderStatus, Role, User, UserStatus};
use orderdesk::stats;
use orderdesk::steadfast::{self, SteadfastClient, StatusKey};
use orderdesk::validation;

#[derive(Debug, Parser)]
#[command(author, version, about = "Order desk with Steadfast courier integration")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml", global = true)]
    config: PathBuf,

    /// Email of the acting user
    #[arg(long, global = true)]
    actor: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print an example config file
    ConfigExample,
    /// Manage orders
    #[command(subcommand)]
    Orders(OrdersCmd),
    /// Send orders to the courier by identifier
    Send { order_ids: Vec<String> },
    /// Check the courier status of one order
    Check { order_id: String },
    /// Check every order on a page
    CheckAll {
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Write courier-derived statuses back to the store
        #[arg(long)]
        reconcile: bool,
    },
    /// Current courier account balance
    Balance,
    /// Raw courier status lookup
    Status {
        #[arg(long, value_enum, default_value_t = KeyArg::Invoice)]
        by: KeyArg,
        value: String,
    },
    /// Fraud report for a phone number
    Fraud { phone: String },
    /// Combined courier success ratio over the phones of some orders
    Ratio { order_ids: Vec<String> },
    /// Write HTML invoices for orders
    Invoice {
        order_ids: Vec<String>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Order, revenue and user totals with the newest orders
    Stats {
        #[arg(long, default_value_t = stats::RECENT_ORDERS)]
        recent: u32,
    },
    /// Manage desk users
    #[command(subcommand)]
    Users(UsersCmd),
}

#[derive(Debug, Subcommand)]
enum OrdersCmd {
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value = "")]
        search: String,
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
    },
    Create(CreateArgs),
    Update(UpdateArgs),
    Delete { order_id: String },
}

#[derive(Debug, ClapArgs)]
struct CreateArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    phone: String,
    #[arg(long)]
    items: String,
    #[arg(long)]
    address: String,
    #[arg(long)]
    amount: f64,
    #[arg(long, default_value = "")]
    reference: String,
    #[arg(long, default_value = "")]
    notes: String,
}

#[derive(Debug, ClapArgs)]
struct UpdateArgs {
    order_id: String,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    phone: Option<String>,
    #[arg(long)]
    items: Option<String>,
    #[arg(long)]
    address: Option<String>,
    #[arg(long)]
    amount: Option<f64>,
    #[arg(long)]
    reference: Option<String>,
    #[arg(long)]
    notes: Option<String>,
}

#[derive(Debug, Subcommand)]
enum UsersCmd {
    /// Create the first verified admin; only allowed on an empty user table
    Bootstrap {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        phone: String,
    },
    List,
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        phone: String,
        #[arg(long, value_enum, default_value_t = RoleArg::Moderator)]
        role: RoleArg,
    },
    Verify {
        email: String,
        #[arg(long)]
        revoke: bool,
    },
    Role {
        email: String,
        #[arg(value_enum)]
        role: RoleArg,
    },
    Delete { email: String },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StatusArg {
    Pending,
    Confirmed,
}

impl From<StatusArg> for OrderStatus {
    fn from(s: StatusArg) -> Self {
        match s {
            StatusArg::Pending => OrderStatus::Pending,
            StatusArg::Confirmed => OrderStatus::Confirmed,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RoleArg {
    Admin,
    Moderator,
}

impl From<RoleArg> for Role {
    fn from(r: RoleArg) -> Self {
        match r {
            RoleArg::Admin => Role::Admin,
            RoleArg::Moderator => Role::Moderator,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KeyArg {
    Invoice,
    Consignment,
    Tracking,
}

impl From<KeyArg> for StatusKey {
    fn from(k: KeyArg) -> Self {
        match k {
            KeyArg::Invoice => StatusKey::Invoice,
            KeyArg::Consignment => StatusKey::ConsignmentId,
            KeyArg::Tracking => StatusKey::TrackingCode,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if let Command::ConfigExample = args.command {
        print!("{}", config::example());
        return Ok(());
    }

    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;
    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let actor = match &args.actor {
        Some(email) => db::get_user_by_email(&pool, email).await?,
        None => None,
    };

    match args.command {
        Command::ConfigExample => unreachable!("handled before config load"),
        Command::Users(cmd) => run_users(&pool, actor.as_ref(), cmd).await,
        Command::Stats { recent } => {
            let viewer = auth::require_moderator(actor.as_ref())?;
            print_stats(&stats::dashboard(&pool, viewer, recent).await?);
            Ok(())
        }
        other => {
            auth::require_moderator(actor.as_ref())?;
            run_desk(&cfg, pool, other).await
        }
    }
}

async fn run_desk(cfg: &Config, pool: Pool, command: Command) -> Result<()> {
    let gateway = Arc::new(SteadfastClient::from_config(cfg)?);
    let fraud = Arc::new(FraudClient::from_config(cfg)?);
    let mut desk = OrderListController::new(
        pool.clone(),
        gateway.clone(),
        fraud,
        ControllerSettings::from_config(cfg),
    );

    let result = run_command(cfg, &pool, &mut desk, gateway.as_ref(), command).await;
    desk.shutdown().await;
    result
}

async fn run_command(
    cfg: &Config,
    pool: &Pool,
    desk: &mut OrderListController,
    gateway: &SteadfastClient,
    command: Command,
) -> Result<()> {
    match command {
        Command::Orders(cmd) => run_orders(pool, desk, cmd).await,
        Command::Send { order_ids } => {
            let orders = find_orders(pool, &order_ids).await?;
            desk.load_orders(orders).await;
            desk.select_all_visible().await;
            send(desk).await
        }
        Command::Check { order_id } => {
            let order = find_orders(pool, std::slice::from_ref(&order_id)).await?;
            let doc_id = order[0].doc_id.clone();
            desk.load_orders(order).await;
            let status = desk.check_status(&doc_id).await?;
            println!("{order_id}: {} ({status})", delivery_label(&status));
            Ok(())
        }
        Command::CheckAll { page, reconcile } => {
            desk.load_page(page).await?;
            let report = desk.check_all_visible().await;
            for row in desk.view().snapshot().await {
                let label = row
                    .delivery_status
                    .as_deref()
                    .map(delivery_label)
                    .unwrap_or_else(|| "-".to_string());
                println!("{:<14} {:<10} {}", row.order.order_id, row.order.status, label);
            }
            for (order_id, err) in &report.failures {
                println!("{order_id}: {err}");
            }
            println!("{}", report.summary());
            if reconcile {
                let n = desk.reconcile().await?;
                println!("{n} order(s) updated");
            }
            Ok(())
        }
        Command::Balance => {
            println!("Balance: ৳{:.2}", desk.balance().await?);
            Ok(())
        }
        Command::Status { by, value } => {
            let resp = steadfast::lookup_status(gateway, by.into(), &value).await?;
            println!("{} ({})", delivery_label(&resp.delivery_status), resp.delivery_status);
            Ok(())
        }
        Command::Fraud { phone } => {
            let report = desk.fraud_check(&phone).await?;
            println!("{}", serde_json::to_string_pretty(&report.raw)?);
            Ok(())
        }
        Command::Ratio { order_ids } => {
            let orders = find_orders(pool, &order_ids).await?;
            desk.load_orders(orders).await;
            desk.select_all_visible().await;
            match desk.bulk_courier_ratio().await? {
                None => println!("No courier data found for the selected phones"),
                Some(ratio) => {
                    println!("Checked {} phone(s)", ratio.checked_phones.len());
                    for c in &ratio.couriers {
                        println!(
                            "{:<12} total {:>5}  success {:>5}  cancelled {:>5}  ratio {:>6.2}%",
                            c.name,
                            c.total_parcel,
                            c.success_parcel,
                            c.cancelled_parcel,
                            c.success_ratio()
                        );
                    }
                }
            }
            Ok(())
        }
        Command::Invoice { order_ids, out } => {
            let orders = find_orders(pool, &order_ids).await?;
            let dir = out.unwrap_or_else(|| PathBuf::from(cfg.app.resolved_invoice_dir()));
            for path in invoice::write_invoices(&orders, &cfg.shop, &dir).await? {
                println!("{}", path.display());
            }
            Ok(())
        }
        Command::ConfigExample | Command::Users(_) | Command::Stats { .. } => {
            unreachable!("dispatched in main")
        }
    }
}

fn print_stats(dash: &stats::DashboardStats) {
    let o = &dash.orders;
    println!("Orders     {:>6}  (pending {}, confirmed {})", o.total, o.pending, o.confirmed);
    println!("Revenue    ৳{:.2}", o.confirmed_revenue);
    if let Some(u) = &dash.users {
        println!("Users      {:>6}  (verified {})", u.total, u.verified);
    }
    if dash.recent_orders.is_empty() {
        return;
    }
    println!("Recent orders:");
    for order in &dash.recent_orders {
        println!(
            "  {:<14} {:<10} {:<20} ৳{:>9.2}",
            order.order_id, order.status, order.name, order.amount
        );
    }
}

async fn run_orders(pool: &Pool, desk: &mut OrderListController, cmd: OrdersCmd) -> Result<()> {
    match cmd {
        OrdersCmd::List { page, search, status } => {
            desk.set_filter(OrderFilter {
                search,
                status: status.map(Into::into),
            });
            desk.load_page(page).await?;
            for row in desk.filtered().await {
                let o = &row.order;
                println!(
                    "{:<14} {:<10} {:<20} {:<12} ৳{:>9.2}  {}",
                    o.order_id,
                    o.status,
                    o.name,
                    o.phone,
                    o.amount,
                    o.tracking_code().unwrap_or("-")
                );
            }
            println!(
                "page {} of {} ({} orders)",
                desk.current_page(),
                desk.total_pages(),
                desk.total_orders()
            );
        }
        OrdersCmd::Create(a) => {
            let order = desk
                .create_order(&NewOrder {
                    name: a.name,
                    phone: a.phone,
                    items: a.items,
                    address: a.address,
                    amount: a.amount,
                    reference: a.reference,
                    notes: a.notes,
                })
                .await?;
            println!("created {}", order.order_id);
        }
        OrdersCmd::Update(a) => {
            let order = find_orders(pool, std::slice::from_ref(&a.order_id)).await?.remove(0);
            let patch = OrderPatch {
                name: a.name,
                phone: a.phone,
                items: a.items,
                address: a.address,
                amount: a.amount,
                reference: a.reference,
                notes: a.notes,
                ..Default::default()
            };
            desk.update_order(&order.doc_id, &patch).await?;
            println!("updated {}", order.order_id);
        }
        OrdersCmd::Delete { order_id } => {
            let order = find_orders(pool, std::slice::from_ref(&order_id)).await?.remove(0);
            desk.delete_order(&order.doc_id).await?;
            println!("deleted {order_id}");
        }
    }
    Ok(())
}

async fn send(desk: &mut OrderListController) -> Result<()> {
    let mut dispatch = desk.begin_dispatch(None).await?;
    match desk.submit(&mut dispatch).await {
        Ok(outcome) => {
            for c in &outcome.confirmed {
                println!("{} confirmed, tracking {}", c.order_id, c.tracking_code);
            }
            for f in &outcome.failed {
                println!("{} failed: {} ({})", f.order.order_id, f.reason, f.category.hint());
            }
            if !dispatch.is_closed() {
                warn!(remaining = dispatch.orders().len(), "some orders were not accepted");
            }
            Ok(())
        }
        Err(DeskError::Courier(err)) => {
            bail!("{err} ({})", err.category().hint())
        }
        Err(err) => Err(err.into()),
    }
}

async fn find_orders(pool: &Pool, order_ids: &[String]) -> Result<Vec<Order>> {
    if order_ids.is_empty() {
        bail!("no order identifiers given");
    }
    let mut orders = Vec::with_capacity(order_ids.len());
    for id in order_ids {
        let order = db::find_order_by_order_id(pool, id)
            .await?
            .ok_or_else(|| anyhow!("order {id} not found"))?;
        orders.push(order);
    }
    Ok(orders)
}

async fn run_users(pool: &Pool, actor: Option<&User>, cmd: UsersCmd) -> Result<()> {
    if let UsersCmd::Bootstrap { name, email, phone } = cmd {
        if !db::list_users(pool).await?.is_empty() {
            bail!("users already exist; ask an admin to add you");
        }
        check_user_fields(&name, &email, &phone)?;
        let user = db::create_user(pool, &name, &email, &phone, Role::Admin, UserStatus::Verified).await?;
        info!(email = %user.email, "bootstrap admin created");
        println!("created admin {}", user.email);
        return Ok(());
    }

    auth::require_admin(actor)?;
    match cmd {
        UsersCmd::Bootstrap { .. } => unreachable!("handled above"),
        UsersCmd::List => {
            for u in db::list_users(pool).await? {
                println!("{:<30} {:<20} {:<10} {}", u.email, u.name, u.role.as_str(), u.status.as_str());
            }
        }
        UsersCmd::Add { name, email, phone, role } => {
            check_user_fields(&name, &email, &phone)?;
            let user = db::create_user(pool, &name, &email, &phone, role.into(), UserStatus::NonVerified)
                .await
                .with_context(|| format!("failed to add {email}"))?;
            println!("added {} (not verified)", user.email);
        }
        UsersCmd::Verify { email, revoke } => {
            let user = user_by_email(pool, &email).await?;
            let status = if revoke { UserStatus::NonVerified } else { UserStatus::Verified };
            db::update_user_status(pool, &user.id, status).await?;
            println!("{} is now {}", user.email, status.as_str());
        }
        UsersCmd::Role { email, role } => {
            let user = user_by_email(pool, &email).await?;
            let role: Role = role.into();
            db::update_user_role(pool, &user.id, role).await?;
            println!("{} is now {}", user.email, role.as_str());
        }
        UsersCmd::Delete { email } => {
            let user = user_by_email(pool, &email).await?;
            db::delete_user(pool, &user.id).await?;
            println!("deleted {}", user.email);
        }
    }
    Ok(())
}

fn check_user_fields(name: &str, email: &str, phone: &str) -> Result<()> {
    if name.trim().is_empty() {
        bail!("name is required");
    }
    if !validation::is_valid_email(email) {
        bail!("invalid email format: {email}");
    }
    if !validation::is_valid_phone(phone) {
        bail!("phone number must be 11 digits: {phone}");
    }
    Ok(())
}

async fn user_by_email(pool: &Pool, email: &str) -> Result<User> {
    db::get_user_by_email(pool, email)
        .await?
        .ok_or_else(|| anyhow!("user {email} not found"))
}
