use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use orderdesk::auth;
use orderdesk::config::{self, Config};
use orderdesk::db;
use orderdesk::invoice;
use orderdesk::model::OrderStatus;

#[derive(Debug, Parser)]
#[command(
    about = "Export HTML invoices for stored orders. Render them to PDF with any HTML-to-PDF tool."
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Email of the moderator or admin exporting
    #[arg(long)]
    actor: String,

    /// Order identifiers to export; all orders when omitted
    order_ids: Vec<String>,

    /// Only export confirmed orders
    #[arg(long)]
    confirmed_only: bool,

    /// Output directory (defaults to app.invoice_dir)
    #[arg(long)]
    out: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    run(&cfg, &args).await
}

async fn run(cfg: &Config, args: &Args) -> Result<()> {
    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let actor = db::get_user_by_email(&pool, &args.actor).await?;
    auth::require_moderator(actor.as_ref())?;

    let mut orders = if args.order_ids.is_empty() {
        db::list_all_orders(&pool).await?
    } else {
        let mut found = Vec::with_capacity(args.order_ids.len());
        for id in &args.order_ids {
            let order = db::find_order_by_order_id(&pool, id)
                .await?
                .ok_or_else(|| anyhow!("order {id} not found"))?;
            found.push(order);
        }
        found
    };
    if args.confirmed_only {
        orders.retain(|o| o.status == OrderStatus::Confirmed);
    }
    if orders.is_empty() {
        info!("no orders to export");
        return Ok(());
    }

    let dir = args
        .out
        .clone()
        .unwrap_or_else(|| PathBuf::from(cfg.app.resolved_invoice_dir()));
    let written = invoice::write_invoices(&orders, &cfg.shop, &dir).await?;
    info!(count = written.len(), dir = %dir.display(), "invoices exported");
    Ok(())
}
