use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use orderdesk::auth;
use orderdesk::config;
use orderdesk::controller::{ControllerSettings, OrderListController};
use orderdesk::db;
use orderdesk::fraud::FraudClient;
use orderdesk::steadfast::SteadfastClient;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Check courier status for every stored order, write confirmed statuses back, and exit"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Email of the moderator or admin running the sync
    #[arg(long)]
    actor: String,

    /// Only look at the first N pages (newest orders first)
    #[arg(long)]
    max_pages: Option<u32>,

    /// Report what would change without writing to the store
    #[arg(long)]
    dry_run: bool,
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
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let actor = db::get_user_by_email(&pool, &args.actor).await?;
    auth::require_moderator(actor.as_ref())?;

    let gateway = Arc::new(SteadfastClient::from_config(&cfg)?);
    let fraud = Arc::new(FraudClient::from_config(&cfg)?);
    let mut desk = OrderListController::new(pool, gateway, fraud, ControllerSettings::from_config(&cfg));

    let result = sync_pages(&mut desk, &args).await;
    desk.shutdown().await;
    result
}

async fn sync_pages(desk: &mut OrderListController, args: &Args) -> Result<()> {
    desk.load_page(1).await?;
    let last_page = match args.max_pages {
        Some(n) => desk.total_pages().min(n.max(1)),
        None => desk.total_pages(),
    };
    info!(total_orders = desk.total_orders(), pages = last_page, "starting status sync");

    let mut checked = 0usize;
    let mut failed = 0usize;
    let mut updated = 0usize;
    for page in 1..=last_page {
        if page > 1 {
            desk.load_page(page).await?;
        }
        let report = desk.check_all_visible().await;
        checked += report.total;
        failed += report.failures.len();
        for (order_id, err) in &report.failures {
            warn!(order_id = %order_id, %err, "status check failed");
        }

        if args.dry_run {
            let planned = orderdesk::sync::plan_reconciliation(&desk.view().snapshot().await);
            for change in &planned {
                info!(order_id = %change.order_id, from = %change.from, to = %change.to, delivery = %change.delivery_status, "would update");
            }
            updated += planned.len();
        } else {
            updated += desk.reconcile().await?;
        }
        info!(page, summary = %report.summary(), "page synced");
    }

    info!(checked, failed, updated, dry_run = args.dry_run, "status sync finished");
    Ok(())
}
