use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use stocksync::channels::{AdapterSet, CatalogClient, MarketplaceClient};
use stocksync::config;
use stocksync::db;
use stocksync::engine;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Push pending stock quantities for one list to all enabled channels"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Stock list to reconcile
    #[arg(long)]
    list: i64,
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

    let connect = Duration::from_secs(cfg.http.connect_timeout_seconds);
    let request = Duration::from_secs(cfg.http.request_timeout_seconds);
    let catalog = CatalogClient::new(connect, request);
    let marketplace = MarketplaceClient::new(connect, request);
    let adapters = AdapterSet {
        catalog: &catalog,
        marketplace: &marketplace,
    };

    let run = engine::run_list(&pool, &adapters, args.list).await?;

    for item in &run.items {
        info!(
            "{} {} [{}] sent={} {} {}",
            item.sku,
            item.progress,
            item.status.as_str(),
            item.sent,
            item.name,
            item.detail
        );
    }

    if !run.success {
        if run.errors > 0 {
            warn!(
                errors = run.errors,
                "run finished with channel errors; see ledger for details"
            );
        } else {
            warn!("run finished without sending any units");
        }
        std::process::exit(1);
    }
    Ok(())
}
