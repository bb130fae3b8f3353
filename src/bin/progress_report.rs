use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use sqlx::Row;
use stocksync::config;
use stocksync::db;

#[derive(Parser, Debug)]
struct Args {
    /// Path to YAML config
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Stock list whose ledger rows to print
    #[arg(long)]
    list: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let rows = sqlx::query(
        "SELECT p.sku, c.name AS channel, s.synced_qty, s.target_qty, s.status, s.last_error, s.updated_at \
         FROM sync_progress s \
         JOIN products p ON p.id = s.product_id \
         JOIN channels c ON c.id = s.channel_id \
         WHERE s.list_id = ? \
         ORDER BY p.sku, c.name",
    )
    .bind(args.list)
    .fetch_all(&pool)
    .await?;

    println!("Ledger for list {}:", args.list);
    for row in rows {
        let sku: String = row.get("sku");
        let channel: String = row.get("channel");
        let synced: i64 = row.get("synced_qty");
        let target: i64 = row.get("target_qty");
        let status: String = row.get("status");
        let last_error: Option<String> = row.try_get("last_error").ok();
        match last_error {
            Some(err) => println!("  {} @ {} -> {}/{} {} ({})", sku, channel, synced, target, status, err),
            None => println!("  {} @ {} -> {}/{} {}", sku, channel, synced, target, status),
        }
    }
    Ok(())
}
