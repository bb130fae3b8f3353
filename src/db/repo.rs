use super::model::{ItemForSync, SyncProgressRow};
use crate::model::{Channel, ChannelKind, ExternalLink, ListStatus, StockList, SyncStatus};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    // WAL plus strict durability; the ledger must survive a crash mid-run.
    // foreign_keys is per-connection in sqlite, so it has to be a connect
    // option rather than a one-off pragma.
    let options = SqliteConnectOptions::from_str(&normalized)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full)
        .foreign_keys(true);
    // An in-memory database exists per connection; cap the pool at one so
    // every query sees the same database.
    let max_connections = if normalized.contains(":memory:") { 1 } else { 5 };
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// For file-backed SQLite URLs, expand a leading `~/` and make sure the
/// parent directory exists. In-memory URLs and other schemes pass through.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (path, query) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path.is_empty() {
        return url.to_string();
    }

    let expanded = match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path.to_string(),
    };
    if let Some(parent) = std::path::Path::new(&expanded).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    match query {
        Some(q) => format!("sqlite://{}?{}", expanded, q),
        None => format!("sqlite://{}", expanded),
    }
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn get_list(pool: &Pool, list_id: i64) -> Result<Option<StockList>> {
    let row = sqlx::query(
        "SELECT id, name, status, sync_target, synced_at FROM stock_lists WHERE id = ?",
    )
    .bind(list_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let status_str: String = row.get("status");
    let status = ListStatus::parse(&status_str)
        .ok_or_else(|| anyhow!("stock list {} has unknown status {}", list_id, status_str))?;
    Ok(Some(StockList {
        id: row.get("id"),
        name: row.get("name"),
        status,
        sync_target: row.try_get("sync_target").ok(),
        synced_at: row
            .try_get::<Option<DateTime<Utc>>, _>("synced_at")
            .ok()
            .flatten(),
    }))
}

#[instrument(skip_all)]
pub async fn items_for_sync(pool: &Pool, list_id: i64) -> Result<Vec<ItemForSync>> {
    let rows = sqlx::query(
        "SELECT i.id, i.product_id, i.qty, i.synced_qty, p.sku, p.name \
         FROM stock_list_items i \
         JOIN products p ON p.id = i.product_id \
         WHERE i.list_id = ? \
         ORDER BY i.id",
    )
    .bind(list_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| ItemForSync {
            item_id: row.get("id"),
            product_id: row.get("product_id"),
            qty: row.get("qty"),
            synced_qty: row.get("synced_qty"),
            sku: row.get("sku"),
            name: row.get("name"),
        })
        .collect())
}

#[instrument(skip_all)]
pub async fn all_channels(pool: &Pool) -> Result<Vec<Channel>> {
    let rows = sqlx::query(
        "SELECT id, name, kind, enabled, push_allowed, url, api_key, token \
         FROM channels ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    let mut channels = Vec::with_capacity(rows.len());
    for row in rows {
        let kind_str: String = row.get("kind");
        let kind = ChannelKind::parse(&kind_str).ok_or_else(|| {
            anyhow!(
                "channel {} has unknown kind {}",
                row.get::<i64, _>("id"),
                kind_str
            )
        })?;
        channels.push(Channel {
            id: row.get("id"),
            name: row.get("name"),
            kind,
            enabled: row.get::<i64, _>("enabled") != 0,
            push_allowed: row.get::<i64, _>("push_allowed") != 0,
            url: row.try_get::<Option<String>, _>("url").ok().flatten(),
            api_key: row.try_get::<Option<String>, _>("api_key").ok().flatten(),
            token: row.try_get::<Option<String>, _>("token").ok().flatten(),
        });
    }
    Ok(channels)
}

#[instrument(skip_all)]
pub async fn links_for_product(
    pool: &Pool,
    product_id: i64,
    channel_id: i64,
) -> Result<Vec<ExternalLink>> {
    let rows = sqlx::query(
        "SELECT id, product_id, channel_id, listing_id, variation_id \
         FROM external_links WHERE product_id = ? AND channel_id = ? ORDER BY id",
    )
    .bind(product_id)
    .bind(channel_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| ExternalLink {
            id: row.get("id"),
            product_id: row.get("product_id"),
            channel_id: row.get("channel_id"),
            listing_id: row.get("listing_id"),
            variation_id: row
                .try_get::<Option<String>, _>("variation_id")
                .ok()
                .flatten(),
        })
        .collect())
}

#[instrument(skip_all)]
pub async fn read_progress(
    pool: &Pool,
    list_id: i64,
    product_id: i64,
    channel_id: i64,
) -> Result<Option<SyncProgressRow>> {
    let row = sqlx::query(
        "SELECT synced_qty, target_qty, status, last_error FROM sync_progress \
         WHERE list_id = ? AND product_id = ? AND channel_id = ?",
    )
    .bind(list_id)
    .bind(product_id)
    .bind(channel_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let status_str: String = row.get("status");
    let status = SyncStatus::parse(&status_str)
        .ok_or_else(|| anyhow!("sync_progress row has unknown status {}", status_str))?;
    Ok(Some(SyncProgressRow {
        synced_qty: row.get("synced_qty"),
        target_qty: row.get("target_qty"),
        status,
        last_error: row
            .try_get::<Option<String>, _>("last_error")
            .ok()
            .flatten(),
    }))
}

/// Idempotent write keyed by (list, product, channel); last write wins.
#[instrument(skip_all)]
#[allow(clippy::too_many_arguments)]
pub async fn upsert_progress(
    pool: &Pool,
    list_id: i64,
    product_id: i64,
    channel_id: i64,
    synced_qty: i64,
    target_qty: i64,
    status: SyncStatus,
    last_error: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO sync_progress \
           (list_id, product_id, channel_id, synced_qty, target_qty, status, last_error, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP) \
         ON CONFLICT (list_id, product_id, channel_id) DO UPDATE SET \
           synced_qty = excluded.synced_qty, \
           target_qty = excluded.target_qty, \
           status = excluded.status, \
           last_error = excluded.last_error, \
           updated_at = CURRENT_TIMESTAMP",
    )
    .bind(list_id)
    .bind(product_id)
    .bind(channel_id)
    .bind(synced_qty)
    .bind(target_qty)
    .bind(status.as_str())
    .bind(last_error)
    .execute(pool)
    .await?;
    Ok(())
}

/// Record that a run actually sent units for this list.
#[instrument(skip_all)]
pub async fn mark_list_synced(
    pool: &Pool,
    list_id: i64,
    run_id: &str,
    at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("UPDATE stock_lists SET sync_target = ?, synced_at = ? WHERE id = ?")
        .bind(run_id)
        .bind(at)
        .bind(list_id)
        .execute(pool)
        .await?;
    Ok(())
}

// Write helpers below are the interface the surrounding administration
// tooling (and the tests) use to stage data; the engine itself only reads
// these tables.

#[instrument(skip_all)]
pub async fn create_product(pool: &Pool, sku: &str, name: &str) -> Result<i64> {
    let rec = sqlx::query("INSERT INTO products (sku, name) VALUES (?, ?) RETURNING id")
        .bind(sku)
        .bind(name)
        .fetch_one(pool)
        .await?;
    Ok(rec.get("id"))
}

#[instrument(skip_all)]
pub async fn create_channel(pool: &Pool, channel: &Channel) -> Result<i64> {
    let rec = sqlx::query(
        "INSERT INTO channels (name, kind, enabled, push_allowed, url, api_key, token) \
         VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(&channel.name)
    .bind(channel.kind.as_str())
    .bind(channel.enabled as i64)
    .bind(channel.push_allowed as i64)
    .bind(channel.url.as_deref())
    .bind(channel.api_key.as_deref())
    .bind(channel.token.as_deref())
    .fetch_one(pool)
    .await?;
    Ok(rec.get("id"))
}

#[instrument(skip_all)]
pub async fn create_stock_list(pool: &Pool, name: &str) -> Result<i64> {
    let rec = sqlx::query("INSERT INTO stock_lists (name, status) VALUES (?, ?) RETURNING id")
        .bind(name)
        .bind(ListStatus::Open.as_str())
        .fetch_one(pool)
        .await?;
    Ok(rec.get("id"))
}

#[instrument(skip_all)]
pub async fn set_list_status(pool: &Pool, list_id: i64, status: ListStatus) -> Result<()> {
    sqlx::query("UPDATE stock_lists SET status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(list_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn add_list_item(pool: &Pool, list_id: i64, product_id: i64, qty: i64) -> Result<i64> {
    let rec = sqlx::query(
        "INSERT INTO stock_list_items (list_id, product_id, qty, synced_qty) \
         VALUES (?, ?, ?, 0) RETURNING id",
    )
    .bind(list_id)
    .bind(product_id)
    .bind(qty)
    .fetch_one(pool)
    .await?;
    Ok(rec.get("id"))
}

#[instrument(skip_all)]
pub async fn link_product(
    pool: &Pool,
    product_id: i64,
    channel_id: i64,
    listing_id: &str,
    variation_id: Option<&str>,
) -> Result<i64> {
    let rec = sqlx::query(
        "INSERT INTO external_links (product_id, channel_id, listing_id, variation_id) \
         VALUES (?, ?, ?, ?) RETURNING id",
    )
    .bind(product_id)
    .bind(channel_id)
    .bind(listing_id)
    .bind(variation_id)
    .fetch_one(pool)
    .await?;
    Ok(rec.get("id"))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_pool() -> Pool {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    fn catalog_channel(name: &str) -> Channel {
        Channel {
            id: 0,
            name: name.into(),
            kind: ChannelKind::Catalog,
            enabled: true,
            push_allowed: true,
            url: Some("http://shop.example".into()),
            api_key: Some("KEY".into()),
            token: None,
        }
    }

    #[tokio::test]
    async fn upsert_progress_is_idempotent_per_key() {
        let pool = setup_pool().await;
        let product = create_product(&pool, "SKU-1", "Widget").await.unwrap();
        let channel = create_channel(&pool, &catalog_channel("shop")).await.unwrap();
        let list = create_stock_list(&pool, "inventory").await.unwrap();
        add_list_item(&pool, list, product, 5).await.unwrap();

        upsert_progress(&pool, list, product, channel, 0, 5, SyncStatus::Pending, None)
            .await
            .unwrap();
        upsert_progress(
            &pool,
            list,
            product,
            channel,
            5,
            5,
            SyncStatus::Done,
            None,
        )
        .await
        .unwrap();

        // Last write wins; the unique key keeps a single row.
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_progress")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);

        let row = read_progress(&pool, list, product, channel)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.synced_qty, 5);
        assert_eq!(row.target_qty, 5);
        assert_eq!(row.status, SyncStatus::Done);
        assert!(row.last_error.is_none());
    }

    #[tokio::test]
    async fn progress_rows_cascade_with_their_item() {
        let pool = setup_pool().await;
        let product = create_product(&pool, "SKU-2", "Gadget").await.unwrap();
        let channel = create_channel(&pool, &catalog_channel("shop")).await.unwrap();
        let list = create_stock_list(&pool, "inventory").await.unwrap();
        let item = add_list_item(&pool, list, product, 3).await.unwrap();

        upsert_progress(&pool, list, product, channel, 3, 3, SyncStatus::Done, None)
            .await
            .unwrap();

        sqlx::query("DELETE FROM stock_list_items WHERE id = ?")
            .bind(item)
            .execute(&pool)
            .await
            .unwrap();

        assert!(read_progress(&pool, list, product, channel)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn links_are_scoped_to_product_and_channel() {
        let pool = setup_pool().await;
        let p1 = create_product(&pool, "SKU-3", "A").await.unwrap();
        let p2 = create_product(&pool, "SKU-4", "B").await.unwrap();
        let c1 = create_channel(&pool, &catalog_channel("shop")).await.unwrap();
        let c2 = create_channel(&pool, &catalog_channel("market")).await.unwrap();

        link_product(&pool, p1, c1, "L-1", None).await.unwrap();
        link_product(&pool, p1, c1, "L-2", Some("V-9")).await.unwrap();
        link_product(&pool, p1, c2, "L-3", None).await.unwrap();
        link_product(&pool, p2, c1, "L-4", None).await.unwrap();

        let links = links_for_product(&pool, p1, c1).await.unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].listing_id, "L-1");
        assert_eq!(links[1].variation_id.as_deref(), Some("V-9"));
    }

    #[tokio::test]
    async fn list_sync_metadata_roundtrip() {
        let pool = setup_pool().await;
        let list = create_stock_list(&pool, "inventory").await.unwrap();

        let before = get_list(&pool, list).await.unwrap().unwrap();
        assert_eq!(before.status, ListStatus::Open);
        assert!(before.sync_target.is_none());
        assert!(before.synced_at.is_none());

        let now = Utc::now();
        mark_list_synced(&pool, list, "run-abc", now).await.unwrap();
        set_list_status(&pool, list, ListStatus::Closed).await.unwrap();

        let after = get_list(&pool, list).await.unwrap().unwrap();
        assert_eq!(after.status, ListStatus::Closed);
        assert_eq!(after.sync_target.as_deref(), Some("run-abc"));
        assert!(after.synced_at.is_some());
    }
}
