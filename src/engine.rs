//! Reconciliation orchestrator.
//!
//! Drives one run over an open stock list: for every item and every enabled
//! channel it resolves applicability, derives the still-unsent quantity from
//! the ledger, pushes the delta through the matching adapter and records the
//! outcome. Items and channels are processed strictly sequentially; a fault
//! is contained at the channel level first (adapter result) and at the item
//! boundary second, so the run always reaches the last item.

use crate::applicability::{self, Applicability};
use crate::channels::AdapterSet;
use crate::db::{self, ItemForSync, Pool};
use crate::model::{Channel, ItemStatus, ListStatus, ProductRef, SyncStatus};
use crate::summary::{self, ItemReport, RunSummary};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Execute a reconciliation run for one stock list.
///
/// Refuses lists that are not `OPEN`. The list's `sync_target`/`synced_at`
/// are updated only when at least one unit was actually sent; its open/closed
/// status is never touched here.
pub async fn run_list(pool: &Pool, adapters: &AdapterSet<'_>, list_id: i64) -> Result<RunSummary> {
    let list = db::get_list(pool, list_id)
        .await?
        .with_context(|| format!("stock list {} not found", list_id))?;
    if list.status != ListStatus::Open {
        bail!("stock list {} is not open", list_id);
    }

    let run_id = Uuid::new_v4().to_string();
    let channels = db::all_channels(pool).await?;
    let enabled: Vec<&Channel> = channels.iter().filter(|c| c.enabled).collect();
    let items = db::items_for_sync(pool, list_id).await?;
    info!(
        run = %run_id,
        list = list_id,
        items = items.len(),
        channels = enabled.len(),
        "starting reconciliation run"
    );

    let mut reports = Vec::with_capacity(items.len());
    for item in &items {
        if enabled.is_empty() {
            // No enabled channel anywhere: omit without touching the ledger.
            reports.push(ItemReport {
                product_id: item.product_id,
                sku: item.sku.clone(),
                name: item.name.clone(),
                sent: 0,
                pending_after: 0,
                status: ItemStatus::Omitted,
                progress: summary::progress_string(item.synced_qty.min(item.qty), item.qty),
                detail: String::new(),
            });
            continue;
        }

        let report = match process_item(pool, adapters, list_id, item, &enabled).await {
            Ok(report) => report,
            Err(err) => {
                // Item boundary: the fault stops this item, never the run.
                error!(?err, product = %item.sku, "item processing failed");
                ItemReport {
                    product_id: item.product_id,
                    sku: item.sku.clone(),
                    name: item.name.clone(),
                    sent: 0,
                    pending_after: 0,
                    status: ItemStatus::Error,
                    progress: summary::progress_string(0, item.qty),
                    detail: format!("item error: {:#}", err),
                }
            }
        };
        reports.push(report);
    }

    let run = RunSummary::build(run_id.clone(), list_id, reports);
    if run.total_sent > 0 {
        db::mark_list_synced(pool, list_id, &run_id, Utc::now()).await?;
    }
    info!("{}", run.banner());
    Ok(run)
}

async fn process_item(
    pool: &Pool,
    adapters: &AdapterSet<'_>,
    list_id: i64,
    item: &ItemForSync,
    channels: &[&Channel],
) -> Result<ItemReport> {
    let product = ProductRef {
        id: item.product_id,
        sku: item.sku.clone(),
        name: item.name.clone(),
    };

    let mut details = Vec::new();
    let mut applicable = 0usize;
    let mut failed = 0usize;
    let mut pending_total = 0i64;
    let mut sent = 0i64;
    let mut pending_after = 0i64;
    let mut min_synced: Option<i64> = None;

    for channel in channels {
        let links = db::links_for_product(pool, product.id, channel.id).await?;
        match applicability::resolve(channel, links.len()) {
            Applicability::Skip { reason } => {
                // Definitive, not transient: recorded so future runs don't
                // re-evaluate this pair as pending.
                db::upsert_progress(
                    pool,
                    list_id,
                    product.id,
                    channel.id,
                    0,
                    0,
                    SyncStatus::Na,
                    Some(&reason),
                )
                .await?;
                details.push(summary::detail_na(&channel.name));
            }
            Applicability::Applicable => {
                applicable += 1;
                let previous = db::read_progress(pool, list_id, product.id, channel.id).await?;
                let already = previous.map(|p| p.synced_qty.max(0)).unwrap_or(0);
                let pending = (item.qty - already).max(0);
                pending_total += pending;

                if pending == 0 {
                    // Re-confirm done without invoking the adapter.
                    let synced = already.min(item.qty);
                    db::upsert_progress(
                        pool,
                        list_id,
                        product.id,
                        channel.id,
                        synced,
                        item.qty,
                        SyncStatus::Done,
                        None,
                    )
                    .await?;
                    details.push(summary::detail_ok(&channel.name, synced, item.qty));
                    track_min(&mut min_synced, synced);
                    continue;
                }

                let Some(adapter) = adapters.for_kind(channel.kind) else {
                    bail!("no adapter for channel kind {}", channel.kind.as_str());
                };
                match adapter.push(channel, &product, &links, pending).await {
                    Ok(()) => {
                        db::upsert_progress(
                            pool,
                            list_id,
                            product.id,
                            channel.id,
                            item.qty,
                            item.qty,
                            SyncStatus::Done,
                            None,
                        )
                        .await?;
                        sent += pending;
                        details.push(summary::detail_ok(&channel.name, item.qty, item.qty));
                        track_min(&mut min_synced, item.qty);
                        info!(
                            channel = %channel.name,
                            product = %product.sku,
                            qty = pending,
                            "pushed stock delta"
                        );
                    }
                    Err(err) => {
                        let message = err.to_string();
                        warn!(
                            channel = %channel.name,
                            product = %product.sku,
                            error = %message,
                            "channel push failed"
                        );
                        let synced = already.min(item.qty);
                        db::upsert_progress(
                            pool,
                            list_id,
                            product.id,
                            channel.id,
                            synced,
                            item.qty,
                            SyncStatus::Error,
                            Some(&message),
                        )
                        .await?;
                        failed += 1;
                        pending_after += pending;
                        details.push(summary::detail_error(&channel.name, &message));
                        track_min(&mut min_synced, synced);
                    }
                }
            }
        }
    }

    let status = classify_item(applicable, failed, pending_total);
    // Cross-channel completion where channels applied; otherwise fall back
    // to the locally recorded scanning progress.
    let progress_synced = min_synced.unwrap_or(item.synced_qty).min(item.qty);
    Ok(ItemReport {
        product_id: product.id,
        sku: item.sku.clone(),
        name: item.name.clone(),
        sent,
        pending_after,
        status,
        progress: summary::progress_string(progress_synced, item.qty),
        detail: summary::join_details(&details),
    })
}

fn track_min(slot: &mut Option<i64>, value: i64) {
    *slot = Some(match *slot {
        Some(current) => current.min(value),
        None => value,
    });
}

/// Item classification, evaluated after all channels were processed.
/// Adapters only run when pending > 0, so failures imply pending was seen.
fn classify_item(applicable: usize, failed: usize, pending_total: i64) -> ItemStatus {
    if applicable == 0 {
        ItemStatus::Omitted
    } else if pending_total == 0 {
        ItemStatus::NoPending
    } else if failed == 0 {
        ItemStatus::Ok
    } else {
        ItemStatus::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_no_applicable_channel_is_omitted() {
        assert_eq!(classify_item(0, 0, 0), ItemStatus::Omitted);
    }

    #[test]
    fn classify_zero_pending_is_no_pending() {
        assert_eq!(classify_item(2, 0, 0), ItemStatus::NoPending);
    }

    #[test]
    fn classify_all_channels_done_is_ok() {
        assert_eq!(classify_item(2, 0, 8), ItemStatus::Ok);
    }

    #[test]
    fn classify_any_failed_channel_is_error() {
        assert_eq!(classify_item(2, 1, 8), ItemStatus::Error);
    }

    #[test]
    fn track_min_keeps_smallest() {
        let mut slot = None;
        track_min(&mut slot, 5);
        track_min(&mut slot, 3);
        track_min(&mut slot, 9);
        assert_eq!(slot, Some(3));
    }
}
