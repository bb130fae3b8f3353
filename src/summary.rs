//! Aggregates per-item, per-channel outcomes into the run report handed back
//! to the caller (and rendered by the CLI).

use crate::model::ItemStatus;
use serde::Serialize;

/// One processed list item.
#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub product_id: i64,
    pub sku: String,
    pub name: String,
    /// Units actually sent for this item during this run, all channels.
    pub sent: i64,
    /// Units still unsent after this run across applicable channels.
    pub pending_after: i64,
    pub status: ItemStatus,
    /// `"synced/total"` cross-channel progress.
    pub progress: String,
    /// Pipe-joined per-channel detail lines.
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub list_id: i64,
    pub ok: usize,
    pub errors: usize,
    pub omitted: usize,
    pub no_pending: usize,
    pub total_sent: i64,
    pub total_pending: i64,
    pub success: bool,
    pub items: Vec<ItemReport>,
}

impl RunSummary {
    pub fn build(run_id: String, list_id: i64, items: Vec<ItemReport>) -> Self {
        let mut ok = 0;
        let mut errors = 0;
        let mut omitted = 0;
        let mut no_pending = 0;
        let mut total_sent = 0;
        let mut total_pending = 0;
        for item in &items {
            match item.status {
                ItemStatus::Ok => ok += 1,
                ItemStatus::Error => errors += 1,
                ItemStatus::Omitted => omitted += 1,
                ItemStatus::NoPending => no_pending += 1,
            }
            total_sent += item.sent;
            total_pending += item.pending_after;
        }
        let success = errors == 0 && total_sent > 0;
        RunSummary {
            run_id,
            list_id,
            ok,
            errors,
            omitted,
            no_pending,
            total_sent,
            total_pending,
            success,
            items,
        }
    }

    pub fn banner(&self) -> String {
        let outcome = if self.success {
            "completed"
        } else if self.errors > 0 {
            "completed with errors"
        } else {
            "nothing sent"
        };
        format!(
            "run {} {}: {} ok / {} error / {} omitted / {} no-pending; {} unit(s) sent, {} still pending",
            self.run_id,
            outcome,
            self.ok,
            self.errors,
            self.omitted,
            self.no_pending,
            self.total_sent,
            self.total_pending
        )
    }
}

pub fn progress_string(synced: i64, total: i64) -> String {
    format!("{}/{}", synced, total)
}

pub fn detail_ok(channel: &str, synced: i64, target: i64) -> String {
    format!("{}: OK ({}/{})", channel, synced, target)
}

pub fn detail_na(channel: &str) -> String {
    format!("{}: N/A", channel)
}

pub fn detail_error(channel: &str, message: &str) -> String {
    format!("{}: ERROR ({})", channel, message)
}

pub fn join_details(details: &[String]) -> String {
    details.join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(status: ItemStatus, sent: i64, pending_after: i64) -> ItemReport {
        ItemReport {
            product_id: 1,
            sku: "SKU-1".into(),
            name: "Widget".into(),
            sent,
            pending_after,
            status,
            progress: progress_string(sent, sent + pending_after),
            detail: String::new(),
        }
    }

    #[test]
    fn detail_lines_match_report_format() {
        assert_eq!(detail_ok("shop", 5, 5), "shop: OK (5/5)");
        assert_eq!(detail_na("market"), "market: N/A");
        assert_eq!(
            detail_error("shop", "transport error: timed out"),
            "shop: ERROR (transport error: timed out)"
        );
        assert_eq!(
            join_details(&["shop: OK (5/5)".into(), "market: N/A".into()]),
            "shop: OK (5/5) | market: N/A"
        );
    }

    #[test]
    fn build_counts_statuses_and_totals() {
        let summary = RunSummary::build(
            "run-1".into(),
            9,
            vec![
                item(ItemStatus::Ok, 5, 0),
                item(ItemStatus::Error, 2, 3),
                item(ItemStatus::Omitted, 0, 0),
                item(ItemStatus::NoPending, 0, 0),
            ],
        );
        assert_eq!(summary.ok, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.omitted, 1);
        assert_eq!(summary.no_pending, 1);
        assert_eq!(summary.total_sent, 7);
        assert_eq!(summary.total_pending, 3);
        assert!(!summary.success);
    }

    #[test]
    fn success_requires_no_errors_and_units_sent() {
        let sent_clean = RunSummary::build("r".into(), 1, vec![item(ItemStatus::Ok, 5, 0)]);
        assert!(sent_clean.success);

        let nothing_sent = RunSummary::build("r".into(), 1, vec![item(ItemStatus::NoPending, 0, 0)]);
        assert!(!nothing_sent.success);
        assert!(nothing_sent.banner().contains("nothing sent"));

        let failed = RunSummary::build(
            "r".into(),
            1,
            vec![item(ItemStatus::Ok, 5, 0), item(ItemStatus::Error, 0, 4)],
        );
        assert!(!failed.success);
        assert!(failed.banner().contains("completed with errors"));
    }
}
