//! Database view models used by repositories.
//!
//! Keep these structs focused on the data returned by queries. Business logic
//! should live in higher layers.

use crate::model::SyncStatus;

/// List item slice the orchestrator works on: quantities plus the joined
/// product identity the adapters need.
#[derive(Debug, Clone)]
pub struct ItemForSync {
    pub item_id: i64,
    pub product_id: i64,
    pub qty: i64,
    pub synced_qty: i64,
    pub sku: String,
    pub name: String,
}

/// Last recorded state of one (list, product, channel) ledger row.
#[derive(Debug, Clone)]
pub struct SyncProgressRow {
    pub synced_qty: i64,
    pub target_qty: i64,
    pub status: SyncStatus,
    pub last_error: Option<String>,
}
