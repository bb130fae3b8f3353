use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a stock list. Only `OPEN` lists may be reconciled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ListStatus {
    Open,
    Closed,
}

impl ListStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListStatus::Open => "OPEN",
            ListStatus::Closed => "CLOSED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(ListStatus::Open),
            "CLOSED" => Some(ListStatus::Closed),
            _ => None,
        }
    }
}

/// Remote protocol spoken by a channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChannelKind {
    None,
    Catalog,
    Marketplace,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::None => "NONE",
            ChannelKind::Catalog => "CATALOG",
            ChannelKind::Marketplace => "MARKETPLACE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NONE" => Some(ChannelKind::None),
            "CATALOG" => Some(ChannelKind::Catalog),
            "MARKETPLACE" => Some(ChannelKind::Marketplace),
            _ => None,
        }
    }
}

/// State of one (list, product, channel) ledger row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SyncStatus {
    Pending,
    Done,
    Error,
    Na,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "PENDING",
            SyncStatus::Done => "DONE",
            SyncStatus::Error => "ERROR",
            SyncStatus::Na => "NA",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(SyncStatus::Pending),
            "DONE" => Some(SyncStatus::Done),
            "ERROR" => Some(SyncStatus::Error),
            "NA" => Some(SyncStatus::Na),
            _ => None,
        }
    }
}

/// Overall outcome of one list item after all channels were processed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ItemStatus {
    Ok,
    Error,
    Omitted,
    NoPending,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Ok => "OK",
            ItemStatus::Error => "ERROR",
            ItemStatus::Omitted => "OMITTED",
            ItemStatus::NoPending => "NO_PENDING",
        }
    }
}

/// A sales channel as configured by the administration tooling.
///
/// `url` + `api_key` carry the catalog credentials (basic auth, key as
/// username), `url` + `token` the marketplace bearer credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: i64,
    pub name: String,
    pub kind: ChannelKind,
    pub enabled: bool,
    pub push_allowed: bool,
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockList {
    pub id: i64,
    pub name: String,
    pub status: ListStatus,
    pub sync_target: Option<String>,
    pub synced_at: Option<DateTime<Utc>>,
}

/// The slice of a product the adapters need: identity plus the reference
/// used for remote matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRef {
    pub id: i64,
    pub sku: String,
    pub name: String,
}

/// A previously established link from a local product to a remote listing
/// on one channel. Marketplace links may be scoped to a single variation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalLink {
    pub id: i64,
    pub product_id: i64,
    pub channel_id: i64,
    pub listing_id: String,
    pub variation_id: Option<String>,
}
