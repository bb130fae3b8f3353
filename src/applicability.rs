//! Decides whether a (product, channel) pair should be synced at all.
//!
//! The answer is definitive for this run: a skipped pair is recorded as an
//! `NA` ledger row by the orchestrator so later runs do not keep
//! re-evaluating it as pending work.

use crate::model::{Channel, ChannelKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applicability {
    Applicable,
    Skip { reason: String },
}

impl Applicability {
    fn skip(reason: &str) -> Self {
        Applicability::Skip {
            reason: reason.to_string(),
        }
    }

    pub fn is_applicable(&self) -> bool {
        matches!(self, Applicability::Applicable)
    }
}

fn blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

/// `link_count` is the number of external links the product has on this
/// channel; only the marketplace kind requires links to exist.
pub fn resolve(channel: &Channel, link_count: usize) -> Applicability {
    if !channel.enabled {
        return Applicability::skip("channel disabled");
    }
    if !channel.push_allowed {
        return Applicability::skip("stock push not allowed");
    }
    match channel.kind {
        ChannelKind::None => Applicability::skip("no connection configured"),
        ChannelKind::Catalog => {
            if blank(&channel.url) || blank(&channel.api_key) {
                return Applicability::skip("catalog credentials missing");
            }
            Applicability::Applicable
        }
        ChannelKind::Marketplace => {
            if blank(&channel.url) || blank(&channel.token) {
                return Applicability::skip("marketplace credentials missing");
            }
            if link_count == 0 {
                return Applicability::skip("no remote links");
            }
            Applicability::Applicable
        }
    }
}
