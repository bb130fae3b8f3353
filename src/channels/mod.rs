//! Channel adapters: protocol-specific pushers for the remote sales channels.
//!
//! Each adapter translates "send this many additional units of this product"
//! into the calls its channel's API requires. Adapters never panic and never
//! let a remote fault escape as anything other than a [`PushError`]; the
//! orchestrator turns those into per-channel ledger entries so one channel's
//! failure cannot block the others.

use crate::model::{Channel, ChannelKind, ExternalLink, ProductRef};
use async_trait::async_trait;
use thiserror::Error;

pub mod catalog;
pub mod marketplace;

pub use catalog::CatalogClient;
pub use marketplace::MarketplaceClient;

/// Failure of a single channel push. Every variant is terminal for the
/// (item, channel) pair this run; none aborts the run itself.
#[derive(Debug, Error)]
pub enum PushError {
    /// The reference search returned zero remote matches.
    #[error("no remote match for reference '{reference}'")]
    NotFound { reference: String },

    /// The remote stock record was missing and could not be created.
    #[error("failed to create remote stock record: {message}")]
    StockRecordCreation { message: String },

    /// Network failure, non-2xx response, or malformed response body.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// One or more marketplace links failed; message aggregates every
    /// per-link outcome, pipe-joined.
    #[error("{message}")]
    PartialLink { message: String },
}

impl PushError {
    pub fn transport(message: impl Into<String>) -> Self {
        PushError::Transport {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for PushError {
    fn from(err: reqwest::Error) -> Self {
        PushError::transport(err.to_string())
    }
}

/// Common contract for all channel pushers.
///
/// `qty` is the still-unsent delta computed from the ledger, always > 0.
/// Implementations add it to the remote quantity; they never overwrite the
/// remote value with an absolute target.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    async fn push(
        &self,
        channel: &Channel,
        product: &ProductRef,
        links: &[ExternalLink],
        qty: i64,
    ) -> Result<(), PushError>;
}

/// The adapters available to one run, keyed by channel kind. Tests substitute
/// recording fakes here.
pub struct AdapterSet<'a> {
    pub catalog: &'a dyn ChannelAdapter,
    pub marketplace: &'a dyn ChannelAdapter,
}

impl<'a> AdapterSet<'a> {
    pub fn for_kind(&self, kind: ChannelKind) -> Option<&'a dyn ChannelAdapter> {
        match kind {
            ChannelKind::Catalog => Some(self.catalog),
            ChannelKind::Marketplace => Some(self.marketplace),
            ChannelKind::None => None,
        }
    }
}
