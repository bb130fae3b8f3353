//! Marketplace adapter: JSON over HTTP against pre-linked listings.
//!
//! A product may carry several links on one channel; each link is pushed
//! independently and the per-link outcomes are aggregated, so one broken
//! listing does not stop the others from receiving stock. The update is a
//! partial body scoped to the listing or to a single variation.

use crate::channels::{ChannelAdapter, PushError};
use crate::model::{Channel, ExternalLink, ProductRef};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;

pub struct MarketplaceClient {
    http: Client,
}

impl fmt::Debug for MarketplaceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarketplaceClient").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Listing {
    pub id: String,
    pub available_quantity: i64,
    #[serde(default)]
    pub variations: Vec<Variation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Variation {
    pub id: String,
    pub available_quantity: i64,
}

impl MarketplaceClient {
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Self {
        let http = Client::builder()
            .user_agent("stocksync/0.1")
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .expect("reqwest client");
        Self { http }
    }

    async fn fetch_listing(
        &self,
        channel: &Channel,
        listing_id: &str,
    ) -> Result<Listing, PushError> {
        let (base, token) = credentials(channel)?;
        let url = format!("{}/items/{}", base.trim_end_matches('/'), listing_id);
        let res = self.http.get(&url).bearer_auth(token).send().await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(PushError::transport(format!(
                "marketplace error {}: {}",
                status, body
            )));
        }
        res.json::<Listing>()
            .await
            .map_err(|err| PushError::transport(format!("malformed listing body: {}", err)))
    }

    async fn update_listing(
        &self,
        channel: &Channel,
        listing_id: &str,
        body: &Value,
    ) -> Result<(), PushError> {
        let (base, token) = credentials(channel)?;
        let url = format!("{}/items/{}", base.trim_end_matches('/'), listing_id);
        let res = self
            .http
            .put(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(PushError::transport(format!(
                "marketplace error {}: {}",
                status, body
            )));
        }
        Ok(())
    }

    /// Push one link; the error string is this link's line in the aggregate.
    async fn push_link(
        &self,
        channel: &Channel,
        link: &ExternalLink,
        qty: i64,
    ) -> Result<(), String> {
        let listing = self
            .fetch_listing(channel, &link.listing_id)
            .await
            .map_err(|err| err.to_string())?;

        let body = match &link.variation_id {
            Some(variation_id) => {
                let current = variation_quantity(&listing, variation_id)
                    .ok_or_else(|| format!("variation {} not found", variation_id))?;
                build_variation_update(variation_id, current + qty)
            }
            None => build_listing_update(listing.available_quantity + qty),
        };

        self.update_listing(channel, &link.listing_id, &body)
            .await
            .map_err(|err| err.to_string())
    }
}

fn credentials(channel: &Channel) -> Result<(&str, &str), PushError> {
    let base = channel
        .url
        .as_deref()
        .ok_or_else(|| PushError::transport("channel has no marketplace URL"))?;
    let token = channel
        .token
        .as_deref()
        .ok_or_else(|| PushError::transport("channel has no marketplace token"))?;
    Ok((base, token))
}

#[async_trait]
impl ChannelAdapter for MarketplaceClient {
    async fn push(
        &self,
        channel: &Channel,
        _product: &ProductRef,
        links: &[ExternalLink],
        qty: i64,
    ) -> Result<(), PushError> {
        if links.is_empty() {
            return Err(PushError::transport("no marketplace links for product"));
        }

        let mut failures = Vec::new();
        for link in links {
            if let Err(message) = self.push_link(channel, link, qty).await {
                failures.push(format!("{}: {}", link.listing_id, message));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(PushError::PartialLink {
                message: failures.join(" | "),
            })
        }
    }
}

pub fn variation_quantity(listing: &Listing, variation_id: &str) -> Option<i64> {
    listing
        .variations
        .iter()
        .find(|v| v.id == variation_id)
        .map(|v| v.available_quantity)
}

pub fn build_listing_update(quantity: i64) -> Value {
    json!({ "available_quantity": quantity })
}

pub fn build_variation_update(variation_id: &str, quantity: i64) -> Value {
    json!({
        "variations": [
            { "id": variation_id, "available_quantity": quantity }
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_listing() -> Listing {
        serde_json::from_value(json!({
            "id": "ITEM-1",
            "available_quantity": 4,
            "variations": [
                { "id": "VAR-A", "available_quantity": 2 },
                { "id": "VAR-B", "available_quantity": 9 }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn listing_without_variations_parses() {
        let listing: Listing =
            serde_json::from_value(json!({ "id": "ITEM-2", "available_quantity": 7 })).unwrap();
        assert_eq!(listing.available_quantity, 7);
        assert!(listing.variations.is_empty());
    }

    #[test]
    fn variation_lookup() {
        let listing = sample_listing();
        assert_eq!(variation_quantity(&listing, "VAR-B"), Some(9));
        assert_eq!(variation_quantity(&listing, "VAR-X"), None);
    }

    #[test]
    fn listing_update_is_additive_partial_body() {
        let listing = sample_listing();
        let body = build_listing_update(listing.available_quantity + 5);
        assert_eq!(body, json!({ "available_quantity": 9 }));
    }

    #[test]
    fn variation_update_is_scoped_to_one_variation() {
        let listing = sample_listing();
        let current = variation_quantity(&listing, "VAR-A").unwrap();
        let body = build_variation_update("VAR-A", current + 3);
        assert_eq!(
            body,
            json!({ "variations": [ { "id": "VAR-A", "available_quantity": 5 } ] })
        );
    }

    #[test]
    fn link_failures_join_with_pipes() {
        let failures = [
            "ITEM-1: marketplace error 500 Internal Server Error: boom".to_string(),
            "ITEM-2: variation VAR-X not found".to_string(),
        ];
        let message = failures.join(" | ");
        assert_eq!(
            message,
            "ITEM-1: marketplace error 500 Internal Server Error: boom | ITEM-2: variation VAR-X not found"
        );
    }
}
