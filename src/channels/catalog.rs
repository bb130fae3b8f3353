//! Legacy catalog adapter: XML document exchange over HTTP.
//!
//! Remote identity is resolved by exact reference (SKU) match. Combination
//! level matches are collected before product level matches and both queries
//! always run; ambiguity is tolerated and the first match wins. The stock
//! record for the matched variant is found or created at quantity zero, then
//! rewritten with its current quantity plus the pending delta.

use crate::channels::{ChannelAdapter, PushError};
use crate::model::{Channel, ExternalLink, ProductRef};
use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::{Client, Method};
use std::fmt;
use std::time::Duration;
use tracing::warn;

pub struct CatalogClient {
    http: Client,
}

impl fmt::Debug for CatalogClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogClient").finish_non_exhaustive()
    }
}

/// One hit of the reference search. `combination_id` is 0 for product-level
/// matches (the base variant).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMatch {
    pub product_id: i64,
    pub combination_id: i64,
}

/// The remote stock-quantity record, as fetched. Updates re-serialize the
/// whole record with only `quantity` changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockRecord {
    pub id: i64,
    pub product_id: i64,
    pub combination_id: i64,
    pub quantity: i64,
}

impl CatalogClient {
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Self {
        let http = Client::builder()
            .user_agent("stocksync/0.1")
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .expect("reqwest client");
        Self { http }
    }

    /// Run both reference searches and collect every hit, combination level
    /// first. Never short-circuits on the first source.
    async fn find_matches(
        &self,
        channel: &Channel,
        reference: &str,
    ) -> Result<Vec<RemoteMatch>, PushError> {
        let mut matches = Vec::new();
        let body = self
            .request_xml(
                channel,
                Method::GET,
                "api/combinations",
                &[("filter[reference]", reference)],
                None,
            )
            .await?;
        matches.extend(parse_combination_matches(&body)?);

        let body = self
            .request_xml(
                channel,
                Method::GET,
                "api/products",
                &[("filter[reference]", reference)],
                None,
            )
            .await?;
        matches.extend(parse_product_matches(&body)?);
        Ok(matches)
    }

    async fn find_stock_record(
        &self,
        channel: &Channel,
        remote: &RemoteMatch,
    ) -> Result<Option<StockRecord>, PushError> {
        let product = remote.product_id.to_string();
        let combination = remote.combination_id.to_string();
        let body = self
            .request_xml(
                channel,
                Method::GET,
                "api/stock_records",
                &[
                    ("filter[product_id]", product.as_str()),
                    ("filter[combination_id]", combination.as_str()),
                ],
                None,
            )
            .await?;
        let ids = parse_id_list(&body, "stock_record")?;
        let Some(id) = ids.first() else {
            return Ok(None);
        };

        let body = self
            .request_xml(
                channel,
                Method::GET,
                &format!("api/stock_records/{}", id),
                &[],
                None,
            )
            .await?;
        Ok(Some(parse_stock_record(&body)?))
    }

    async fn create_stock_record(
        &self,
        channel: &Channel,
        remote: &RemoteMatch,
    ) -> Result<StockRecord, PushError> {
        let draft = StockRecord {
            id: 0,
            product_id: remote.product_id,
            combination_id: remote.combination_id,
            quantity: 0,
        };
        let body = self
            .request_xml(
                channel,
                Method::POST,
                "api/stock_records",
                &[],
                Some(render_stock_record(&draft)),
            )
            .await
            .map_err(|err| PushError::StockRecordCreation {
                message: err.to_string(),
            })?;
        parse_stock_record(&body).map_err(|err| PushError::StockRecordCreation {
            message: err.to_string(),
        })
    }

    async fn update_stock_record(
        &self,
        channel: &Channel,
        record: &StockRecord,
    ) -> Result<(), PushError> {
        self.request_xml(
            channel,
            Method::PUT,
            &format!("api/stock_records/{}", record.id),
            &[],
            Some(render_stock_record(record)),
        )
        .await?;
        Ok(())
    }

    /// Issue one catalog API call and return the raw XML body. The API key
    /// is the basic-auth username; the password is always empty.
    async fn request_xml(
        &self,
        channel: &Channel,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<String>,
    ) -> Result<String, PushError> {
        let base = channel
            .url
            .as_deref()
            .ok_or_else(|| PushError::transport("channel has no catalog URL"))?;
        let key = channel
            .api_key
            .as_deref()
            .ok_or_else(|| PushError::transport("channel has no catalog API key"))?;
        let url = format!("{}/{}", base.trim_end_matches('/'), path);

        let mut request = self
            .http
            .request(method, &url)
            .basic_auth(key, Some(""))
            .query(query);
        if let Some(body) = body {
            request = request
                .header("Content-Type", "text/xml; charset=utf-8")
                .body(body);
        }

        let res = request.send().await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(PushError::transport(format!(
                "catalog error {}: {}",
                status, body
            )));
        }
        Ok(res.text().await?)
    }
}

#[async_trait]
impl ChannelAdapter for CatalogClient {
    async fn push(
        &self,
        channel: &Channel,
        product: &ProductRef,
        _links: &[ExternalLink],
        qty: i64,
    ) -> Result<(), PushError> {
        let matches = self.find_matches(channel, &product.sku).await?;
        let Some(first) = matches.first() else {
            return Err(PushError::NotFound {
                reference: product.sku.clone(),
            });
        };
        if matches.len() > 1 {
            warn!(
                channel = %channel.name,
                reference = %product.sku,
                matches = matches.len(),
                "ambiguous reference match; using first"
            );
        }

        let record = match self.find_stock_record(channel, first).await? {
            Some(record) => record,
            None => self.create_stock_record(channel, first).await?,
        };

        let updated = StockRecord {
            quantity: record.quantity + qty,
            ..record
        };
        self.update_stock_record(channel, &updated).await
    }
}

fn malformed(what: &str) -> PushError {
    PushError::transport(format!("malformed catalog response: {}", what))
}

fn attr_i64(e: &quick_xml::events::BytesStart<'_>, name: &str) -> Option<i64> {
    for attr in e.attributes().flatten() {
        let key = std::str::from_utf8(attr.key.as_ref()).unwrap_or("");
        if key == name {
            return attr.unescape_value().ok()?.parse().ok();
        }
    }
    None
}

/// Extract `<combination id=".." product_id=".."/>` hits.
pub fn parse_combination_matches(xml: &str) -> Result<Vec<RemoteMatch>, PushError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut matches = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e) | Event::Empty(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"combination" {
                    let id = attr_i64(&e, "id").ok_or_else(|| malformed("combination id"))?;
                    let product_id = attr_i64(&e, "product_id")
                        .ok_or_else(|| malformed("combination product_id"))?;
                    matches.push(RemoteMatch {
                        product_id,
                        combination_id: id,
                    });
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(malformed(&err.to_string())),
            _ => {}
        }
    }
    Ok(matches)
}

/// Extract `<product id=".."/>` hits; these address the base variant.
pub fn parse_product_matches(xml: &str) -> Result<Vec<RemoteMatch>, PushError> {
    let ids = parse_id_list(xml, "product")?;
    Ok(ids
        .into_iter()
        .map(|id| RemoteMatch {
            product_id: id,
            combination_id: 0,
        })
        .collect())
}

/// Collect the `id` attribute of every `<{element} id=".."/>` in the body.
pub fn parse_id_list(xml: &str, element: &str) -> Result<Vec<i64>, PushError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut ids = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e) | Event::Empty(e)) => {
                if e.local_name().as_ref() == element.as_bytes() {
                    let id = attr_i64(&e, "id")
                        .ok_or_else(|| malformed(&format!("{} id", element)))?;
                    ids.push(id);
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(malformed(&err.to_string())),
            _ => {}
        }
    }
    Ok(ids)
}

/// Parse a full `<stock_record>` document (child elements carry the fields).
pub fn parse_stock_record(xml: &str) -> Result<StockRecord, PushError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut id = None;
    let mut product_id = None;
    let mut combination_id = None;
    let mut quantity = None;
    let mut current: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = std::str::from_utf8(e.local_name().as_ref())
                    .unwrap_or("")
                    .to_string();
                current = Some(name);
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().unwrap_or_default();
                let value: Option<i64> = text.trim().parse().ok();
                match current.as_deref() {
                    Some("id") => id = value,
                    Some("product_id") => product_id = value,
                    Some("combination_id") => combination_id = value,
                    Some("quantity") => quantity = value,
                    _ => {}
                }
            }
            Ok(Event::End(_)) => current = None,
            Ok(Event::Eof) => break,
            Err(err) => return Err(malformed(&err.to_string())),
            _ => {}
        }
    }

    Ok(StockRecord {
        id: id.ok_or_else(|| malformed("stock_record id"))?,
        product_id: product_id.ok_or_else(|| malformed("stock_record product_id"))?,
        combination_id: combination_id.ok_or_else(|| malformed("stock_record combination_id"))?,
        quantity: quantity.ok_or_else(|| malformed("stock_record quantity"))?,
    })
}

/// Serialize a stock record for create/update calls. The shape mirrors what
/// the API returns so an update is the fetched record with a new quantity.
pub fn render_stock_record(record: &StockRecord) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <catalog><stock_record>\
         <id>{}</id>\
         <product_id>{}</product_id>\
         <combination_id>{}</combination_id>\
         <quantity>{}</quantity>\
         </stock_record></catalog>",
        record.id, record.product_id, record.combination_id, record.quantity
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_combination_matches_collects_all_hits() {
        let xml = r#"<?xml version="1.0"?>
            <catalog>
              <combinations>
                <combination id="7" product_id="3"/>
                <combination id="9" product_id="4"/>
              </combinations>
            </catalog>"#;
        let matches = parse_combination_matches(xml).unwrap();
        assert_eq!(
            matches,
            vec![
                RemoteMatch {
                    product_id: 3,
                    combination_id: 7
                },
                RemoteMatch {
                    product_id: 4,
                    combination_id: 9
                },
            ]
        );
    }

    #[test]
    fn parse_combination_matches_empty_result() {
        let xml = r#"<catalog><combinations/></catalog>"#;
        assert!(parse_combination_matches(xml).unwrap().is_empty());
    }

    #[test]
    fn parse_product_matches_targets_base_variant() {
        let xml = r#"<catalog><products><product id="12"/></products></catalog>"#;
        let matches = parse_product_matches(xml).unwrap();
        assert_eq!(
            matches,
            vec![RemoteMatch {
                product_id: 12,
                combination_id: 0
            }]
        );
    }

    #[test]
    fn parse_id_list_reads_attributes() {
        let xml = r#"<catalog><stock_records>
            <stock_record id="31"/><stock_record id="32"/>
        </stock_records></catalog>"#;
        assert_eq!(parse_id_list(xml, "stock_record").unwrap(), vec![31, 32]);
    }

    #[test]
    fn stock_record_parse_then_render_preserves_fields() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <catalog><stock_record>
              <id>31</id>
              <product_id>3</product_id>
              <combination_id>7</combination_id>
              <quantity>10</quantity>
            </stock_record></catalog>"#;
        let record = parse_stock_record(xml).unwrap();
        assert_eq!(
            record,
            StockRecord {
                id: 31,
                product_id: 3,
                combination_id: 7,
                quantity: 10
            }
        );

        // An update is the same record with only the quantity changed,
        // additively: R + delta, never the delta alone.
        let updated = StockRecord {
            quantity: record.quantity + 5,
            ..record
        };
        let rendered = render_stock_record(&updated);
        assert!(rendered.contains("<quantity>15</quantity>"));
        assert!(rendered.contains("<id>31</id>"));
        assert!(rendered.contains("<product_id>3</product_id>"));
        assert!(rendered.contains("<combination_id>7</combination_id>"));
    }

    #[test]
    fn parse_stock_record_rejects_missing_quantity() {
        let xml = r#"<catalog><stock_record><id>31</id>
            <product_id>3</product_id><combination_id>0</combination_id>
            </stock_record></catalog>"#;
        let err = parse_stock_record(xml).unwrap_err();
        assert!(err.to_string().contains("malformed"));
    }
}
