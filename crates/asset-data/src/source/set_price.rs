//! SET quote page scrape.
//!
//! The quote page is server-rendered, so plain HTTP with a browser
//! User-Agent is enough. The price cell text (`"1,234.50"`, `"-"`) is passed
//! through untouched; locale stripping happens in the normalizer.

use async_trait::async_trait;
use chrono::Utc;

use asset_core::{EntityId, RawRecord, SchemaId, Venue, LATEST_PRICES};

use super::SourceAdapter;
use crate::error::SourceError;
use crate::http::fetch_text;
use crate::selector::{first_match_in, SelectorStrategy};

pub const DEFAULT_SET_BASE_URL: &str = "https://www.set.or.th";

/// Price element candidates, most specific first.
pub fn price_strategies() -> Vec<SelectorStrategy> {
    vec![
        SelectorStrategy::text("div.value.text-white.mb-0.me-2.lh-1.stock-info"),
        SelectorStrategy::text("div.stock-info.value"),
        SelectorStrategy::text("div.stock-info"),
    ]
}

pub struct SetPriceAdapter {
    http: reqwest::Client,
    base_url: String,
    strategies: Vec<SelectorStrategy>,
}

impl SetPriceAdapter {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            strategies: price_strategies(),
        }
    }

    pub fn quote_url(&self, entity: &EntityId) -> String {
        format!(
            "{}/th/market/product/stock/quote/{}/price",
            self.base_url,
            urlencoding::encode(entity.symbol())
        )
    }
}

#[async_trait]
impl SourceAdapter for SetPriceAdapter {
    type Entity = EntityId;

    fn name(&self) -> &'static str {
        "set-price"
    }

    fn schema(&self) -> SchemaId {
        SchemaId::new(LATEST_PRICES, 1)
    }

    async fn fetch(&self, entity: &EntityId) -> Result<Vec<RawRecord>, SourceError> {
        if entity.venue() != Venue::Set {
            return Err(SourceError::NotFound(format!(
                "{entity} is not listed on {}",
                Venue::Set
            )));
        }

        let url = self.quote_url(entity);
        let body = fetch_text(&self.http, &url).await?;

        let found = first_match_in(&body, &self.strategies)?
            .ok_or_else(|| SourceError::Parse(format!("{url}: price element not found")))?;
        let price = found.values.into_iter().next().unwrap_or_default();

        Ok(vec![RawRecord::new(entity.to_string())
            .with("symbol", entity.symbol())
            .with("market", Venue::Set.code())
            .with("price", price)
            .with("as_of", Utc::now().to_rfc3339())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpSettings;
    use asset_core::FailureKind;
    use serde_json::json;

    fn adapter(server: &mockito::Server) -> SetPriceAdapter {
        SetPriceAdapter::new(HttpSettings::default().build_client().unwrap(), &server.url())
    }

    #[tokio::test]
    async fn test_scrapes_price_cell() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/th/market/product/stock/quote/KTC/price")
            .with_body(
                r#"<html><body>
                <div class="value text-white mb-0 me-2 lh-1 stock-info"> 1,043.50 </div>
                </body></html>"#,
            )
            .create_async()
            .await;

        let id = EntityId::parse("ktc", Venue::Set).unwrap();
        let records = adapter(&server).fetch(&id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("price"), Some(&json!("1,043.50")));
        assert_eq!(records[0].get("symbol"), Some(&json!("KTC")));
    }

    #[tokio::test]
    async fn test_missing_element_is_parse_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/th/market/product/stock/quote/LH/price")
            .with_body("<html><body><p>redesigned</p></body></html>")
            .create_async()
            .await;

        let id = EntityId::parse("LH", Venue::Set).unwrap();
        let err = adapter(&server).fetch(&id).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::ParseFailure);
    }

    #[tokio::test]
    async fn test_unknown_symbol_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/th/market/product/stock/quote/NOPE/price")
            .with_status(404)
            .create_async()
            .await;

        let id = EntityId::parse("NOPE", Venue::Set).unwrap();
        let err = adapter(&server).fetch(&id).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::NotFound);
    }
}
