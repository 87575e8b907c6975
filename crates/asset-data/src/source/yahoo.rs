//! Yahoo Finance adapters: latest quote and daily history.
//!
//! `yahoo_finance_api` handles the crumb/cookie dance. Calls carry no
//! timeout of their own, so each one is wrapped in `tokio::time::timeout`.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use time::OffsetDateTime;
use tracing::debug;
use yahoo_finance_api as yahoo;

use asset_core::{EntityId, RawRecord, SchemaId, LATEST_PRICES, STOCK_PRICES};

use super::SourceAdapter;
use crate::error::SourceError;

/// Look-back of a history backfill.
pub const DEFAULT_HISTORY_YEARS: u32 = 5;

/// One daily bar as returned by the provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adjclose: f64,
    pub volume: u64,
}

impl From<&yahoo::Quote> for Bar {
    fn from(q: &yahoo::Quote) -> Self {
        Self {
            timestamp: q.timestamp as i64,
            open: q.open,
            high: q.high,
            low: q.low,
            close: q.close,
            adjclose: q.adjclose,
            volume: q.volume,
        }
    }
}

fn connector() -> Result<yahoo::YahooConnector, SourceError> {
    yahoo::YahooConnector::new()
        .map_err(|e| SourceError::Parse(format!("yahoo connector: {e:?}")))
}

fn finite(v: f64) -> Value {
    if v.is_finite() {
        json!(v)
    } else {
        Value::Null
    }
}

/// Quote record for the latest bar, price rounded to cents.
///
/// A non-finite close means the provider had no price; it is emitted as
/// null so it persists as absent rather than zero.
pub fn quote_record(entity: &EntityId, bar: &Bar) -> RawRecord {
    let price = if bar.close.is_finite() {
        json!((bar.close * 100.0).round() / 100.0)
    } else {
        Value::Null
    };

    RawRecord::new(entity.to_string())
        .with("symbol", entity.symbol())
        .with("market", entity.venue().code())
        .with("price", price)
        .with("as_of", bar.timestamp)
}

/// Split/dividend adjusted bar records.
///
/// Open, high and low are scaled by `adjclose / close`; close becomes
/// `adjclose`. Bars with no usable close keep their raw values.
pub fn bar_records(entity: &EntityId, bars: &[Bar]) -> Vec<RawRecord> {
    bars.iter()
        .map(|bar| {
            let factor = if bar.close.is_finite() && bar.close > 0.0 && bar.adjclose.is_finite() {
                bar.adjclose / bar.close
            } else {
                1.0
            };
            let close = if factor == 1.0 { bar.close } else { bar.adjclose };

            RawRecord::new(entity.to_string())
                .with("Date", bar.timestamp)
                .with("ticker", entity.symbol())
                .with("Open", finite(bar.open * factor))
                .with("High", finite(bar.high * factor))
                .with("Low", finite(bar.low * factor))
                .with("Close", finite(close))
                .with("Volume", bar.volume)
        })
        .collect()
}

/// Latest price for US, SET (`.BK`) and commodity tickers.
pub struct YahooQuoteAdapter {
    connector: yahoo::YahooConnector,
    timeout: Duration,
}

impl YahooQuoteAdapter {
    pub fn new(timeout: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            connector: connector()?,
            timeout,
        })
    }
}

#[async_trait]
impl SourceAdapter for YahooQuoteAdapter {
    type Entity = EntityId;

    fn name(&self) -> &'static str {
        "yahoo-quote"
    }

    fn schema(&self) -> SchemaId {
        SchemaId::new(LATEST_PRICES, 1)
    }

    async fn fetch(&self, entity: &EntityId) -> Result<Vec<RawRecord>, SourceError> {
        let ticker = entity.yahoo_symbol();
        debug!(symbol = %entity, ticker = %ticker, "yahoo latest quote");

        let response = tokio::time::timeout(self.timeout, self.connector.get_latest_quotes(&ticker, "1d"))
            .await
            .map_err(|_| SourceError::Timeout(format!("{ticker}: no response in {:?}", self.timeout)))?
            .map_err(|e| SourceError::from_yahoo(&e, &ticker))?;

        let quote = response
            .last_quote()
            .map_err(|e| SourceError::from_yahoo(&e, &ticker))?;

        Ok(vec![quote_record(entity, &Bar::from(&quote))])
    }
}

/// Daily OHLCV backfill.
pub struct YahooHistoryAdapter {
    connector: yahoo::YahooConnector,
    timeout: Duration,
    years: u32,
}

impl YahooHistoryAdapter {
    pub fn new(timeout: Duration, years: u32) -> Result<Self, SourceError> {
        Ok(Self {
            connector: connector()?,
            timeout,
            years: years.max(1),
        })
    }
}

#[async_trait]
impl SourceAdapter for YahooHistoryAdapter {
    type Entity = EntityId;

    fn name(&self) -> &'static str {
        "yahoo-history"
    }

    fn schema(&self) -> SchemaId {
        SchemaId::new(STOCK_PRICES, 1)
    }

    async fn fetch(&self, entity: &EntityId) -> Result<Vec<RawRecord>, SourceError> {
        let ticker = entity.yahoo_symbol();
        let end = OffsetDateTime::now_utc();
        let start = end - time::Duration::days(365 * i64::from(self.years));

        debug!(symbol = %entity, ticker = %ticker, years = self.years, "yahoo history");

        let response = tokio::time::timeout(
            self.timeout,
            self.connector.get_quote_history(&ticker, start, end),
        )
        .await
        .map_err(|_| SourceError::Timeout(format!("{ticker}: no response in {:?}", self.timeout)))?
        .map_err(|e| SourceError::from_yahoo(&e, &ticker))?;

        let quotes = response
            .quotes()
            .map_err(|e| SourceError::from_yahoo(&e, &ticker))?;
        if quotes.is_empty() {
            return Err(SourceError::NotFound(format!("{ticker}: no history")));
        }

        let mut bars: Vec<Bar> = quotes.iter().map(Bar::from).collect();
        bars.sort_by_key(|b| b.timestamp);
        Ok(bar_records(entity, &bars))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asset_core::Venue;

    fn bar(close: f64, adjclose: f64) -> Bar {
        Bar {
            timestamp: 1_704_153_600,
            open: 10.0,
            high: 12.0,
            low: 9.0,
            close,
            adjclose,
            volume: 1_000,
        }
    }

    #[test]
    fn test_quote_record_rounds_and_keys() {
        let id = EntityId::parse("KTC", Venue::Set).unwrap();
        let raw = quote_record(&id, &bar(43.4567, 43.4567));
        assert_eq!(raw.get("symbol"), Some(&json!("KTC")));
        assert_eq!(raw.get("market"), Some(&json!("SET")));
        assert_eq!(raw.get("price"), Some(&json!(43.46)));
        assert_eq!(raw.get("as_of"), Some(&json!(1_704_153_600)));
    }

    #[test]
    fn test_quote_record_without_price() {
        let id = EntityId::parse("GC=F", Venue::Commodity).unwrap();
        let raw = quote_record(&id, &bar(f64::NAN, f64::NAN));
        assert_eq!(raw.get("price"), Some(&Value::Null));
        assert_eq!(raw.get("market"), Some(&json!("COMMODITY")));
    }

    #[test]
    fn test_bar_records_adjusted() {
        let id = EntityId::parse("BRK.B", Venue::Us).unwrap();
        let records = bar_records(&id, &[bar(20.0, 10.0)]);
        assert_eq!(records.len(), 1);
        let raw = &records[0];
        assert_eq!(raw.get("ticker"), Some(&json!("BRK.B")));
        assert_eq!(raw.get("Open"), Some(&json!(5.0)));
        assert_eq!(raw.get("High"), Some(&json!(6.0)));
        assert_eq!(raw.get("Close"), Some(&json!(10.0)));
        assert_eq!(raw.get("Volume"), Some(&json!(1_000)));
    }

    #[test]
    fn test_bar_records_unadjusted_when_close_missing() {
        let id = EntityId::parse("AAPL", Venue::Us).unwrap();
        let records = bar_records(&id, &[bar(0.0, 3.0)]);
        assert_eq!(records[0].get("Open"), Some(&json!(10.0)));
        assert_eq!(records[0].get("Close"), Some(&json!(0.0)));
    }
}
