//! Latest-price collection.

use tracing::{info, warn};

use asset_core::{EntityId, Venue, SET_SYMBOLS, SP500_SYMBOLS};
use asset_data::{SetPriceAdapter, YahooQuoteAdapter};

use super::Context;
use crate::error::CollectorError;
use crate::summary::RunSummary;
use crate::Result;

/// Where latest prices are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteSource {
    Yahoo,
    /// SET quote pages; SET symbols only.
    SetWeb,
}

pub async fn collect_quotes(
    ctx: &Context,
    venue: Venue,
    source: QuoteSource,
    symbols: Option<&str>,
    all: bool,
) -> Result<RunSummary> {
    if source == QuoteSource::SetWeb && venue != Venue::Set {
        return Err(CollectorError::Config(format!(
            "the set-web source only serves SET symbols, not {}",
            venue.code()
        )));
    }

    let entities = resolve_entities(ctx, venue, symbols, all).await?;
    info!(market = venue.code(), entities = entities.len(), source = ?source, "collecting latest prices");

    match source {
        QuoteSource::Yahoo => {
            let adapter = YahooQuoteAdapter::new(ctx.config.http.timeout)?;
            ctx.ingest(adapter, entities).await
        }
        QuoteSource::SetWeb => {
            let http = ctx.config.http.build_client()?;
            let adapter = SetPriceAdapter::new(http, &ctx.config.endpoints.set_base_url);
            ctx.ingest(adapter, entities).await
        }
    }
}

/// Entities named on the command line, or every known symbol of the venue.
pub async fn resolve_entities(
    ctx: &Context,
    venue: Venue,
    symbols: Option<&str>,
    all: bool,
) -> Result<Vec<EntityId>> {
    if let Some(symbols) = symbols {
        return Ok(EntityId::parse_list(symbols, venue)?);
    }
    if !all {
        return Err(CollectorError::Config(
            "either --symbols or --all is required".to_string(),
        ));
    }

    let known = match venue {
        Venue::Set => ctx.store.known_symbols(SET_SYMBOLS).await?,
        Venue::Us => ctx.store.known_symbols(SP500_SYMBOLS).await?,
        Venue::Commodity => ctx.config.commodity_symbols.clone(),
    };
    if known.is_empty() {
        warn!(market = venue.code(), "no known symbols, run the matching sync command first");
    }

    Ok(parse_known(&known, venue))
}

/// Parse stored symbols, skipping ones that no longer validate.
pub(crate) fn parse_known(known: &[String], venue: Venue) -> Vec<EntityId> {
    known
        .iter()
        .filter_map(|raw| match EntityId::parse(raw, venue) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(symbol = %raw, error = %e, "skipping stored symbol");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_skips_invalid() {
        let known = vec![
            "AAPL".to_string(),
            "".to_string(),
            "BRK.B".to_string(),
            "THIS-SYMBOL-IS-TOO-LONG".to_string(),
        ];
        let ids = parse_known(&known, Venue::Us);
        let symbols: Vec<&str> = ids.iter().map(EntityId::symbol).collect();
        assert_eq!(symbols, vec!["AAPL", "BRK.B"]);
    }
}
