//! Daily OHLCV backfill for US symbols.

use tracing::info;

use asset_core::{EntityId, Venue, SP500_SYMBOLS};
use asset_data::YahooHistoryAdapter;

use super::quotes::{parse_known, resolve_entities};
use super::{symbol_sync, Context};
use crate::summary::RunSummary;
use crate::Result;

/// Backfill `years` of daily bars (default from config).
///
/// With `all`, the symbol list comes from `sp500_symbols`; an empty table
/// is filled from the constituents page first.
pub async fn collect_history(
    ctx: &Context,
    symbols: Option<&str>,
    all: bool,
    years: Option<u32>,
) -> Result<RunSummary> {
    let years = years.unwrap_or(ctx.config.ingest.history_years);

    let entities = if symbols.is_none() && all {
        known_or_synced(ctx).await?
    } else {
        resolve_entities(ctx, Venue::Us, symbols, all).await?
    };

    info!(entities = entities.len(), years = years, "collecting price history");
    let adapter = YahooHistoryAdapter::new(ctx.config.http.timeout, years)?;
    ctx.ingest(adapter, entities).await
}

async fn known_or_synced(ctx: &Context) -> Result<Vec<EntityId>> {
    let mut known = ctx.store.known_symbols(SP500_SYMBOLS).await?;
    if known.is_empty() {
        info!("no stored S&P 500 constituents, syncing them first");
        let summary = symbol_sync::sync_sp500(ctx).await?;
        summary.log_summary("sp500 sync");
        known = ctx.store.known_symbols(SP500_SYMBOLS).await?;
    }
    Ok(parse_known(&known, Venue::Us))
}
