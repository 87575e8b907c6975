//! Reference symbol directories.

use tracing::info;

use asset_data::{DirectoryPage, SetDirectoryAdapter, Sp500DirectoryAdapter, Sp500Page};

use super::Context;
use crate::summary::RunSummary;
use crate::Result;

/// Scrape every SET industry group / sector page into `set_symbols`.
///
/// Pages are rendered through the configured WebDriver endpoint, one
/// browser session for the whole run.
pub async fn sync_set_symbols(ctx: &Context) -> Result<RunSummary> {
    let http = ctx.config.http.build_client()?;
    let adapter = SetDirectoryAdapter::new(
        http,
        &ctx.config.webdriver.url,
        &ctx.config.endpoints.set_base_url,
        ctx.config.webdriver.render_timeout(),
    );

    let pages = DirectoryPage::all();
    info!(pages = pages.len(), webdriver = %ctx.config.webdriver.url, "syncing SET directory");
    ctx.ingest(adapter, pages).await
}

/// Load the S&P 500 constituents table into `sp500_symbols`.
pub async fn sync_sp500(ctx: &Context) -> Result<RunSummary> {
    let http = ctx.config.http.build_client()?;
    let adapter = Sp500DirectoryAdapter::new(http, &ctx.config.endpoints.sp500_url);

    info!(url = %ctx.config.endpoints.sp500_url, "syncing S&P 500 constituents");
    ctx.ingest(adapter, vec![Sp500Page]).await
}
