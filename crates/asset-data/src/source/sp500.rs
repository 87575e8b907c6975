//! S&P 500 constituents from the Wikipedia list page.
//!
//! The first `<table>` on the page is read into records keyed by header
//! text. Headers are not interpreted here; "Date added" vs "Date first
//! added" is resolved by the `sp500_symbols` alias table.

use std::fmt;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use asset_core::{RawRecord, SchemaId, SP500_SYMBOLS};

use super::SourceAdapter;
use crate::error::SourceError;
use crate::http::fetch_text;

pub const DEFAULT_SP500_URL: &str = "https://en.wikipedia.org/wiki/List_of_S%26P_500_companies";

/// The single page this adapter reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sp500Page;

impl fmt::Display for Sp500Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("sp500")
    }
}

pub struct Sp500DirectoryAdapter {
    http: reqwest::Client,
    url: String,
}

impl Sp500DirectoryAdapter {
    pub fn new(http: reqwest::Client, url: &str) -> Self {
        Self {
            http,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl SourceAdapter for Sp500DirectoryAdapter {
    type Entity = Sp500Page;

    fn name(&self) -> &'static str {
        "sp500-directory"
    }

    fn schema(&self) -> SchemaId {
        SchemaId::new(SP500_SYMBOLS, 1)
    }

    async fn fetch(&self, page: &Sp500Page) -> Result<Vec<RawRecord>, SourceError> {
        let body = fetch_text(&self.http, &self.url).await?;
        let records = parse_first_table(&body, &page.to_string())?;
        debug!(url = %self.url, rows = records.len(), "constituents table parsed");
        Ok(records)
    }
}

fn selector(css: &str) -> Result<Selector, SourceError> {
    Selector::parse(css).map_err(|e| SourceError::Parse(format!("invalid selector {css:?}: {e:?}")))
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Read the first table of `html` into one record per data row.
pub fn parse_first_table(html: &str, entity: &str) -> Result<Vec<RawRecord>, SourceError> {
    let doc = Html::parse_document(html);
    let table_sel = selector("table")?;
    let row_sel = selector("tr")?;
    let th_sel = selector("th")?;
    let td_sel = selector("td")?;

    let table = doc
        .select(&table_sel)
        .next()
        .ok_or_else(|| SourceError::Parse("no table on page".to_string()))?;

    let mut headers: Vec<String> = Vec::new();
    let mut records = Vec::new();

    for row in table.select(&row_sel) {
        let cells: Vec<String> = row.select(&td_sel).map(cell_text).collect();
        if cells.is_empty() {
            if headers.is_empty() {
                headers = row.select(&th_sel).map(cell_text).collect();
            }
            continue;
        }
        if headers.is_empty() {
            return Err(SourceError::Parse("table has no header row".to_string()));
        }

        let mut record = RawRecord::new(entity);
        for (header, value) in headers.iter().zip(cells) {
            record.insert(header.clone(), value);
        }
        records.push(record);
    }

    Ok(records)
}
