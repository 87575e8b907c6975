//! SET symbol directory, one page per industry subgroup.
//!
//! Index pages are rendered client-side, so they go through a WebDriver
//! session. The session is opened on the first fetch and reused for every
//! page of the run; [`SourceAdapter::close`] ends it.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use asset_core::symbol::MAX_SYMBOL_LEN;
use asset_core::{RawRecord, SchemaId, Venue, SET_SYMBOLS};

use super::SourceAdapter;
use crate::error::SourceError;
use crate::selector::SelectorStrategy;
use crate::webdriver::{WebDriverSession, HEADLESS_CHROME_ARGS};

/// Industry groups and their subgroups as used in SET index URLs.
pub const SET_INDUSTRY_GROUPS: &[(&str, &[&str])] = &[
    ("agro", &["agri", "food"]),
    ("consump", &["fashion", "home", "person"]),
    ("fincial", &["bank", "fin", "insur"]),
    ("indus", &["auto", "imm", "paper", "petro", "pkg", "steel"]),
    ("propcon", &["conmat", "prop", "pf&reit", "cons"]),
    ("resourc", &["energ", "mine"]),
    ("service", &["comm", "helth", "media", "prof", "tourism", "trans"]),
    ("tech", &["etron", "ict"]),
];

/// One industry subgroup listing page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DirectoryPage {
    pub group: String,
    pub subgroup: String,
}

impl DirectoryPage {
    pub fn new(group: &str, subgroup: &str) -> Self {
        Self {
            group: group.to_string(),
            subgroup: subgroup.to_string(),
        }
    }

    /// Every page of the built-in industry table.
    pub fn all() -> Vec<Self> {
        SET_INDUSTRY_GROUPS
            .iter()
            .flat_map(|(group, subgroups)| subgroups.iter().map(move |sub| Self::new(group, sub)))
            .collect()
    }
}

impl fmt::Display for DirectoryPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.subgroup)
    }
}

/// Symbol cell candidates: the visible label, then the row anchor.
pub fn symbol_strategies() -> Vec<SelectorStrategy> {
    vec![
        SelectorStrategy::text("div.symbol"),
        SelectorStrategy::text_or_attr("a[data-symbol]", "data-symbol"),
    ]
}

pub struct SetDirectoryAdapter {
    http: reqwest::Client,
    webdriver_url: String,
    base_url: String,
    render_timeout: Duration,
    strategies: Vec<SelectorStrategy>,
    session: Mutex<Option<WebDriverSession>>,
}

impl SetDirectoryAdapter {
    /// `http` is used for WebDriver commands and should carry a timeout.
    pub fn new(
        http: reqwest::Client,
        webdriver_url: &str,
        base_url: &str,
        render_timeout: Duration,
    ) -> Self {
        Self {
            http,
            webdriver_url: webdriver_url.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            render_timeout,
            strategies: symbol_strategies(),
            session: Mutex::new(None),
        }
    }

    pub fn page_url(&self, page: &DirectoryPage) -> String {
        format!(
            "{}/th/market/index/set/{}/{}",
            self.base_url,
            urlencoding::encode(&page.group),
            urlencoding::encode(&page.subgroup)
        )
    }
}

#[async_trait]
impl SourceAdapter for SetDirectoryAdapter {
    type Entity = DirectoryPage;

    fn name(&self) -> &'static str {
        "set-directory"
    }

    fn schema(&self) -> SchemaId {
        SchemaId::new(SET_SYMBOLS, 1)
    }

    async fn fetch(&self, page: &DirectoryPage) -> Result<Vec<RawRecord>, SourceError> {
        let mut guard = self.session.lock().await;
        if guard.is_none() {
            let session =
                WebDriverSession::start(self.http.clone(), &self.webdriver_url, HEADLESS_CHROME_ARGS)
                    .await?;
            info!(session = session.id(), "browser session opened");
            *guard = Some(session);
        }
        let session = guard
            .as_ref()
            .ok_or_else(|| SourceError::Parse("browser session unavailable".to_string()))?;

        let url = self.page_url(page);
        session.navigate(&url).await?;

        let found = session
            .wait_for(&self.strategies, self.render_timeout)
            .await?
            .ok_or_else(|| SourceError::Parse(format!("{url}: no symbol element rendered")))?;

        let group = page.group.to_uppercase();
        let subgroup = page.subgroup.to_uppercase();
        let records: Vec<RawRecord> = found
            .values
            .into_iter()
            .filter(|symbol| symbol.chars().count() < MAX_SYMBOL_LEN)
            .map(|symbol| {
                RawRecord::new(page.to_string())
                    .with("symbol", symbol)
                    .with("group", group.as_str())
                    .with("subgroup", subgroup.as_str())
                    .with("market", Venue::Set.code())
            })
            .collect();

        debug!(page = %page, strategy = found.strategy, symbols = records.len(), "directory page scraped");
        Ok(records)
    }

    async fn close(&self) {
        if let Some(session) = self.session.lock().await.take() {
            session.close().await;
        }
    }
}
