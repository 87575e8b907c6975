//! Ordered CSS selector strategies.
//!
//! Scraped pages change markup without notice. Adapters declare a list of
//! strategies from most to least specific; the first one that yields at
//! least one non-empty value wins and later ones are not evaluated.

use scraper::{ElementRef, Html, Selector};

use crate::error::SourceError;

/// What to read from a matched element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extract {
    /// Trimmed text content.
    Text,
    /// Text content, falling back to the attribute when the text is blank.
    TextOrAttr(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorStrategy {
    pub css: String,
    pub extract: Extract,
}

/// Winning strategy index and its extracted values, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyMatch {
    pub strategy: usize,
    pub values: Vec<String>,
}

impl SelectorStrategy {
    pub fn text(css: &str) -> Self {
        Self {
            css: css.to_string(),
            extract: Extract::Text,
        }
    }

    pub fn text_or_attr(css: &str, attr: &str) -> Self {
        Self {
            css: css.to_string(),
            extract: Extract::TextOrAttr(attr.to_string()),
        }
    }

    /// All non-empty values this strategy extracts from `doc`.
    pub fn select(&self, doc: &Html) -> Result<Vec<String>, SourceError> {
        let selector = Selector::parse(&self.css)
            .map_err(|e| SourceError::Parse(format!("invalid selector {:?}: {e:?}", self.css)))?;

        Ok(doc
            .select(&selector)
            .filter_map(|el| self.extract_from(el))
            .collect())
    }

    fn extract_from(&self, el: ElementRef<'_>) -> Option<String> {
        let text = || {
            let t = el.text().collect::<String>();
            let t = t.trim();
            (!t.is_empty()).then(|| t.to_string())
        };
        let attr = |name: &str| {
            el.value()
                .attr(name)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        match &self.extract {
            Extract::Text => text(),
            Extract::TextOrAttr(name) => text().or_else(|| attr(name)),
        }
    }
}

/// Evaluate strategies in order against a parsed document.
pub fn first_match(
    doc: &Html,
    strategies: &[SelectorStrategy],
) -> Result<Option<StrategyMatch>, SourceError> {
    for (idx, strategy) in strategies.iter().enumerate() {
        let values = strategy.select(doc)?;
        if !values.is_empty() {
            return Ok(Some(StrategyMatch {
                strategy: idx,
                values,
            }));
        }
    }
    Ok(None)
}

/// Parse `html` and evaluate strategies.
///
/// `Html` is not `Send`; keeping parse and evaluation in one synchronous call
/// lets async callers hold only the owned result across await points.
pub fn first_match_in(
    html: &str,
    strategies: &[SelectorStrategy],
) -> Result<Option<StrategyMatch>, SourceError> {
    let doc = Html::parse_document(html);
    first_match(&doc, strategies)
}
