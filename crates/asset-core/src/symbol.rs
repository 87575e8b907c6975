//! Ticker identity.
//!
//! Canonical symbols are stored in the venue's own notation: SET symbols
//! without the `.BK` suffix, US share classes with a dot (`BRK.B`),
//! commodities with the provider ticker (`GC=F`). Provider-specific
//! spellings are produced at the adapter boundary.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Symbols must be strictly shorter than this.
pub const MAX_SYMBOL_LEN: usize = 15;

const SET_SUFFIX: &str = ".BK";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SymbolError {
    #[error("empty symbol")]
    Empty,

    #[error("symbol {0:?} exceeds the symbol length limit")]
    TooLong(String),

    #[error("symbol {symbol:?} contains invalid character {ch:?}")]
    InvalidChar { symbol: String, ch: char },

    #[error("unknown market {0:?}")]
    UnknownVenue(String),
}

/// Exchange scope a symbol is unique within.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Venue {
    /// Stock Exchange of Thailand.
    Set,
    /// NASDAQ / NYSE listings.
    Us,
    /// Futures and spot commodities (gold).
    Commodity,
}

impl Venue {
    /// Market code persisted alongside quotes.
    pub fn code(self) -> &'static str {
        match self {
            Self::Set => "SET",
            Self::Us => "US",
            Self::Commodity => "COMMODITY",
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Venue {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "set" | "th" | "bk" => Ok(Self::Set),
            "us" | "nasdaq" | "nyse" => Ok(Self::Us),
            "commodity" | "cmdty" => Ok(Self::Commodity),
            other => Err(SymbolError::UnknownVenue(other.to_string())),
        }
    }
}

/// Trim and uppercase. Used for every symbol-typed field.
pub fn canonical_symbol(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Canonical instrument identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId {
    symbol: String,
    venue: Venue,
}

impl EntityId {
    /// Parse and canonicalize a user or upstream supplied symbol.
    pub fn parse(raw: &str, venue: Venue) -> Result<Self, SymbolError> {
        let mut symbol = canonical_symbol(raw);
        match venue {
            Venue::Set => {
                if let Some(bare) = symbol.strip_suffix(SET_SUFFIX) {
                    symbol = bare.to_string();
                }
            }
            Venue::Us => symbol = symbol.replace('-', "."),
            Venue::Commodity => {}
        }

        if symbol.is_empty() {
            return Err(SymbolError::Empty);
        }
        if symbol.chars().count() >= MAX_SYMBOL_LEN {
            return Err(SymbolError::TooLong(symbol));
        }
        if let Some(ch) = symbol
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '&' | '=' | '^')))
        {
            return Err(SymbolError::InvalidChar { symbol, ch });
        }

        Ok(Self { symbol, venue })
    }

    /// Parse a comma separated list, skipping blanks. Repeats of a
    /// canonical symbol are dropped, keeping list order.
    pub fn parse_list(raw: &str, venue: Venue) -> Result<Vec<Self>, SymbolError> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let id = Self::parse(part, venue)?;
            if seen.insert(id.symbol.clone()) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn venue(&self) -> Venue {
        self.venue
    }

    /// Ticker spelling understood by Yahoo Finance.
    pub fn yahoo_symbol(&self) -> String {
        match self.venue {
            Venue::Set => format!("{}{}", self.symbol, SET_SUFFIX),
            Venue::Us => self.symbol.replace('.', "-"),
            Venue::Commodity => self.symbol.clone(),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.symbol)
    }
}
