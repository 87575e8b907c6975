//! Table schemas and field alias tables.
//!
//! Upstream column names drift (Wikipedia renamed "Date first added" to
//! "Date added"). Each field lists the names it may appear under; extra
//! aliases can be loaded from a TOML file so drift is fixed by
//! configuration:
//!
//! ```toml
//! [sp500_symbols]
//! date_added = ["Date of inclusion"]
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

pub const LATEST_PRICES: &str = "latest_prices";
pub const STOCK_PRICES: &str = "stock_prices";
pub const SET_SYMBOLS: &str = "set_symbols";
pub const SP500_SYMBOLS: &str = "sp500_symbols";

/// `schema name → field name → extra aliases`.
pub type AliasOverrides = BTreeMap<String, BTreeMap<String, Vec<String>>>;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("alias file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("alias file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("alias override for unknown field {schema}.{field}")]
    UnknownField { schema: String, field: String },
}

/// Storage type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Text canonicalized as a ticker (trimmed, uppercased).
    Symbol,
    Text,
    Float,
    Integer,
    Date,
    Timestamp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// Canonical column name.
    pub name: String,
    /// Upstream names, tried in order before the canonical name.
    pub aliases: Vec<String>,
    pub kind: FieldKind,
    /// Part of the natural primary key.
    pub key: bool,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            kind,
            key: false,
        }
    }

    pub fn key(mut self) -> Self {
        self.key = true;
        self
    }

    pub fn aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases.extend(aliases.iter().map(|a| a.to_string()));
        self
    }

    /// Lookup order: aliases first, canonical name last.
    pub fn candidates(&self) -> impl Iterator<Item = &str> {
        self.aliases
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.name.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaId {
    pub name: String,
    pub version: u32,
}

impl SchemaId {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub id: SchemaId,
    /// Destination table (unqualified).
    pub table: String,
    pub fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn key_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.key)
    }

    pub fn value_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| !f.key)
    }
}

/// All schemas known to a process, keyed by `(name, version)`.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<SchemaId, Arc<Schema>>,
}

impl SchemaRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the four tables this workspace writes.
    pub fn builtin() -> Self {
        use FieldKind::*;

        let mut registry = Self::empty();

        registry.register(Schema {
            id: SchemaId::new(LATEST_PRICES, 1),
            table: LATEST_PRICES.to_string(),
            fields: vec![
                FieldSpec::new("symbol", Symbol).key().aliases(&["Symbol", "ticker"]),
                FieldSpec::new("market", Text).key(),
                FieldSpec::new("price", Float).aliases(&["last_price", "Last", "Close"]),
                FieldSpec::new("as_of", Timestamp).aliases(&["timestamp", "Date"]),
            ],
        });

        registry.register(Schema {
            id: SchemaId::new(STOCK_PRICES, 1),
            table: STOCK_PRICES.to_string(),
            fields: vec![
                FieldSpec::new("time", Timestamp).key().aliases(&["Date", "Datetime"]),
                FieldSpec::new("ticker", Symbol).key().aliases(&["Ticker", "symbol"]),
                FieldSpec::new("open", Float).aliases(&["Open"]),
                FieldSpec::new("high", Float).aliases(&["High"]),
                FieldSpec::new("low", Float).aliases(&["Low"]),
                FieldSpec::new("close", Float).aliases(&["Close"]),
                FieldSpec::new("volume", Integer).aliases(&["Volume"]),
            ],
        });

        registry.register(Schema {
            id: SchemaId::new(SET_SYMBOLS, 1),
            table: SET_SYMBOLS.to_string(),
            fields: vec![
                FieldSpec::new("symbol", Symbol).key(),
                FieldSpec::new("industry_group", Text).aliases(&["group"]),
                FieldSpec::new("sector", Text).aliases(&["subgroup"]),
                FieldSpec::new("market", Text),
            ],
        });

        registry.register(Schema {
            id: SchemaId::new(SP500_SYMBOLS, 1),
            table: SP500_SYMBOLS.to_string(),
            fields: vec![
                FieldSpec::new("symbol", Symbol).key().aliases(&["Symbol", "Ticker symbol"]),
                FieldSpec::new("security_name", Text).aliases(&["Security", "Company"]),
                FieldSpec::new("gics_sector", Text).aliases(&["GICS Sector"]),
                FieldSpec::new("gics_sub_industry", Text).aliases(&["GICS Sub-Industry"]),
                FieldSpec::new("headquarters", Text).aliases(&["Headquarters Location"]),
                FieldSpec::new("date_added", Date).aliases(&["Date added", "Date first added"]),
                FieldSpec::new("cik", Text).aliases(&["CIK"]),
                FieldSpec::new("founded", Text).aliases(&["Founded"]),
            ],
        });

        registry
    }

    pub fn register(&mut self, schema: Schema) {
        self.schemas.insert(schema.id.clone(), Arc::new(schema));
    }

    pub fn get(&self, id: &SchemaId) -> Option<Arc<Schema>> {
        self.schemas.get(id).cloned()
    }

    /// Highest registered version of a schema.
    pub fn latest(&self, name: &str) -> Option<Arc<Schema>> {
        self.schemas
            .values()
            .filter(|s| s.id.name == name)
            .max_by_key(|s| s.id.version)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Append extra aliases to every version of the named schemas.
    ///
    /// Overrides naming a schema that is not registered are ignored; naming
    /// an unknown field of a registered schema is an error.
    pub fn apply_aliases(&mut self, overrides: &AliasOverrides) -> Result<(), SchemaError> {
        for (schema_name, fields) in overrides {
            let ids: Vec<SchemaId> = self
                .schemas
                .keys()
                .filter(|id| &id.name == schema_name)
                .cloned()
                .collect();

            if ids.is_empty() {
                tracing::warn!(schema = %schema_name, "alias override for unregistered schema ignored");
                continue;
            }

            for id in ids {
                let Some(current) = self.schemas.get(&id) else {
                    continue;
                };
                let mut schema = Schema::clone(current);
                for (field_name, aliases) in fields {
                    let field = schema
                        .fields
                        .iter_mut()
                        .find(|f| &f.name == field_name)
                        .ok_or_else(|| SchemaError::UnknownField {
                            schema: schema_name.clone(),
                            field: field_name.clone(),
                        })?;
                    for alias in aliases {
                        if !field.aliases.contains(alias) {
                            field.aliases.push(alias.clone());
                        }
                    }
                }
                self.schemas.insert(id, Arc::new(schema));
            }
        }
        Ok(())
    }

    /// Read an alias TOML file.
    pub fn load_aliases(path: &Path) -> Result<AliasOverrides, SchemaError> {
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: display.clone(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| SchemaError::Parse {
            path: display,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_builtin_schemas() {
        let registry = SchemaRegistry::builtin();
        assert_eq!(registry.len(), 4);

        let bars = registry.get(&SchemaId::new(STOCK_PRICES, 1)).unwrap();
        let keys: Vec<_> = bars.key_fields().map(|f| f.name.as_str()).collect();
        assert_eq!(keys, vec!["time", "ticker"]);

        let sp500 = registry.latest(SP500_SYMBOLS).unwrap();
        let date_added = sp500.field("date_added").unwrap();
        let candidates: Vec<_> = date_added.candidates().collect();
        assert_eq!(candidates, vec!["Date added", "Date first added", "date_added"]);
    }

    #[test]
    fn test_latest_picks_highest_version() {
        let mut registry = SchemaRegistry::builtin();
        registry.register(Schema {
            id: SchemaId::new(SET_SYMBOLS, 2),
            table: SET_SYMBOLS.to_string(),
            fields: vec![FieldSpec::new("symbol", FieldKind::Symbol).key()],
        });
        assert_eq!(registry.latest(SET_SYMBOLS).unwrap().id.version, 2);
    }

    #[test]
    fn test_alias_file_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[sp500_symbols]\ndate_added = [\"Date of inclusion\"]\n\n[unknown_table]\nx = [\"y\"]"
        )
        .unwrap();

        let overrides = SchemaRegistry::load_aliases(file.path()).unwrap();
        let mut registry = SchemaRegistry::builtin();
        registry.apply_aliases(&overrides).unwrap();

        let sp500 = registry.latest(SP500_SYMBOLS).unwrap();
        let aliases = &sp500.field("date_added").unwrap().aliases;
        assert_eq!(aliases.last().map(String::as_str), Some("Date of inclusion"));
    }

    #[test]
    fn test_alias_override_for_unknown_field_fails() {
        let mut overrides = AliasOverrides::new();
        overrides
            .entry(SP500_SYMBOLS.to_string())
            .or_default()
            .insert("nonexistent".to_string(), vec!["X".to_string()]);

        let mut registry = SchemaRegistry::builtin();
        let err = registry.apply_aliases(&overrides).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownField { .. }));
    }
}
