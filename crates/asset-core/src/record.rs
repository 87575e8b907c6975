//! Raw and canonical record shapes.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value as JsonValue};

use crate::schema::{FieldKind, Schema, SchemaId};

/// Upstream record as the adapter saw it: field name → JSON value.
///
/// Field names are whatever the upstream used (`"Date first added"`,
/// `"Close"`, ...). Resolution to canonical names happens in the normalizer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    /// Entity this record was fetched for (symbol or directory page key).
    pub entity: String,
    pub fields: Map<String, JsonValue>,
}

impl RawRecord {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            fields: Map::new(),
        }
    }

    /// Builder-style insert.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<JsonValue>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.fields.get(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Typed column value of a canonical record.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Float(f64),
    Integer(i64),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    /// Could not be determined upstream. Persisted as NULL, never as zero.
    Absent(FieldKind),
}

impl Value {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Float(v) => write!(f, "{}", v),
            Self::Integer(v) => write!(f, "{}", v),
            Self::Date(d) => write!(f, "{}", d),
            Self::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
            Self::Absent(_) => f.write_str("NULL"),
        }
    }
}

/// Normalized record, one value per schema field in schema order.
#[derive(Debug, Clone)]
pub struct CanonicalRecord {
    schema: Arc<Schema>,
    entity: String,
    values: Vec<Value>,
}

impl CanonicalRecord {
    /// `values` must follow `schema.fields` order; the normalizer guarantees it.
    pub(crate) fn new(schema: Arc<Schema>, entity: String, values: Vec<Value>) -> Self {
        debug_assert_eq!(schema.fields.len(), values.len());
        Self {
            schema,
            entity,
            values,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn schema_id(&self) -> &SchemaId {
        &self.schema.id
    }

    pub fn table(&self) -> &str {
        &self.schema.table
    }

    /// Entity the raw record was fetched for.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.schema
            .fields
            .iter()
            .position(|f| f.name == field)
            .map(|idx| &self.values[idx])
    }

    /// Natural key rendered as `a|b`, used for de-duplication and failure reports.
    pub fn key(&self) -> String {
        self.schema
            .fields
            .iter()
            .zip(&self.values)
            .filter(|(spec, _)| spec.key)
            .map(|(_, value)| value.to_string())
            .collect::<Vec<_>>()
            .join("|")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_record_builder() {
        let raw = RawRecord::new("AAPL")
            .with("Close", 190.5)
            .with("Date", "2024-01-02");
        assert_eq!(raw.len(), 2);
        assert_eq!(raw.get("Close"), Some(&json!(190.5)));
        assert_eq!(raw.entity, "AAPL");
    }

    #[test]
    fn test_absent_renders_as_null() {
        assert_eq!(Value::Absent(FieldKind::Float).to_string(), "NULL");
        assert!(Value::Absent(FieldKind::Text).is_absent());
        assert_eq!(Value::Integer(3).as_f64(), Some(3.0));
    }
}
