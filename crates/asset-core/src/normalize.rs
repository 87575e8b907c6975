//! Raw → canonical record conversion.
//!
//! Field resolution walks the field's aliases in declared order, then the
//! canonical name, and takes the first one present with a non-null,
//! non-blank value. Unresolved non-key fields become [`Value::Absent`];
//! unresolved key fields fail the record.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value as JsonValue;

use crate::error::ValidationError;
use crate::record::{CanonicalRecord, RawRecord, Value};
use crate::schema::{FieldKind, FieldSpec, SchemaId, SchemaRegistry};
use crate::symbol::canonical_symbol;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%B %d, %Y", "%d %B %Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Markers meaning "no value" in scraped numeric cells.
const ABSENT_MARKERS: &[&str] = &["-", "N/A", "NA", "--"];

#[derive(Debug, Clone)]
pub struct Normalizer {
    registry: Arc<SchemaRegistry>,
}

impl Normalizer {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Convert one raw record into the named schema version.
    pub fn normalize(
        &self,
        raw: &RawRecord,
        schema_id: &SchemaId,
    ) -> Result<CanonicalRecord, ValidationError> {
        let schema = self
            .registry
            .get(schema_id)
            .ok_or_else(|| ValidationError::UnknownSchema {
                name: schema_id.name.clone(),
                version: schema_id.version,
            })?;

        let mut values = Vec::with_capacity(schema.fields.len());
        for spec in &schema.fields {
            let value = match resolve(raw, spec) {
                Some(json) => coerce(spec, json)?,
                None => Value::Absent(spec.kind),
            };

            if spec.key && value.is_absent() {
                return Err(ValidationError::MissingKey {
                    field: spec.name.clone(),
                });
            }
            values.push(value);
        }

        Ok(CanonicalRecord::new(schema, raw.entity.clone(), values))
    }

    /// Normalize a batch; the first failure fails the whole batch.
    pub fn normalize_all(
        &self,
        raws: &[RawRecord],
        schema_id: &SchemaId,
    ) -> Result<Vec<CanonicalRecord>, ValidationError> {
        raws.iter().map(|raw| self.normalize(raw, schema_id)).collect()
    }
}

fn resolve<'a>(raw: &'a RawRecord, spec: &FieldSpec) -> Option<&'a JsonValue> {
    spec.candidates()
        .filter_map(|name| raw.get(name))
        .find(|value| match value {
            JsonValue::Null => false,
            JsonValue::String(s) => !s.trim().is_empty(),
            _ => true,
        })
}

fn invalid(spec: &FieldSpec, json: &JsonValue, reason: impl Into<String>) -> ValidationError {
    let value = match json {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    };
    ValidationError::InvalidValue {
        field: spec.name.clone(),
        value,
        reason: reason.into(),
    }
}

fn coerce(spec: &FieldSpec, json: &JsonValue) -> Result<Value, ValidationError> {
    let absent = Value::Absent(spec.kind);

    match spec.kind {
        FieldKind::Symbol | FieldKind::Text => {
            let text = match json {
                JsonValue::String(s) => s.trim().to_string(),
                JsonValue::Number(n) => n.to_string(),
                JsonValue::Bool(b) => b.to_string(),
                _ => return Err(invalid(spec, json, "expected a scalar")),
            };
            if text.is_empty() {
                Ok(absent)
            } else if spec.kind == FieldKind::Symbol {
                Ok(Value::Text(canonical_symbol(&text)))
            } else {
                Ok(Value::Text(text))
            }
        }

        FieldKind::Float => {
            let number = match json {
                JsonValue::Number(n) => n.as_f64(),
                JsonValue::String(s) => parse_number(s).map_err(|e| invalid(spec, json, e))?,
                _ => return Err(invalid(spec, json, "expected a number")),
            };
            Ok(number.map(Value::Float).unwrap_or(absent))
        }

        FieldKind::Integer => {
            let number = match json {
                JsonValue::Number(n) => match n.as_i64() {
                    Some(i) => return Ok(Value::Integer(i)),
                    None => n.as_f64(),
                },
                JsonValue::String(s) => parse_number(s).map_err(|e| invalid(spec, json, e))?,
                _ => return Err(invalid(spec, json, "expected an integer")),
            };
            match number {
                None => Ok(absent),
                Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                    Ok(Value::Integer(f as i64))
                }
                Some(_) => Err(invalid(spec, json, "not an integer")),
            }
        }

        FieldKind::Date => match json {
            JsonValue::String(s) => parse_date(s)
                .map(Value::Date)
                .map_err(|e| invalid(spec, json, e)),
            _ => Err(invalid(spec, json, "expected a date string")),
        },

        FieldKind::Timestamp => {
            let ts = match json {
                JsonValue::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().map(|f| f as i64))
                    .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
                JsonValue::String(s) => parse_timestamp(s),
                _ => None,
            };
            ts.map(Value::Timestamp)
                .ok_or_else(|| invalid(spec, json, "unrecognized timestamp"))
        }
    }
}

/// Parse a possibly locale-formatted number.
///
/// Thousands separators, spaces and non-breaking spaces are stripped.
/// Empty cells and placeholder dashes yield `Ok(None)`.
pub fn parse_number(input: &str) -> Result<Option<f64>, String> {
    let cleaned: String = input
        .chars()
        .filter(|c| !matches!(c, ',' | ' ' | '\u{a0}' | '\t'))
        .collect();

    if cleaned.is_empty()
        || ABSENT_MARKERS
            .iter()
            .any(|marker| cleaned.eq_ignore_ascii_case(marker))
    {
        return Ok(None);
    }

    let value: f64 = cleaned
        .parse()
        .map_err(|_| format!("cannot parse {cleaned:?} as a number"))?;
    if !value.is_finite() {
        return Err(format!("{cleaned:?} is not a finite number"));
    }
    Ok(Some(value))
}

/// Parse a calendar date, dropping trailing citation markers such as `[3]`
/// or a parenthetical note.
pub fn parse_date(input: &str) -> Result<NaiveDate, String> {
    let head = input
        .split(['[', '('])
        .next()
        .unwrap_or_default()
        .trim();

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(head, format) {
            return Ok(date);
        }
    }
    if let Some(ts) = parse_timestamp(head) {
        return Ok(ts.date_naive());
    }
    Err(format!("unrecognized date {head:?}"))
}

fn parse_timestamp(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Some(ts.with_timezone(&Utc));
    }
    if input.chars().all(|c| c.is_ascii_digit()) {
        return input
            .parse::<i64>()
            .ok()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
    }
    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Some(naive.and_utc());
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(input, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
