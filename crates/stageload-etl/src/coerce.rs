//! Row-level type coercion
//!
//! Turns one raw CSV row into typed, bindable values per the table mapping.
//! Dirty numeric cells degrade to null so a stray bad amount never aborts an
//! ingestion run; an unparseable non-empty date is an error, because a date
//! that silently became null would corrupt actuality intervals downstream.

use chrono::NaiveDate;

use crate::mapping::{ColumnType, TableMapping};
use stageload_common::{EtlError, Result};

/// Accepted date layouts, tried in order; first match wins.
const DATE_FORMATS: &[&str] = &["%d.%m.%Y", "%Y-%m-%d", "%d-%m-%Y", "%Y%m%d", "%m/%d/%Y"];

/// One coerced cell, typed to match its mapped column.
#[derive(Debug, Clone, PartialEq)]
pub enum CoercedValue {
    Date(Option<NaiveDate>),
    Integer(Option<i64>),
    Decimal(Option<f64>),
    Text(Option<String>),
}

/// A fully coerced row, in mapping column order.
pub type PreparedRow = Vec<CoercedValue>;

/// Parse a date literal against the accepted layouts.
///
/// Empty, whitespace-only, and the literal token `null` (any case) are
/// recognized nulls. Anything else that matches none of the layouts is a
/// row-scoped error.
pub fn parse_date(column: &str, raw: &str) -> Result<Option<NaiveDate>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
        return Ok(None);
    }
    for layout in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, layout) {
            return Ok(Some(date));
        }
    }
    Err(EtlError::RowCoercion {
        column: column.to_string(),
        value: raw.to_string(),
    })
}

/// Apply the mapping's type rules to one row of raw cells.
///
/// `raw` holds the cells for the mapping's columns, in mapping order.
pub fn prepare(mapping: &TableMapping, raw: &[&str]) -> Result<PreparedRow> {
    debug_assert_eq!(raw.len(), mapping.columns.len());

    mapping
        .columns
        .iter()
        .zip(raw)
        .map(|(spec, &value)| coerce(spec.name, spec.column_type, value))
        .collect()
}

fn coerce(column: &str, column_type: ColumnType, raw: &str) -> Result<CoercedValue> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(null_of(column_type));
    }

    Ok(match column_type {
        ColumnType::Date => CoercedValue::Date(parse_date(column, raw)?),
        ColumnType::Integer => CoercedValue::Integer(trimmed.parse::<i64>().ok()),
        ColumnType::Decimal => CoercedValue::Decimal(trimmed.parse::<f64>().ok()),
        ColumnType::Text => CoercedValue::Text(Some(trimmed.to_string())),
    })
}

fn null_of(column_type: ColumnType) -> CoercedValue {
    match column_type {
        ColumnType::Date => CoercedValue::Date(None),
        ColumnType::Integer => CoercedValue::Integer(None),
        ColumnType::Decimal => CoercedValue::Decimal(None),
        ColumnType::Text => CoercedValue::Text(None),
    }
}
