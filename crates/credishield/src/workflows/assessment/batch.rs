use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use tracing::warn;

use super::domain::FormField;

/// A batch row as read from an upload: column name to raw cell text.
pub type RawRow = BTreeMap<String, String>;

/// Per-row result from the batch endpoint; extra keys are kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub index: usize,
    pub probability_of_default: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub count: usize,
    pub results: Vec<BatchResult>,
}

/// Coerce numeric columns; categorical and unknown columns pass through as text.
///
/// Blank numeric cells become `0`. Cells that do not parse, and numeric
/// fields with no column at all, become `null`.
pub fn normalize_rows(rows: &[RawRow]) -> Vec<Map<String, Value>> {
    rows.iter()
        .enumerate()
        .map(|(index, row)| {
            let mut normalized: Map<String, Value> = row
                .iter()
                .map(|(column, cell)| {
                    let value = match FormField::from_key(column.trim()) {
                        Some(field) if field.is_numeric() => coerce_number(index, column, cell),
                        _ => Value::String(cell.clone()),
                    };
                    (column.trim().to_string(), value)
                })
                .collect();

            for field in FormField::ALL.into_iter().filter(|field| field.is_numeric()) {
                normalized
                    .entry(field.key().to_string())
                    .or_insert(Value::Null);
            }
            normalized
        })
        .collect()
}

fn coerce_number(index: usize, column: &str, cell: &str) -> Value {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return Value::from(0);
    }

    if let Ok(whole) = trimmed.parse::<i64>() {
        return Value::from(whole);
    }

    match trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
        Some(number) => Value::Number(number),
        None => {
            warn!(row = index, column, cell, "batch cell is not numeric");
            Value::Null
        }
    }
}
