//! Trade-dependency dataset snapshots.
//!
//! A snapshot anchors the numeric claims a model makes about a
//! jurisdiction's imports. Snapshots are regenerated on demand and
//! overwritten, never merged. When generation fails a deterministic
//! synthetic row set is derived from the focus taxonomy.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Categories used when the focus string names none.
pub const DEFAULT_CATEGORIES: [&str; 3] = ["Semiconductors", "Energy Systems", "Food Security"];

const MAX_CATEGORIES: usize = 6;
const ROWS_PER_CATEGORY: usize = 3;
const MIN_ROWS: usize = 12;
const MAX_ROWS: usize = 18;

const START_VALUE_USD: f64 = 125_000.0;
const CATEGORY_STEP_USD: f64 = 87_500.0;
const PADDING_STEP_USD: f64 = 50_000.0;

const PADDING_CODE: &str = "9999.99.90";
const PADDING_CATEGORY: &str = "Industrial Imports";
const UNKNOWN_CODES: [&str; 3] = ["9999.99.99", "9999.99.98", "9999.99.97"];

/// One trade-dependency row.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(default)]
pub struct DatasetRow {
    /// HS-like commodity code
    #[serde(rename = "hs_code", deserialize_with = "crate::lenient::string")]
    pub code: String,
    #[serde(deserialize_with = "crate::lenient::string")]
    pub category: String,
    #[serde(rename = "country", deserialize_with = "crate::lenient::string")]
    pub jurisdiction: String,
    /// Import value in USD
    #[serde(rename = "value_usd", deserialize_with = "crate::lenient::number")]
    pub value: f64,
}

/// Cached rows for one (jurisdiction, focus) pair.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct DatasetSnapshot {
    pub rows: Vec<DatasetRow>,
}

impl DatasetSnapshot {
    pub fn new(rows: Vec<DatasetRow>) -> Self {
        Self { rows }
    }
}

fn taxonomy_codes(category: &str) -> &'static [&'static str] {
    match category {
        "Semiconductors" => &[
            "8542.31.00",
            "8542.32.00",
            "8542.33.00",
            "8542.39.00",
            "8542.41.00",
            "8542.42.00",
        ],
        "Energy Systems" => &[
            "8501.10.00",
            "8501.90.00",
            "8502.10.00",
            "8502.30.00",
            "8504.40.00",
            "8507.30.00",
        ],
        "Food Security" => &[
            "0713.10.00",
            "0713.20.00",
            "0713.30.00",
            "0712.90.00",
            "0714.10.00",
            "0714.20.00",
        ],
        _ => &UNKNOWN_CODES,
    }
}

/// Build the deterministic synthetic row set for a focus string.
///
/// Same inputs always produce the same rows: between 12 and 18 of them,
/// three per named category (at most six categories), padded with
/// generic industrial imports.
pub fn fallback_rows(jurisdiction: &str, focus: &str) -> Vec<DatasetRow> {
    let jurisdiction = jurisdiction.trim();
    let named: Vec<&str> = focus
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    let categories: Vec<&str> = if named.is_empty() {
        DEFAULT_CATEGORIES.to_vec()
    } else {
        named.into_iter().take(MAX_CATEGORIES).collect()
    };

    let mut rows = Vec::with_capacity(MAX_ROWS);
    let mut value = START_VALUE_USD;

    for category in categories {
        let codes = taxonomy_codes(category);
        for i in 0..ROWS_PER_CATEGORY {
            rows.push(DatasetRow {
                code: codes[(i + rows.len()) % codes.len()].to_string(),
                category: category.to_string(),
                jurisdiction: jurisdiction.to_string(),
                value,
            });
            value += CATEGORY_STEP_USD;
        }
    }

    while rows.len() < MIN_ROWS {
        rows.push(DatasetRow {
            code: PADDING_CODE.to_string(),
            category: PADDING_CATEGORY.to_string(),
            jurisdiction: jurisdiction.to_string(),
            value,
        });
        value += PADDING_STEP_USD;
    }

    rows.truncate(MAX_ROWS);
    rows
}

/// Pull dataset rows out of an extracted model payload.
///
/// Accepts `{"rows": [...]}` or a bare array. Returns `None` when neither
/// shape is present so the caller can fall back. Array items that are not
/// objects are skipped.
pub fn rows_from_value(value: &Value) -> Option<Vec<DatasetRow>> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => map.get("rows")?.as_array()?,
        _ => return None,
    };

    Some(
        items
            .iter()
            .filter(|item| item.is_object())
            .filter_map(|item| serde_json::from_value(item.clone()).ok())
            .collect(),
    )
}
