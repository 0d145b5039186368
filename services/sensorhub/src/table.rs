//! Column generation for record tables

use serde::Serialize;
use serde_json::{Map, Value};

pub const MIN_COLUMN_WIDTH: u32 = 100;

/// A table column derived from a record key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub field: String,
    pub header_name: String,
    pub editable: bool,
    pub min_width: u32,
}

/// Columns for `rows`, one per key of the first row; `None` when there are no rows
pub fn columns_for(rows: &[Map<String, Value>]) -> Option<Vec<Column>> {
    let first = rows.first()?;
    Some(
        first
            .keys()
            .map(|key| Column {
                field: key.clone(),
                header_name: capitalize(key),
                editable: false,
                min_width: MIN_COLUMN_WIDTH,
            })
            .collect(),
    )
}

/// Uppercase the first character, leaving the rest untouched
pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Render a cell the way the data grid shows it
pub fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
