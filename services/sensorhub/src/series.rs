//! Sensor payload decoding and plot series derivation
//!
//! A sensor's `data` field is a JSON-encoded array of flat readings that all
//! share a `timestamp` key; the remaining keys depend on the sensor. The
//! [`SeriesBinder`] holds the picker state of the graph view: one selected
//! record and up to two selected fields, and the plot derived from them.
//!
//! Values that do not parse as numbers become NaN rather than being dropped,
//! so x and y stay index-aligned. Each [`Series`] reports how many such
//! points it carries.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ParseError;
use crate::sensors::SensorRecord;

/// Key shared by every reading; always the x axis
pub const TIMESTAMP_KEY: &str = "timestamp";

/// Label of the x axis
pub const TIME_LABEL: &str = "Time";

/// One flat reading, keys in payload order
pub type Reading = Map<String, Value>;

/// Decode a payload into its ordered readings
pub fn parse_payload(payload: &str) -> Result<Vec<Reading>, ParseError> {
    let value: Value =
        serde_json::from_str(payload).map_err(|e| ParseError::Malformed(e.to_string()))?;
    let Value::Array(items) = value else {
        return Err(ParseError::NotAnArray);
    };
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(reading) => Ok(reading),
            _ => Err(ParseError::NotAnObject { index }),
        })
        .collect()
}

/// Plottable field names: the first reading's keys minus the timestamp
pub fn candidate_fields(readings: &[Reading]) -> Vec<String> {
    readings
        .first()
        .map(|first| {
            first
                .keys()
                .filter(|key| key.as_str() != TIMESTAMP_KEY)
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

/// Numeric value of a reading field
///
/// Strings are read by their longest numeric prefix, so `"20.5C"` is 20.5.
/// Anything without a numeric prefix is NaN.
pub fn parse_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => parse_numeric_prefix(s),
        _ => f64::NAN,
    }
}

fn parse_numeric_prefix(text: &str) -> f64 {
    let text = text.trim_start();
    let bytes = text.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end += 1;
    }
    if text[end..].starts_with("Infinity") {
        return if text.starts_with('-') {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
    }

    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut mantissa_digits = end - digits_start;
    if end < bytes.len() && bytes[end] == b'.' {
        let fraction_start = end + 1;
        let mut cursor = fraction_start;
        while cursor < bytes.len() && bytes[cursor].is_ascii_digit() {
            cursor += 1;
        }
        mantissa_digits += cursor - fraction_start;
        end = cursor;
    }
    if mantissa_digits == 0 {
        return f64::NAN;
    }

    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut cursor = end + 1;
        if cursor < bytes.len() && (bytes[cursor] == b'+' || bytes[cursor] == b'-') {
            cursor += 1;
        }
        let exponent_start = cursor;
        while cursor < bytes.len() && bytes[cursor].is_ascii_digit() {
            cursor += 1;
        }
        if cursor > exponent_start {
            end = cursor;
        }
    }

    text[..end].parse::<f64>().unwrap_or(f64::NAN)
}

/// Numeric values of `key` across all readings, in order
fn column(readings: &[Reading], key: &str) -> (Vec<f64>, usize) {
    let values: Vec<f64> = readings
        .iter()
        .map(|reading| reading.get(key).map(parse_number).unwrap_or(f64::NAN))
        .collect();
    let non_numeric = values.iter().filter(|v| v.is_nan()).count();
    (values, non_numeric)
}

/// One y series of a plot
#[derive(Debug, Clone, Serialize)]
pub struct Series {
    pub label: String,
    pub y: Vec<f64>,
    /// Points whose value did not parse as a number (plotted as gaps)
    pub non_numeric: usize,
}

/// Aligned data for the graph view
#[derive(Debug, Clone, Serialize)]
pub struct Plot {
    pub x_label: String,
    pub x: Vec<f64>,
    pub series: Vec<Series>,
}

/// Derive a plot for the given fields; the x axis is computed once and shared
pub fn derive_plot(readings: &[Reading], fields: &[&str]) -> Plot {
    let (x, bad_timestamps) = column(readings, TIMESTAMP_KEY);
    if bad_timestamps > 0 {
        tracing::debug!("{} readings have a non-numeric timestamp", bad_timestamps);
    }
    let series = fields
        .iter()
        .map(|field| {
            let (y, non_numeric) = column(readings, field);
            if non_numeric > 0 {
                tracing::debug!("Field '{}' has {} non-numeric points", field, non_numeric);
            }
            Series {
                label: field.to_string(),
                y,
                non_numeric,
            }
        })
        .collect();
    Plot {
        x_label: TIME_LABEL.to_string(),
        x,
        series,
    }
}

/// The selected record with its decoded payload
#[derive(Debug, Clone)]
struct Bound {
    record: SensorRecord,
    readings: Vec<Reading>,
    candidates: Vec<String>,
    parse_error: Option<ParseError>,
}

impl Bound {
    fn new(record: SensorRecord) -> Self {
        match parse_payload(&record.data) {
            Ok(readings) => {
                let candidates = candidate_fields(&readings);
                Self {
                    record,
                    readings,
                    candidates,
                    parse_error: None,
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to parse sensor data for '{}': {}",
                    record.sensor_id,
                    e
                );
                Self {
                    record,
                    readings: Vec::new(),
                    candidates: Vec::new(),
                    parse_error: Some(e),
                }
            }
        }
    }
}

/// Snapshot of the picker state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub record: Option<String>,
    pub primary: Option<String>,
    pub secondary: Option<String>,
}

/// Record and field selection for the graph view
#[derive(Debug, Clone, Default)]
pub struct SeriesBinder {
    records: Vec<SensorRecord>,
    bound: Option<Bound>,
    primary: Option<String>,
    secondary: Option<String>,
    plot: Option<Plot>,
}

impl SeriesBinder {
    pub fn new(records: Vec<SensorRecord>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    pub fn records(&self) -> &[SensorRecord] {
        &self.records
    }

    /// Replace the record collection with a newer fetch
    ///
    /// The selected record is re-bound by id. If its payload changed the
    /// readings are decoded again, field selections that no longer exist are
    /// dropped and the plot is derived again. If the record is gone, the
    /// whole selection is cleared.
    pub fn replace_records(&mut self, records: Vec<SensorRecord>) {
        self.records = records;
        let Some(bound) = &self.bound else {
            return;
        };
        let selected_id = bound.record.sensor_id.clone();
        match self.records.iter().find(|r| r.sensor_id == selected_id) {
            None => {
                tracing::debug!("Selected sensor '{}' disappeared", selected_id);
                self.clear();
            }
            Some(record) if *record == bound.record => {}
            Some(record) => {
                let rebound = Bound::new(record.clone());
                let keep = |field: &Option<String>| {
                    field
                        .as_ref()
                        .filter(|f| rebound.candidates.contains(*f))
                        .cloned()
                };
                self.primary = keep(&self.primary);
                self.secondary = keep(&self.secondary);
                self.bound = Some(rebound);
                self.rederive();
            }
        }
    }

    /// Select a record by id; `None` or an unknown id clears the selection
    ///
    /// Any change of record clears both field selections and the plot.
    pub fn select_record(&mut self, sensor_id: Option<&str>) {
        let current = self.bound.as_ref().map(|b| b.record.sensor_id.as_str());
        if current == sensor_id && sensor_id.is_some() {
            return;
        }
        self.clear();
        let Some(id) = sensor_id else {
            return;
        };
        match self.records.iter().find(|r| r.sensor_id == id) {
            Some(record) => self.bound = Some(Bound::new(record.clone())),
            None => tracing::debug!("Unknown sensor '{}' selected", id),
        }
    }

    /// Select the first-axis field; returns false if it is not a candidate
    pub fn select_primary(&mut self, field: Option<&str>) -> bool {
        let Some(accepted) = self.accept_field(field) else {
            return false;
        };
        self.primary = accepted;
        self.rederive();
        true
    }

    /// Select the second-axis field; returns false if it is not a candidate
    pub fn select_secondary(&mut self, field: Option<&str>) -> bool {
        if field.is_some() && !self.secondary_available() {
            return false;
        }
        let Some(accepted) = self.accept_field(field) else {
            return false;
        };
        self.secondary = accepted;
        self.rederive();
        true
    }

    pub fn candidates(&self) -> &[String] {
        self.bound
            .as_ref()
            .map(|b| b.candidates.as_slice())
            .unwrap_or(&[])
    }

    /// Decoded readings of the selected record
    pub fn readings(&self) -> &[Reading] {
        self.bound
            .as_ref()
            .map(|b| b.readings.as_slice())
            .unwrap_or(&[])
    }

    /// The second axis is only offered once the record has fields
    pub fn secondary_available(&self) -> bool {
        !self.candidates().is_empty()
    }

    pub fn parse_error(&self) -> Option<&ParseError> {
        self.bound.as_ref().and_then(|b| b.parse_error.as_ref())
    }

    pub fn plot(&self) -> Option<&Plot> {
        self.plot.as_ref()
    }

    pub fn selection(&self) -> Selection {
        Selection {
            record: self.bound.as_ref().map(|b| b.record.sensor_id.clone()),
            primary: self.primary.clone(),
            secondary: self.secondary.clone(),
        }
    }

    fn accept_field(&self, field: Option<&str>) -> Option<Option<String>> {
        match field {
            None => Some(None),
            Some(f) if self.candidates().iter().any(|c| c == f) => Some(Some(f.to_string())),
            Some(f) => {
                tracing::debug!("Ignoring field '{}' not offered by the selected sensor", f);
                None
            }
        }
    }

    fn clear(&mut self) {
        self.bound = None;
        self.primary = None;
        self.secondary = None;
        self.plot = None;
    }

    fn rederive(&mut self) {
        let fields: Vec<&str> = [self.primary.as_deref(), self.secondary.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        self.plot = match &self.bound {
            Some(bound) if !fields.is_empty() => Some(derive_plot(&bound.readings, &fields)),
            _ => None,
        };
    }
}
