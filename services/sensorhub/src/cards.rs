//! Summary cards for the sensor and device overviews

use serde::Serialize;

use crate::devices::Device;
use crate::sensors::SensorRecord;
use crate::series::{parse_number, parse_payload, Reading};

/// Whether a sensor's latest reading sits inside its desired range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeStatus {
    InRange,
    OutOfRange,
    NoData,
}

/// Check the latest value of `field` against the inclusive `range`
pub fn range_status(readings: &[Reading], field: &str, range: (f64, f64)) -> RangeStatus {
    let latest = readings
        .last()
        .and_then(|reading| reading.get(field))
        .map(parse_number);
    match latest {
        Some(value) if value.is_nan() => RangeStatus::NoData,
        Some(value) if value >= range.0 && value <= range.1 => RangeStatus::InRange,
        Some(_) => RangeStatus::OutOfRange,
        None => RangeStatus::NoData,
    }
}

/// Total readings across the sensors backing a device's streams
pub fn device_entry_count(device: &Device, sensors: &[SensorRecord]) -> usize {
    sensors
        .iter()
        .filter(|sensor| {
            device
                .streams
                .iter()
                .any(|stream| stream.stream_id == sensor.sensor_id)
        })
        .map(|sensor| match parse_payload(&sensor.data) {
            Ok(readings) => readings.len(),
            Err(e) => {
                tracing::debug!("Not counting '{}': {}", sensor.sensor_id, e);
                0
            }
        })
        .sum()
}
