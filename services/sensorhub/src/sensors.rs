//! Sensor records and their endpoints

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::api::ApiClient;

/// A named data source carrying an opaque serialized time series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorRecord {
    pub sensor_id: String,
    #[serde(default)]
    pub display_name: String,
    /// Serialized readings, decoded by [`crate::series::parse_payload`]
    #[serde(default, deserialize_with = "payload_string")]
    pub data: String,
}

impl SensorRecord {
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.sensor_id
        } else {
            &self.display_name
        }
    }
}

/// Keep the payload opaque even if the backend already decoded it
fn payload_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

impl ApiClient {
    /// GET sensors/list
    pub async fn list_sensors(&self) -> crate::Result<Vec<SensorRecord>> {
        let sensors: Vec<SensorRecord> = self.get_json("sensors/list", &[]).await?;
        tracing::debug!("Listed {} sensors", sensors.len());
        Ok(sensors)
    }

    /// GET sensors/get?sensorId=
    pub async fn get_sensor(&self, sensor_id: &str) -> crate::Result<Option<SensorRecord>> {
        if sensor_id.is_empty() {
            return Ok(None);
        }
        let value = self
            .get_value("sensors/get", &[("sensorId", sensor_id)])
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }
}
