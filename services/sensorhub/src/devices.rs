//! Device records and their endpoints

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::api::ApiClient;

/// A registered IoT device and the streams it publishes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub device_id: String,
    #[serde(default, deserialize_with = "lenient_streams")]
    pub streams: Vec<Stream>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One data stream of a device; its id matches a sensor id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stream {
    pub stream_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDevice {
    pub device_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStream {
    pub device_id: String,
    pub stream_id: String,
}

/// Streams arrive either as a list or as a JSON-encoded string of one
fn lenient_streams<'de, D>(deserializer: D) -> Result<Vec<Stream>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let value = match value {
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Failed to parse device streams: {}", e);
                return Ok(Vec::new());
            }
        },
        other => other,
    };
    match value {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| match serde_json::from_value::<Stream>(item) {
                Ok(stream) => Some(stream),
                Err(e) => {
                    tracing::warn!("Skipping malformed stream entry: {}", e);
                    None
                }
            })
            .collect()),
        _ => Ok(Vec::new()),
    }
}

impl ApiClient {
    /// GET devices/list
    pub async fn list_devices(&self) -> crate::Result<Vec<Device>> {
        let devices: Vec<Device> = self.get_json("devices/list", &[]).await?;
        tracing::debug!("Listed {} devices", devices.len());
        Ok(devices)
    }

    /// GET devices/get?deviceId=
    pub async fn get_device(&self, device_id: &str) -> crate::Result<Option<Device>> {
        if device_id.is_empty() {
            return Ok(None);
        }
        let value = self
            .get_value("devices/get", &[("deviceId", device_id)])
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }

    /// POST devices/create
    pub async fn create_device(&self, request: &NewDevice) -> crate::Result<Value> {
        tracing::debug!("Creating device '{}'", request.device_id);
        self.post_json("devices/create", request).await
    }

    /// POST devices/stream/create
    pub async fn create_device_stream(&self, request: &NewStream) -> crate::Result<Value> {
        tracing::debug!(
            "Creating stream '{}' on device '{}'",
            request.stream_id,
            request.device_id
        );
        self.post_json("devices/stream/create", request).await
    }
}
