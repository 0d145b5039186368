//! Two-step file upload through a pre-signed object storage URL

use crate::api::ApiClient;
use crate::SensorhubError;

impl ApiClient {
    /// Ask the backend for a one-time upload URL
    pub async fn upload_url(&self) -> crate::Result<String> {
        let response = self.get_response("upload/url", &[]).await?;
        if !response.is_success() {
            return Err(SensorhubError::Api {
                status: response.status,
                body: response.body,
            });
        }

        // The URL comes back either JSON-encoded or as plain text
        let body = response.body.trim();
        let url = match serde_json::from_str::<serde_json::Value>(body) {
            Ok(serde_json::Value::String(url)) => url,
            Ok(serde_json::Value::Null) => String::new(),
            _ => body.to_string(),
        };

        if url.is_empty() {
            return Err(SensorhubError::Upload(
                "backend did not issue an upload URL".to_string(),
            ));
        }
        Ok(url)
    }

    /// Upload `body` with the file's declared content type
    ///
    /// The PUT goes straight to object storage and carries no bearer token;
    /// the pre-signed URL is the authorization.
    pub async fn upload_file(&self, content_type: &str, body: &[u8]) -> crate::Result<()> {
        let url = self.upload_url().await?;
        tracing::debug!("Uploading {} bytes ({})", body.len(), content_type);

        let response = self
            .http()
            .put_bytes(&url, &[("Content-Type", content_type)], body)
            .await?;

        if !response.is_success() {
            return Err(SensorhubError::Upload(format!(
                "storage returned status {}: {}",
                response.status, response.body
            )));
        }

        tracing::info!("Upload of {} bytes succeeded", body.len());
        Ok(())
    }
}
