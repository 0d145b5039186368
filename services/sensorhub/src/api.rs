//! Authenticated client for the platform's REST backend
//!
//! Endpoint groups live next to their record types (`devices`, `sensors`,
//! `users`, `upload`); this module owns URL building, the bearer header and
//! response normalisation.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::config::Config;
use crate::io::{HttpClient, HttpResponse};
use crate::item::unwrap_item;
use crate::session::TokenProvider;
use crate::SensorhubError;

/// Client for the backend, bound to one token provider
#[derive(Clone)]
pub struct ApiClient {
    config: Arc<Config>,
    http: Arc<dyn HttpClient>,
    tokens: Arc<dyn TokenProvider>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.config.api.base_url)
            .finish()
    }
}

impl ApiClient {
    pub fn new(
        config: Arc<Config>,
        http: Arc<dyn HttpClient>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        tracing::debug!("Created ApiClient for {}", config.api.base_url);
        Self {
            config,
            http,
            tokens,
        }
    }

    /// The same backend, authenticated by a different provider
    pub fn with_tokens(&self, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            config: Arc::clone(&self.config),
            http: Arc::clone(&self.http),
            tokens,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn http(&self) -> &Arc<dyn HttpClient> {
        &self.http
    }

    /// Join an endpoint path onto the base URL, with optional query pairs
    pub fn url(&self, path: &str, query: &[(&str, &str)]) -> crate::Result<String> {
        let base = self.config.api.base_url.trim_end_matches('/');
        let joined = format!("{}/{}", base, path.trim_start_matches('/'));
        if query.is_empty() {
            return Ok(joined);
        }
        reqwest::Url::parse_with_params(&joined, query)
            .map(String::from)
            .map_err(|e| SensorhubError::Config(format!("Invalid API URL '{}': {}", joined, e)))
    }

    /// Authenticated GET, returning the response undecoded
    pub(crate) async fn get_response(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> crate::Result<HttpResponse> {
        let url = self.url(path, query)?;
        let token = self.tokens.id_token().await?;
        self.http
            .get(&url, &[("Authorization", token.as_str())])
            .await
    }

    pub(crate) async fn get_value(&self, path: &str, query: &[(&str, &str)]) -> crate::Result<Value> {
        decode(self.get_response(path, query).await?)
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> crate::Result<T> {
        let value = self.get_value(path, query).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub(crate) async fn post_json<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> crate::Result<Value> {
        let url = self.url(path, &[])?;
        let token = self.tokens.id_token().await?;
        let body = serde_json::to_string(body)?;
        let response = self
            .http
            .post_json(&url, &[("Authorization", token.as_str())], &body)
            .await?;
        decode(response)
    }
}

fn decode(response: HttpResponse) -> crate::Result<Value> {
    if !response.is_success() {
        return Err(SensorhubError::Api {
            status: response.status,
            body: response.body,
        });
    }
    if response.body.trim().is_empty() {
        return Ok(Value::Null);
    }
    let value: Value = serde_json::from_str(&response.body)?;
    Ok(unwrap_item(value))
}
