//! Caller sessions and bearer token providers
//!
//! Tokens are issued by the external identity provider. This module only
//! carries them: it reads the username out of a token's payload so the role
//! can be looked up, and hands the raw token to the API client. Signature
//! verification is left to the backend, which receives the same token.

use std::path::PathBuf;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::SensorhubError;

/// Source of the bearer token attached to backend requests
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait TokenProvider: Send + Sync {
    /// Return the current identity token
    async fn id_token(&self) -> crate::Result<String>;
}

/// An authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub id_token: String,
}

impl Session {
    /// Build a session from a raw identity token
    pub fn from_id_token(token: &str) -> crate::Result<Self> {
        let token = token.trim();
        let mut segments = token.split('.');
        let payload = match (segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(payload), Some(_)) => payload,
            _ => {
                return Err(SensorhubError::Auth(
                    "token is not a three-part JWT".to_string(),
                ))
            }
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| SensorhubError::Auth(format!("token payload is not base64url: {}", e)))?;
        let claims: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| SensorhubError::Auth(format!("token payload is not JSON: {}", e)))?;

        let user_id = ["cognito:username", "username", "sub"]
            .iter()
            .find_map(|claim| claims.get(*claim).and_then(|v| v.as_str()))
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SensorhubError::Auth("token carries no username claim".to_string()))?;

        Ok(Self {
            user_id: user_id.to_string(),
            id_token: token.to_string(),
        })
    }

    /// Build a session from an `Authorization` header value
    ///
    /// Accepts both `Bearer <token>` and a bare token, which is what the
    /// backend's authorizer expects.
    pub fn from_authorization_header(value: &str) -> crate::Result<Self> {
        let value = value.trim();
        let token = match value.split_once(' ') {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest,
            _ => value,
        };
        Self::from_id_token(token)
    }
}

#[async_trait]
impl TokenProvider for Session {
    async fn id_token(&self) -> crate::Result<String> {
        Ok(self.id_token.clone())
    }
}

/// A fixed token, typically from configuration or the environment
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn id_token(&self) -> crate::Result<String> {
        Ok(self.token.clone())
    }
}

/// A token stored in a file that an external refresher keeps current
#[derive(Debug, Clone)]
pub struct FileTokenProvider {
    path: PathBuf,
}

impl FileTokenProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TokenProvider for FileTokenProvider {
    async fn id_token(&self) -> crate::Result<String> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            SensorhubError::Auth(format!("Failed to read token file {:?}: {}", self.path, e))
        })?;
        let token = content.trim();
        if token.is_empty() {
            return Err(SensorhubError::Auth(format!(
                "token file {:?} is empty",
                self.path
            )));
        }
        Ok(token.to_string())
    }
}

/// Provider used when no poller token is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct MissingTokenProvider;

#[async_trait]
impl TokenProvider for MissingTokenProvider {
    async fn id_token(&self) -> crate::Result<String> {
        Err(SensorhubError::Auth(
            "no identity token configured".to_string(),
        ))
    }
}

#[cfg(test)]
pub(crate) fn test_token(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.signature", header, payload)
}
