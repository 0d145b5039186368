//! BDD test world for sensorhub service

use std::sync::Mutex;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use cucumber::World;
use sensorhub::access::{Decision, RoleResolver, Tool};
use sensorhub::io::{HttpClient, HttpResponse};
use sensorhub::sensors::SensorRecord;
use sensorhub::series::SeriesBinder;
use sensorhub::session::Session;
use sensorhub::state::StateHandle;
use sensorhub::SensorhubError;

#[derive(Debug, Default, World)]
pub struct SensorhubWorld {
    // Route guards
    pub tools: Vec<Tool>,
    pub role: Option<String>,
    pub role_lookup_fails: bool,
    pub decision: Option<Decision>,

    // Series binding
    pub records: Vec<SensorRecord>,
    pub binder: Option<SeriesBinder>,
    pub last_selection_accepted: Option<bool>,

    // Running service
    pub backend: Option<std::sync::Arc<FakeBackend>>,
    pub hub_state: Option<StateHandle>,
    pub response_status: Option<u16>,
    pub response_location: Option<String>,
    pub response_body: Option<String>,
}

impl SensorhubWorld {
    pub fn resolver(&self) -> FixedRole {
        if self.role_lookup_fails {
            FixedRole(None)
        } else {
            FixedRole(self.role.clone())
        }
    }
}

/// Resolver answering with a fixed role, or failing when there is none
#[derive(Debug, Clone)]
pub struct FixedRole(pub Option<String>);

#[async_trait::async_trait]
impl RoleResolver for FixedRole {
    async fn resolve(&self, _session: &Session) -> sensorhub::Result<String> {
        self.0
            .clone()
            .ok_or_else(|| SensorhubError::Http("role lookup timed out".to_string()))
    }
}

/// In-memory stand-in for the REST backend
#[derive(Debug)]
pub struct FakeBackend {
    pub post_status: u16,
    pub posts: Mutex<Vec<(String, String)>>,
}

impl FakeBackend {
    pub fn new(post_status: u16) -> Self {
        Self {
            post_status,
            posts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl HttpClient for FakeBackend {
    async fn get(&self, _url: &str, _headers: &[(&str, &str)]) -> sensorhub::Result<HttpResponse> {
        Ok(HttpResponse {
            status: 200,
            body: "[]".to_string(),
        })
    }

    async fn post_json(
        &self,
        url: &str,
        _headers: &[(&str, &str)],
        body: &str,
    ) -> sensorhub::Result<HttpResponse> {
        self.posts
            .lock()
            .unwrap()
            .push((url.to_string(), body.to_string()));
        Ok(HttpResponse {
            status: self.post_status,
            body: "{}".to_string(),
        })
    }

    async fn put_bytes(
        &self,
        _url: &str,
        _headers: &[(&str, &str)],
        _body: &[u8],
    ) -> sensorhub::Result<HttpResponse> {
        Ok(HttpResponse {
            status: 200,
            body: String::new(),
        })
    }
}

/// An unsigned identity token naming `user`
pub fn caller_token(user: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"cognito:username":"{}"}}"#, user));
    format!("{}.{}.sig", header, payload)
}
