//! BDD step definitions for dashboard service feature

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request};
use cucumber::{given, then, when};
use tower::ServiceExt;

use sensorhub::{Config, SensorhubBuilder};

use crate::world::{caller_token, FakeBackend, SensorhubWorld};

fn hub_config() -> Config {
    let mut config = Config::default();
    config.api.base_url = "https://api.example.com/Prod".to_string();
    config.identity.id_token = Some("poller-token".to_string());
    config
}

#[given(expr = "a sensorhub whose backend answers mutations with status {int}")]
fn sensorhub_with_backend(world: &mut SensorhubWorld, status: u16) {
    world.backend = Some(Arc::new(FakeBackend::new(status)));
}

async fn send(world: &mut SensorhubWorld, request: Request<Body>) {
    let backend = world.backend.clone().expect("backend not set");
    let hub = SensorhubBuilder::new(hub_config())
        .with_http_client(backend)
        .with_role_resolver(Arc::new(world.resolver()))
        .build()
        .expect("failed to build sensorhub");
    world.hub_state = Some(hub.state());

    let response = hub.router().oneshot(request).await.unwrap();
    world.response_status = Some(response.status().as_u16());
    world.response_location = response
        .headers()
        .get(header::LOCATION)
        .map(|v| v.to_str().unwrap().to_string());
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    world.response_body = Some(String::from_utf8(body.to_vec()).unwrap());
}

#[when(expr = "the caller opens {string}")]
async fn open_page(world: &mut SensorhubWorld, path: String) {
    let request = Request::builder()
        .uri(path)
        .header(header::AUTHORIZATION, caller_token("alice"))
        .body(Body::empty())
        .unwrap();
    send(world, request).await;
}

#[when(expr = "an anonymous caller opens {string}")]
async fn open_page_anonymously(world: &mut SensorhubWorld, path: String) {
    let request = Request::builder().uri(path).body(Body::empty()).unwrap();
    send(world, request).await;
}

#[when(expr = "the caller creates device {string}")]
async fn create_device(world: &mut SensorhubWorld, device_id: String) {
    let request = Request::builder()
        .method("POST")
        .uri("/api/devices")
        .header(header::AUTHORIZATION, format!("Bearer {}", caller_token("alice")))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(format!(r#"{{"deviceId":"{}"}}"#, device_id)))
        .unwrap();
    send(world, request).await;
}

#[then(expr = "the response status is {int}")]
fn response_status(world: &mut SensorhubWorld, status: u16) {
    assert_eq!(world.response_status, Some(status));
}

#[then(expr = "the response redirects to {string}")]
fn response_redirects(world: &mut SensorhubWorld, location: String) {
    assert_eq!(world.response_location.as_deref(), Some(location.as_str()));
}

#[then(expr = "the response contains {string}")]
fn response_contains(world: &mut SensorhubWorld, expected: String) {
    let body = world.response_body.as_ref().expect("no response body");
    assert!(
        body.contains(&expected),
        "Expected response to contain '{}', but it didn't.\nResponse body:\n{}",
        expected,
        body
    );
}

#[then(expr = "the backend received {string} for {string}")]
fn backend_received(world: &mut SensorhubWorld, endpoint: String, device_id: String) {
    let backend = world.backend.as_ref().expect("backend not set");
    let posts = backend.posts.lock().unwrap();
    assert!(
        posts
            .iter()
            .any(|(url, body)| url.ends_with(&endpoint) && body.contains(&device_id)),
        "No POST to {} carrying {} in {:?}",
        endpoint,
        device_id,
        posts
    );
}

#[then("the backend received nothing")]
fn backend_received_nothing(world: &mut SensorhubWorld) {
    let backend = world.backend.as_ref().expect("backend not set");
    assert!(backend.posts.lock().unwrap().is_empty());
}

#[then(expr = "a notice {string} is shown")]
async fn notice_shown(world: &mut SensorhubWorld, message: String) {
    let state = world.hub_state.as_ref().expect("sensorhub not started");
    let s = state.read().await;
    let now_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64;
    assert!(
        s.notices
            .active("alice", now_ms)
            .iter()
            .any(|n| n.message.starts_with(&message)),
        "No notice starting with '{}'",
        message
    );
}
