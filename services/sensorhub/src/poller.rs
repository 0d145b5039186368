//! Poller: refetches record collections on a fixed cadence

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio_util::sync::CancellationToken;

use crate::api::ApiClient;
use crate::config::PollingConfig;
use crate::state::{SharedState, Snapshot, StateHandle};

/// A record collection kept fresh by polling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Devices,
    Sensors,
    Users,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Devices => write!(f, "devices"),
            Resource::Sensors => write!(f, "sensors"),
            Resource::Users => write!(f, "users"),
        }
    }
}

/// Polls the backend and stores results in the shared state
pub struct Poller {
    api: ApiClient,
    state: StateHandle,
    interval: Duration,
    resources: Vec<Resource>,
    cancel: CancellationToken,
}

impl Poller {
    pub fn new(
        api: ApiClient,
        config: &PollingConfig,
        state: StateHandle,
        cancel: CancellationToken,
    ) -> Self {
        let mut resources = Vec::new();
        if config.devices {
            resources.push(Resource::Devices);
        }
        if config.sensors {
            resources.push(Resource::Sensors);
        }
        if config.users {
            resources.push(Resource::Users);
        }
        Self {
            api,
            state,
            interval: config.interval,
            resources,
            cancel,
        }
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// Start polling every resource. Returns when the cancellation token is triggered.
    pub async fn run(&self) {
        let mut handles = Vec::new();

        for resource in &self.resources {
            let api = self.api.clone();
            let state = self.state.clone();
            let cancel = self.cancel.clone();
            let resource = *resource;
            let interval = self.interval;

            handles.push(tokio::spawn(async move {
                poll_loop(api, state, resource, interval, cancel).await;
            }));
        }

        self.cancel.cancelled().await;

        for handle in handles {
            let _ = handle.await;
        }
    }
}

async fn poll_loop(
    api: ApiClient,
    state: StateHandle,
    resource: Resource,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut generation = 0u64;
    loop {
        generation += 1;

        // Fetches are not awaited here: a slow response must not delay the
        // next tick. The generation decides which result wins.
        let fetch_api = api.clone();
        let fetch_state = state.clone();
        let fetch_cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = fetch_once(&fetch_api, &fetch_state, resource, generation) => {}
                _ = fetch_cancel.cancelled() => {
                    tracing::debug!("Abandoned {} fetch #{}", resource, generation);
                }
            }
        });

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancel.cancelled() => {
                tracing::debug!("Polling loop for {} cancelled", resource);
                break;
            }
        }
    }
}

/// Fetch one resource and store it under `generation`
///
/// Returns true if the result (or the error) was applied.
pub async fn fetch_once(
    api: &ApiClient,
    state: &StateHandle,
    resource: Resource,
    generation: u64,
) -> bool {
    match resource {
        Resource::Devices => {
            let result = api.list_devices().await;
            store(state, resource, generation, result, |s| &mut s.devices).await
        }
        Resource::Sensors => {
            let result = api.list_sensors().await;
            store(state, resource, generation, result, |s| &mut s.sensors).await
        }
        Resource::Users => {
            let result = api.list_users().await;
            store(state, resource, generation, result, |s| &mut s.users).await
        }
    }
}

async fn store<T, F>(
    state: &StateHandle,
    resource: Resource,
    generation: u64,
    result: crate::Result<Vec<T>>,
    select: F,
) -> bool
where
    F: FnOnce(&mut SharedState) -> &mut Snapshot<T>,
{
    let now_ms = current_epoch_ms();
    let mut guard = state.write().await;
    let snapshot = select(&mut *guard);

    match result {
        Ok(items) => {
            let count = items.len();
            let applied = snapshot.apply(generation, items, now_ms);
            if applied {
                tracing::debug!("Stored {} {} (#{})", count, resource, generation);
            } else {
                tracing::debug!(
                    "Discarded stale {} result #{} (have #{})",
                    resource,
                    generation,
                    snapshot.generation
                );
            }
            applied
        }
        Err(e) => {
            let applied = snapshot.record_error(generation, e.to_string());
            tracing::debug!("Fetching {} failed: {}", resource, e);
            if snapshot.consecutive_errors == 5 {
                tracing::warn!(
                    "Fetching {} has failed {} times in a row: {}",
                    resource,
                    snapshot.consecutive_errors,
                    e
                );
            }
            applied
        }
    }
}

pub(crate) fn current_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
