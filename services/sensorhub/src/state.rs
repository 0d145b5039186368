//! Shared snapshots of polled records and the per-user notice boards

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::config::NoticeConfig;
use crate::devices::Device;
use crate::notice::UserNotices;
use crate::sensors::SensorRecord;
use crate::users::User;

/// The latest accepted fetch of one record collection
///
/// Every fetch carries the generation it was issued with. A result is only
/// applied if it is newer than the one already applied, so a slow fetch that
/// completes late cannot overwrite newer data.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot<T> {
    pub items: Vec<T>,
    pub generation: u64,
    pub fetched_epoch_ms: Option<u64>,
    pub last_error: Option<String>,
    pub consecutive_errors: u32,
}

impl<T> Default for Snapshot<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            generation: 0,
            fetched_epoch_ms: None,
            last_error: None,
            consecutive_errors: 0,
        }
    }
}

impl<T> Snapshot<T> {
    /// Replace the collection wholesale; returns false for a stale result
    pub fn apply(&mut self, generation: u64, items: Vec<T>, now_ms: u64) -> bool {
        if generation <= self.generation {
            return false;
        }
        self.items = items;
        self.generation = generation;
        self.fetched_epoch_ms = Some(now_ms);
        self.last_error = None;
        self.consecutive_errors = 0;
        true
    }

    /// Record a failed fetch; the previous items stay visible
    pub fn record_error(&mut self, generation: u64, error: String) -> bool {
        if generation <= self.generation {
            return false;
        }
        self.generation = generation;
        self.last_error = Some(error);
        self.consecutive_errors += 1;
        true
    }
}

/// State shared by the poller and the dashboard
#[derive(Debug)]
pub struct SharedState {
    pub devices: Snapshot<Device>,
    pub sensors: Snapshot<SensorRecord>,
    pub users: Snapshot<User>,
    pub notices: UserNotices,
}

impl SharedState {
    pub fn new(notices: &NoticeConfig) -> Self {
        Self {
            devices: Snapshot::default(),
            sensors: Snapshot::default(),
            users: Snapshot::default(),
            notices: UserNotices::new(notices),
        }
    }
}

/// Thread-safe shared state handle
pub type StateHandle = Arc<RwLock<SharedState>>;

pub fn new_state_handle(notices: &NoticeConfig) -> StateHandle {
    Arc::new(RwLock::new(SharedState::new(notices)))
}
