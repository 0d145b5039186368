//! Self-dismissing success and error banners

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::NoticeConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Success,
    Error,
}

/// A banner shown until it expires
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
    pub posted_epoch_ms: u64,
    pub expires_epoch_ms: u64,
}

/// Bounded queue of notices, oldest evicted first
#[derive(Debug)]
pub struct NoticeBoard {
    notices: VecDeque<Notice>,
    success_ttl: Duration,
    error_ttl: Duration,
    capacity: usize,
}

impl NoticeBoard {
    pub fn new(config: &NoticeConfig) -> Self {
        Self {
            notices: VecDeque::with_capacity(config.capacity),
            success_ttl: config.success_ttl,
            error_ttl: config.error_ttl,
            capacity: config.capacity.max(1),
        }
    }

    pub fn post_success(&mut self, message: impl Into<String>, now_ms: u64) {
        self.post(NoticeKind::Success, message.into(), now_ms);
    }

    pub fn post_error(&mut self, message: impl Into<String>, now_ms: u64) {
        self.post(NoticeKind::Error, message.into(), now_ms);
    }

    fn post(&mut self, kind: NoticeKind, message: String, now_ms: u64) {
        let ttl = match kind {
            NoticeKind::Success => self.success_ttl,
            NoticeKind::Error => self.error_ttl,
        };
        self.prune(now_ms);
        if self.notices.len() >= self.capacity {
            self.notices.pop_front();
        }
        self.notices.push_back(Notice {
            kind,
            message,
            posted_epoch_ms: now_ms,
            expires_epoch_ms: now_ms
                .saturating_add(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)),
        });
    }

    /// Notices still visible at `now_ms`, oldest first
    pub fn active(&self, now_ms: u64) -> Vec<&Notice> {
        self.notices
            .iter()
            .filter(|n| n.expires_epoch_ms > now_ms)
            .collect()
    }

    /// Drop expired notices
    pub fn prune(&mut self, now_ms: u64) {
        self.notices.retain(|n| n.expires_epoch_ms > now_ms);
    }

    pub fn is_empty(&self) -> bool {
        self.notices.is_empty()
    }
}

/// One notice board per user
///
/// A notice reports the outcome of one caller's own action and is only ever
/// shown back to that caller.
#[derive(Debug)]
pub struct UserNotices {
    boards: HashMap<String, NoticeBoard>,
    config: NoticeConfig,
}

impl UserNotices {
    pub fn new(config: &NoticeConfig) -> Self {
        Self {
            boards: HashMap::new(),
            config: config.clone(),
        }
    }

    pub fn post_success(&mut self, user_id: &str, message: impl Into<String>, now_ms: u64) {
        self.board_mut(user_id, now_ms).post_success(message, now_ms);
    }

    pub fn post_error(&mut self, user_id: &str, message: impl Into<String>, now_ms: u64) {
        self.board_mut(user_id, now_ms).post_error(message, now_ms);
    }

    /// Notices of `user_id` still visible at `now_ms`, oldest first
    pub fn active(&self, user_id: &str, now_ms: u64) -> Vec<&Notice> {
        self.boards
            .get(user_id)
            .map(|board| board.active(now_ms))
            .unwrap_or_default()
    }

    /// Number of users holding at least one unexpired notice
    pub fn user_count(&self) -> usize {
        self.boards.len()
    }

    fn board_mut(&mut self, user_id: &str, now_ms: u64) -> &mut NoticeBoard {
        self.boards.retain(|_, board| {
            board.prune(now_ms);
            !board.is_empty()
        });
        let config = &self.config;
        self.boards
            .entry(user_id.to_string())
            .or_insert_with(|| NoticeBoard::new(config))
    }
}
