//! Read-only view of a running session

use crate::state::{Health, SessionState};
use arc_swap::ArcSwapOption;
use dlms_mapper::RegisterSnapshot;
use dlms_session::FramingStatistics;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

/// Observable state of a session, replaced as a whole on every change
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub health: Health,
    /// Telegrams that produced a snapshot
    pub telegrams_ok: u64,
    /// Telegrams dropped for any reason, including mapping errors
    pub telegrams_failed: u64,
    /// Incremented with every published snapshot
    pub snapshot_sequence: u64,
    /// Connection attempts since the link was last opened
    pub connect_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Counters of the current connection's frame reader
    pub framing: FramingStatistics,
}

/// Accessor handed to the publisher
///
/// Cloning is cheap; every clone observes the same session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    snapshot: Arc<ArcSwapOption<RegisterSnapshot>>,
    status: watch::Receiver<SessionStatus>,
}

impl SessionHandle {
    pub(crate) fn new(
        snapshot: Arc<ArcSwapOption<RegisterSnapshot>>,
        status: watch::Receiver<SessionStatus>,
    ) -> Self {
        Self { snapshot, status }
    }

    /// The most recently published snapshot, `None` before the first one
    pub fn snapshot(&self) -> Option<Arc<RegisterSnapshot>> {
        self.snapshot.load_full()
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn health(&self) -> Health {
        self.status.borrow().health
    }

    pub fn state(&self) -> SessionState {
        self.status.borrow().state
    }

    /// Receiver notified on every status change
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }
}
