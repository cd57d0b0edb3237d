//! Session state machine and the health flag derived from it

use crate::error::{DlmsError, DlmsResult};
use serde::Serialize;
use std::fmt;

/// State of a session controller
///
/// # State Transitions
/// ```text
/// Disconnected -> Connecting            (on start, after backoff)
/// Connecting   -> Listening | Faulted   (link opened)
/// Connecting   -> Disconnected          (open failed)
/// Listening    -> Decoding              (complete APDU received)
/// Decoding     -> Listening | Faulted   (telegram published or dropped)
/// Faulted      -> Decoding              (complete APDU received)
/// any          -> Faulted               (fault threshold crossed)
/// any          -> Disconnected          (I/O error, faulted reconnect, shutdown)
/// ```
///
/// There is no terminal state; the controller stops only when cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No link is open (initial state)
    ///
    /// Entered on start, after an I/O error and while waiting out the
    /// reconnect backoff.
    Disconnected,
    /// Opening the link
    Connecting,
    /// Link open, waiting for the next complete APDU
    Listening,
    /// Running one APDU through security, decoding and mapping
    Decoding,
    /// Link open, but too many recent telegrams failed
    ///
    /// Reading continues; the link is reopened periodically as long as no
    /// telegram succeeds.
    Faulted,
}

impl SessionState {
    /// Whether a link is currently open
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            SessionState::Listening | SessionState::Decoding | SessionState::Faulted
        )
    }

    /// Validate state transition
    ///
    /// Staying in the same state is always valid.
    pub fn validate_transition(&self, new_state: SessionState) -> DlmsResult<()> {
        let valid = match (*self, new_state) {
            (from, to) if from == to => true,
            (_, SessionState::Disconnected) => true,
            (SessionState::Disconnected, _) => new_state == SessionState::Connecting,
            (_, SessionState::Faulted) => true,
            (SessionState::Connecting, SessionState::Listening) => true,
            (SessionState::Listening, SessionState::Decoding) => true,
            (SessionState::Faulted, SessionState::Decoding) => true,
            (SessionState::Decoding, SessionState::Listening) => true,
            _ => false,
        };

        if valid {
            Ok(())
        } else {
            Err(DlmsError::InvalidData(format!(
                "Invalid state transition: {:?} -> {:?}",
                self, new_state
            )))
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Listening => "listening",
            SessionState::Decoding => "decoding",
            SessionState::Faulted => "faulted",
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::Disconnected
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health indicator handed to the publisher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Health {
    Healthy,
    /// Fault threshold crossed, whether or not the link is open
    DegradedFaulted,
    Disconnected,
}

impl Health {
    /// Health for `state`, given whether the fault threshold is crossed
    pub fn of(state: SessionState, faulted: bool) -> Self {
        if faulted {
            Health::DegradedFaulted
        } else if !state.is_connected() {
            Health::Disconnected
        } else {
            Health::Healthy
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Health::Healthy => "healthy",
            Health::DegradedFaulted => "degraded-faulted",
            Health::Disconnected => "disconnected",
        }
    }
}

impl Default for Health {
    fn default() -> Self {
        Health::Disconnected
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
