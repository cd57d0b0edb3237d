//! Listener configuration
//!
//! Operational tuning of one session: framing limits, the fault threshold
//! and the reconnect schedule. Every field has a default so a partial
//! `listener` section deserialises.

use crate::error::{DlmsError, DlmsResult};
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use dlms_session::FrameReaderConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// When the session is considered faulted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultPolicy {
    /// Failures among the last `window` telegrams that raise the fault
    #[serde(default = "FaultPolicy::default_threshold")]
    pub threshold: usize,
    /// Number of most recent telegram outcomes considered
    #[serde(default = "FaultPolicy::default_window")]
    pub window: usize,
}

impl Default for FaultPolicy {
    fn default() -> Self {
        Self {
            threshold: Self::default_threshold(),
            window: Self::default_window(),
        }
    }
}

impl FaultPolicy {
    fn default_threshold() -> usize {
        5
    }

    fn default_window() -> usize {
        10
    }
}

/// Backoff schedule between attempts to open the link
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    #[serde(default = "ReconnectPolicy::default_initial_interval_ms")]
    pub initial_interval_ms: u64,
    /// Cap for a single delay
    #[serde(default = "ReconnectPolicy::default_max_interval_ms")]
    pub max_interval_ms: u64,
    #[serde(default = "ReconnectPolicy::default_multiplier")]
    pub multiplier: f64,
    /// Jitter in [0.0, 1.0]; 0.2 means ±20%
    #[serde(default = "ReconnectPolicy::default_randomization_factor")]
    pub randomization_factor: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_interval_ms: Self::default_initial_interval_ms(),
            max_interval_ms: Self::default_max_interval_ms(),
            multiplier: Self::default_multiplier(),
            randomization_factor: Self::default_randomization_factor(),
        }
    }
}

impl ReconnectPolicy {
    fn default_initial_interval_ms() -> u64 {
        1_000
    }

    fn default_max_interval_ms() -> u64 {
        60_000
    }

    fn default_multiplier() -> f64 {
        2.0
    }

    fn default_randomization_factor() -> f64 {
        0.2
    }

    /// Exponential backoff without an elapsed-time limit
    ///
    /// The link is retried forever; only the delay is capped.
    pub fn build_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.initial_interval_ms))
            .with_max_interval(Duration::from_millis(self.max_interval_ms))
            .with_multiplier(self.multiplier)
            .with_randomization_factor(self.randomization_factor)
            .with_max_elapsed_time(None)
            .build()
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    fn validate(&self) -> DlmsResult<()> {
        if self.initial_interval_ms == 0 {
            return Err(DlmsError::Configuration(
                "listener.reconnect.initial_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_interval_ms < self.initial_interval_ms {
            return Err(DlmsError::Configuration(format!(
                "listener.reconnect.max_interval_ms ({}) must not be below initial_interval_ms ({})",
                self.max_interval_ms, self.initial_interval_ms
            )));
        }
        if self.multiplier.is_nan() || self.multiplier < 1.0 {
            return Err(DlmsError::Configuration(format!(
                "listener.reconnect.multiplier must be at least 1.0, got {}",
                self.multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.randomization_factor) {
            return Err(DlmsError::Configuration(format!(
                "listener.reconnect.randomization_factor must be within [0, 1], got {}",
                self.randomization_factor
            )));
        }
        Ok(())
    }
}

/// Configuration of one session controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Ceiling for a reassembled APDU, also applied to block transfers
    #[serde(default = "ListenerConfig::default_max_apdu_size")]
    pub max_apdu_size: usize,
    /// Silence tolerated inside a partially received telegram
    #[serde(default = "ListenerConfig::default_inter_frame_timeout_ms")]
    pub inter_frame_timeout_ms: u64,
    #[serde(default)]
    pub fault: FaultPolicy,
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
    /// Reopen interval while faulted and no telegram succeeds
    #[serde(default = "ListenerConfig::default_faulted_reconnect_ms")]
    pub faulted_reconnect_ms: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            max_apdu_size: Self::default_max_apdu_size(),
            inter_frame_timeout_ms: Self::default_inter_frame_timeout_ms(),
            fault: FaultPolicy::default(),
            reconnect: ReconnectPolicy::default(),
            faulted_reconnect_ms: Self::default_faulted_reconnect_ms(),
        }
    }
}

impl ListenerConfig {
    fn default_max_apdu_size() -> usize {
        8192
    }

    fn default_inter_frame_timeout_ms() -> u64 {
        2_000
    }

    fn default_faulted_reconnect_ms() -> u64 {
        300_000
    }

    pub fn frame_reader_config(&self) -> FrameReaderConfig {
        FrameReaderConfig {
            max_apdu_size: self.max_apdu_size,
            inter_frame_timeout: Duration::from_millis(self.inter_frame_timeout_ms),
        }
    }

    pub fn faulted_reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.faulted_reconnect_ms)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// `DlmsError::Configuration` naming the offending field
    pub fn validate(&self) -> DlmsResult<()> {
        if self.max_apdu_size == 0 {
            return Err(DlmsError::Configuration(
                "listener.max_apdu_size must be greater than 0".to_string(),
            ));
        }
        if self.inter_frame_timeout_ms == 0 {
            return Err(DlmsError::Configuration(
                "listener.inter_frame_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.fault.threshold == 0 || self.fault.threshold > self.fault.window {
            return Err(DlmsError::Configuration(format!(
                "listener.fault.threshold must be within 1..={} (window), got {}",
                self.fault.window, self.fault.threshold
            )));
        }
        if self.faulted_reconnect_ms == 0 {
            return Err(DlmsError::Configuration(
                "listener.faulted_reconnect_ms must be greater than 0".to_string(),
            ));
        }
        self.reconnect.validate()
    }
}
