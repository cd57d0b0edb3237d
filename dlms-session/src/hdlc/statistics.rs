//! HDLC framing statistics

use serde::Serialize;

/// Counters kept by the frame reader
///
/// Every discarded byte or frame is accounted for in exactly one counter,
/// so a noisy line shows up here even when no telegram is ever lost.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FramingStatistics {
    /// Frames delimited and parsed successfully
    pub frames_received: u64,
    /// Number of HCS (Header Check Sequence) errors
    pub hcs_errors: u64,
    /// Number of FCS (Frame Check Sequence) errors
    pub fcs_errors: u64,
    /// Frames with an unparseable format, length, address or control field
    pub malformed_frames: u64,
    /// Partial telegrams discarded for exceeding the size ceiling
    pub oversize_discards: u64,
    /// Partial telegrams discarded after the inter-frame timeout
    pub timeouts: u64,
    /// Bytes dropped while searching for a frame flag
    pub bytes_skipped: u64,
    /// Supervisory and unnumbered frames without application data
    pub ignored_frames: u64,
    /// Complete APDUs handed to the caller
    pub apdus_emitted: u64,
}

impl FramingStatistics {
    /// Create new statistics with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all statistics counters
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn increment_frames_received(&mut self) {
        self.frames_received += 1;
    }

    pub fn increment_hcs_errors(&mut self) {
        self.hcs_errors += 1;
    }

    pub fn increment_fcs_errors(&mut self) {
        self.fcs_errors += 1;
    }

    pub fn increment_malformed_frames(&mut self) {
        self.malformed_frames += 1;
    }

    pub fn increment_oversize_discards(&mut self) {
        self.oversize_discards += 1;
    }

    pub fn increment_timeouts(&mut self) {
        self.timeouts += 1;
    }

    pub fn add_bytes_skipped(&mut self, count: usize) {
        self.bytes_skipped += count as u64;
    }

    pub fn increment_ignored_frames(&mut self) {
        self.ignored_frames += 1;
    }

    pub fn increment_apdus_emitted(&mut self) {
        self.apdus_emitted += 1;
    }

    /// Total number of framing errors reported to the caller
    pub fn framing_errors(&self) -> u64 {
        self.hcs_errors + self.fcs_errors + self.malformed_frames + self.oversize_discards + self.timeouts
    }

    /// Get error rate as a percentage of all delimited frames
    ///
    /// Returns 0.0 if no frames have been seen.
    pub fn error_rate(&self) -> f64 {
        let errors = self.hcs_errors + self.fcs_errors + self.malformed_frames;
        let total = self.frames_received + errors;
        if total == 0 {
            0.0
        } else {
            (errors as f64 / total as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_rate() {
        let mut stats = FramingStatistics::new();
        assert_eq!(stats.error_rate(), 0.0);
        stats.increment_frames_received();
        stats.increment_frames_received();
        stats.increment_frames_received();
        stats.increment_fcs_errors();
        assert_eq!(stats.error_rate(), 25.0);
        stats.increment_timeouts();
        assert_eq!(stats.framing_errors(), 2);
        stats.clear();
        assert_eq!(stats, FramingStatistics::default());
    }
}
