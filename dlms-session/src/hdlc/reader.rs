//! Continuous HDLC frame reader for push telegrams
//!
//! The reader owns the receive buffer of one open link. Each call to
//! [`HdlcFrameReader::next_apdu`] yields either a complete, checksum-validated
//! APDU, a recoverable framing error (after which the reader has already
//! resynchronised), or an I/O error that ends the link.

use crate::error::{DlmsError, DlmsResult};
use crate::hdlc::frame::{strip_llc, FrameDefect, HdlcFrame, FLAG, LENGTH_MASK, MIN_FRAME_LENGTH};
use crate::hdlc::statistics::FramingStatistics;
use bytes::{Buf, BytesMut};
use dlms_transport::StreamAccessor;
use std::time::Duration;

/// Default ceiling for a reassembled APDU
pub const DEFAULT_MAX_APDU_SIZE: usize = 8192;
/// Default silence tolerated inside a partially received telegram
pub const DEFAULT_INTER_FRAME_TIMEOUT: Duration = Duration::from_millis(2000);

const READ_CHUNK: usize = 512;

/// Frame reader configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReaderConfig {
    pub max_apdu_size: usize,
    pub inter_frame_timeout: Duration,
}

impl Default for FrameReaderConfig {
    fn default() -> Self {
        Self {
            max_apdu_size: DEFAULT_MAX_APDU_SIZE,
            inter_frame_timeout: DEFAULT_INTER_FRAME_TIMEOUT,
        }
    }
}

enum Delimited {
    Frame(Vec<u8>),
    Defect(FrameDefect),
    NeedMore,
}

/// Reads frames from a byte stream and reassembles segmented telegrams
pub struct HdlcFrameReader<S> {
    stream: S,
    config: FrameReaderConfig,
    buffer: BytesMut,
    partial: Vec<u8>,
    statistics: FramingStatistics,
}

impl<S: StreamAccessor> HdlcFrameReader<S> {
    pub fn new(stream: S, config: FrameReaderConfig) -> Self {
        Self {
            stream,
            config,
            buffer: BytesMut::with_capacity(READ_CHUNK * 2),
            partial: Vec::new(),
            statistics: FramingStatistics::new(),
        }
    }

    pub fn statistics(&self) -> &FramingStatistics {
        &self.statistics
    }

    pub fn config(&self) -> &FrameReaderConfig {
        &self.config
    }

    /// Close the underlying stream
    pub async fn close(&mut self) -> DlmsResult<()> {
        self.buffer.clear();
        self.partial.clear();
        self.stream.close().await
    }

    /// Give back the underlying stream
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Wait for the next complete APDU
    ///
    /// # Errors
    ///
    /// * `DlmsError::FrameInvalid` - a frame or partial telegram was discarded;
    ///   the reader is resynchronised and the next call continues the stream
    /// * `DlmsError::Connection` - the stream failed or reached EOF
    pub async fn next_apdu(&mut self) -> DlmsResult<Vec<u8>> {
        loop {
            match self.delimit() {
                Delimited::Frame(bytes) => {
                    if let Some(apdu) = self.accept_frame(&bytes)? {
                        return Ok(apdu);
                    }
                }
                Delimited::Defect(defect) => {
                    self.record_defect(&defect);
                    return Err(self.discard_partial(defect.into()));
                }
                Delimited::NeedMore => self.fill_buffer().await?,
            }
        }
    }

    /// Whether an unfinished telegram is pending
    fn is_mid_telegram(&self) -> bool {
        !self.partial.is_empty() || self.buffer.iter().any(|&b| b != FLAG)
    }

    async fn fill_buffer(&mut self) -> DlmsResult<()> {
        let mut chunk = [0u8; READ_CHUNK];
        let n = if self.is_mid_telegram() {
            match tokio::time::timeout(self.config.inter_frame_timeout, self.stream.read(&mut chunk))
                .await
            {
                Ok(result) => result?,
                Err(_) => {
                    self.statistics.increment_timeouts();
                    let pending = self.partial.len() + self.buffer.len();
                    self.buffer.clear();
                    return Err(self.discard_partial(DlmsError::FrameInvalid(format!(
                        "Telegram incomplete after {} ms of silence ({} bytes pending)",
                        self.config.inter_frame_timeout.as_millis(),
                        pending
                    ))));
                }
            }
        } else {
            self.stream.read(&mut chunk).await?
        };

        if n == 0 {
            return Err(DlmsError::Connection(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Stream closed by peer",
            )));
        }
        self.buffer.extend_from_slice(&chunk[..n]);
        Ok(())
    }

    /// Cut the next flag-delimited frame out of the receive buffer
    fn delimit(&mut self) -> Delimited {
        match self.buffer.iter().position(|&b| b == FLAG) {
            Some(0) => {}
            Some(skip) => {
                self.statistics.add_bytes_skipped(skip);
                self.buffer.advance(skip);
            }
            None => {
                self.statistics.add_bytes_skipped(self.buffer.len());
                self.buffer.clear();
                return Delimited::NeedMore;
            }
        }

        // collapse runs of flags down to the last one
        while self.buffer.len() >= 2 && self.buffer[1] == FLAG {
            self.buffer.advance(1);
        }
        if self.buffer.len() < 3 {
            return Delimited::NeedMore;
        }

        let format = u16::from_be_bytes([self.buffer[1], self.buffer[2]]);
        let length = (format & LENGTH_MASK) as usize;
        if (self.buffer[1] & 0xF0) != 0xA0 || length < MIN_FRAME_LENGTH {
            // treat the flag as noise and rescan
            self.buffer.advance(1);
            return Delimited::Defect(FrameDefect::Malformed(format!(
                "frame format 0x{:04X}",
                format
            )));
        }
        if self.buffer.len() < length + 2 {
            return Delimited::NeedMore;
        }
        if self.buffer[length + 1] != FLAG {
            self.buffer.advance(1);
            return Delimited::Defect(FrameDefect::Malformed(format!(
                "no closing flag after {} bytes",
                length
            )));
        }

        let frame = self.buffer[1..=length].to_vec();
        // the closing flag may open the next frame
        self.buffer.advance(length + 1);
        Delimited::Frame(frame)
    }

    fn accept_frame(&mut self, bytes: &[u8]) -> DlmsResult<Option<Vec<u8>>> {
        let frame = match HdlcFrame::parse(bytes) {
            Ok(frame) => frame,
            Err(defect) => {
                self.record_defect(&defect);
                return Err(self.discard_partial(defect.into()));
            }
        };
        self.statistics.increment_frames_received();
        log::trace!("{}", frame);

        if !frame.frame_type().carries_payload()
            || (frame.information_field().is_empty() && self.partial.is_empty())
        {
            self.statistics.increment_ignored_frames();
            return Ok(None);
        }

        let segmented = frame.is_segmented();
        self.partial.extend_from_slice(frame.information_field());
        if self.partial.len() > self.config.max_apdu_size {
            self.statistics.increment_oversize_discards();
            let size = self.partial.len();
            return Err(self.discard_partial(DlmsError::FrameInvalid(format!(
                "Reassembled telegram of {} bytes exceeds limit of {} bytes",
                size, self.config.max_apdu_size
            ))));
        }
        if segmented {
            return Ok(None);
        }

        let payload = std::mem::take(&mut self.partial);
        let apdu = strip_llc(&payload).to_vec();
        self.statistics.increment_apdus_emitted();
        Ok(Some(apdu))
    }

    fn record_defect(&mut self, defect: &FrameDefect) {
        match defect {
            FrameDefect::Malformed(_) => self.statistics.increment_malformed_frames(),
            FrameDefect::HeaderCheck => self.statistics.increment_hcs_errors(),
            FrameDefect::FrameCheck => self.statistics.increment_fcs_errors(),
        }
    }

    fn discard_partial(&mut self, error: DlmsError) -> DlmsError {
        if !self.partial.is_empty() {
            log::debug!("Discarding {} bytes of partial telegram", self.partial.len());
            self.partial.clear();
        }
        error
    }
}
