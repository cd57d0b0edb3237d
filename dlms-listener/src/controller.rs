//! Session controller
//!
//! Drives one link through its lifecycle:
//!
//! 1. open the link through the [`LinkConnector`], backing off exponentially
//!    (capped, jittered) while opening fails;
//! 2. read APDUs with a fresh [`HdlcFrameReader`] and run each one through
//!    the [`TelegramPipeline`], strictly one at a time;
//! 3. publish every snapshot by replacing the shared reference, leaving the
//!    previous snapshot in place whenever a telegram is dropped;
//! 4. on an I/O error close the link and start over at 1.
//!
//! Cancellation is observed while opening, while waiting for bytes and
//! during every backoff sleep. The stream is closed before [`run`] returns.
//!
//! [`run`]: SessionController::run

use crate::config::ListenerConfig;
use crate::error::{DlmsError, DlmsResult};
use crate::fault::FaultTracker;
use crate::handle::{SessionHandle, SessionStatus};
use crate::pipeline::TelegramPipeline;
use crate::state::{Health, SessionState};
use arc_swap::ArcSwapOption;
use backoff::backoff::Backoff;
use dlms_mapper::RegisterSnapshot;
use dlms_session::{FramingStatistics, HdlcFrameReader};
use dlms_transport::{LinkConnector, StreamAccessor};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why reading from an open link stopped
#[derive(Debug)]
enum LinkEnd {
    Cancelled,
    /// End of a finite source such as a replayed capture
    EndOfStream,
    Lost(DlmsError),
    /// Faulted without a successful telegram for too long
    FaultedReconnect,
}

/// Owns one link and the snapshot published from it
pub struct SessionController {
    connector: Arc<dyn LinkConnector>,
    pipeline: TelegramPipeline,
    config: ListenerConfig,
    tracker: FaultTracker,
    snapshot: Arc<ArcSwapOption<RegisterSnapshot>>,
    status_tx: watch::Sender<SessionStatus>,
    status: SessionStatus,
}

impl SessionController {
    /// # Errors
    /// `DlmsError::Configuration` when `config` is out of range
    pub fn new(
        connector: Arc<dyn LinkConnector>,
        pipeline: TelegramPipeline,
        config: ListenerConfig,
    ) -> DlmsResult<Self> {
        config.validate()?;
        let (status_tx, _) = watch::channel(SessionStatus::default());
        Ok(Self {
            connector,
            pipeline,
            tracker: FaultTracker::new(&config.fault),
            config,
            snapshot: Arc::new(ArcSwapOption::from(None)),
            status_tx,
            status: SessionStatus::default(),
        })
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle::new(Arc::clone(&self.snapshot), self.status_tx.subscribe())
    }

    /// Run until `cancel` fires or a finite source is exhausted
    pub async fn run(mut self, cancel: CancellationToken) {
        let link = self.connector.describe();
        let mut backoff = self.config.reconnect.build_backoff();

        loop {
            self.status.connect_attempts = self.status.connect_attempts.saturating_add(1);
            self.transition(SessionState::Connecting);
            log::info!(
                "Opening {} (attempt {})",
                link,
                self.status.connect_attempts
            );

            let opened = tokio::select! {
                _ = cancel.cancelled() => break,
                opened = self.connector.connect() => opened,
            };

            match opened {
                Ok(stream) => {
                    log::info!("Opened {}", link);
                    backoff.reset();
                    self.status.connect_attempts = 0;

                    match self.listen(stream, &cancel).await {
                        LinkEnd::Cancelled => break,
                        LinkEnd::EndOfStream => {
                            log::info!("End of {}", link);
                            break;
                        }
                        LinkEnd::Lost(err) => {
                            log::warn!("Lost {}: {}", link, err);
                            self.status.last_error = Some(err.to_string());
                        }
                        LinkEnd::FaultedReconnect => {
                            log::warn!(
                                "No telegram decoded within {} ms while faulted, reopening {}",
                                self.config.faulted_reconnect_ms,
                                link
                            );
                        }
                    }
                }
                Err(err) => {
                    log::warn!("Failed to open {}: {}", link, err);
                    self.status.last_error = Some(err.to_string());
                }
            }
            self.transition(SessionState::Disconnected);

            let delay = backoff
                .next_backoff()
                .unwrap_or_else(|| self.config.reconnect.max_interval());
            log::warn!(
                "Reconnecting to {} in {} ms (attempt {})",
                link,
                delay.as_millis(),
                self.status.connect_attempts.saturating_add(1)
            );
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.transition(SessionState::Disconnected);
        log::info!("Session on {} stopped", link);
    }

    async fn listen(&mut self, stream: Box<dyn StreamAccessor>, cancel: &CancellationToken) -> LinkEnd {
        let mut reader = HdlcFrameReader::new(stream, self.config.frame_reader_config());
        self.pipeline.reset();
        self.status.framing = FramingStatistics::default();
        let mut faulted_since = self.tracker.is_faulted().then(Instant::now);
        self.transition(self.idle_state());

        let end = loop {
            let deadline =
                faulted_since.map(|since| since + self.config.faulted_reconnect_interval());
            let next = tokio::select! {
                _ = cancel.cancelled() => break LinkEnd::Cancelled,
                _ = sleep_until(deadline) => break LinkEnd::FaultedReconnect,
                next = reader.next_apdu() => next,
            };
            self.status.framing = reader.statistics().clone();

            match next {
                Ok(apdu) => {
                    self.transition(SessionState::Decoding);
                    match self.pipeline.process(&apdu) {
                        Ok(Some(snapshot)) => self.publish_snapshot(snapshot, &mut faulted_since),
                        Ok(None) => {}
                        Err(err) => self.drop_telegram(err, &mut faulted_since),
                    }
                }
                Err(err) if err.class().is_session_fatal() => {
                    if is_end_of_stream(&err) && self.connector.ends_at_eof() {
                        break LinkEnd::EndOfStream;
                    }
                    break LinkEnd::Lost(err);
                }
                Err(err) => self.drop_telegram(err, &mut faulted_since),
            }
            self.transition(self.idle_state());
        };

        if let Err(err) = reader.close().await {
            log::debug!("Closing stream failed: {}", err);
        }
        end
    }

    fn publish_snapshot(&mut self, snapshot: RegisterSnapshot, faulted_since: &mut Option<Instant>) {
        log::debug!(
            "Telegram '{}' mapped to {} registers",
            snapshot.telegram,
            snapshot.len()
        );
        self.snapshot.store(Some(Arc::new(snapshot)));
        self.status.telegrams_ok += 1;
        self.status.snapshot_sequence += 1;
        if self.tracker.record_success() {
            log::info!("Telegram decoded, fault cleared");
        }
        *faulted_since = None;
    }

    fn drop_telegram(&mut self, err: DlmsError, faulted_since: &mut Option<Instant>) {
        let class = err.class();
        log::warn!("Dropped telegram ({} error): {}", class.as_str(), err);
        self.status.telegrams_failed += 1;
        self.status.last_error = Some(err.to_string());

        if class.counts_toward_fault() && self.tracker.record_failure() {
            log::warn!(
                "{} of the last {} telegrams failed, session faulted",
                self.tracker.failures(),
                self.config.fault.window
            );
            *faulted_since = Some(Instant::now());
        }
    }

    /// State while waiting for the next APDU on an open link
    fn idle_state(&self) -> SessionState {
        if self.tracker.is_faulted() {
            SessionState::Faulted
        } else {
            SessionState::Listening
        }
    }

    fn transition(&mut self, next: SessionState) {
        let current = self.status.state;
        if let Err(err) = current.validate_transition(next) {
            log::warn!("{}", err);
        }
        if current != next {
            log::debug!("Session state {} -> {}", current, next);
        }
        self.status.state = next;
        self.status.health = Health::of(next, self.tracker.is_faulted());
        self.status_tx.send_replace(self.status.clone());
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn is_end_of_stream(err: &DlmsError) -> bool {
    matches!(err, DlmsError::Connection(io) if io.kind() == std::io::ErrorKind::UnexpectedEof)
}
