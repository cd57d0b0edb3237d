//! Session controller for DLMS/COSEM push meters
//!
//! Owns one link to one meter: opens it through a
//! [`LinkConnector`](dlms_transport::LinkConnector), reads HDLC frames,
//! runs every APDU through the [`TelegramPipeline`] and publishes the
//! resulting register snapshot. Lost links are reopened with capped
//! exponential backoff; sustained telegram failures raise the
//! degraded-faulted health flag.
//!
//! ```ignore
//! let pipeline = TelegramPipeline::from_definition(definition, keys, config.max_apdu_size);
//! let controller = SessionController::new(connector, pipeline, config)?;
//! let handle = controller.handle();
//! tokio::spawn(controller.run(cancel.clone()));
//!
//! if let Some(snapshot) = handle.snapshot() {
//!     println!("{:?}", snapshot.value("ACTIVE_POWER_TOTAL"));
//! }
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod fault;
pub mod handle;
pub mod pipeline;
pub mod state;

pub use config::{FaultPolicy, ListenerConfig, ReconnectPolicy};
pub use controller::SessionController;
pub use error::{DlmsError, DlmsResult, ErrorClass};
pub use fault::FaultTracker;
pub use handle::{SessionHandle, SessionStatus};
pub use pipeline::TelegramPipeline;
pub use state::{Health, SessionState};
