//! Transport layer module for DLMS/COSEM push acquisition
//!
//! Provides the receive-only byte streams the frame reader consumes: a
//! serial port for live meters and a file replay for recorded captures.

pub mod error;
pub mod replay;
pub mod serial;
pub mod stream;

pub use error::{DlmsError, DlmsResult};
pub use replay::ReplayConnector;
pub use serial::{SerialConnector, SerialSettings, SerialTransport};
pub use stream::{IoStream, LinkConnector, StreamAccessor, TransportLayer};
