//! Error types for the listener

pub use dlms_core::error::{DlmsError, DlmsResult, ErrorClass};
