//! Error types re-exported from `dlms-core`

pub use dlms_core::error::{DlmsError, DlmsResult};
