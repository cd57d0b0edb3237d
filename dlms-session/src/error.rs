pub use dlms_core::error::{DlmsError, DlmsResult};
