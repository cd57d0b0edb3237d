//! Session layer module for DLMS/COSEM push acquisition
//!
//! Delimits HDLC frames on a receive-only link, validates HCS/FCS and
//! reassembles segmented telegrams into complete APDUs.

pub mod error;
pub mod hdlc;

pub use error::{DlmsError, DlmsResult};
pub use hdlc::*;
