//! A-XDR encoding/decoding for DLMS/COSEM
//!
//! Push notifications carry their payload as A-XDR encoded `Data`. This
//! crate turns those bytes into [`DataObject`](dlms_core::DataObject) trees.

pub mod axdr;
pub mod error;

pub use axdr::types::{AxdrTag, LengthEncoding};
pub use axdr::{AxdrDecoder, AxdrEncoder};
