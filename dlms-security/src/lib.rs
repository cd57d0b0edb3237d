//! Security module for DLMS/COSEM push telegrams
//!
//! Verifies and removes security suite 0 (AES-GCM-128) protection from
//! ciphered APDUs before they reach the COSEM decoder.

pub mod encryption;
pub mod error;
pub mod keys;
pub mod protection;

pub use encryption::{GcmCipher, SecurityControl};
pub use error::{DlmsError, DlmsResult};
pub use keys::{KeyKind, SecurityKeys, SystemTitle};
pub use protection::{is_ciphered_tag, CipheredApdu, SecurityLayer};
