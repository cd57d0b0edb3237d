//! Register mapping for DLMS/COSEM push telegrams
//!
//! Loads telegram definition documents and maps decoded COSEM objects onto
//! named, normalised registers.

pub mod catalog;
pub mod definition;
pub mod derived;
pub mod error;
pub mod mapper;
pub mod snapshot;
pub mod transform;

pub use catalog::{ScannedDocument, TelegramCatalog};
pub use definition::{RegisterEntry, TelegramDefinition, TelegramDocument, TelegramInfo};
pub use error::{DlmsError, DlmsResult};
pub use mapper::RegisterMapper;
pub use snapshot::{Register, RegisterSnapshot, RegisterValue};
pub use transform::{Operand, TransformKind, TransformationRule};
