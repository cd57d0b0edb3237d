//! Core types and utilities for DLMS/COSEM push acquisition
//!
//! This crate provides the error type shared by every layer, OBIS codes,
//! decoded data objects and the scaler-unit model used when mapping
//! register values.

pub mod cosem_object;
pub mod datatypes;
pub mod error;
pub mod obis_code;
pub mod scaler_unit;

pub use cosem_object::{AttributeKey, CosemObject};
pub use datatypes::{CosemDateTime, DataObject, DataObjectType};
pub use error::{DlmsError, DlmsResult, ErrorClass};
pub use obis_code::ObisCode;
pub use scaler_unit::{ScalerUnit, Unit};
