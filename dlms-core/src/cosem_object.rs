//! Decoded COSEM attribute values

use crate::datatypes::DataObject;
use crate::obis_code::ObisCode;
use crate::scaler_unit::ScalerUnit;
use std::fmt;

/// Composite key identifying one COSEM attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributeKey {
    pub class_id: u16,
    pub logical_name: ObisCode,
    pub attribute_index: i8,
}

impl AttributeKey {
    pub fn new(class_id: u16, logical_name: ObisCode, attribute_index: i8) -> Self {
        Self {
            class_id,
            logical_name,
            attribute_index,
        }
    }
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.class_id, self.logical_name, self.attribute_index
        )
    }
}

/// One decoded attribute value from a notification
///
/// `path` is the index path of the value inside the notification body,
/// e.g. `[3]` for the fourth element of the top-level structure.
#[derive(Debug, Clone, PartialEq)]
pub struct CosemObject {
    pub class_id: u16,
    pub logical_name: ObisCode,
    pub attribute_index: i8,
    pub value: DataObject,
    pub scaler_unit: Option<ScalerUnit>,
    pub path: Vec<usize>,
}

impl CosemObject {
    pub fn key(&self) -> AttributeKey {
        AttributeKey::new(self.class_id, self.logical_name, self.attribute_index)
    }
}
