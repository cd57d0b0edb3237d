//! Data object types for DLMS/COSEM protocol

use crate::datatypes::cosem_date_time::CosemDateTime;
use crate::error::{DlmsError, DlmsResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Decoded A-XDR `Data` value as carried in push notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataObject {
    /// Null data
    Null,
    /// Boolean value
    Boolean(bool),
    /// Bit string: packed bytes and the number of significant bits
    BitString { bytes: Vec<u8>, bits: usize },
    /// Integer 8-bit
    Integer8(i8),
    /// Integer 16-bit
    Integer16(i16),
    /// Integer 32-bit
    Integer32(i32),
    /// Integer 64-bit
    Integer64(i64),
    /// Unsigned integer 8-bit
    Unsigned8(u8),
    /// Unsigned integer 16-bit
    Unsigned16(u16),
    /// Unsigned integer 32-bit
    Unsigned32(u32),
    /// Unsigned integer 64-bit
    Unsigned64(u64),
    /// Float 32-bit
    Float32(f32),
    /// Float 64-bit
    Float64(f64),
    /// Enumeration (8-bit)
    Enumerate(u8),
    /// BCD (Binary Coded Decimal)
    Bcd(u8),
    /// Octet string
    OctetString(Vec<u8>),
    /// Visible string
    VisibleString(Vec<u8>),
    /// UTF-8 string
    Utf8String(Vec<u8>),
    /// Array of DataObjects
    Array(Vec<DataObject>),
    /// Structure (ordered list of DataObjects)
    Structure(Vec<DataObject>),
    /// Date (5 raw bytes)
    Date([u8; 5]),
    /// Time (4 raw bytes)
    Time([u8; 4]),
    /// Date and time
    DateTime(CosemDateTime),
}

/// Type enumeration for DataObject
///
/// Definition documents name types either by these variant names or by the
/// short aliases common in meter XML dumps (`UInt32`, `Enum`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataObjectType {
    #[serde(alias = "None")]
    Null,
    Boolean,
    BitString,
    #[serde(alias = "Int8")]
    Integer8,
    #[serde(alias = "Int16")]
    Integer16,
    #[serde(alias = "Int32")]
    Integer32,
    #[serde(alias = "Int64")]
    Integer64,
    #[serde(alias = "UInt8")]
    Unsigned8,
    #[serde(alias = "UInt16")]
    Unsigned16,
    #[serde(alias = "UInt32")]
    Unsigned32,
    #[serde(alias = "UInt64")]
    Unsigned64,
    Float32,
    Float64,
    #[serde(alias = "Enum")]
    Enumerate,
    Bcd,
    OctetString,
    #[serde(alias = "String")]
    VisibleString,
    Utf8String,
    Array,
    Structure,
    Date,
    Time,
    DateTime,
}

impl DataObjectType {
    /// Check if this type is a number type
    pub fn is_number(&self) -> bool {
        matches!(
            self,
            DataObjectType::Integer8
                | DataObjectType::Integer16
                | DataObjectType::Integer32
                | DataObjectType::Integer64
                | DataObjectType::Unsigned8
                | DataObjectType::Unsigned16
                | DataObjectType::Unsigned32
                | DataObjectType::Unsigned64
                | DataObjectType::Float32
                | DataObjectType::Float64
                | DataObjectType::Enumerate
                | DataObjectType::Bcd
        )
    }
}

impl DataObject {
    /// Get the type of this data object
    pub fn get_type(&self) -> DataObjectType {
        match self {
            DataObject::Null => DataObjectType::Null,
            DataObject::Boolean(_) => DataObjectType::Boolean,
            DataObject::BitString { .. } => DataObjectType::BitString,
            DataObject::Integer8(_) => DataObjectType::Integer8,
            DataObject::Integer16(_) => DataObjectType::Integer16,
            DataObject::Integer32(_) => DataObjectType::Integer32,
            DataObject::Integer64(_) => DataObjectType::Integer64,
            DataObject::Unsigned8(_) => DataObjectType::Unsigned8,
            DataObject::Unsigned16(_) => DataObjectType::Unsigned16,
            DataObject::Unsigned32(_) => DataObjectType::Unsigned32,
            DataObject::Unsigned64(_) => DataObjectType::Unsigned64,
            DataObject::Float32(_) => DataObjectType::Float32,
            DataObject::Float64(_) => DataObjectType::Float64,
            DataObject::Enumerate(_) => DataObjectType::Enumerate,
            DataObject::Bcd(_) => DataObjectType::Bcd,
            DataObject::OctetString(_) => DataObjectType::OctetString,
            DataObject::VisibleString(_) => DataObjectType::VisibleString,
            DataObject::Utf8String(_) => DataObjectType::Utf8String,
            DataObject::Array(_) => DataObjectType::Array,
            DataObject::Structure(_) => DataObjectType::Structure,
            DataObject::Date(_) => DataObjectType::Date,
            DataObject::Time(_) => DataObjectType::Time,
            DataObject::DateTime(_) => DataObjectType::DateTime,
        }
    }

    /// Check if this is a null object
    pub fn is_null(&self) -> bool {
        matches!(self, DataObject::Null)
    }

    /// Check if this is a number
    pub fn is_number(&self) -> bool {
        self.get_type().is_number()
    }

    /// Check if this is a complex type (array or structure)
    pub fn is_complex(&self) -> bool {
        matches!(self, DataObject::Array(_) | DataObject::Structure(_))
    }

    /// Numeric value as f64, for every integer, float, enum and BCD variant
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DataObject::Integer8(v) => Some(*v as f64),
            DataObject::Integer16(v) => Some(*v as f64),
            DataObject::Integer32(v) => Some(*v as f64),
            DataObject::Integer64(v) => Some(*v as f64),
            DataObject::Unsigned8(v) => Some(*v as f64),
            DataObject::Unsigned16(v) => Some(*v as f64),
            DataObject::Unsigned32(v) => Some(*v as f64),
            DataObject::Unsigned64(v) => Some(*v as f64),
            DataObject::Float32(v) => Some(*v as f64),
            DataObject::Float64(v) => Some(*v),
            DataObject::Enumerate(v) => Some(*v as f64),
            DataObject::Bcd(v) => Some(((v >> 4) * 10 + (v & 0x0F)) as f64),
            _ => None,
        }
    }

    /// Signed integer value, when the variant fits in an i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DataObject::Integer8(v) => Some(*v as i64),
            DataObject::Integer16(v) => Some(*v as i64),
            DataObject::Integer32(v) => Some(*v as i64),
            DataObject::Integer64(v) => Some(*v),
            DataObject::Unsigned8(v) | DataObject::Enumerate(v) => Some(*v as i64),
            DataObject::Unsigned16(v) => Some(*v as i64),
            DataObject::Unsigned32(v) => Some(*v as i64),
            DataObject::Unsigned64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Get as boolean
    pub fn as_bool(&self) -> DlmsResult<bool> {
        match self {
            DataObject::Boolean(b) => Ok(*b),
            _ => Err(DlmsError::InvalidData(format!(
                "Expected Boolean, got {:?}",
                self.get_type()
            ))),
        }
    }

    /// Get raw bytes of an octet, visible or UTF-8 string
    pub fn as_bytes(&self) -> DlmsResult<&[u8]> {
        match self {
            DataObject::OctetString(b)
            | DataObject::VisibleString(b)
            | DataObject::Utf8String(b) => Ok(b),
            _ => Err(DlmsError::InvalidData(format!(
                "Expected string type, got {:?}",
                self.get_type()
            ))),
        }
    }

    /// Get elements of an array or structure
    pub fn as_elements(&self) -> DlmsResult<&[DataObject]> {
        match self {
            DataObject::Array(items) | DataObject::Structure(items) => Ok(items),
            _ => Err(DlmsError::InvalidData(format!(
                "Expected Array or Structure, got {:?}",
                self.get_type()
            ))),
        }
    }
}

impl fmt::Display for DataObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataObject::Null => write!(f, "NULL"),
            DataObject::Boolean(b) => write!(f, "BOOLEAN: {}", b),
            DataObject::BitString { bytes, bits } => {
                write!(f, "BIT_STRING({}): ", bits)?;
                for byte in bytes {
                    write!(f, "{:08b} ", byte)?;
                }
                Ok(())
            }
            DataObject::Integer8(i) => write!(f, "INTEGER8: {}", i),
            DataObject::Integer16(i) => write!(f, "INTEGER16: {}", i),
            DataObject::Integer32(i) => write!(f, "INTEGER32: {}", i),
            DataObject::Integer64(i) => write!(f, "INTEGER64: {}", i),
            DataObject::Unsigned8(u) => write!(f, "UNSIGNED8: {}", u),
            DataObject::Unsigned16(u) => write!(f, "UNSIGNED16: {}", u),
            DataObject::Unsigned32(u) => write!(f, "UNSIGNED32: {}", u),
            DataObject::Unsigned64(u) => write!(f, "UNSIGNED64: {}", u),
            DataObject::Float32(v) => write!(f, "FLOAT32: {}", v),
            DataObject::Float64(v) => write!(f, "FLOAT64: {}", v),
            DataObject::Enumerate(e) => write!(f, "ENUMERATE: {}", e),
            DataObject::Bcd(b) => write!(f, "BCD: {}", b),
            DataObject::OctetString(s) => {
                write!(f, "OCTET_STRING: ")?;
                for byte in s {
                    write!(f, "{:02X} ", byte)?;
                }
                Ok(())
            }
            DataObject::VisibleString(s) => {
                write!(f, "VISIBLE_STRING: {}", String::from_utf8_lossy(s))
            }
            DataObject::Utf8String(s) => {
                write!(f, "UTF8_STRING: {}", String::from_utf8_lossy(s))
            }
            DataObject::Array(arr) => {
                write!(f, "ARRAY: {} element(s)", arr.len())?;
                for (i, elem) in arr.iter().enumerate() {
                    write!(f, "\n  [{}]: {}", i, elem)?;
                }
                Ok(())
            }
            DataObject::Structure(s) => {
                write!(f, "STRUCTURE: {} element(s)", s.len())?;
                for (i, elem) in s.iter().enumerate() {
                    write!(f, "\n  [{}]: {}", i, elem)?;
                }
                Ok(())
            }
            DataObject::Date(d) => write!(f, "DATE: {:02X?}", d),
            DataObject::Time(t) => write!(f, "TIME: {:02X?}", t),
            DataObject::DateTime(dt) => write!(f, "DATE_TIME: {}", dt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_object_null() {
        let obj = DataObject::Null;
        assert!(obj.is_null());
        assert_eq!(obj.get_type(), DataObjectType::Null);
    }

    #[test]
    fn test_data_object_numeric() {
        assert_eq!(DataObject::Unsigned32(123456).as_f64(), Some(123456.0));
        assert_eq!(DataObject::Integer16(-5).as_i64(), Some(-5));
        assert_eq!(DataObject::Bcd(0x42).as_f64(), Some(42.0));
        assert_eq!(DataObject::Unsigned64(u64::MAX).as_i64(), None);
        assert!(DataObject::OctetString(vec![1]).as_f64().is_none());
    }

    #[test]
    fn test_data_object_boolean() {
        let obj = DataObject::Boolean(true);
        assert!(obj.as_bool().unwrap());
        assert!(DataObject::Unsigned8(1).as_bool().is_err());
    }

    #[test]
    fn test_data_object_elements() {
        let obj = DataObject::Structure(vec![DataObject::Integer8(-2), DataObject::Enumerate(30)]);
        assert!(obj.is_complex());
        assert_eq!(obj.as_elements().unwrap().len(), 2);
        assert!(DataObject::Null.as_elements().is_err());
    }

    #[test]
    fn test_data_object_type_aliases() {
        let types: Vec<DataObjectType> =
            serde_json::from_str(r#"["UInt32", "Enum", "OctetString", "Int16"]"#).unwrap();
        assert_eq!(
            types,
            vec![
                DataObjectType::Unsigned32,
                DataObjectType::Enumerate,
                DataObjectType::OctetString,
                DataObjectType::Integer16,
            ]
        );
    }
}
