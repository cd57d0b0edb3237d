use crate::error::{DlmsError, DlmsResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

static EXTENDED_FORMAT: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^(\d{1,3})-(\d{1,3}):(\d{1,3})\.(\d{1,3})\.(\d{1,3})(?:[*.](\d{1,3}))?$").ok()
});

/// OBIS (Object Identification System) code for identifying COSEM objects
///
/// OBIS codes are 6-byte identifiers used in DLMS/COSEM to uniquely identify
/// objects in a logical device. In definition documents they are written as
/// text, either "1.0.1.8.0.255" or "1-0:1.8.0*255".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObisCode {
    bytes: [u8; 6],
}

impl ObisCode {
    /// Create a new OBIS code from individual bytes
    ///
    /// # Arguments
    ///
    /// * `a` - First byte (A value)
    /// * `b` - Second byte (B value)
    /// * `c` - Third byte (C value)
    /// * `d` - Fourth byte (D value)
    /// * `e` - Fifth byte (E value)
    /// * `f` - Sixth byte (F value)
    pub fn new(a: u8, b: u8, c: u8, d: u8, e: u8, f: u8) -> Self {
        Self {
            bytes: [a, b, c, d, e, f],
        }
    }

    /// Build an OBIS code from a 6-byte octet string
    pub fn from_bytes(bytes: &[u8]) -> DlmsResult<Self> {
        let bytes: [u8; 6] = bytes.try_into().map_err(|_| {
            DlmsError::InvalidData(format!(
                "OBIS code must be 6 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self { bytes })
    }

    /// Parse an OBIS code from string format
    ///
    /// Supports formats like:
    /// - "1.0.1.8.0.255"
    /// - "1-0:1.8.0*255" (F defaults to 255 when omitted)
    ///
    /// # Returns
    ///
    /// Returns `Ok(ObisCode)` if parsing succeeds, `Err(DlmsError)` otherwise
    pub fn from_string(s: &str) -> DlmsResult<Self> {
        let s = s.trim();
        if let Ok(code) = Self::parse_dot_format(s) {
            return Ok(code);
        }

        if let Ok(code) = Self::parse_extended_format(s) {
            return Ok(code);
        }

        Err(DlmsError::InvalidData(format!("Invalid OBIS code format: {}", s)))
    }

    fn parse_dot_format(s: &str) -> DlmsResult<Self> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 6 {
            return Err(DlmsError::InvalidData("Expected 6 dot-separated values".to_string()));
        }

        let mut bytes = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            bytes[i] = part
                .parse::<u8>()
                .map_err(|_| DlmsError::InvalidData(format!("Invalid byte value: {}", part)))?;
        }

        Ok(Self { bytes })
    }

    fn parse_extended_format(s: &str) -> DlmsResult<Self> {
        let re = EXTENDED_FORMAT
            .as_ref()
            .ok_or_else(|| DlmsError::InvalidData("OBIS pattern unavailable".to_string()))?;
        let caps = re
            .captures(s)
            .ok_or_else(|| DlmsError::InvalidData(format!("Not an extended OBIS code: {}", s)))?;

        let mut bytes = [255u8; 6];
        for (i, byte) in bytes.iter_mut().enumerate() {
            if let Some(m) = caps.get(i + 1) {
                *byte = m.as_str().parse::<u8>().map_err(|_| {
                    DlmsError::InvalidData(format!("Invalid byte value: {}", m.as_str()))
                })?;
            }
        }

        Ok(Self { bytes })
    }

    /// Get the OBIS code as a byte array
    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.bytes
    }

    /// Get the A value (first byte)
    pub fn a(&self) -> u8 {
        self.bytes[0]
    }

    /// Get the C value (third byte)
    pub fn c(&self) -> u8 {
        self.bytes[2]
    }

    /// Get the F value (sixth byte)
    pub fn f(&self) -> u8 {
        self.bytes[5]
    }
}

impl FromStr for ObisCode {
    type Err = DlmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s)
    }
}

impl TryFrom<String> for ObisCode {
    type Error = DlmsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_string(&value)
    }
}

impl From<ObisCode> for String {
    fn from(code: ObisCode) -> Self {
        code.to_string()
    }
}

impl fmt::Display for ObisCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}.{}.{}",
            self.bytes[0], self.bytes[1], self.bytes[2],
            self.bytes[3], self.bytes[4], self.bytes[5]
        )
    }
}
