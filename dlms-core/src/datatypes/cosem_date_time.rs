//! COSEM DateTime type for DLMS/COSEM protocol

use crate::error::{DlmsError, DlmsResult};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

const DEVIATION_NOT_SPECIFIED: i16 = -0x8000;
const YEAR_NOT_SPECIFIED: u16 = 0xFFFF;
const NOT_SPECIFIED: u8 = 0xFF;

/// Clock status bit: the value is invalid
pub const CLOCK_STATUS_INVALID: u8 = 0x01;
/// Clock status bit: daylight saving is active
pub const CLOCK_STATUS_DAYLIGHT_SAVING: u8 = 0x80;

/// A COSEM date-time (12-byte octet string)
///
/// Layout: year (u16 BE), month, day of month, day of week, hour, minute,
/// second, hundredths, deviation (i16 BE, minutes), clock status.
/// Any field may carry the "not specified" marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CosemDateTime {
    year: u16,
    month: u8,
    day_of_month: u8,
    day_of_week: u8,
    hour: u8,
    minute: u8,
    second: u8,
    hundredths: u8,
    deviation: i16,
    clock_status: u8,
}

impl CosemDateTime {
    pub const LENGTH: usize = 12;

    /// Constructs a fully specified COSEM DateTime without deviation
    pub fn new(year: u16, month: u8, day_of_month: u8, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            year,
            month,
            day_of_month,
            day_of_week: NOT_SPECIFIED,
            hour,
            minute,
            second,
            hundredths: 0,
            deviation: DEVIATION_NOT_SPECIFIED,
            clock_status: 0,
        }
    }

    /// Decode from the 12-byte wire form
    pub fn decode(bytes: &[u8]) -> DlmsResult<Self> {
        if bytes.len() != Self::LENGTH {
            return Err(DlmsError::InvalidData(format!(
                "COSEM date-time must be {} bytes, got {}",
                Self::LENGTH,
                bytes.len()
            )));
        }
        Ok(Self {
            year: u16::from_be_bytes([bytes[0], bytes[1]]),
            month: bytes[2],
            day_of_month: bytes[3],
            day_of_week: bytes[4],
            hour: bytes[5],
            minute: bytes[6],
            second: bytes[7],
            hundredths: bytes[8],
            deviation: i16::from_be_bytes([bytes[9], bytes[10]]),
            clock_status: bytes[11],
        })
    }

    /// Encode to the 12-byte wire form
    pub fn encode(&self) -> [u8; 12] {
        let year = self.year.to_be_bytes();
        let deviation = self.deviation.to_be_bytes();
        [
            year[0],
            year[1],
            self.month,
            self.day_of_month,
            self.day_of_week,
            self.hour,
            self.minute,
            self.second,
            self.hundredths,
            deviation[0],
            deviation[1],
            self.clock_status,
        ]
    }

    /// Deviation from UTC in minutes, if specified
    pub fn deviation(&self) -> Option<i16> {
        (self.deviation != DEVIATION_NOT_SPECIFIED).then_some(self.deviation)
    }

    pub fn clock_status(&self) -> u8 {
        self.clock_status
    }

    /// Meter-local wall-clock time
    ///
    /// Returns `None` when the clock status flags the value invalid or when
    /// any date or time field is unspecified.
    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        if self.clock_status & CLOCK_STATUS_INVALID != 0 || self.year == YEAR_NOT_SPECIFIED {
            return None;
        }
        let millis = if self.hundredths == NOT_SPECIFIED {
            0
        } else {
            self.hundredths as u32 * 10
        };
        NaiveDate::from_ymd_opt(self.year as i32, self.month as u32, self.day_of_month as u32)?
            .and_hms_milli_opt(self.hour as u32, self.minute as u32, self.second as u32, millis)
    }
}

impl fmt::Display for CosemDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_naive() {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            None => write!(f, "unspecified ({:02X?})", self.encode()),
        }
    }
}
