//! Scaler-unit pairs and COSEM unit codes
//!
//! Register (class 3) and Extended Register (class 4) objects carry a
//! scaler-unit attribute:
//! - **scaler**: i8, the raw value is multiplied by 10^scaler
//! - **unit**: enum code from the Blue Book unit table (30 = Wh, 27 = W, ...)

use crate::datatypes::DataObject;
use crate::error::{DlmsError, DlmsResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// COSEM unit identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    Year,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
    Degree,
    Celsius,
    CubicMeter,
    CubicMeterPerHour,
    Watt,
    Var,
    VoltAmpere,
    WattHour,
    VarHour,
    VoltAmpereHour,
    Ampere,
    Coulomb,
    Volt,
    Hertz,
    Kelvin,
    Percent,
    AmpereHour,
    Count,
    /// Code outside the table above
    Other(u8),
}

impl Unit {
    /// Map a Blue Book unit code
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Unit::Year,
            2 => Unit::Month,
            3 => Unit::Week,
            4 => Unit::Day,
            5 => Unit::Hour,
            6 => Unit::Minute,
            7 => Unit::Second,
            8 => Unit::Degree,
            9 => Unit::Celsius,
            13 => Unit::CubicMeter,
            15 => Unit::CubicMeterPerHour,
            27 => Unit::Watt,
            28 => Unit::Var,
            29 => Unit::VoltAmpere,
            30 => Unit::WattHour,
            31 => Unit::VarHour,
            32 => Unit::VoltAmpereHour,
            33 => Unit::Ampere,
            34 => Unit::Coulomb,
            35 => Unit::Volt,
            44 => Unit::Hertz,
            52 => Unit::Kelvin,
            56 => Unit::Percent,
            57 => Unit::AmpereHour,
            255 => Unit::Count,
            other => Unit::Other(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Unit::Year => 1,
            Unit::Month => 2,
            Unit::Week => 3,
            Unit::Day => 4,
            Unit::Hour => 5,
            Unit::Minute => 6,
            Unit::Second => 7,
            Unit::Degree => 8,
            Unit::Celsius => 9,
            Unit::CubicMeter => 13,
            Unit::CubicMeterPerHour => 15,
            Unit::Watt => 27,
            Unit::Var => 28,
            Unit::VoltAmpere => 29,
            Unit::WattHour => 30,
            Unit::VarHour => 31,
            Unit::VoltAmpereHour => 32,
            Unit::Ampere => 33,
            Unit::Coulomb => 34,
            Unit::Volt => 35,
            Unit::Hertz => 44,
            Unit::Kelvin => 52,
            Unit::Percent => 56,
            Unit::AmpereHour => 57,
            Unit::Count => 255,
            Unit::Other(code) => *code,
        }
    }

    /// Display symbol; empty for dimensionless counts and unknown codes
    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::Year => "a",
            Unit::Month => "mo",
            Unit::Week => "wk",
            Unit::Day => "d",
            Unit::Hour => "h",
            Unit::Minute => "min",
            Unit::Second => "s",
            Unit::Degree => "°",
            Unit::Celsius => "°C",
            Unit::CubicMeter => "m³",
            Unit::CubicMeterPerHour => "m³/h",
            Unit::Watt => "W",
            Unit::Var => "var",
            Unit::VoltAmpere => "VA",
            Unit::WattHour => "Wh",
            Unit::VarHour => "varh",
            Unit::VoltAmpereHour => "VAh",
            Unit::Ampere => "A",
            Unit::Coulomb => "C",
            Unit::Volt => "V",
            Unit::Hertz => "Hz",
            Unit::Kelvin => "K",
            Unit::Percent => "%",
            Unit::AmpereHour => "Ah",
            Unit::Count | Unit::Other(_) => "",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Multiplication factor converting a value expressed in `from` into `to`
///
/// Only decimal-prefix conversions between the same base quantity are known
/// (Wh and kWh, W and kW, ...). Identical symbols convert with factor 1.
pub fn conversion_factor(from: &str, to: &str) -> Option<f64> {
    if from == to {
        return Some(1.0);
    }
    if let Some(base) = to.strip_prefix('k') {
        if base == from {
            return Some(0.001);
        }
    }
    if let Some(base) = from.strip_prefix('k') {
        if base == to {
            return Some(1000.0);
        }
    }
    if let Some(base) = to.strip_prefix('M') {
        if base == from {
            return Some(0.000_001);
        }
    }
    None
}

/// Scaler Unit structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScalerUnit {
    /// Scaling factor; the actual value is multiplied by 10^scaler
    pub scaler: i8,
    pub unit: Unit,
}

impl ScalerUnit {
    pub fn new(scaler: i8, unit: Unit) -> Self {
        Self { scaler, unit }
    }

    /// Apply scaling to a value
    ///
    /// # Returns
    /// The scaled value (value * 10^scaler)
    pub fn scale_value(&self, value: f64) -> f64 {
        scale(value, self.scaler)
    }

    /// Check whether a decoded value has the `{integer, enum}` scaler-unit shape
    pub fn matches(obj: &DataObject) -> bool {
        Self::from_data_object(obj).is_ok()
    }

    /// Create from DataObject (Structure of scaler and unit)
    ///
    /// Meters are inconsistent about the unit's type, so both enum and
    /// unsigned encodings are accepted.
    pub fn from_data_object(obj: &DataObject) -> DlmsResult<Self> {
        match obj {
            DataObject::Structure(elements) => {
                if elements.len() != 2 {
                    return Err(DlmsError::InvalidData(format!(
                        "ScalerUnit structure must have 2 elements, got {}",
                        elements.len()
                    )));
                }

                let scaler = match &elements[0] {
                    DataObject::Integer8(v) => *v,
                    _ => {
                        return Err(DlmsError::InvalidData(
                            "ScalerUnit scaler must be Integer8".to_string(),
                        ));
                    }
                };

                let unit = match &elements[1] {
                    DataObject::Enumerate(v) | DataObject::Unsigned8(v) => *v,
                    _ => {
                        return Err(DlmsError::InvalidData(
                            "ScalerUnit unit must be Enumerate".to_string(),
                        ));
                    }
                };

                Ok(Self::new(scaler, Unit::from_code(unit)))
            }
            _ => Err(DlmsError::InvalidData(
                "ScalerUnit must be a Structure".to_string(),
            )),
        }
    }

    /// Convert to DataObject (Structure)
    pub fn to_data_object(&self) -> DataObject {
        DataObject::Structure(vec![
            DataObject::Integer8(self.scaler),
            DataObject::Enumerate(self.unit.code()),
        ])
    }
}

/// `value × 10^scaler`, computed so that negative scalers divide exactly
/// (123456 with scaler -2 yields 1234.56, not 1234.5600000000002)
pub fn scale(value: f64, scaler: i8) -> f64 {
    if scaler < 0 {
        value / 10_f64.powi(-(scaler as i32))
    } else {
        value * 10_f64.powi(scaler as i32)
    }
}
