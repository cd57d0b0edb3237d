//! Register values and snapshots

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Normalised register value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegisterValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl RegisterValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RegisterValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RegisterValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, RegisterValue::Number(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            RegisterValue::Bool(_) => "boolean",
            RegisterValue::Number(_) => "number",
            RegisterValue::Text(_) => "text",
        }
    }
}

impl fmt::Display for RegisterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterValue::Bool(b) => write!(f, "{}", b),
            RegisterValue::Number(n) => write!(f, "{}", n),
            RegisterValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for RegisterValue {
    fn from(value: f64) -> Self {
        RegisterValue::Number(value)
    }
}

impl From<bool> for RegisterValue {
    fn from(value: bool) -> Self {
        RegisterValue::Bool(value)
    }
}

impl From<String> for RegisterValue {
    fn from(value: String) -> Self {
        RegisterValue::Text(value)
    }
}

impl From<&str> for RegisterValue {
    fn from(value: &str) -> Self {
        RegisterValue::Text(value.to_string())
    }
}

/// One named register of a snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Register {
    pub value: RegisterValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub captured_at: DateTime<Utc>,
}

impl Register {
    pub fn new(value: RegisterValue, unit: Option<String>, captured_at: DateTime<Utc>) -> Self {
        Self {
            value,
            unit,
            captured_at,
        }
    }
}

/// Every register produced from one telegram
///
/// A snapshot is only ever built whole; readers never observe registers from
/// two different telegrams mixed together.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisterSnapshot {
    /// Push layout name, or the definition id for self-describing telegrams
    pub telegram: String,
    pub captured_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meter_time: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoke_id: Option<u32>,
    pub registers: BTreeMap<String, Register>,
    /// Decoded objects without a register definition
    pub unmatched: usize,
    /// Matched objects whose value could not be represented
    pub skipped: usize,
}

impl RegisterSnapshot {
    pub fn get(&self, name: &str) -> Option<&Register> {
        self.registers.get(name)
    }

    pub fn value(&self, name: &str) -> Option<&RegisterValue> {
        self.registers.get(name).map(|r| &r.value)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.value(name).and_then(RegisterValue::as_f64)
    }

    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_value_deserialize() {
        let values: Vec<RegisterValue> = serde_json::from_str(r#"[true, 2.5, 7, "x"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                RegisterValue::Bool(true),
                RegisterValue::Number(2.5),
                RegisterValue::Number(7.0),
                RegisterValue::Text("x".to_string()),
            ]
        );
    }

    #[test]
    fn test_snapshot_serializes_registers_by_name() {
        let now = Utc::now();
        let mut registers = BTreeMap::new();
        registers.insert(
            "ACTIVE_POWER_IMPORT".to_string(),
            Register::new(RegisterValue::Number(230.0), Some("W".to_string()), now),
        );
        let snapshot = RegisterSnapshot {
            telegram: "generic".to_string(),
            captured_at: now,
            meter_time: None,
            invoke_id: Some(4),
            registers,
            unmatched: 1,
            skipped: 0,
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["registers"]["ACTIVE_POWER_IMPORT"]["value"], 230.0);
        assert_eq!(json["registers"]["ACTIVE_POWER_IMPORT"]["unit"], "W");
        assert!(json.get("meter_time").is_none());
        assert_eq!(snapshot.number("ACTIVE_POWER_IMPORT"), Some(230.0));
    }
}
