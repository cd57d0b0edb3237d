//! Value transformations declared by a telegram definition
//!
//! Rules run in document order over the primary registers of a telegram.
//! A rule whose key is absent does nothing.

use crate::error::{DlmsError, DlmsResult};
use crate::snapshot::{Register, RegisterValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Transformation operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransformKind {
    Multiply,
    Add,
    Subtract,
    Divide,
    Replace,
    ToInteger,
    ToString,
    ToFloat,
    MultiplyIfKey,
}

impl TransformKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformKind::Multiply => "MULTIPLY",
            TransformKind::Add => "ADD",
            TransformKind::Subtract => "SUBTRACT",
            TransformKind::Divide => "DIVIDE",
            TransformKind::Replace => "REPLACE",
            TransformKind::ToInteger => "TO_INTEGER",
            TransformKind::ToString => "TO_STRING",
            TransformKind::ToFloat => "TO_FLOAT",
            TransformKind::MultiplyIfKey => "MULTIPLY_IF_KEY",
        }
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison used by `MULTIPLY_IF_KEY`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operand {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Neq,
}

impl Operand {
    fn holds(&self, left: &RegisterValue, right: &RegisterValue) -> DlmsResult<bool> {
        match self {
            Operand::Eq => return Ok(left == right),
            Operand::Neq => return Ok(left != right),
            _ => {}
        }
        let (l, r) = match (left.as_f64(), right.as_f64()) {
            (Some(l), Some(r)) => (l, r),
            _ => {
                return Err(DlmsError::Mapping(format!(
                    "Cannot order {} against {}",
                    left.type_name(),
                    right.type_name()
                )));
            }
        };
        Ok(match self {
            Operand::Gt => l > r,
            Operand::Gte => l >= r,
            Operand::Lt => l < r,
            Operand::Lte => l <= r,
            Operand::Eq => l == r,
            Operand::Neq => l != r,
        })
    }
}

/// One entry of the `transformations` list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationRule {
    #[serde(rename = "type")]
    pub kind: TransformKind,
    pub key: String,
    #[serde(default)]
    pub value: Option<RegisterValue>,
    #[serde(default)]
    pub operand: Option<Operand>,
    #[serde(default)]
    pub transform_key: Option<String>,
    #[serde(default)]
    pub multiplier: Option<f64>,
}

impl TransformationRule {
    pub fn new(kind: TransformKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
            value: None,
            operand: None,
            transform_key: None,
            multiplier: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<RegisterValue>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn when(mut self, operand: Operand, transform_key: impl Into<String>, multiplier: f64) -> Self {
        self.operand = Some(operand);
        self.transform_key = Some(transform_key.into());
        self.multiplier = Some(multiplier);
        self
    }

    /// Structural problems that make the rule unusable
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.key.trim().is_empty() {
            problems.push(format!("{} rule without a key", self.kind));
        }
        match self.kind {
            TransformKind::Multiply
            | TransformKind::Add
            | TransformKind::Subtract
            | TransformKind::Divide => {
                if !self.value.as_ref().is_some_and(RegisterValue::is_number) {
                    problems.push(format!("{} rule on '{}' needs a numeric value", self.kind, self.key));
                }
            }
            TransformKind::Replace => {
                if self.value.is_none() {
                    problems.push(format!("REPLACE rule on '{}' needs a value", self.key));
                }
            }
            TransformKind::MultiplyIfKey => {
                if self.value.is_none()
                    || self.operand.is_none()
                    || self.transform_key.is_none()
                    || self.multiplier.is_none()
                {
                    problems.push(format!(
                        "MULTIPLY_IF_KEY rule on '{}' needs value, operand, transform_key and multiplier",
                        self.key
                    ));
                }
            }
            TransformKind::ToInteger | TransformKind::ToString | TransformKind::ToFloat => {}
        }
        problems
    }

    /// Apply the rule to `registers`
    ///
    /// # Errors
    /// `Mapping` for arithmetic on non-numeric values, division by zero,
    /// unparsable conversions and incomplete rules.
    pub fn apply(
        &self,
        registers: &mut BTreeMap<String, Register>,
        captured_at: DateTime<Utc>,
    ) -> DlmsResult<()> {
        let Some(current) = registers.get(&self.key).map(|r| r.value.clone()) else {
            return Ok(());
        };

        let (target, value) = match self.kind {
            TransformKind::Multiply => (&self.key, arithmetic(&current, self.number()?, |a, b| Ok(a * b))?),
            TransformKind::Add => (&self.key, arithmetic(&current, self.number()?, |a, b| Ok(a + b))?),
            TransformKind::Subtract => (&self.key, arithmetic(&current, self.number()?, |a, b| Ok(a - b))?),
            TransformKind::Divide => (
                &self.key,
                arithmetic(&current, self.number()?, |a, b| {
                    if b == 0.0 {
                        Err(DlmsError::Mapping("DIVIDE by zero".to_string()))
                    } else {
                        Ok(a / b)
                    }
                })?,
            ),
            TransformKind::Replace => (&self.key, self.operand_value()?.clone()),
            TransformKind::ToInteger => (&self.key, to_integer(&current)?),
            TransformKind::ToString => (&self.key, RegisterValue::Text(current.to_string())),
            TransformKind::ToFloat => (&self.key, to_float(&current)?),
            TransformKind::MultiplyIfKey => {
                let (operand, transform_key, multiplier) =
                    match (self.operand, &self.transform_key, self.multiplier) {
                        (Some(o), Some(k), Some(m)) => (o, k, m),
                        _ => return Err(self.incomplete()),
                    };
                if !operand.holds(&current, self.operand_value()?)? {
                    return Ok(());
                }
                let Some(to_scale) = registers.get(transform_key).map(|r| r.value.clone()) else {
                    return Ok(());
                };
                (transform_key, arithmetic(&to_scale, multiplier, |a, b| Ok(a * b))?)
            }
        };

        match registers.get_mut(target) {
            Some(register) => register.value = value,
            None => {
                registers.insert(target.clone(), Register::new(value, None, captured_at));
            }
        }
        Ok(())
    }

    fn operand_value(&self) -> DlmsResult<&RegisterValue> {
        self.value.as_ref().ok_or_else(|| self.incomplete())
    }

    fn number(&self) -> DlmsResult<f64> {
        self.operand_value()?
            .as_f64()
            .ok_or_else(|| self.incomplete())
    }

    fn incomplete(&self) -> DlmsError {
        DlmsError::Mapping(format!("Incomplete {} rule on '{}'", self.kind, self.key))
    }
}

fn arithmetic(
    value: &RegisterValue,
    operand: f64,
    op: impl Fn(f64, f64) -> DlmsResult<f64>,
) -> DlmsResult<RegisterValue> {
    let current = value.as_f64().ok_or_else(|| {
        DlmsError::Mapping(format!("Arithmetic on a {} value", value.type_name()))
    })?;
    Ok(RegisterValue::Number(op(current, operand)?))
}

fn to_integer(value: &RegisterValue) -> DlmsResult<RegisterValue> {
    let n = match value {
        RegisterValue::Number(n) => n.trunc(),
        RegisterValue::Bool(b) => f64::from(u8::from(*b)),
        RegisterValue::Text(s) => s
            .trim()
            .parse::<i64>()
            .map(|n| n as f64)
            .map_err(|_| DlmsError::Mapping(format!("'{}' is not an integer", s)))?,
    };
    Ok(RegisterValue::Number(n))
}

fn to_float(value: &RegisterValue) -> DlmsResult<RegisterValue> {
    let n = match value {
        RegisterValue::Number(n) => *n,
        RegisterValue::Bool(b) => f64::from(u8::from(*b)),
        RegisterValue::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| DlmsError::Mapping(format!("'{}' is not a number", s)))?,
    };
    Ok(RegisterValue::Number(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registers(entries: &[(&str, RegisterValue)]) -> BTreeMap<String, Register> {
        let now = Utc::now();
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), Register::new(v.clone(), Some("W".to_string()), now)))
            .collect()
    }

    #[test]
    fn test_arithmetic_rules() {
        let mut regs = registers(&[("P", RegisterValue::Number(10.0))]);
        let now = Utc::now();
        TransformationRule::new(TransformKind::Multiply, "P").with_value(3.0).apply(&mut regs, now).unwrap();
        TransformationRule::new(TransformKind::Add, "P").with_value(5.0).apply(&mut regs, now).unwrap();
        TransformationRule::new(TransformKind::Subtract, "P").with_value(1.0).apply(&mut regs, now).unwrap();
        TransformationRule::new(TransformKind::Divide, "P").with_value(4.0).apply(&mut regs, now).unwrap();
        assert_eq!(regs["P"].value, RegisterValue::Number(8.5));
        assert_eq!(regs["P"].unit.as_deref(), Some("W"));
    }

    #[test]
    fn test_absent_key_is_noop() {
        let mut regs = registers(&[]);
        TransformationRule::new(TransformKind::Multiply, "MISSING")
            .with_value(2.0)
            .apply(&mut regs, Utc::now())
            .unwrap();
        assert!(regs.is_empty());
    }

    #[test]
    fn test_divide_by_zero() {
        let mut regs = registers(&[("P", RegisterValue::Number(1.0))]);
        let err = TransformationRule::new(TransformKind::Divide, "P")
            .with_value(0.0)
            .apply(&mut regs, Utc::now())
            .unwrap_err();
        assert!(matches!(err, DlmsError::Mapping(_)));
    }

    #[test]
    fn test_arithmetic_on_text_fails() {
        let mut regs = registers(&[("SERIAL", RegisterValue::Text("abc".to_string()))]);
        assert!(
            TransformationRule::new(TransformKind::Add, "SERIAL")
                .with_value(1.0)
                .apply(&mut regs, Utc::now())
                .is_err()
        );
    }

    #[test]
    fn test_conversions() {
        let mut regs = registers(&[
            ("A", RegisterValue::Number(12.7)),
            ("B", RegisterValue::Text("42".to_string())),
            ("C", RegisterValue::Number(3.0)),
        ]);
        let now = Utc::now();
        TransformationRule::new(TransformKind::ToInteger, "A").apply(&mut regs, now).unwrap();
        TransformationRule::new(TransformKind::ToFloat, "B").apply(&mut regs, now).unwrap();
        TransformationRule::new(TransformKind::ToString, "C").apply(&mut regs, now).unwrap();
        assert_eq!(regs["A"].value, RegisterValue::Number(12.0));
        assert_eq!(regs["B"].value, RegisterValue::Number(42.0));
        assert_eq!(regs["C"].value, RegisterValue::Text("3".to_string()));
    }

    #[test]
    fn test_replace() {
        let mut regs = registers(&[("STATE", RegisterValue::Number(1.0))]);
        TransformationRule::new(TransformKind::Replace, "STATE")
            .with_value("on")
            .apply(&mut regs, Utc::now())
            .unwrap();
        assert_eq!(regs["STATE"].value, RegisterValue::Text("on".to_string()));
    }

    #[test]
    fn test_multiply_if_key() {
        let rule = TransformationRule::new(TransformKind::MultiplyIfKey, "DIRECTION")
            .with_value(1.0)
            .when(Operand::Eq, "ACTIVE_POWER", -1.0);

        let mut regs = registers(&[
            ("DIRECTION", RegisterValue::Number(1.0)),
            ("ACTIVE_POWER", RegisterValue::Number(500.0)),
        ]);
        rule.apply(&mut regs, Utc::now()).unwrap();
        assert_eq!(regs["ACTIVE_POWER"].value, RegisterValue::Number(-500.0));

        let mut regs = registers(&[
            ("DIRECTION", RegisterValue::Number(0.0)),
            ("ACTIVE_POWER", RegisterValue::Number(500.0)),
        ]);
        rule.apply(&mut regs, Utc::now()).unwrap();
        assert_eq!(regs["ACTIVE_POWER"].value, RegisterValue::Number(500.0));
    }

    #[test]
    fn test_problems() {
        assert!(TransformationRule::new(TransformKind::Multiply, "P").problems().len() == 1);
        assert!(TransformationRule::new(TransformKind::MultiplyIfKey, "P").with_value(1.0).problems().len() == 1);
        assert!(TransformationRule::new(TransformKind::ToString, "P").problems().is_empty());
    }

    #[test]
    fn test_deserialize_rule() {
        let rule: TransformationRule = serde_json::from_str(
            r#"{"type": "MULTIPLY_IF_KEY", "key": "D", "value": 1, "operand": "GTE", "transform_key": "P", "multiplier": -1}"#,
        )
        .unwrap();
        assert_eq!(rule.kind, TransformKind::MultiplyIfKey);
        assert_eq!(rule.operand, Some(Operand::Gte));
        assert_eq!(rule.multiplier, Some(-1.0));
    }
}
