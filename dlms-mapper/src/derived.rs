//! Registers computed from other registers
//!
//! Meters differ in which totals they push. Missing totals are filled in
//! from per-phase and import/export registers in two stages. Each stage
//! reads a frozen copy of the registers present before it started, so the
//! result does not depend on evaluation order within a stage.

use crate::error::{DlmsError, DlmsResult};
use crate::snapshot::{Register, RegisterValue};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

const PHASES: [&str; 3] = ["L1", "L2", "L3"];

enum Formula {
    /// a - b
    Difference(String, String),
    /// Σ parts
    Sum(Vec<String>),
}

struct DerivedRegister {
    name: String,
    formula: Formula,
}

impl DerivedRegister {
    fn difference(name: impl Into<String>, a: impl Into<String>, b: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            formula: Formula::Difference(a.into(), b.into()),
        }
    }

    fn sum(name: impl Into<String>, prefix: &str) -> Self {
        Self {
            name: name.into(),
            formula: Formula::Sum(PHASES.iter().map(|p| format!("{}_{}", prefix, p)).collect()),
        }
    }

    fn inputs(&self) -> Vec<&str> {
        match &self.formula {
            Formula::Difference(a, b) => vec![a.as_str(), b.as_str()],
            Formula::Sum(parts) => parts.iter().map(String::as_str).collect(),
        }
    }

    /// `None` when an input is missing
    fn evaluate(
        &self,
        frozen: &BTreeMap<String, Register>,
    ) -> DlmsResult<Option<(f64, Option<String>)>> {
        let inputs = self.inputs();
        let mut values = Vec::with_capacity(inputs.len());
        for input in &inputs {
            let Some(register) = frozen.get(*input) else {
                return Ok(None);
            };
            let value = register.value.as_f64().ok_or_else(|| {
                DlmsError::Mapping(format!(
                    "{} depends on {}, which is a {} value",
                    self.name,
                    input,
                    register.value.type_name()
                ))
            })?;
            values.push(value);
        }

        let result = match &self.formula {
            Formula::Difference(..) => values[0] - values[1],
            Formula::Sum(_) => values.iter().sum(),
        };
        let unit = frozen.get(inputs[0]).and_then(|r| r.unit.clone());
        Ok(Some((result, unit)))
    }
}

fn stages() -> [Vec<DerivedRegister>; 2] {
    let mut first: Vec<DerivedRegister> = PHASES
        .iter()
        .map(|p| {
            DerivedRegister::difference(
                format!("ACTIVE_POWER_TOTAL_{}", p),
                format!("ACTIVE_POWER_IMPORT_{}", p),
                format!("ACTIVE_POWER_EXPORT_{}", p),
            )
        })
        .collect();
    first.push(DerivedRegister::sum("ACTIVE_POWER_IMPORT", "ACTIVE_POWER_IMPORT"));
    first.push(DerivedRegister::sum("ACTIVE_POWER_EXPORT", "ACTIVE_POWER_EXPORT"));
    first.push(DerivedRegister::sum("CURRENT_TOTAL", "CURRENT"));

    let second = vec![DerivedRegister::difference(
        "ACTIVE_POWER_TOTAL",
        "ACTIVE_POWER_IMPORT",
        "ACTIVE_POWER_EXPORT",
    )];

    [first, second]
}

/// Add every derivable register that the telegram did not carry
///
/// # Errors
/// `Mapping` when a dependency holds a non-numeric value.
pub fn augment(
    registers: &mut BTreeMap<String, Register>,
    captured_at: DateTime<Utc>,
) -> DlmsResult<()> {
    for stage in stages() {
        let frozen = registers.clone();
        for derived in stage {
            if frozen.contains_key(&derived.name) {
                continue;
            }
            if let Some((value, unit)) = derived.evaluate(&frozen)? {
                registers.insert(
                    derived.name,
                    Register::new(RegisterValue::Number(value), unit, captured_at),
                );
            }
        }
    }
    Ok(())
}
