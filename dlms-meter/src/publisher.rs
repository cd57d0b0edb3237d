//! JSON-lines publisher
//!
//! Prints one line per published snapshot or health change, with registers
//! addressed by bus path. Registers without an assigned path appear under
//! `/Registers/<NAME>`.

use chrono::{DateTime, Utc};
use dlms_core::scaler_unit::conversion_factor;
use dlms_listener::{Health, SessionHandle, SessionState, SessionStatus};
use dlms_mapper::{Register, RegisterSnapshot, RegisterValue};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;

const PHASES: [&str; 3] = ["L1", "L2", "L3"];

/// Where a register is published and in which unit
#[derive(Debug, Clone, PartialEq)]
pub struct BusPath {
    pub path: String,
    /// Unit the bus expects; decimal multiples are converted
    pub unit: Option<&'static str>,
}

/// Register name → bus path
#[derive(Debug, Clone, Default)]
pub struct PathTable {
    paths: HashMap<String, BusPath>,
}

impl PathTable {
    /// Paths of a Victron grid meter
    pub fn victron() -> Self {
        let mut table = Self::default();
        table.insert("ACTIVE_POWER_TOTAL", "/Ac/Power", None);
        table.insert("CURRENT_TOTAL", "/Ac/Current", None);
        table.insert("ACTIVE_ENERGY_IMPORT", "/Ac/Energy/Forward", Some("kWh"));
        table.insert("ACTIVE_ENERGY_EXPORT", "/Ac/Energy/Reverse", Some("kWh"));
        table.insert("FREQUENCY", "/Ac/Frequency", None);
        table.insert("SERIAL_NUMBER", "/Serial", None);
        table.insert("POWER_FACTOR_TOTAL", "/Ac/PowerFactor", None);
        for phase in PHASES {
            let prefix = format!("/Ac/{}", phase);
            table.insert(format!("ACTIVE_POWER_TOTAL_{}", phase), format!("{}/Power", prefix), None);
            table.insert(format!("CURRENT_{}", phase), format!("{}/Current", prefix), None);
            table.insert(format!("VOLTAGE_{}", phase), format!("{}/Voltage", prefix), None);
            table.insert(
                format!("ACTIVE_ENERGY_IMPORT_{}", phase),
                format!("{}/Energy/Forward", prefix),
                Some("kWh"),
            );
            table.insert(
                format!("ACTIVE_ENERGY_EXPORT_{}", phase),
                format!("{}/Energy/Reverse", prefix),
                Some("kWh"),
            );
            table.insert(format!("POWER_FACTOR_{}", phase), format!("{}/PowerFactor", prefix), None);
        }
        table
    }

    pub fn insert(
        &mut self,
        register: impl Into<String>,
        path: impl Into<String>,
        unit: Option<&'static str>,
    ) {
        self.paths.insert(
            register.into(),
            BusPath {
                path: path.into(),
                unit,
            },
        );
    }

    pub fn path_for(&self, register: &str) -> String {
        self.paths
            .get(register)
            .map(|p| p.path.clone())
            .unwrap_or_else(|| format!("/Registers/{}", register))
    }

    fn bus_value(&self, name: &str, register: &Register) -> (String, BusValue) {
        let Some(bus) = self.paths.get(name) else {
            return (self.path_for(name), BusValue::from(register));
        };
        let converted = match (&register.value, register.unit.as_deref(), bus.unit) {
            (RegisterValue::Number(value), Some(sent), Some(wanted)) => {
                conversion_factor(sent, wanted).map(|factor| BusValue {
                    value: RegisterValue::Number(value * factor),
                    unit: Some(wanted.to_string()),
                })
            }
            _ => None,
        };
        (
            bus.path.clone(),
            converted.unwrap_or_else(|| BusValue::from(register)),
        )
    }

    /// One output line
    pub fn render(&self, status: &SessionStatus, snapshot: Option<&RegisterSnapshot>) -> BusUpdate {
        BusUpdate {
            health: status.health,
            state: status.state,
            sequence: status.snapshot_sequence,
            telegram: snapshot.map(|s| s.telegram.clone()),
            captured_at: snapshot.map(|s| s.captured_at),
            values: snapshot
                .map(|s| {
                    s.registers
                        .iter()
                        .map(|(name, register)| self.bus_value(name, register))
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusValue {
    pub value: RegisterValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl From<&Register> for BusValue {
    fn from(register: &Register) -> Self {
        Self {
            value: register.value.clone(),
            unit: register.unit.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusUpdate {
    pub health: Health,
    pub state: SessionState,
    pub sequence: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,
    pub values: BTreeMap<String, BusValue>,
}

/// Write a line whenever a new snapshot is published or health changes
///
/// Returns once the session has stopped.
pub async fn publish_lines<W: Write>(
    handle: SessionHandle,
    table: PathTable,
    mut out: W,
) -> anyhow::Result<()> {
    let mut status_rx = handle.subscribe();
    let mut last: Option<(u64, Health)> = None;

    loop {
        let status = status_rx.borrow_and_update().clone();
        let current = (status.snapshot_sequence, status.health);
        if last != Some(current) {
            last = Some(current);
            let update = table.render(&status, handle.snapshot().as_deref());
            writeln!(out, "{}", serde_json::to_string(&update)?)?;
            out.flush()?;
        }
        if status_rx.changed().await.is_err() {
            break;
        }
    }
    Ok(())
}
