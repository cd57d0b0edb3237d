//! Register mapping
//!
//! [`RegisterMapper`] turns the objects of one decoded notification into a
//! [`RegisterSnapshot`]:
//!
//! 1. each object is looked up in the definition table; unknown objects
//!    are counted and skipped;
//! 2. matched values are normalised (scaler, multiplier, unit);
//! 3. transformations run in document order;
//! 4. derived registers are added.
//!
//! Any error aborts the whole telegram; no partial snapshot is returned.

use crate::derived;
use crate::definition::{RegisterEntry, TelegramDefinition};
use crate::error::{DlmsError, DlmsResult};
use crate::snapshot::{Register, RegisterSnapshot, RegisterValue};
use chrono::{DateTime, FixedOffset, Utc};
use dlms_application::PushNotification;
use dlms_core::scaler_unit::{conversion_factor, scale};
use dlms_core::{CosemDateTime, CosemObject, DataObject};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Maps decoded notifications through one telegram definition
#[derive(Debug, Clone)]
pub struct RegisterMapper {
    definition: Arc<TelegramDefinition>,
}

impl RegisterMapper {
    pub fn new(definition: Arc<TelegramDefinition>) -> Self {
        Self { definition }
    }

    pub fn definition(&self) -> &TelegramDefinition {
        &self.definition
    }

    /// Map `notification`, stamping registers with the current time
    pub fn map(&self, notification: &PushNotification) -> DlmsResult<RegisterSnapshot> {
        self.map_at(notification, Utc::now())
    }

    pub fn map_at(
        &self,
        notification: &PushNotification,
        captured_at: DateTime<Utc>,
    ) -> DlmsResult<RegisterSnapshot> {
        let mut registers = BTreeMap::new();
        let mut unmatched = 0;
        let mut skipped = 0;

        for object in &notification.objects {
            let Some(entry) = self.entry_for(object, notification.layout.is_none()) else {
                unmatched += 1;
                continue;
            };
            match convert(object, entry)? {
                Some((value, unit)) => {
                    registers.insert(entry.name.clone(), Register::new(value, unit, captured_at));
                }
                None => skipped += 1,
            }
        }

        for rule in self.definition.transformations() {
            rule.apply(&mut registers, captured_at)?;
        }
        derived::augment(&mut registers, captured_at)?;

        if unmatched > 0 {
            log::debug!(
                "{} of {} decoded objects have no register definition in '{}'",
                unmatched,
                notification.objects.len(),
                self.definition.id()
            );
        }

        Ok(RegisterSnapshot {
            telegram: notification
                .layout
                .clone()
                .unwrap_or_else(|| self.definition.id().to_string()),
            captured_at,
            meter_time: notification.meter_time.as_ref().and_then(CosemDateTime::to_naive),
            invoke_id: notification.invoke_id,
            registers,
            unmatched,
            skipped,
        })
    }

    fn entry_for(&self, object: &CosemObject, self_describing: bool) -> Option<&RegisterEntry> {
        self.definition.lookup(&object.key()).or_else(|| {
            if self_describing {
                self.definition
                    .lookup_by_obis(object.logical_name, object.attribute_index)
            } else {
                None
            }
        })
    }
}

/// Normalised value and unit; `None` when the value has no register form
fn convert(
    object: &CosemObject,
    entry: &RegisterEntry,
) -> DlmsResult<Option<(RegisterValue, Option<String>)>> {
    let value = &object.value;

    if let Some(raw) = value.as_f64() {
        let scaler = entry
            .scaler
            .or(object.scaler_unit.map(|su| su.scaler))
            .unwrap_or(0);
        let mut number = scale(raw, scaler) * entry.multiplier.unwrap_or(1.0);

        let meter_unit = object
            .scaler_unit
            .map(|su| su.unit.symbol())
            .filter(|symbol| !symbol.is_empty());
        let unit = match (&entry.unit, meter_unit) {
            (Some(wanted), Some(sent)) => {
                if let Some(factor) = conversion_factor(sent, wanted) {
                    number *= factor;
                }
                Some(wanted.clone())
            }
            (Some(wanted), None) => Some(wanted.clone()),
            (None, Some(sent)) => Some(sent.to_string()),
            (None, None) => None,
        };

        if !number.is_finite() {
            return Err(DlmsError::Mapping(format!(
                "{} evaluates to a non-finite number",
                entry.name
            )));
        }
        return Ok(Some((RegisterValue::Number(number), unit)));
    }

    let converted = match value {
        DataObject::Boolean(b) => Some(RegisterValue::Bool(*b)),
        DataObject::OctetString(bytes)
        | DataObject::VisibleString(bytes)
        | DataObject::Utf8String(bytes) => Some(RegisterValue::Text(text_of(bytes))),
        DataObject::DateTime(dt) => date_time_text(dt).map(RegisterValue::Text),
        _ => None,
    };
    Ok(converted.map(|v| (v, entry.unit.clone())))
}

/// Printable text as-is, anything else as upper-case hex
fn text_of(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) if !text.is_empty() && text.chars().all(|c| !c.is_control()) => text.to_string(),
        _ => hex::encode_upper(bytes),
    }
}

/// RFC 3339 when the deviation is known, ISO 8601 local time otherwise
fn date_time_text(dt: &CosemDateTime) -> Option<String> {
    let naive = dt.to_naive()?;
    match dt.deviation().and_then(|minutes| FixedOffset::west_opt(i32::from(minutes) * 60)) {
        Some(offset) => naive
            .and_local_timezone(offset)
            .single()
            .map(|t| t.to_rfc3339()),
        None => Some(naive.format("%Y-%m-%dT%H:%M:%S").to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::TelegramDocument;
    use dlms_application::NotificationKind;
    use dlms_core::{ObisCode, ScalerUnit, Unit};

    const DOC: &str = r#"
version: "1.0"
info: { id: test-meter, name: Test, distributer: Grid, country: AT }
registers:
  - { class_id: 3, obis: "1.0.1.8.0.255", name: ACTIVE_ENERGY_IMPORT, unit: kWh }
  - { class_id: 3, obis: "1.0.1.7.0.255", name: ACTIVE_POWER_IMPORT }
  - { class_id: 3, obis: "1.0.2.7.0.255", name: ACTIVE_POWER_EXPORT }
  - { class_id: 3, obis: "1.0.32.7.0.255", name: VOLTAGE_L1, scaler: -1, unit: V }
  - { class_id: 1, obis: "0.0.96.1.0.255", name: SERIAL }
  - { class_id: 1, obis: "0.0.1.0.0.255", name: CLOCK }
  - { class_id: 1, obis: "0.0.96.3.10.255", name: DISCONNECTOR }
  - { class_id: 1, obis: "0.0.96.99.0.255", name: PROFILE }
transformations:
  - { type: MULTIPLY, key: ACTIVE_POWER_EXPORT, value: 1 }
"#;

    fn mapper() -> RegisterMapper {
        let definition = TelegramDefinition::try_from(TelegramDocument::from_yaml(DOC).unwrap()).unwrap();
        RegisterMapper::new(Arc::new(definition))
    }

    fn object(class_id: u16, obis: ObisCode, value: DataObject, su: Option<ScalerUnit>) -> CosemObject {
        CosemObject {
            class_id,
            logical_name: obis,
            attribute_index: 2,
            value,
            scaler_unit: su,
            path: vec![0],
        }
    }

    fn notification(objects: Vec<CosemObject>) -> PushNotification {
        PushNotification {
            kind: NotificationKind::Data,
            invoke_id: Some(1),
            meter_time: Some(CosemDateTime::new(2024, 6, 1, 12, 0, 0)),
            layout: None,
            objects,
            untagged: 0,
        }
    }

    #[test]
    fn test_scaled_value_with_unit_conversion() {
        let n = notification(vec![object(
            3,
            ObisCode::new(1, 0, 1, 8, 0, 255),
            DataObject::Unsigned32(123456),
            Some(ScalerUnit::new(-2, Unit::WattHour)),
        )]);
        let snapshot = mapper().map(&n).unwrap();
        let register = snapshot.get("ACTIVE_ENERGY_IMPORT").unwrap();
        let value = register.value.as_f64().unwrap();
        assert!((value - 1.23456).abs() < 1e-9, "{value}");
        assert_eq!(register.unit.as_deref(), Some("kWh"));
        assert_eq!(snapshot.telegram, "test-meter");
        assert_eq!(snapshot.invoke_id, Some(1));
        assert_eq!(
            snapshot.meter_time.unwrap().to_string(),
            "2024-06-01 12:00:00"
        );
    }

    #[test]
    fn test_meter_unit_used_without_override() {
        let n = notification(vec![object(
            3,
            ObisCode::new(1, 0, 1, 7, 0, 255),
            DataObject::Unsigned32(1500),
            Some(ScalerUnit::new(0, Unit::Watt)),
        )]);
        let snapshot = mapper().map(&n).unwrap();
        let register = snapshot.get("ACTIVE_POWER_IMPORT").unwrap();
        assert_eq!(register.value, RegisterValue::Number(1500.0));
        assert_eq!(register.unit.as_deref(), Some("W"));
    }

    #[test]
    fn test_scaler_override() {
        let n = notification(vec![object(
            3,
            ObisCode::new(1, 0, 32, 7, 0, 255),
            DataObject::Unsigned16(2301),
            None,
        )]);
        let snapshot = mapper().map(&n).unwrap();
        assert_eq!(snapshot.number("VOLTAGE_L1"), Some(230.1));
    }

    #[test]
    fn test_unmatched_and_skipped_counts() {
        let n = notification(vec![
            object(3, ObisCode::new(1, 0, 99, 7, 0, 255), DataObject::Unsigned16(1), None),
            object(1, ObisCode::new(0, 0, 96, 99, 0, 255), DataObject::Array(vec![]), None),
            object(1, ObisCode::new(0, 0, 96, 1, 0, 255), DataObject::OctetString(b"SN1234".to_vec()), None),
        ]);
        let snapshot = mapper().map(&n).unwrap();
        assert_eq!(snapshot.unmatched, 1);
        assert_eq!(snapshot.skipped, 1);
        assert_eq!(snapshot.value("SERIAL"), Some(&RegisterValue::Text("SN1234".to_string())));
    }

    #[test]
    fn test_self_describing_class_fallback() {
        // decoder guessed class 1 because no scaler-unit followed
        let n = notification(vec![object(
            1,
            ObisCode::new(1, 0, 1, 7, 0, 255),
            DataObject::Unsigned32(42),
            None,
        )]);
        assert_eq!(mapper().map(&n).unwrap().number("ACTIVE_POWER_IMPORT"), Some(42.0));

        let mut with_layout = n.clone();
        with_layout.layout = Some("positional".to_string());
        let snapshot = mapper().map(&with_layout).unwrap();
        assert_eq!(snapshot.unmatched, 1);
        assert_eq!(snapshot.telegram, "positional");
    }

    #[test]
    fn test_text_bool_and_date_time() {
        let mut clock = CosemDateTime::new(2024, 1, 31, 23, 0, 0);
        clock = CosemDateTime::decode(&{
            let mut bytes = clock.encode();
            // deviation -60 minutes (UTC+1)
            bytes[9] = 0xFF;
            bytes[10] = 0xC4;
            bytes
        })
        .unwrap();
        let n = notification(vec![
            object(1, ObisCode::new(0, 0, 96, 1, 0, 255), DataObject::OctetString(vec![0x01, 0xFF]), None),
            object(1, ObisCode::new(0, 0, 96, 3, 10, 255), DataObject::Boolean(true), None),
            object(1, ObisCode::new(0, 0, 1, 0, 0, 255), DataObject::DateTime(clock), None),
        ]);
        let snapshot = mapper().map(&n).unwrap();
        assert_eq!(snapshot.value("SERIAL"), Some(&RegisterValue::Text("01FF".to_string())));
        assert_eq!(snapshot.value("DISCONNECTOR"), Some(&RegisterValue::Bool(true)));
        assert_eq!(
            snapshot.value("CLOCK"),
            Some(&RegisterValue::Text("2024-01-31T23:00:00+01:00".to_string()))
        );
    }

    #[test]
    fn test_derived_registers_in_snapshot() {
        let n = notification(vec![
            object(3, ObisCode::new(1, 0, 1, 7, 0, 255), DataObject::Unsigned32(800), Some(ScalerUnit::new(0, Unit::Watt))),
            object(3, ObisCode::new(1, 0, 2, 7, 0, 255), DataObject::Unsigned32(300), Some(ScalerUnit::new(0, Unit::Watt))),
        ]);
        let snapshot = mapper().map(&n).unwrap();
        assert_eq!(snapshot.number("ACTIVE_POWER_TOTAL"), Some(500.0));
    }

    #[test]
    fn test_mapping_error_discards_telegram() {
        let n = notification(vec![
            object(3, ObisCode::new(1, 0, 1, 7, 0, 255), DataObject::Unsigned32(800), None),
            object(3, ObisCode::new(1, 0, 2, 7, 0, 255), DataObject::VisibleString(b"x".to_vec()), None),
        ]);
        assert!(matches!(mapper().map(&n), Err(DlmsError::Mapping(_))));
    }
}
