//! Notification decoding and flattening
//!
//! [`NotificationDecoder`] turns one plaintext APDU into a flat list of
//! [`CosemObject`]s. It parses the notification header itself and hands the
//! A-XDR payload to a [`DataDecoder`]. Every failure, whatever its source,
//! leaves this module as either `UnsupportedApdu` or `Decode`, so the
//! session can drop the telegram and keep listening.
//!
//! Two flattening strategies exist:
//!
//! - **layout-driven**: the definition declares push layouts and element *i*
//!   of the body is identified by capture object *i*;
//! - **self-describing**: the body interleaves OBIS codes with values
//!   (`obis, value [, {scaler, unit}]`), possibly nested in structures.

use crate::apdu::{ApduKind, DataNotification, EventNotification, NotificationKind};
use crate::error::{DlmsError, DlmsResult};
use crate::layout::{PushLayout, select_layout};
use dlms_asn1::AxdrDecoder;
use dlms_core::{CosemDateTime, CosemObject, DataObject, ObisCode, ScalerUnit};
use std::sync::Arc;

/// Class id of a Data object (value without scaler-unit)
const CLASS_DATA: u16 = 1;
/// Class id of a Register object
const CLASS_REGISTER: u16 = 3;
/// Class id of an Extended Register object
const CLASS_EXTENDED_REGISTER: u16 = 4;

const ATTRIBUTE_VALUE: i8 = 2;
const ATTRIBUTE_SCALER_UNIT: i8 = 3;

/// Decoding capability for a single A-XDR `Data` value
#[cfg_attr(test, mockall::automock)]
pub trait DataDecoder: Send + Sync {
    /// Decode the value at the start of `bytes`, returning it together with
    /// the number of bytes it occupied
    fn decode_data(&self, bytes: &[u8]) -> DlmsResult<(DataObject, usize)>;
}

/// [`DataDecoder`] backed by [`AxdrDecoder`]
#[derive(Debug, Clone, Copy, Default)]
pub struct AxdrDataDecoder;

impl DataDecoder for AxdrDataDecoder {
    fn decode_data(&self, bytes: &[u8]) -> DlmsResult<(DataObject, usize)> {
        let mut decoder = AxdrDecoder::new(bytes);
        let value = decoder.decode_data_object()?;
        Ok((value, decoder.position()))
    }
}

/// A decoded push telegram
#[derive(Debug, Clone, PartialEq)]
pub struct PushNotification {
    pub kind: NotificationKind,
    pub invoke_id: Option<u32>,
    /// Meter clock at capture time, when the meter sent one
    pub meter_time: Option<CosemDateTime>,
    /// Name of the push layout used, `None` for self-describing bodies
    pub layout: Option<String>,
    pub objects: Vec<CosemObject>,
    /// Leaf values that could not be tied to an OBIS code
    pub untagged: usize,
}

/// Decoder from plaintext APDU to [`PushNotification`]
#[derive(Clone)]
pub struct NotificationDecoder {
    data_decoder: Arc<dyn DataDecoder>,
    layouts: Vec<PushLayout>,
}

impl std::fmt::Debug for NotificationDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDecoder")
            .field("layouts", &self.layouts.len())
            .finish()
    }
}

impl Default for NotificationDecoder {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl NotificationDecoder {
    /// A-XDR decoder using `layouts`; an empty list selects self-describing
    /// flattening
    pub fn new(layouts: Vec<PushLayout>) -> Self {
        Self::with_data_decoder(Arc::new(AxdrDataDecoder), layouts)
    }

    pub fn with_data_decoder(data_decoder: Arc<dyn DataDecoder>, layouts: Vec<PushLayout>) -> Self {
        Self {
            data_decoder,
            layouts,
        }
    }

    pub fn layouts(&self) -> &[PushLayout] {
        &self.layouts
    }

    /// Decode one plaintext APDU
    ///
    /// # Errors
    /// `UnsupportedApdu` for tags other than data- and event-notification,
    /// `Decode` for everything else that goes wrong.
    pub fn decode(&self, apdu: &[u8]) -> DlmsResult<PushNotification> {
        self.decode_apdu(apdu).map_err(|err| match err {
            DlmsError::UnsupportedApdu(_) | DlmsError::Decode(_) => err,
            other => DlmsError::Decode(other.to_string()),
        })
    }

    fn decode_apdu(&self, apdu: &[u8]) -> DlmsResult<PushNotification> {
        match ApduKind::classify(apdu)? {
            ApduKind::DataNotification => {
                let notification = DataNotification::decode(apdu, self.data_decoder.as_ref())?;
                self.flatten_data_notification(notification)
            }
            ApduKind::EventNotification => {
                let event = EventNotification::decode(apdu, self.data_decoder.as_ref())?;
                Ok(flatten_event(event))
            }
            ApduKind::GeneralBlockTransfer => Err(DlmsError::Decode(
                "general-block-transfer must be reassembled before decoding".to_string(),
            )),
            ApduKind::Ciphered(tag) => Err(DlmsError::Decode(format!(
                "APDU is still ciphered (tag 0x{:02X})",
                tag
            ))),
        }
    }

    fn flatten_data_notification(
        &self,
        notification: DataNotification,
    ) -> DlmsResult<PushNotification> {
        let invoke_id = Some(notification.long_invoke_id.invoke_id());
        let meter_time = notification.date_time;
        let elements = match notification.body {
            DataObject::Structure(items) | DataObject::Array(items) => items,
            single => vec![single],
        };

        if self.layouts.is_empty() {
            let mut walker = SelfDescribingWalker::default();
            walker.walk(&elements, &mut Vec::new());
            return Ok(PushNotification {
                kind: NotificationKind::Data,
                invoke_id,
                meter_time,
                layout: None,
                objects: walker.objects,
                untagged: walker.untagged,
            });
        }

        let layout = select_layout(&self.layouts, &elements)?;
        let objects = flatten_with_layout(layout, elements)?;
        Ok(PushNotification {
            kind: NotificationKind::Data,
            invoke_id,
            meter_time,
            layout: Some(layout.name.clone()),
            objects,
            untagged: 0,
        })
    }
}

fn flatten_event(event: EventNotification) -> PushNotification {
    let object = CosemObject {
        class_id: event.descriptor.class_id,
        logical_name: event.descriptor.instance_id,
        attribute_index: event.descriptor.attribute_id,
        value: event.value,
        scaler_unit: None,
        path: Vec::new(),
    };
    PushNotification {
        kind: NotificationKind::Event,
        invoke_id: None,
        meter_time: event.time,
        layout: None,
        objects: vec![object],
        untagged: 0,
    }
}

fn flatten_with_layout(layout: &PushLayout, elements: Vec<DataObject>) -> DlmsResult<Vec<CosemObject>> {
    let mut objects = Vec::with_capacity(elements.len());
    for (position, value) in elements.into_iter().enumerate() {
        let capture = layout.capture_object(position).ok_or_else(|| {
            DlmsError::Decode(format!(
                "Layout '{}' has no capture object at position {}",
                layout.name, position
            ))
        })?;
        if !capture.accepts(&value) {
            return Err(DlmsError::Decode(format!(
                "Layout '{}' position {} ({}) expects {:?}, received {:?}",
                layout.name,
                position,
                capture.obis,
                capture.data_type,
                value.get_type()
            )));
        }
        objects.push(CosemObject {
            class_id: capture.class_id,
            logical_name: capture.obis,
            attribute_index: capture.attribute,
            value,
            scaler_unit: None,
            path: vec![position],
        });
    }
    attach_scaler_units(&mut objects);
    Ok(objects)
}

/// Copy each captured scaler-unit attribute onto the value attribute of the
/// same register
fn attach_scaler_units(objects: &mut [CosemObject]) {
    let scalers: Vec<(ObisCode, ScalerUnit)> = objects
        .iter()
        .filter(|o| {
            matches!(o.class_id, CLASS_REGISTER | CLASS_EXTENDED_REGISTER)
                && o.attribute_index == ATTRIBUTE_SCALER_UNIT
        })
        .filter_map(|o| {
            ScalerUnit::from_data_object(&o.value)
                .ok()
                .map(|su| (o.logical_name, su))
        })
        .collect();

    for (obis, scaler_unit) in scalers {
        for object in objects.iter_mut().filter(|o| {
            o.logical_name == obis && o.attribute_index == ATTRIBUTE_VALUE
        }) {
            object.scaler_unit = Some(scaler_unit);
        }
    }
}

/// Depth-first walk over a self-describing body
#[derive(Default)]
struct SelfDescribingWalker {
    objects: Vec<CosemObject>,
    untagged: usize,
}

impl SelfDescribingWalker {
    fn walk(&mut self, items: &[DataObject], path: &mut Vec<usize>) {
        let mut i = 0;
        while i < items.len() {
            let tagged = obis_of(&items[i]).and_then(|obis| {
                items
                    .get(i + 1)
                    .filter(|value| !value.is_complex())
                    .map(|value| (obis, value))
            });

            if let Some((obis, value)) = tagged {
                let scaler_unit = items
                    .get(i + 2)
                    .and_then(|candidate| ScalerUnit::from_data_object(candidate).ok());
                path.push(i + 1);
                self.objects.push(CosemObject {
                    class_id: if scaler_unit.is_some() {
                        CLASS_REGISTER
                    } else {
                        CLASS_DATA
                    },
                    logical_name: obis,
                    attribute_index: ATTRIBUTE_VALUE,
                    value: value.clone(),
                    scaler_unit,
                    path: path.clone(),
                });
                path.pop();
                i += if scaler_unit.is_some() { 3 } else { 2 };
                continue;
            }

            match &items[i] {
                DataObject::Structure(children) | DataObject::Array(children) => {
                    path.push(i);
                    self.walk(children, path);
                    path.pop();
                }
                _ => self.untagged += 1,
            }
            i += 1;
        }
    }
}

fn obis_of(value: &DataObject) -> Option<ObisCode> {
    match value {
        DataObject::OctetString(bytes) if bytes.len() == 6 => ObisCode::from_bytes(bytes).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apdu::{CosemAttributeDescriptor, EVENT_NOTIFICATION_REQUEST};
    use crate::layout::CaptureObject;
    use dlms_core::{DataObjectType, Unit};

    fn obis(a: u8, b: u8, c: u8, d: u8, e: u8, f: u8) -> DataObject {
        DataObject::OctetString(vec![a, b, c, d, e, f])
    }

    fn su(scaler: i8, unit: u8) -> DataObject {
        DataObject::Structure(vec![DataObject::Integer8(scaler), DataObject::Enumerate(unit)])
    }

    #[test]
    fn test_self_describing_flat_body() {
        let body = DataObject::Structure(vec![
            DataObject::OctetString(b"KFM_0001".to_vec()),
            obis(1, 0, 1, 8, 0, 255),
            DataObject::Unsigned32(123456),
            su(-2, 30),
            obis(0, 0, 96, 1, 0, 255),
            DataObject::VisibleString(b"12345678".to_vec()),
        ]);
        let apdu = DataNotification::new(9, None, body).encode();
        let decoded = NotificationDecoder::default().decode(&apdu).unwrap();

        assert_eq!(decoded.invoke_id, Some(9));
        assert_eq!(decoded.layout, None);
        assert_eq!(decoded.untagged, 1);
        assert_eq!(decoded.objects.len(), 2);

        let energy = &decoded.objects[0];
        assert_eq!(energy.class_id, 3);
        assert_eq!(energy.logical_name, ObisCode::new(1, 0, 1, 8, 0, 255));
        assert_eq!(energy.scaler_unit, Some(ScalerUnit::new(-2, Unit::WattHour)));
        assert_eq!(energy.path, vec![2]);

        let serial = &decoded.objects[1];
        assert_eq!(serial.class_id, 1);
        assert_eq!(serial.attribute_index, 2);
        assert_eq!(serial.path, vec![5]);
    }

    #[test]
    fn test_self_describing_nested_registers() {
        let body = DataObject::Structure(vec![
            DataObject::Structure(vec![obis(1, 0, 32, 7, 0, 255), DataObject::Unsigned16(2301), su(-1, 35)]),
            DataObject::Structure(vec![obis(1, 0, 31, 7, 0, 255), DataObject::Unsigned16(52), su(-2, 33)]),
        ]);
        let apdu = DataNotification::new(1, None, body).encode();
        let decoded = NotificationDecoder::default().decode(&apdu).unwrap();

        assert_eq!(decoded.objects.len(), 2);
        assert_eq!(decoded.objects[0].path, vec![0, 1]);
        assert_eq!(decoded.objects[1].path, vec![1, 1]);
        assert_eq!(decoded.objects[1].scaler_unit.unwrap().unit, Unit::Ampere);
        assert_eq!(decoded.untagged, 0);
    }

    #[test]
    fn test_layout_driven() {
        let layout = PushLayout::new(
            "basic",
            vec![
                CaptureObject::new(0, 1, ObisCode::new(0, 0, 96, 1, 0, 255), 2)
                    .with_type(DataObjectType::OctetString),
                CaptureObject::new(1, 3, ObisCode::new(1, 0, 1, 8, 0, 255), 2)
                    .with_type(DataObjectType::Unsigned32),
                CaptureObject::new(2, 3, ObisCode::new(1, 0, 1, 8, 0, 255), 3),
            ],
        );
        let body = DataObject::Structure(vec![
            DataObject::OctetString(b"123".to_vec()),
            DataObject::Unsigned32(123456),
            su(-2, 30),
        ]);
        let meter_time = CosemDateTime::new(2024, 5, 1, 10, 0, 0);
        let apdu = DataNotification::new(3, Some(meter_time), body).encode();
        let decoded = NotificationDecoder::new(vec![layout]).decode(&apdu).unwrap();

        assert_eq!(decoded.layout.as_deref(), Some("basic"));
        assert_eq!(decoded.meter_time, Some(meter_time));
        assert_eq!(decoded.objects.len(), 3);
        assert_eq!(
            decoded.objects[1].scaler_unit,
            Some(ScalerUnit::new(-2, Unit::WattHour))
        );
        assert_eq!(decoded.objects[0].scaler_unit, None);
    }

    #[test]
    fn test_layout_type_mismatch() {
        let layout = PushLayout::new(
            "basic",
            vec![CaptureObject::new(0, 3, ObisCode::new(1, 0, 1, 8, 0, 255), 2)
                .with_type(DataObjectType::Unsigned32)],
        );
        let apdu = DataNotification::new(
            1,
            None,
            DataObject::Structure(vec![DataObject::Integer16(5)]),
        )
        .encode();
        assert!(matches!(
            NotificationDecoder::new(vec![layout]).decode(&apdu),
            Err(DlmsError::Decode(_))
        ));
    }

    #[test]
    fn test_event_notification() {
        let event = EventNotification {
            time: None,
            descriptor: CosemAttributeDescriptor::new(1, ObisCode::new(0, 0, 96, 11, 0, 255), 2),
            value: DataObject::Unsigned16(17),
        };
        let apdu = event.encode();
        assert_eq!(apdu[0], EVENT_NOTIFICATION_REQUEST);
        let decoded = NotificationDecoder::default().decode(&apdu).unwrap();
        assert_eq!(decoded.kind, NotificationKind::Event);
        assert_eq!(decoded.objects.len(), 1);
        assert_eq!(decoded.objects[0].value, DataObject::Unsigned16(17));
    }

    #[test]
    fn test_unsupported_apdu() {
        let err = NotificationDecoder::default()
            .decode(&[0xC4, 0x01, 0x81, 0x00])
            .unwrap_err();
        assert!(matches!(err, DlmsError::UnsupportedApdu(0xC4)));
    }

    #[test]
    fn test_self_describing_telegram_with_meter_time() {
        let apdu = [
            0x0F, 0x00, 0x00, 0x00, 0x01, 0x0C, 0x07, 0xE8, 0x06, 0x01, 0x06, 0x0C, 0x00, 0x00,
            0xFF, 0x80, 0x00, 0x00, 0x02, 0x02, 0x09, 0x06, 0x01, 0x00, 0x01, 0x08, 0x00, 0xFF,
            0x06, 0x00, 0x01, 0xE2, 0x40,
        ];
        let decoded = NotificationDecoder::default().decode(&apdu).unwrap();
        assert!(decoded.meter_time.is_some());
        assert_eq!(decoded.objects.len(), 1);
        assert_eq!(decoded.objects[0].logical_name, ObisCode::new(1, 0, 1, 8, 0, 255));
        assert_eq!(decoded.objects[0].value, DataObject::Unsigned32(123_456));
    }

    #[test]
    fn test_still_ciphered() {
        let err = NotificationDecoder::default()
            .decode(&[0xDB, 0x08, 1, 2, 3, 4, 5, 6, 7, 8])
            .unwrap_err();
        assert!(matches!(err, DlmsError::Decode(_)));
    }

    #[test]
    fn test_capability_error_becomes_decode_error() {
        let mut mock = MockDataDecoder::new();
        mock.expect_decode_data()
            .times(1)
            .returning(|_| Err(DlmsError::Asn1Decoding("bad tag 0x77".to_string())));
        let decoder = NotificationDecoder::with_data_decoder(Arc::new(mock), Vec::new());

        let err = decoder.decode(&[0x0F, 0, 0, 0, 1, 0x00, 0x77]).unwrap_err();
        match err {
            DlmsError::Decode(msg) => assert!(msg.contains("bad tag 0x77")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_capability_receives_body_bytes() {
        let mut mock = MockDataDecoder::new();
        mock.expect_decode_data()
            .withf(|bytes: &[u8]| bytes == &[0x12, 0x00, 0x05][..])
            .times(1)
            .returning(|bytes| Ok((DataObject::Unsigned16(5), bytes.len())));
        let decoder = NotificationDecoder::with_data_decoder(Arc::new(mock), Vec::new());

        let decoded = decoder
            .decode(&[0x0F, 0, 0, 0, 1, 0x00, 0x12, 0x00, 0x05])
            .unwrap();
        assert_eq!(decoded.untagged, 1);
        assert!(decoded.objects.is_empty());
    }

    #[test]
    fn test_capability_overrun_rejected() {
        let mut mock = MockDataDecoder::new();
        mock.expect_decode_data()
            .returning(|bytes| Ok((DataObject::Null, bytes.len() + 4)));
        let decoder = NotificationDecoder::with_data_decoder(Arc::new(mock), Vec::new());
        assert!(matches!(
            decoder.decode(&[0x0F, 0, 0, 0, 1, 0x00, 0x00]),
            Err(DlmsError::Decode(_))
        ));
    }
}
