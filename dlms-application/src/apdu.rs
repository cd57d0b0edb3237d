//! APDU tags and notification PDUs
//!
//! A push meter only ever sends unsolicited APDUs. After the security layer
//! has removed any ciphering envelope, the first byte of the APDU is one of:
//!
//! | Tag    | APDU                          |
//! |--------|-------------------------------|
//! | `0x0F` | data-notification             |
//! | `0xC2` | event-notification-request    |
//! | `0xE0` | general-block-transfer        |
//!
//! Ciphering tags (`0xDB`, `0xDC`, `0xCA`) are recognised so that a telegram
//! which is still ciphered after unprotection can be reported precisely.
//! Every other tag is rejected as [`DlmsError::UnsupportedApdu`].

use crate::decoder::DataDecoder;
use crate::error::{DlmsError, DlmsResult};
use dlms_asn1::AxdrEncoder;
use dlms_core::{CosemDateTime, DataObject, ObisCode};
use std::fmt;

/// data-notification
pub const DATA_NOTIFICATION: u8 = 0x0F;
/// event-notification-request
pub const EVENT_NOTIFICATION_REQUEST: u8 = 0xC2;
/// general-block-transfer
pub const GENERAL_BLOCK_TRANSFER: u8 = 0xE0;

/// Classified APDU tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApduKind {
    DataNotification,
    EventNotification,
    GeneralBlockTransfer,
    /// A ciphering envelope (general-glo, general-ded, glo-event-notification)
    Ciphered(u8),
}

impl ApduKind {
    /// Classify the first byte of an APDU
    ///
    /// # Errors
    /// `UnsupportedApdu` for any tag that a push meter does not send,
    /// `Decode` for an empty APDU.
    pub fn classify(apdu: &[u8]) -> DlmsResult<Self> {
        let tag = *apdu
            .first()
            .ok_or_else(|| DlmsError::Decode("Empty APDU".to_string()))?;
        match tag {
            DATA_NOTIFICATION => Ok(ApduKind::DataNotification),
            EVENT_NOTIFICATION_REQUEST => Ok(ApduKind::EventNotification),
            GENERAL_BLOCK_TRANSFER => Ok(ApduKind::GeneralBlockTransfer),
            t if dlms_security::is_ciphered_tag(t) => Ok(ApduKind::Ciphered(t)),
            other => Err(DlmsError::UnsupportedApdu(other)),
        }
    }

    pub fn tag(&self) -> u8 {
        match self {
            ApduKind::DataNotification => DATA_NOTIFICATION,
            ApduKind::EventNotification => EVENT_NOTIFICATION_REQUEST,
            ApduKind::GeneralBlockTransfer => GENERAL_BLOCK_TRANSFER,
            ApduKind::Ciphered(tag) => *tag,
        }
    }
}

/// Which notification produced a set of objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Data,
    Event,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Data => "data-notification",
            NotificationKind::Event => "event-notification",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Long-Invoke-Id-And-Priority
///
/// Bits 0..=23 carry the invoke id, bit 28 self-descriptive, bit 29
/// processing option, bit 30 service class and bit 31 priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LongInvokeIdAndPriority(pub u32);

impl LongInvokeIdAndPriority {
    pub fn invoke_id(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    pub fn is_self_descriptive(&self) -> bool {
        self.0 & 0x1000_0000 != 0
    }

    pub fn is_confirmed(&self) -> bool {
        self.0 & 0x4000_0000 != 0
    }

    pub fn is_high_priority(&self) -> bool {
        self.0 & 0x8000_0000 != 0
    }
}

/// data-notification APDU
#[derive(Debug, Clone, PartialEq)]
pub struct DataNotification {
    pub long_invoke_id: LongInvokeIdAndPriority,
    pub date_time: Option<CosemDateTime>,
    pub body: DataObject,
}

impl DataNotification {
    pub fn new(invoke_id: u32, date_time: Option<CosemDateTime>, body: DataObject) -> Self {
        Self {
            long_invoke_id: LongInvokeIdAndPriority(invoke_id),
            date_time,
            body,
        }
    }

    /// Decode a data-notification, tag included
    ///
    /// The header is parsed here. The notification body is handed to
    /// `data_decoder`, and any bytes left after it are rejected.
    pub fn decode(apdu: &[u8], data_decoder: &dyn DataDecoder) -> DlmsResult<Self> {
        let mut cursor = Cursor::new(apdu);
        cursor.expect_tag(DATA_NOTIFICATION)?;
        let long_invoke_id = LongInvokeIdAndPriority(u32::from_be_bytes(cursor.take_array()?));

        // untagged octet-string: length byte, 0 when the meter sends no time
        let date_time = match cursor.take_u8()? as usize {
            0 => None,
            CosemDateTime::LENGTH => Some(CosemDateTime::decode(cursor.take(CosemDateTime::LENGTH)?)?),
            other => {
                return Err(DlmsError::Decode(format!(
                    "date-time octet-string of {} bytes, expected {}",
                    other,
                    CosemDateTime::LENGTH
                )));
            }
        };

        let body = cursor.take_data(data_decoder)?;
        cursor.expect_end()?;

        Ok(Self {
            long_invoke_id,
            date_time,
            body,
        })
    }

    /// Encode with the data-notification tag
    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = AxdrEncoder::new();
        encoder.encode_u8(DATA_NOTIFICATION);
        encoder.encode_u32(self.long_invoke_id.0);
        match &self.date_time {
            Some(dt) => encoder.encode_octet_string(&dt.encode()),
            None => encoder.encode_u8(0x00),
        }
        encoder.encode_data_object(&self.body);
        encoder.into_bytes()
    }
}

/// Cosem-Attribute-Descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CosemAttributeDescriptor {
    pub class_id: u16,
    pub instance_id: ObisCode,
    pub attribute_id: i8,
}

impl CosemAttributeDescriptor {
    pub fn new(class_id: u16, instance_id: ObisCode, attribute_id: i8) -> Self {
        Self {
            class_id,
            instance_id,
            attribute_id,
        }
    }
}

/// event-notification-request APDU
#[derive(Debug, Clone, PartialEq)]
pub struct EventNotification {
    pub time: Option<CosemDateTime>,
    pub descriptor: CosemAttributeDescriptor,
    pub value: DataObject,
}

impl EventNotification {
    /// Decode an event-notification-request, tag included
    pub fn decode(apdu: &[u8], data_decoder: &dyn DataDecoder) -> DlmsResult<Self> {
        let mut cursor = Cursor::new(apdu);
        cursor.expect_tag(EVENT_NOTIFICATION_REQUEST)?;

        // time: OCTET STRING (SIZE(12)) OPTIONAL
        let time = if cursor.take_u8()? != 0x00 {
            let len = cursor.take_u8()? as usize;
            if len != CosemDateTime::LENGTH {
                return Err(DlmsError::Decode(format!(
                    "event time of {} bytes, expected {}",
                    len,
                    CosemDateTime::LENGTH
                )));
            }
            Some(CosemDateTime::decode(cursor.take(len)?)?)
        } else {
            None
        };

        let class_id = u16::from_be_bytes(cursor.take_array()?);
        let instance_id = ObisCode::from_bytes(cursor.take(6)?)?;
        let attribute_id = cursor.take_u8()? as i8;
        let value = cursor.take_data(data_decoder)?;
        cursor.expect_end()?;

        Ok(Self {
            time,
            descriptor: CosemAttributeDescriptor::new(class_id, instance_id, attribute_id),
            value,
        })
    }

    /// Encode with the event-notification-request tag
    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = AxdrEncoder::new();
        encoder.encode_u8(EVENT_NOTIFICATION_REQUEST);
        match &self.time {
            Some(dt) => {
                encoder.encode_u8(0x01);
                encoder.encode_octet_string(&dt.encode());
            }
            None => encoder.encode_u8(0x00),
        }
        encoder.encode_u16(self.descriptor.class_id);
        encoder.encode_bytes(&self.descriptor.instance_id.as_bytes()[..]);
        encoder.encode_u8(self.descriptor.attribute_id as u8);
        encoder.encode_data_object(&self.value);
        encoder.into_bytes()
    }
}

/// Byte cursor over an APDU header
///
/// Header fields are fixed-layout, so only the notification payload goes
/// through the pluggable [`DataDecoder`].
pub(crate) struct Cursor<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    pub(crate) fn expect_tag(&mut self, tag: u8) -> DlmsResult<()> {
        let found = self.take_u8()?;
        if found != tag {
            return Err(DlmsError::Decode(format!(
                "Expected APDU tag 0x{:02X}, found 0x{:02X}",
                tag, found
            )));
        }
        Ok(())
    }

    pub(crate) fn take(&mut self, len: usize) -> DlmsResult<&'a [u8]> {
        let end = self.position + len;
        if end > self.bytes.len() {
            return Err(DlmsError::Decode(format!(
                "APDU truncated: need {} bytes at offset {}, have {}",
                len,
                self.position,
                self.bytes.len() - self.position
            )));
        }
        let slice = &self.bytes[self.position..end];
        self.position = end;
        Ok(slice)
    }

    pub(crate) fn take_u8(&mut self) -> DlmsResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn take_array<const N: usize>(&mut self) -> DlmsResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// A-XDR length prefix
    pub(crate) fn take_length(&mut self) -> DlmsResult<usize> {
        let (length, consumed) = dlms_asn1::LengthEncoding::decode(self.rest())
            .map_err(|e| DlmsError::Decode(e.to_string()))?;
        self.position += consumed;
        Ok(length.value())
    }

    /// Decode one Data value through the decoding capability
    pub(crate) fn take_data(&mut self, data_decoder: &dyn DataDecoder) -> DlmsResult<DataObject> {
        let (value, consumed) = data_decoder.decode_data(self.rest())?;
        if consumed > self.bytes.len() - self.position {
            return Err(DlmsError::Decode(format!(
                "Decoder consumed {} bytes, only {} available",
                consumed,
                self.bytes.len() - self.position
            )));
        }
        self.position += consumed;
        Ok(value)
    }

    pub(crate) fn rest(&self) -> &'a [u8] {
        &self.bytes[self.position..]
    }

    pub(crate) fn expect_end(&self) -> DlmsResult<()> {
        let trailing = self.bytes.len() - self.position;
        if trailing != 0 {
            return Err(DlmsError::Decode(format!(
                "{} trailing bytes after notification body",
                trailing
            )));
        }
        Ok(())
    }
}
