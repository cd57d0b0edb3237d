//! A-XDR decoder for DLMS/COSEM

use crate::axdr::types::{AxdrTag, LengthEncoding};
use crate::error::{DlmsError, DlmsResult};
use dlms_core::datatypes::{CosemDateTime, DataObject};

/// Deepest array/structure nesting accepted before a value is rejected
pub const MAX_NESTING_DEPTH: usize = 16;

/// A-XDR decoder for decoding DLMS/COSEM data types
pub struct AxdrDecoder<'a> {
    buffer: &'a [u8],
    position: usize,
    depth: usize,
}

impl<'a> AxdrDecoder<'a> {
    /// Create a new decoder
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
            depth: 0,
        }
    }

    /// Decode a DataObject
    pub fn decode_data_object(&mut self) -> DlmsResult<DataObject> {
        let tag = self.decode_tag()?;

        let obj = match tag {
            AxdrTag::Null | AxdrTag::DontCare => DataObject::Null,
            AxdrTag::Boolean => DataObject::Boolean(self.decode_bool()?),
            AxdrTag::Integer8 => DataObject::Integer8(self.decode_i8()?),
            AxdrTag::Integer16 => DataObject::Integer16(i16::from_be_bytes(self.read_array()?)),
            AxdrTag::Integer32 => DataObject::Integer32(i32::from_be_bytes(self.read_array()?)),
            AxdrTag::Integer64 => DataObject::Integer64(i64::from_be_bytes(self.read_array()?)),
            AxdrTag::Unsigned8 => DataObject::Unsigned8(self.decode_u8()?),
            AxdrTag::Unsigned16 => DataObject::Unsigned16(self.decode_u16()?),
            AxdrTag::Unsigned32 => DataObject::Unsigned32(self.decode_u32()?),
            AxdrTag::Unsigned64 => DataObject::Unsigned64(u64::from_be_bytes(self.read_array()?)),
            AxdrTag::Float32 => DataObject::Float32(f32::from_be_bytes(self.read_array()?)),
            AxdrTag::Float64 => DataObject::Float64(f64::from_be_bytes(self.read_array()?)),
            AxdrTag::Enumerate => DataObject::Enumerate(self.decode_u8()?),
            AxdrTag::Bcd => DataObject::Bcd(self.decode_u8()?),
            AxdrTag::OctetString => DataObject::OctetString(self.decode_octet_string()?),
            AxdrTag::VisibleString => DataObject::VisibleString(self.decode_octet_string()?),
            AxdrTag::Utf8String => DataObject::Utf8String(self.decode_octet_string()?),
            AxdrTag::BitString => {
                let bits = self.decode_length()?;
                let bytes = self.decode_fixed_bytes(bits.div_ceil(8))?.to_vec();
                DataObject::BitString { bytes, bits }
            }
            AxdrTag::Array => DataObject::Array(self.decode_sequence()?),
            AxdrTag::Structure => DataObject::Structure(self.decode_sequence()?),
            AxdrTag::CompactArray => {
                return Err(DlmsError::Asn1Decoding(
                    "compact-array is not used in push notifications".to_string(),
                ));
            }
            AxdrTag::Date => DataObject::Date(self.read_array()?),
            AxdrTag::Time => DataObject::Time(self.read_array()?),
            AxdrTag::DateTime => {
                let bytes = self.decode_fixed_bytes(CosemDateTime::LENGTH)?;
                DataObject::DateTime(CosemDateTime::decode(bytes)?)
            }
        };
        Ok(obj)
    }

    /// Decode a tag
    pub fn decode_tag(&mut self) -> DlmsResult<AxdrTag> {
        AxdrTag::try_from(self.read_byte()?)
    }

    /// Decode a boolean
    pub fn decode_bool(&mut self) -> DlmsResult<bool> {
        Ok(self.read_byte()? != 0x00)
    }

    /// Decode an i8
    pub fn decode_i8(&mut self) -> DlmsResult<i8> {
        Ok(self.read_byte()? as i8)
    }

    /// Decode a u8
    pub fn decode_u8(&mut self) -> DlmsResult<u8> {
        self.read_byte()
    }

    /// Decode a u16 (big-endian)
    pub fn decode_u16(&mut self) -> DlmsResult<u16> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    /// Decode a u32 (big-endian)
    pub fn decode_u32(&mut self) -> DlmsResult<u32> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    /// Decode a length prefix
    pub fn decode_length(&mut self) -> DlmsResult<usize> {
        let (len_enc, consumed) = LengthEncoding::decode(&self.buffer[self.position..])?;
        self.position += consumed;
        Ok(len_enc.value())
    }

    /// Decode a length-prefixed octet string
    pub fn decode_octet_string(&mut self) -> DlmsResult<Vec<u8>> {
        let len = self.decode_length()?;
        Ok(self.decode_fixed_bytes(len)?.to_vec())
    }

    fn decode_sequence(&mut self) -> DlmsResult<Vec<DataObject>> {
        let len = self.decode_length()?;
        // every element needs at least its tag byte
        if len > self.remaining() {
            return Err(DlmsError::Asn1Decoding(format!(
                "Sequence of {} elements exceeds {} remaining bytes",
                len,
                self.remaining()
            )));
        }
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(DlmsError::Asn1Decoding(format!(
                "Nesting deeper than {} levels",
                MAX_NESTING_DEPTH
            )));
        }

        self.depth += 1;
        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            items.push(self.decode_data_object()?);
        }
        self.depth -= 1;
        Ok(items)
    }

    /// Decode fixed-length bytes
    pub fn decode_fixed_bytes(&mut self, len: usize) -> DlmsResult<&'a [u8]> {
        if len > self.remaining() {
            return Err(DlmsError::Asn1Decoding(format!(
                "Not enough bytes: need {}, have {}",
                len,
                self.remaining()
            )));
        }

        let buffer = self.buffer;
        let result = &buffer[self.position..self.position + len];
        self.position += len;
        Ok(result)
    }

    fn read_array<const N: usize>(&mut self) -> DlmsResult<[u8; N]> {
        let bytes = self.decode_fixed_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn read_byte(&mut self) -> DlmsResult<u8> {
        let byte = *self
            .buffer
            .get(self.position)
            .ok_or_else(|| DlmsError::Asn1Decoding("Not enough bytes".to_string()))?;
        self.position += 1;
        Ok(byte)
    }

    /// Get current position
    pub fn position(&self) -> usize {
        self.position
    }

    /// Get remaining bytes
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_null() {
        let bytes = [0x00];
        let mut decoder = AxdrDecoder::new(&bytes);
        assert_eq!(decoder.decode_tag().unwrap(), AxdrTag::Null);
    }

    #[test]
    fn test_decode_boolean() {
        let bytes = [0x03, 0xFF];
        let mut decoder = AxdrDecoder::new(&bytes);
        let obj = decoder.decode_data_object().unwrap();
        assert!(obj.as_bool().unwrap());
    }

    #[test]
    fn test_decode_integer32() {
        let bytes = [0x05, 0x12, 0x34, 0x56, 0x78];
        let mut decoder = AxdrDecoder::new(&bytes);
        let obj = decoder.decode_data_object().unwrap();
        assert_eq!(obj, DataObject::Integer32(0x12345678));
        assert_eq!(decoder.remaining(), 0);
    }

    #[test]
    fn test_decode_register_structure() {
        // { octet-string(1.0.1.8.0.255), double-long-unsigned 123456, { -2, Wh } }
        let bytes = [
            0x02, 0x03, 0x09, 0x06, 0x01, 0x00, 0x01, 0x08, 0x00, 0xFF, 0x06, 0x00, 0x01, 0xE2,
            0x40, 0x02, 0x02, 0x0F, 0xFE, 0x16, 0x1E,
        ];
        let mut decoder = AxdrDecoder::new(&bytes);
        let obj = decoder.decode_data_object().unwrap();
        let items = obj.as_elements().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], DataObject::OctetString(vec![1, 0, 1, 8, 0, 255]));
        assert_eq!(items[1], DataObject::Unsigned32(123456));
        assert_eq!(
            items[2],
            DataObject::Structure(vec![DataObject::Integer8(-2), DataObject::Enumerate(30)])
        );
        assert_eq!(decoder.position(), bytes.len());
    }

    #[test]
    fn test_decode_truncated_octet_string() {
        let bytes = [0x09, 0x08, 0x01, 0x02];
        let mut decoder = AxdrDecoder::new(&bytes);
        assert!(matches!(
            decoder.decode_data_object(),
            Err(DlmsError::Asn1Decoding(_))
        ));
    }

    #[test]
    fn test_decode_rejects_oversized_sequence_count() {
        let bytes = [0x02, 0x82, 0xFF, 0xFF, 0x00];
        let mut decoder = AxdrDecoder::new(&bytes);
        assert!(decoder.decode_data_object().is_err());
    }

    #[test]
    fn test_decode_rejects_deep_nesting() {
        let mut bytes = Vec::new();
        for _ in 0..=MAX_NESTING_DEPTH {
            bytes.extend_from_slice(&[0x02, 0x01]);
        }
        bytes.push(0x00);
        let mut decoder = AxdrDecoder::new(&bytes);
        assert!(decoder.decode_data_object().is_err());
    }

    #[test]
    fn test_decode_date_time() {
        let mut bytes = vec![0x19];
        bytes.extend_from_slice(&CosemDateTime::new(2024, 6, 1, 8, 0, 0).encode());
        let mut decoder = AxdrDecoder::new(&bytes);
        match decoder.decode_data_object().unwrap() {
            DataObject::DateTime(dt) => {
                assert_eq!(dt.to_naive().unwrap().to_string(), "2024-06-01 08:00:00")
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
