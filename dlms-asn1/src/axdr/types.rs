//! A-XDR tags and length prefixes

use crate::error::{DlmsError, DlmsResult};

/// Type tag preceding every encoded `Data` value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxdrTag {
    Null = 0x00,
    Array = 0x01,
    Structure = 0x02,
    Boolean = 0x03,
    BitString = 0x04,
    Integer32 = 0x05,
    Unsigned32 = 0x06,
    OctetString = 0x09,
    VisibleString = 0x0A,
    Utf8String = 0x0C,
    Bcd = 0x0D,
    Integer8 = 0x0F,
    Integer16 = 0x10,
    Unsigned8 = 0x11,
    Unsigned16 = 0x12,
    CompactArray = 0x13,
    Integer64 = 0x14,
    Unsigned64 = 0x15,
    Enumerate = 0x16,
    Float32 = 0x17,
    Float64 = 0x18,
    DateTime = 0x19,
    Date = 0x1A,
    Time = 0x1B,
    DontCare = 0xFF,
}

const KNOWN_TAGS: [AxdrTag; 25] = [
    AxdrTag::Null,
    AxdrTag::Array,
    AxdrTag::Structure,
    AxdrTag::Boolean,
    AxdrTag::BitString,
    AxdrTag::Integer32,
    AxdrTag::Unsigned32,
    AxdrTag::OctetString,
    AxdrTag::VisibleString,
    AxdrTag::Utf8String,
    AxdrTag::Bcd,
    AxdrTag::Integer8,
    AxdrTag::Integer16,
    AxdrTag::Unsigned8,
    AxdrTag::Unsigned16,
    AxdrTag::CompactArray,
    AxdrTag::Integer64,
    AxdrTag::Unsigned64,
    AxdrTag::Enumerate,
    AxdrTag::Float32,
    AxdrTag::Float64,
    AxdrTag::DateTime,
    AxdrTag::Date,
    AxdrTag::Time,
    AxdrTag::DontCare,
];

impl AxdrTag {
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for AxdrTag {
    type Error = DlmsError;

    fn try_from(value: u8) -> DlmsResult<Self> {
        KNOWN_TAGS
            .into_iter()
            .find(|tag| tag.to_u8() == value)
            .ok_or_else(|| DlmsError::Asn1Decoding(format!("Unknown A-XDR tag: 0x{:02X}", value)))
    }
}

/// Length encoding for variable-length types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthEncoding {
    /// Short form: length < 128, encoded in 1 byte
    Short(u8),
    /// Long form: length >= 128, encoded with length-of-length byte + length bytes
    Long(usize),
}

impl LengthEncoding {
    /// Pick the shortest form for `len`
    pub fn for_length(len: usize) -> Self {
        if len < 0x80 {
            LengthEncoding::Short(len as u8)
        } else {
            LengthEncoding::Long(len)
        }
    }

    /// The encoded length value
    pub fn value(&self) -> usize {
        match self {
            LengthEncoding::Short(len) => *len as usize,
            LengthEncoding::Long(len) => *len,
        }
    }

    /// Encode length to bytes
    pub fn encode(&self) -> Vec<u8> {
        match self {
            LengthEncoding::Short(len) => vec![*len],
            LengthEncoding::Long(len) => {
                let significant = len.to_be_bytes();
                let skip = significant.iter().take_while(|b| **b == 0).count();
                let bytes = &significant[skip.min(significant.len() - 1)..];
                let mut result = Vec::with_capacity(1 + bytes.len());
                result.push(0x80 | bytes.len() as u8);
                result.extend_from_slice(bytes);
                result
            }
        }
    }

    /// Decode length from bytes, returning the length and the bytes consumed
    pub fn decode(bytes: &[u8]) -> DlmsResult<(Self, usize)> {
        let first_byte = *bytes
            .first()
            .ok_or_else(|| DlmsError::Asn1Decoding("Not enough bytes for length".to_string()))?;
        if (first_byte & 0x80) == 0 {
            return Ok((LengthEncoding::Short(first_byte), 1));
        }

        let length_of_length = (first_byte & 0x7F) as usize;
        if length_of_length == 0 || length_of_length > 4 {
            return Err(DlmsError::Asn1Decoding(format!(
                "Invalid length-of-length: {}",
                length_of_length
            )));
        }
        if bytes.len() < 1 + length_of_length {
            return Err(DlmsError::Asn1Decoding("Not enough bytes for long length".to_string()));
        }

        let len = bytes[1..1 + length_of_length]
            .iter()
            .fold(0usize, |acc, &byte| (acc << 8) | byte as usize);
        Ok((LengthEncoding::Long(len), 1 + length_of_length))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_encoding_short() {
        let enc = LengthEncoding::for_length(10);
        assert_eq!(enc.encode(), vec![10]);
    }

    #[test]
    fn test_length_encoding_long() {
        let enc = LengthEncoding::for_length(256);
        assert_eq!(enc.encode(), vec![0x82, 0x01, 0x00]);
        let (decoded, consumed) = LengthEncoding::decode(&enc.encode()).unwrap();
        assert_eq!(decoded.value(), 256);
        assert_eq!(consumed, 3);
    }

    #[test]
    fn test_length_encoding_rejects_truncated() {
        assert!(LengthEncoding::decode(&[]).is_err());
        assert!(LengthEncoding::decode(&[0x82, 0x01]).is_err());
        assert!(LengthEncoding::decode(&[0x85, 0, 0, 0, 0, 1]).is_err());
    }

    #[test]
    fn test_tag_round_trip() {
        for byte in [0x00u8, 0x02, 0x06, 0x09, 0x16, 0x19, 0xFF] {
            assert_eq!(AxdrTag::try_from(byte).unwrap().to_u8(), byte);
        }
        assert!(AxdrTag::try_from(0x07).is_err());
        assert!(AxdrTag::try_from(0x1C).is_err());
    }
}
