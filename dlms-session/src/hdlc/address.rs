//! HDLC address types

use crate::error::{DlmsError, DlmsResult};
use std::fmt;

const ONE_BYTE_UPPER_BOUND: u16 = 0x7F;
const TWO_BYTE_UPPER_BOUND: u16 = 0x3FFF;

/// HDLC address
///
/// Encoded on 1, 2 or 4 bytes; bit 0 of every byte is the extension bit
/// and is set only on the last byte. Two- and four-byte forms split into an
/// upper (logical device) and lower (physical device) half.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HdlcAddress {
    byte_length: usize,
    logical_id: u16,
    physical_id: u16,
}

impl HdlcAddress {
    /// Create a new one-byte HDLC address
    pub fn new(logical_id: u16) -> DlmsResult<Self> {
        if logical_id > ONE_BYTE_UPPER_BOUND {
            return Err(DlmsError::InvalidData(format!(
                "One byte address exceeded upper bound of 0x{:02X}",
                ONE_BYTE_UPPER_BOUND
            )));
        }
        Ok(Self {
            byte_length: 1,
            logical_id,
            physical_id: 0,
        })
    }

    /// Create a new HDLC address with logical and physical ID
    pub fn new_with_physical(logical_id: u16, physical_id: u16) -> DlmsResult<Self> {
        let size = Self::address_size_of(logical_id)?.max(Self::address_size_of(physical_id)?);
        Ok(Self {
            byte_length: size * 2,
            logical_id,
            physical_id,
        })
    }

    fn address_size_of(address: u16) -> DlmsResult<usize> {
        if address <= ONE_BYTE_UPPER_BOUND {
            Ok(1)
        } else if address <= TWO_BYTE_UPPER_BOUND {
            Ok(2)
        } else {
            Err(DlmsError::InvalidData(format!(
                "Address 0x{:X} is out of upper bound 0x{:X}",
                address, TWO_BYTE_UPPER_BOUND
            )))
        }
    }

    /// Get logical ID
    pub fn logical_id(&self) -> u16 {
        self.logical_id
    }

    /// Get physical ID
    pub fn physical_id(&self) -> u16 {
        self.physical_id
    }

    /// Get byte length
    pub fn byte_length(&self) -> usize {
        self.byte_length
    }

    /// Encode address to bytes
    pub fn encode(&self) -> Vec<u8> {
        let half = self.byte_length.div_ceil(2);
        let mut result = Vec::with_capacity(self.byte_length);
        Self::push_half(&mut result, self.logical_id, half);
        if self.byte_length > 1 {
            Self::push_half(&mut result, self.physical_id, half);
        }
        if let Some(last) = result.last_mut() {
            *last |= 0x01;
        }
        result
    }

    fn push_half(out: &mut Vec<u8>, value: u16, bytes: usize) {
        for i in (0..bytes).rev() {
            out.push((((value >> (7 * i)) & 0x7F) << 1) as u8);
        }
    }

    /// Decode address from its wire bytes (extension bit included)
    pub fn decode(data: &[u8]) -> DlmsResult<Self> {
        let (logical_id, physical_id) = match data.len() {
            1 => ((data[0] >> 1) as u16, 0),
            2 => ((data[0] >> 1) as u16, (data[1] >> 1) as u16),
            4 => (
                ((data[0] >> 1) as u16) << 7 | (data[1] >> 1) as u16,
                ((data[2] >> 1) as u16) << 7 | (data[3] >> 1) as u16,
            ),
            length => {
                return Err(DlmsError::FrameInvalid(format!(
                    "HDLC address has an invalid byte length of {}",
                    length
                )));
            }
        };
        Ok(Self {
            byte_length: data.len(),
            logical_id,
            physical_id,
        })
    }
}

impl fmt::Display for HdlcAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.byte_length.div_ceil(2) * 2;
        write!(f, "{:0width$X}", self.logical_id, width = width)?;
        if self.byte_length > 1 {
            write!(f, "-{:0width$X}", self.physical_id, width = width)?;
        }
        Ok(())
    }
}

/// HDLC address pair (source and destination)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HdlcAddressPair {
    source: HdlcAddress,
    destination: HdlcAddress,
}

impl HdlcAddressPair {
    /// Create a new address pair
    pub fn new(source: HdlcAddress, destination: HdlcAddress) -> Self {
        Self {
            source,
            destination,
        }
    }

    /// Get source address
    pub fn source(&self) -> HdlcAddress {
        self.source
    }

    /// Get destination address
    pub fn destination(&self) -> HdlcAddress {
        self.destination
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hdlc_address_new() {
        let addr = HdlcAddress::new(0x10).unwrap();
        assert_eq!(addr.logical_id(), 0x10);
        assert_eq!(addr.byte_length(), 1);
        assert_eq!(addr.encode(), vec![0x21]);
        assert!(HdlcAddress::new(0x80).is_err());
    }

    #[test]
    fn test_hdlc_address_encode_decode() {
        let addr = HdlcAddress::new_with_physical(0x01, 0x11).unwrap();
        let encoded = addr.encode();
        assert_eq!(encoded, vec![0x02, 0x23]);
        assert_eq!(HdlcAddress::decode(&encoded).unwrap(), addr);
    }

    #[test]
    fn test_four_byte_address() {
        let addr = HdlcAddress::new_with_physical(0x01, 0x3FFF).unwrap();
        assert_eq!(addr.byte_length(), 4);
        let encoded = addr.encode();
        assert_eq!(encoded, vec![0x00, 0x02, 0xFE, 0xFF]);
        let decoded = HdlcAddress::decode(&encoded).unwrap();
        assert_eq!(decoded.physical_id(), 0x3FFF);
        assert_eq!(decoded.to_string(), "0001-3FFF");
    }

    #[test]
    fn test_decode_rejects_three_bytes() {
        assert!(HdlcAddress::decode(&[0x02, 0x02, 0x03]).is_err());
    }

    #[test]
    fn test_hdlc_address_pair() {
        let src = HdlcAddress::new(0x10).unwrap();
        let dst = HdlcAddress::new(0x20).unwrap();
        let pair = HdlcAddressPair::new(src, dst);
        assert_eq!(pair.source(), src);
        assert_eq!(pair.destination(), dst);
    }
}
