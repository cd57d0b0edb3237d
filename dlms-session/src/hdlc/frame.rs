//! HDLC frame structure and encoding/decoding

use crate::error::{DlmsError, DlmsResult};
use crate::hdlc::address::{HdlcAddress, HdlcAddressPair};
use crate::hdlc::fcs::FcsCalc;
use std::fmt;

/// HDLC frame flag
pub const FLAG: u8 = 0x7E;

/// Logical Link Control (LLC) Request
pub const LLC_REQUEST: [u8; 3] = [0xE6, 0xE6, 0x00];

/// Logical Link Control (LLC) Response
pub const LLC_RESPONSE: [u8; 3] = [0xE6, 0xE7, 0x00];

/// Frame format type nibble (frame format type 3)
const FORMAT_TYPE: u8 = 0xA0;
/// Segmentation bit in the high frame format byte
const SEGMENTATION_BIT: u8 = 0x08;
/// 11-bit frame length inside the frame format field
pub const LENGTH_MASK: u16 = 0x07FF;
/// Frame format, one-byte addresses, control and FCS
pub const MIN_FRAME_LENGTH: usize = 7;

/// HDLC frame type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Information,
    ReceiveReady,
    ReceiveNotReady,
    SetNormalResponseMode,
    Disconnect,
    UnnumberedAcknowledge,
    DisconnectMode,
    FrameReject,
    UnnumberedInformation,
    InvalidType,
}

impl FrameType {
    /// Get frame type from control byte
    ///
    /// The poll/final bit (0x10) is ignored for unnumbered frames.
    pub fn from_control_byte(control_byte: u8) -> Self {
        match control_byte {
            x if (x & 0x01) == 0x00 => FrameType::Information,
            x if (x & 0x0F) == 0x01 => FrameType::ReceiveReady,
            x if (x & 0x0F) == 0x05 => FrameType::ReceiveNotReady,
            x if (x & 0xEF) == 0x83 => FrameType::SetNormalResponseMode,
            x if (x & 0xEF) == 0x43 => FrameType::Disconnect,
            x if (x & 0xEF) == 0x63 => FrameType::UnnumberedAcknowledge,
            x if (x & 0xEF) == 0x0F => FrameType::DisconnectMode,
            x if (x & 0xEF) == 0x87 => FrameType::FrameReject,
            x if (x & 0xEF) == 0x03 => FrameType::UnnumberedInformation,
            _ => FrameType::InvalidType,
        }
    }

    /// Get control byte value for this frame type, poll/final bit set
    pub fn to_control_byte(&self, send_seq: u8, recv_seq: u8) -> u8 {
        match self {
            FrameType::Information => ((recv_seq & 0x07) << 5) | 0x10 | ((send_seq & 0x07) << 1),
            FrameType::ReceiveReady => ((recv_seq & 0x07) << 5) | 0x11,
            FrameType::ReceiveNotReady => ((recv_seq & 0x07) << 5) | 0x15,
            FrameType::SetNormalResponseMode => 0x93,
            FrameType::Disconnect => 0x53,
            FrameType::UnnumberedAcknowledge => 0x73,
            FrameType::DisconnectMode => 0x1F,
            FrameType::FrameReject => 0x97,
            FrameType::UnnumberedInformation => 0x13,
            FrameType::InvalidType => 0xFF,
        }
    }

    /// Whether frames of this type carry application data
    pub fn carries_payload(&self) -> bool {
        matches!(
            self,
            FrameType::Information | FrameType::UnnumberedInformation
        )
    }
}

/// Why a delimited frame was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameDefect {
    /// Structure does not parse (format, length, address or control field)
    Malformed(String),
    /// Header check sequence mismatch
    HeaderCheck,
    /// Frame check sequence mismatch
    FrameCheck,
}

impl fmt::Display for FrameDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameDefect::Malformed(reason) => write!(f, "Malformed HDLC frame: {}", reason),
            FrameDefect::HeaderCheck => f.write_str("HDLC header check sequence mismatch"),
            FrameDefect::FrameCheck => f.write_str("HDLC frame check sequence mismatch"),
        }
    }
}

impl From<FrameDefect> for DlmsError {
    fn from(defect: FrameDefect) -> Self {
        DlmsError::FrameInvalid(defect.to_string())
    }
}

/// HDLC frame
#[derive(Debug, Clone, PartialEq)]
pub struct HdlcFrame {
    frame_type: FrameType,
    information_field: Vec<u8>,
    send_sequence: Option<u8>,
    receive_sequence: Option<u8>,
    segmented: bool,
    control_field: u8,
    address_pair: HdlcAddressPair,
}

impl HdlcFrame {
    /// Create a new information frame with sequence numbers
    pub fn new_information(
        address_pair: HdlcAddressPair,
        information_field: Vec<u8>,
        send_sequence: u8,
        receive_sequence: u8,
        segmented: bool,
    ) -> Self {
        Self {
            frame_type: FrameType::Information,
            information_field,
            send_sequence: Some(send_sequence & 0x07),
            receive_sequence: Some(receive_sequence & 0x07),
            segmented,
            control_field: FrameType::Information
                .to_control_byte(send_sequence, receive_sequence),
            address_pair,
        }
    }

    /// Create a new unnumbered information frame
    pub fn new_unnumbered_information(
        address_pair: HdlcAddressPair,
        information_field: Vec<u8>,
        segmented: bool,
    ) -> Self {
        Self {
            frame_type: FrameType::UnnumberedInformation,
            information_field,
            send_sequence: None,
            receive_sequence: None,
            segmented,
            control_field: FrameType::UnnumberedInformation.to_control_byte(0, 0),
            address_pair,
        }
    }

    /// Split `payload` into consecutive I-frames of at most `max_information` bytes
    ///
    /// Every frame except the last has the segmentation bit set.
    pub fn segment(
        address_pair: HdlcAddressPair,
        payload: &[u8],
        max_information: usize,
    ) -> DlmsResult<Vec<Self>> {
        if max_information == 0 {
            return Err(DlmsError::InvalidData(
                "Maximum information length must be greater than zero".to_string(),
            ));
        }
        let chunks: Vec<&[u8]> = payload.chunks(max_information).collect();
        let count = chunks.len();
        Ok(chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| {
                Self::new_information(address_pair, chunk.to_vec(), i as u8, 0, i + 1 < count)
            })
            .collect())
    }

    /// Decode an HDLC frame from the bytes between its flags
    pub fn decode(frame: &[u8]) -> DlmsResult<Self> {
        Self::parse(frame).map_err(DlmsError::from)
    }

    /// Decode an HDLC frame, reporting the precise defect on failure
    pub fn parse(frame: &[u8]) -> Result<Self, FrameDefect> {
        if frame.len() < MIN_FRAME_LENGTH {
            return Err(FrameDefect::Malformed(format!(
                "frame of {} bytes is too short",
                frame.len()
            )));
        }

        let format = u16::from_be_bytes([frame[0], frame[1]]);
        if (frame[0] & 0xF0) != FORMAT_TYPE {
            return Err(FrameDefect::Malformed(format!(
                "illegal frame format 0x{:04X}",
                format
            )));
        }
        let segmented = (frame[0] & SEGMENTATION_BIT) == SEGMENTATION_BIT;
        let declared = (format & LENGTH_MASK) as usize;
        if declared != frame.len() {
            return Err(FrameDefect::Malformed(format!(
                "length field {} does not match frame of {} bytes",
                declared,
                frame.len()
            )));
        }

        if !FcsCalc::verify(frame) {
            return Err(FrameDefect::FrameCheck);
        }

        let mut pos = 2;
        let dest_len = Self::address_length(&frame[pos..])?;
        let destination = HdlcAddress::decode(&frame[pos..pos + dest_len])
            .map_err(|e| FrameDefect::Malformed(e.to_string()))?;
        pos += dest_len;
        let src_len = Self::address_length(&frame[pos..])?;
        let source = HdlcAddress::decode(&frame[pos..pos + src_len])
            .map_err(|e| FrameDefect::Malformed(e.to_string()))?;
        pos += src_len;

        // control field plus trailing FCS
        if pos + 3 > frame.len() {
            return Err(FrameDefect::Malformed(
                "frame too short for control field".to_string(),
            ));
        }
        let control_field = frame[pos];
        pos += 1;

        let frame_type = FrameType::from_control_byte(control_field);
        if frame_type == FrameType::InvalidType {
            return Err(FrameDefect::Malformed(format!(
                "control field unknown: 0x{:02X}",
                control_field
            )));
        }

        let (send_sequence, receive_sequence) = match frame_type {
            FrameType::Information => (
                Some((control_field & 0x0E) >> 1),
                Some((control_field & 0xE0) >> 5),
            ),
            FrameType::ReceiveReady | FrameType::ReceiveNotReady => {
                (None, Some((control_field & 0xE0) >> 5))
            }
            _ => (None, None),
        };

        // header, FCS: no information field
        let information_field = if pos + 2 == frame.len() {
            Vec::new()
        } else {
            // header, HCS, information, FCS
            if pos + 4 > frame.len() {
                return Err(FrameDefect::Malformed(
                    "frame too short for header check sequence".to_string(),
                ));
            }
            if !FcsCalc::verify(&frame[..pos + 2]) {
                return Err(FrameDefect::HeaderCheck);
            }
            frame[pos + 2..frame.len() - 2].to_vec()
        };

        Ok(Self {
            frame_type,
            information_field,
            send_sequence,
            receive_sequence,
            segmented,
            control_field,
            address_pair: HdlcAddressPair::new(source, destination),
        })
    }

    /// Encode frame to bytes, without the surrounding flags
    pub fn encode(&self) -> DlmsResult<Vec<u8>> {
        let destination = self.address_pair.destination().encode();
        let source = self.address_pair.source().encode();
        let header_len = 2 + destination.len() + source.len() + 1;
        let length = if self.information_field.is_empty() {
            header_len + 2
        } else {
            header_len + 2 + self.information_field.len() + 2
        };
        if length > LENGTH_MASK as usize {
            return Err(DlmsError::InvalidData(format!(
                "Frame of {} bytes exceeds the 11-bit length field",
                length
            )));
        }

        let mut result = Vec::with_capacity(length);
        let mut format_h = FORMAT_TYPE | ((length >> 8) as u8 & 0x07);
        if self.segmented {
            format_h |= SEGMENTATION_BIT;
        }
        result.push(format_h);
        result.push((length & 0xFF) as u8);
        result.extend_from_slice(&destination);
        result.extend_from_slice(&source);
        result.push(self.control_field);

        if !self.information_field.is_empty() {
            let hcs = FcsCalc::checksum(&result);
            result.extend_from_slice(&hcs);
            result.extend_from_slice(&self.information_field);
        }
        let fcs = FcsCalc::checksum(&result);
        result.extend_from_slice(&fcs);

        Ok(result)
    }

    /// Encode frame to bytes with opening and closing flags
    pub fn encode_with_flags(&self) -> DlmsResult<Vec<u8>> {
        let body = self.encode()?;
        let mut result = Vec::with_capacity(body.len() + 2);
        result.push(FLAG);
        result.extend_from_slice(&body);
        result.push(FLAG);
        Ok(result)
    }

    fn address_length(data: &[u8]) -> Result<usize, FrameDefect> {
        data.iter()
            .take(4)
            .position(|b| b & 0x01 != 0)
            .map(|i| i + 1)
            .ok_or_else(|| FrameDefect::Malformed("HDLC address is illegal in frame".to_string()))
    }

    /// Get frame type
    pub fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    /// Get information field
    pub fn information_field(&self) -> &[u8] {
        &self.information_field
    }

    /// Take ownership of the information field
    pub fn into_information_field(self) -> Vec<u8> {
        self.information_field
    }

    /// Get send sequence number
    pub fn send_sequence(&self) -> Option<u8> {
        self.send_sequence
    }

    /// Get receive sequence number
    pub fn receive_sequence(&self) -> Option<u8> {
        self.receive_sequence
    }

    /// Check if frame is segmented
    pub fn is_segmented(&self) -> bool {
        self.segmented
    }

    /// Get address pair
    pub fn address_pair(&self) -> HdlcAddressPair {
        self.address_pair
    }
}

impl fmt::Display for HdlcFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HDLC Frame: type={:?}, src={}, dst={}, info={} bytes{}",
            self.frame_type,
            self.address_pair.source(),
            self.address_pair.destination(),
            self.information_field.len(),
            if self.segmented { ", segmented" } else { "" }
        )
    }
}

/// Strip a leading LLC header from a reassembled payload
pub fn strip_llc(payload: &[u8]) -> &[u8] {
    if payload.starts_with(&LLC_RESPONSE) || payload.starts_with(&LLC_REQUEST) {
        &payload[LLC_REQUEST.len()..]
    } else {
        payload
    }
}
