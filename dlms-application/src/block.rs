//! General-block-transfer reassembly
//!
//! Meters whose notifications exceed the negotiated PDU size split them into
//! general-block-transfer APDUs:
//!
//! ```text
//! E0 | block-control | block-number (u16) | block-number-ack (u16) | block-data (octet string)
//! ```
//!
//! Block numbers start at 1. The block with the last-block bit set completes
//! the inner APDU, which is then decoded like any other telegram (and may
//! itself be ciphered).

use crate::apdu::{Cursor, GENERAL_BLOCK_TRANSFER};
use crate::error::{DlmsError, DlmsResult};
use dlms_asn1::AxdrEncoder;

/// Block-control bit: this is the last block
pub const LAST_BLOCK: u8 = 0x80;
/// Block-control bit: streaming in progress
pub const STREAMING: u8 = 0x40;
/// Block-control mask: window size
pub const WINDOW_MASK: u8 = 0x3F;

/// One general-block-transfer APDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneralBlockTransfer {
    pub block_control: u8,
    pub block_number: u16,
    pub block_number_ack: u16,
    pub block_data: Vec<u8>,
}

impl GeneralBlockTransfer {
    pub fn new(block_number: u16, last: bool, block_data: Vec<u8>) -> Self {
        Self {
            block_control: if last { LAST_BLOCK } else { 0 },
            block_number,
            block_number_ack: 0,
            block_data,
        }
    }

    pub fn is_last(&self) -> bool {
        self.block_control & LAST_BLOCK != 0
    }

    pub fn is_streaming(&self) -> bool {
        self.block_control & STREAMING != 0
    }

    pub fn window(&self) -> u8 {
        self.block_control & WINDOW_MASK
    }

    pub fn decode(apdu: &[u8]) -> DlmsResult<Self> {
        let mut cursor = Cursor::new(apdu);
        cursor.expect_tag(GENERAL_BLOCK_TRANSFER)?;
        let block_control = cursor.take_u8()?;
        let block_number = u16::from_be_bytes(cursor.take_array()?);
        let block_number_ack = u16::from_be_bytes(cursor.take_array()?);
        let len = cursor.take_length()?;
        let block_data = cursor.take(len)?.to_vec();
        cursor.expect_end()?;
        Ok(Self {
            block_control,
            block_number,
            block_number_ack,
            block_data,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = AxdrEncoder::new();
        encoder.encode_u8(GENERAL_BLOCK_TRANSFER);
        encoder.encode_u8(self.block_control);
        encoder.encode_u16(self.block_number);
        encoder.encode_u16(self.block_number_ack);
        encoder.encode_octet_string(&self.block_data);
        encoder.into_bytes()
    }

    /// Split `apdu` into blocks of at most `block_size` data bytes
    pub fn split(apdu: &[u8], block_size: usize) -> Vec<Self> {
        let chunks: Vec<&[u8]> = apdu.chunks(block_size.max(1)).collect();
        let count = chunks.len();
        chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| Self::new((i + 1) as u16, i + 1 == count, chunk.to_vec()))
            .collect()
    }
}

/// Collects general-block-transfer blocks into the inner APDU
#[derive(Debug)]
pub struct BlockTransferAssembler {
    max_size: usize,
    next_block: u16,
    buffer: Vec<u8>,
}

impl BlockTransferAssembler {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            next_block: 1,
            buffer: Vec::new(),
        }
    }

    /// Whether blocks of an incomplete APDU are held
    pub fn in_progress(&self) -> bool {
        self.next_block > 1
    }

    pub fn reset(&mut self) {
        self.next_block = 1;
        self.buffer.clear();
    }

    /// Feed one general-block-transfer APDU
    ///
    /// Returns the reassembled APDU once the last block arrives. Block 1
    /// always starts a new transfer; any other out-of-sequence block discards
    /// the transfer and is reported as a decode error.
    pub fn push(&mut self, apdu: &[u8]) -> DlmsResult<Option<Vec<u8>>> {
        let block = match GeneralBlockTransfer::decode(apdu) {
            Ok(block) => block,
            Err(e) => {
                self.reset();
                return Err(e);
            }
        };

        if block.block_number == 1 && self.in_progress() {
            log::debug!(
                "General-block-transfer restarted, dropping {} buffered bytes",
                self.buffer.len()
            );
            self.reset();
        }
        if block.block_number != self.next_block {
            let expected = self.next_block;
            self.reset();
            return Err(DlmsError::Decode(format!(
                "General-block-transfer block {} out of sequence, expected {}",
                block.block_number, expected
            )));
        }
        if self.buffer.len() + block.block_data.len() > self.max_size {
            self.reset();
            return Err(DlmsError::Decode(format!(
                "General-block-transfer exceeds {} bytes",
                self.max_size
            )));
        }

        self.buffer.extend_from_slice(&block.block_data);
        if block.is_last() {
            self.next_block = 1;
            return Ok(Some(std::mem::take(&mut self.buffer)));
        }
        self.next_block = self.next_block.wrapping_add(1);
        Ok(None)
    }
}
