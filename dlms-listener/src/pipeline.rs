//! Per-telegram processing: security, block reassembly, decoding, mapping

use crate::error::DlmsResult;
use dlms_application::apdu::GENERAL_BLOCK_TRANSFER;
use dlms_application::{BlockTransferAssembler, NotificationDecoder};
use dlms_mapper::{RegisterMapper, RegisterSnapshot, TelegramDefinition};
use dlms_security::{SecurityKeys, SecurityLayer};
use std::sync::Arc;

/// Turns complete APDUs into register snapshots
///
/// A general-block-transfer block only yields a snapshot once its last
/// block arrives; the blocks before it return `Ok(None)`.
#[derive(Debug)]
pub struct TelegramPipeline {
    security: SecurityLayer,
    decoder: NotificationDecoder,
    mapper: RegisterMapper,
    blocks: BlockTransferAssembler,
}

impl TelegramPipeline {
    pub fn new(
        security: SecurityLayer,
        decoder: NotificationDecoder,
        mapper: RegisterMapper,
        max_apdu_size: usize,
    ) -> Self {
        Self {
            security,
            decoder,
            mapper,
            blocks: BlockTransferAssembler::new(max_apdu_size),
        }
    }

    /// Pipeline with the default A-XDR decoder and the layouts of `definition`
    pub fn from_definition(
        definition: Arc<TelegramDefinition>,
        keys: SecurityKeys,
        max_apdu_size: usize,
    ) -> Self {
        let decoder = NotificationDecoder::new(definition.layouts().to_vec());
        Self::new(
            SecurityLayer::new(keys),
            decoder,
            RegisterMapper::new(definition),
            max_apdu_size,
        )
    }

    pub fn mapper(&self) -> &RegisterMapper {
        &self.mapper
    }

    /// Drop a partially received block transfer
    pub fn reset(&mut self) {
        self.blocks.reset();
    }

    /// Process one APDU from the frame reader
    ///
    /// # Errors
    /// Any security, decode or mapping error; the telegram is then dropped
    /// as a whole.
    pub fn process(&mut self, apdu: &[u8]) -> DlmsResult<Option<RegisterSnapshot>> {
        let plain = self.security.unprotect(apdu)?;

        let assembled;
        let plain: &[u8] = if plain.first() == Some(&GENERAL_BLOCK_TRANSFER) {
            match self.blocks.push(&plain)? {
                Some(inner) => {
                    log::debug!("General-block-transfer complete, {} bytes", inner.len());
                    // the reassembled APDU may itself be ciphered
                    assembled = self.security.unprotect(&inner)?.into_owned();
                    &assembled
                }
                None => return Ok(None),
            }
        } else {
            &plain
        };

        let notification = self.decoder.decode(plain)?;
        let snapshot = self.mapper.map(&notification)?;
        Ok(Some(snapshot))
    }
}
