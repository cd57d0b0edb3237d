//! Removal (and application) of APDU ciphering

use crate::encryption::{GcmCipher, SecurityControl, NONCE_LENGTH, TAG_LENGTH};
use crate::error::{DlmsError, DlmsResult};
use crate::keys::{SecurityKeys, SystemTitle, SYSTEM_TITLE_LENGTH};
use dlms_asn1::LengthEncoding;
use std::borrow::Cow;

/// general-glo-ciphering
pub const GENERAL_GLO_CIPHERING: u8 = 0xDB;
/// general-ded-ciphering
pub const GENERAL_DED_CIPHERING: u8 = 0xDC;
/// glo-event-notification-request
pub const GLO_EVENT_NOTIFICATION_REQUEST: u8 = 0xCA;

/// Whether an APDU tag denotes a ciphered APDU
pub fn is_ciphered_tag(tag: u8) -> bool {
    matches!(
        tag,
        GENERAL_GLO_CIPHERING | GENERAL_DED_CIPHERING | GLO_EVENT_NOTIFICATION_REQUEST
    )
}

/// A ciphered APDU split into its security header and protected payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipheredApdu {
    pub tag: u8,
    /// Carried only by the general-ciphering forms
    pub system_title: Option<SystemTitle>,
    pub security_control: SecurityControl,
    pub invocation_counter: u32,
    /// Ciphertext or plaintext, followed by the tag when authenticated
    pub payload: Vec<u8>,
}

impl CipheredApdu {
    /// Parse a ciphered APDU; `Ok(None)` for cleartext APDUs
    pub fn parse(apdu: &[u8]) -> DlmsResult<Option<Self>> {
        let Some(&tag) = apdu.first() else {
            return Err(DlmsError::Decode("Empty APDU".to_string()));
        };
        if !is_ciphered_tag(tag) {
            return Ok(None);
        }

        let mut pos = 1;
        let system_title = if tag == GLO_EVENT_NOTIFICATION_REQUEST {
            None
        } else {
            let (len, consumed) = LengthEncoding::decode(&apdu[pos..])?;
            pos += consumed;
            if len.value() != SYSTEM_TITLE_LENGTH {
                return Err(DlmsError::Security(format!(
                    "System title of {} bytes, expected {}",
                    len.value(),
                    SYSTEM_TITLE_LENGTH
                )));
            }
            let bytes = apdu
                .get(pos..pos + SYSTEM_TITLE_LENGTH)
                .ok_or_else(|| DlmsError::Security("Truncated system title".to_string()))?;
            pos += SYSTEM_TITLE_LENGTH;
            Some(SystemTitle::from_slice(bytes)?)
        };

        let (len, consumed) = LengthEncoding::decode(&apdu[pos..])?;
        pos += consumed;
        let content = apdu.get(pos..).unwrap_or_default();
        if content.len() != len.value() {
            return Err(DlmsError::Security(format!(
                "Ciphered content length {} does not match {} remaining bytes",
                len.value(),
                content.len()
            )));
        }
        if content.len() < 5 {
            return Err(DlmsError::Security(
                "Ciphered content too short for security header".to_string(),
            ));
        }

        Ok(Some(Self {
            tag,
            system_title,
            security_control: SecurityControl::from_byte(content[0]),
            invocation_counter: u32::from_be_bytes([content[1], content[2], content[3], content[4]]),
            payload: content[5..].to_vec(),
        }))
    }

    /// Encode back to the wire form
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.tag];
        if let Some(title) = &self.system_title {
            out.extend_from_slice(&LengthEncoding::for_length(SYSTEM_TITLE_LENGTH).encode());
            out.extend_from_slice(title.as_bytes());
        }
        out.extend_from_slice(&LengthEncoding::for_length(5 + self.payload.len()).encode());
        out.push(self.security_control.to_byte());
        out.extend_from_slice(&self.invocation_counter.to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }
}

/// Security layer: strips ciphering from incoming APDUs
#[derive(Debug, Clone, Default)]
pub struct SecurityLayer {
    keys: SecurityKeys,
}

impl SecurityLayer {
    pub fn new(keys: SecurityKeys) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &SecurityKeys {
        &self.keys
    }

    /// Return the plaintext APDU
    ///
    /// Cleartext APDUs are borrowed unchanged.
    ///
    /// # Errors
    /// * `DlmsError::MissingKey` - ciphering present but a required key is not configured
    /// * `DlmsError::AuthenticationFailed` - tag verification failed
    /// * `DlmsError::Security` - malformed security header or unsupported suite
    pub fn unprotect<'a>(&self, apdu: &'a [u8]) -> DlmsResult<Cow<'a, [u8]>> {
        let Some(ciphered) = CipheredApdu::parse(apdu)? else {
            return Ok(Cow::Borrowed(apdu));
        };
        let plaintext = self.decipher(&ciphered)?;
        log::debug!(
            "Deciphered APDU 0x{:02X}: {}, invocation counter {}",
            ciphered.tag,
            ciphered.security_control,
            ciphered.invocation_counter
        );
        Ok(Cow::Owned(plaintext))
    }

    fn decipher(&self, ciphered: &CipheredApdu) -> DlmsResult<Vec<u8>> {
        let sc = ciphered.security_control;
        if sc.security_suite_id() != 0 {
            return Err(DlmsError::Security(format!(
                "Unsupported security suite {}",
                sc.security_suite_id()
            )));
        }
        if sc.is_compressed() {
            return Err(DlmsError::Security(
                "Compressed APDUs are not supported".to_string(),
            ));
        }
        if !sc.is_authenticated() && !sc.is_encrypted() {
            return Ok(ciphered.payload.clone());
        }

        let cipher = self.cipher()?;
        let nonce = self.nonce(ciphered)?;
        let authentication_key = if sc.is_authenticated() {
            Some(
                self.keys
                    .authentication_key()
                    .ok_or(DlmsError::MissingKey("authentication key"))?,
            )
        } else {
            None
        };

        match authentication_key {
            Some(ak) => {
                let (body, tag) = split_tag(&ciphered.payload)?;
                if sc.is_encrypted() {
                    let mut aad = Vec::with_capacity(1 + ak.len());
                    aad.push(sc.to_byte());
                    aad.extend_from_slice(ak);
                    cipher.decrypt(&nonce, &aad, body, tag)
                } else {
                    let mut aad = Vec::with_capacity(1 + ak.len() + body.len());
                    aad.push(sc.to_byte());
                    aad.extend_from_slice(ak);
                    aad.extend_from_slice(body);
                    let expected = cipher.gmac(&nonce, &aad)?;
                    if expected.as_slice() != tag {
                        return Err(DlmsError::AuthenticationFailed(
                            "GMAC mismatch, check the configured keys".to_string(),
                        ));
                    }
                    Ok(body.to_vec())
                }
            }
            None => Ok(cipher.apply_keystream(&nonce, &ciphered.payload)),
        }
    }

    /// Apply ciphering as a meter would, producing a general-glo-ciphering APDU
    pub fn protect(
        &self,
        system_title: SystemTitle,
        security_control: SecurityControl,
        invocation_counter: u32,
        plaintext: &[u8],
    ) -> DlmsResult<Vec<u8>> {
        let mut ciphered = CipheredApdu {
            tag: GENERAL_GLO_CIPHERING,
            system_title: Some(system_title),
            security_control,
            invocation_counter,
            payload: Vec::new(),
        };
        let sc = security_control;
        ciphered.payload = if !sc.is_authenticated() && !sc.is_encrypted() {
            plaintext.to_vec()
        } else {
            let cipher = self.cipher()?;
            let nonce = self.nonce(&ciphered)?;
            match (sc.is_authenticated(), sc.is_encrypted()) {
                (true, encrypted) => {
                    let ak = self
                        .keys
                        .authentication_key()
                        .ok_or(DlmsError::MissingKey("authentication key"))?;
                    let mut aad = vec![sc.to_byte()];
                    aad.extend_from_slice(ak);
                    if encrypted {
                        let (mut body, tag) = cipher.encrypt(&nonce, &aad, plaintext)?;
                        body.extend_from_slice(&tag);
                        body
                    } else {
                        aad.extend_from_slice(plaintext);
                        let tag = cipher.gmac(&nonce, &aad)?;
                        let mut body = plaintext.to_vec();
                        body.extend_from_slice(&tag);
                        body
                    }
                }
                (false, _) => cipher.apply_keystream(&nonce, plaintext),
            }
        };
        Ok(ciphered.encode())
    }

    fn cipher(&self) -> DlmsResult<GcmCipher> {
        let key = self
            .keys
            .block_cipher_key()
            .ok_or(DlmsError::MissingKey("block cipher key"))?;
        GcmCipher::new(key)
    }

    fn nonce(&self, ciphered: &CipheredApdu) -> DlmsResult<[u8; NONCE_LENGTH]> {
        let title = ciphered
            .system_title
            .as_ref()
            .or(self.keys.system_title())
            .ok_or(DlmsError::MissingKey("system title"))?;
        let mut nonce = [0u8; NONCE_LENGTH];
        nonce[..SYSTEM_TITLE_LENGTH].copy_from_slice(title.as_bytes());
        nonce[SYSTEM_TITLE_LENGTH..].copy_from_slice(&ciphered.invocation_counter.to_be_bytes());
        Ok(nonce)
    }
}

fn split_tag(payload: &[u8]) -> DlmsResult<(&[u8], &[u8])> {
    if payload.len() < TAG_LENGTH {
        return Err(DlmsError::Security(format!(
            "Authenticated payload of {} bytes is shorter than its tag",
            payload.len()
        )));
    }
    Ok(payload.split_at(payload.len() - TAG_LENGTH))
}
