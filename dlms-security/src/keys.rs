//! Configured key material

use crate::error::{DlmsError, DlmsResult};
use std::fmt;
use std::str::FromStr;

/// AES-128 key length in bytes
pub const KEY_LENGTH: usize = 16;
/// System title length in bytes
pub const SYSTEM_TITLE_LENGTH: usize = 8;

/// System Title
///
/// An 8-byte identifier of the sending device, usually three bytes of
/// manufacturer flag followed by a serial number. Together with the
/// invocation counter it forms the GCM initialization vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SystemTitle {
    value: [u8; SYSTEM_TITLE_LENGTH],
}

impl SystemTitle {
    pub fn new(bytes: [u8; SYSTEM_TITLE_LENGTH]) -> Self {
        Self { value: bytes }
    }

    /// Create System Title from slice
    ///
    /// # Errors
    /// Returns error if bytes length is not 8
    pub fn from_slice(bytes: &[u8]) -> DlmsResult<Self> {
        let value: [u8; SYSTEM_TITLE_LENGTH] = bytes.try_into().map_err(|_| {
            DlmsError::InvalidData(format!(
                "System Title must be {} bytes, got {}",
                SYSTEM_TITLE_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Self { value })
    }

    /// Get the System Title as bytes
    pub fn as_bytes(&self) -> &[u8; SYSTEM_TITLE_LENGTH] {
        &self.value
    }

    /// Manufacturer flag, when the first three bytes are printable ASCII
    pub fn manufacturer(&self) -> Option<&str> {
        let flag = &self.value[..3];
        if flag.iter().all(|b| b.is_ascii_alphanumeric()) {
            std::str::from_utf8(flag).ok()
        } else {
            None
        }
    }
}

impl fmt::Display for SystemTitle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.value))
    }
}

/// Which configured key a telegram or definition requires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    AuthenticationKey,
    BlockCipherKey,
}

impl KeyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyKind::AuthenticationKey => "authentication_key",
            KeyKind::BlockCipherKey => "block_cipher_key",
        }
    }
}

impl FromStr for KeyKind {
    type Err = DlmsError;

    fn from_str(s: &str) -> DlmsResult<Self> {
        match s {
            "authentication_key" => Ok(KeyKind::AuthenticationKey),
            "block_cipher_key" => Ok(KeyKind::BlockCipherKey),
            other => Err(DlmsError::Configuration(format!(
                "Unknown key name '{}', expected authentication_key or block_cipher_key",
                other
            ))),
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authentication key, block cipher key and optional fallback system title
///
/// Every field may be absent; an absent key means the meter is expected to
/// send in cleartext (or only with the security features the present keys cover).
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SecurityKeys {
    authentication_key: Option<[u8; KEY_LENGTH]>,
    block_cipher_key: Option<[u8; KEY_LENGTH]>,
    system_title: Option<SystemTitle>,
}

impl SecurityKeys {
    pub fn new(
        authentication_key: Option<[u8; KEY_LENGTH]>,
        block_cipher_key: Option<[u8; KEY_LENGTH]>,
        system_title: Option<SystemTitle>,
    ) -> Self {
        Self {
            authentication_key,
            block_cipher_key,
            system_title,
        }
    }

    /// No keys at all: cleartext meters only
    pub fn none() -> Self {
        Self::default()
    }

    /// Parse hex-encoded configuration values; empty strings mean "not configured"
    ///
    /// # Errors
    /// `DlmsError::Configuration` for non-hex input or wrong lengths
    pub fn from_hex(
        authentication_key: &str,
        block_cipher_key: &str,
        system_title: &str,
    ) -> DlmsResult<Self> {
        let system_title = parse_hex::<SYSTEM_TITLE_LENGTH>("system_title", system_title)?
            .map(SystemTitle::new);
        Ok(Self {
            authentication_key: parse_hex("authentication_key", authentication_key)?,
            block_cipher_key: parse_hex("block_cipher_key", block_cipher_key)?,
            system_title,
        })
    }

    pub fn authentication_key(&self) -> Option<&[u8; KEY_LENGTH]> {
        self.authentication_key.as_ref()
    }

    pub fn block_cipher_key(&self) -> Option<&[u8; KEY_LENGTH]> {
        self.block_cipher_key.as_ref()
    }

    pub fn system_title(&self) -> Option<&SystemTitle> {
        self.system_title.as_ref()
    }

    pub fn has(&self, kind: KeyKind) -> bool {
        match kind {
            KeyKind::AuthenticationKey => self.authentication_key.is_some(),
            KeyKind::BlockCipherKey => self.block_cipher_key.is_some(),
        }
    }
}

impl fmt::Debug for SecurityKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |present: bool| if present { "<set>" } else { "<none>" };
        f.debug_struct("SecurityKeys")
            .field("authentication_key", &mask(self.authentication_key.is_some()))
            .field("block_cipher_key", &mask(self.block_cipher_key.is_some()))
            .field("system_title", &self.system_title)
            .finish()
    }
}

fn parse_hex<const N: usize>(name: &str, value: &str) -> DlmsResult<Option<[u8; N]>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    let bytes = hex::decode(value).map_err(|e| {
        DlmsError::Configuration(format!("{} is not valid hex: {}", name, e))
    })?;
    let array: [u8; N] = bytes.as_slice().try_into().map_err(|_| {
        DlmsError::Configuration(format!(
            "{} must be {} hex characters, got {}",
            name,
            N * 2,
            value.len()
        ))
    })?;
    Ok(Some(array))
}
