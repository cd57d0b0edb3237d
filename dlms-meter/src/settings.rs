//! Process settings
//!
//! An optional TOML file layered under environment variables, e.g.
//!
//! ```text
//! DLMS__SERIAL__DEVICE=/dev/ttyUSB1
//! DLMS__SECURITY__BLOCK_CIPHER_KEY=000102030405060708090A0B0C0D0E0F
//! DLMS__LISTENER__FAULT__THRESHOLD=3
//! ```

use config::{Config, Environment, File, FileFormat};
use dlms_core::{DlmsError, DlmsResult};
use dlms_listener::ListenerConfig;
use dlms_security::SecurityKeys;
use dlms_transport::SerialSettings;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "dlms-meter.toml";

/// Serial link parameters, fixed for the lifetime of the process
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SerialSection {
    #[serde(default = "SerialSection::device_default")]
    pub device: String,
    #[serde(default = "SerialSection::baud_rate_default")]
    pub baud_rate: u32,
    #[serde(default = "SerialSection::data_bits_default")]
    pub data_bits: u8,
    /// `none`, `even` or `odd`
    #[serde(default = "SerialSection::parity_default")]
    pub parity: String,
    #[serde(default = "SerialSection::stop_bits_default")]
    pub stop_bits: u8,
}

impl Default for SerialSection {
    fn default() -> Self {
        Self {
            device: Self::device_default(),
            baud_rate: Self::baud_rate_default(),
            data_bits: Self::data_bits_default(),
            parity: Self::parity_default(),
            stop_bits: Self::stop_bits_default(),
        }
    }
}

impl SerialSection {
    fn device_default() -> String {
        "/dev/ttyUSB0".to_string()
    }

    fn baud_rate_default() -> u32 {
        2400
    }

    fn data_bits_default() -> u8 {
        8
    }

    fn parity_default() -> String {
        "none".to_string()
    }

    fn stop_bits_default() -> u8 {
        1
    }

    pub fn to_settings(&self) -> DlmsResult<SerialSettings> {
        SerialSettings::from_parts(
            &self.device,
            self.baud_rate,
            self.data_bits,
            &self.parity,
            self.stop_bits,
        )
    }
}

/// Hex-encoded keys; empty means not configured
#[derive(Clone, Default, PartialEq, Deserialize)]
pub struct SecuritySection {
    #[serde(default)]
    pub authentication_key: String,
    #[serde(default)]
    pub block_cipher_key: String,
    /// Used for glo-ciphered APDUs that carry no system title
    #[serde(default)]
    pub system_title: String,
}

impl SecuritySection {
    pub fn keys(&self) -> DlmsResult<SecurityKeys> {
        SecurityKeys::from_hex(
            self.authentication_key.trim(),
            self.block_cipher_key.trim(),
            self.system_title.trim(),
        )
    }
}

impl fmt::Debug for SecuritySection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |value: &str| if value.is_empty() { "<none>" } else { "<set>" };
        f.debug_struct("SecuritySection")
            .field("authentication_key", &mask(&self.authentication_key))
            .field("block_cipher_key", &mask(&self.block_cipher_key))
            .field("system_title", &self.system_title)
            .finish()
    }
}

/// Which telegram definition to use
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TelegramSection {
    #[serde(default = "TelegramSection::id_default")]
    pub id: String,
    /// Directory of YAML definition documents
    #[serde(default = "TelegramSection::directory_default")]
    pub directory: PathBuf,
}

impl Default for TelegramSection {
    fn default() -> Self {
        Self {
            id: Self::id_default(),
            directory: Self::directory_default(),
        }
    }
}

impl TelegramSection {
    fn id_default() -> String {
        "generic-obis".to_string()
    }

    fn directory_default() -> PathBuf {
        PathBuf::from("telegrams")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub serial: SerialSection,
    #[serde(default)]
    pub security: SecuritySection,
    #[serde(default)]
    pub telegram: TelegramSection,
    #[serde(default)]
    pub listener: ListenerConfig,
}

impl Settings {
    /// Load `path` (if it exists) and the `DLMS__*` environment
    ///
    /// # Errors
    /// `DlmsError::Configuration` for unreadable files and invalid values
    pub fn load(path: &Path) -> DlmsResult<Self> {
        Self::load_with_env(path, None)
    }

    /// `env` replaces the process environment when given
    fn load_with_env(path: &Path, env: Option<config::Map<String, String>>) -> DlmsResult<Self> {
        // values stay strings (keys may be all digits); numbers are coerced on deserialisation
        let settings: Settings = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(false))
            .add_source(Environment::with_prefix("DLMS").separator("__").source(env))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| DlmsError::Configuration(format!("{}: {}", path.display(), e)))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> DlmsResult<()> {
        self.serial.to_settings()?;
        self.security.keys()?;
        if self.telegram.id.trim().is_empty() {
            return Err(DlmsError::Configuration(
                "telegram.id must not be empty".to_string(),
            ));
        }
        self.listener.validate()
    }
}
