//! Telegram definition documents
//!
//! One YAML document per meter family describes what its push telegrams
//! contain: optional push layouts, the register lookup table and value
//! transformations. [`TelegramDocument`] is the document as written;
//! [`TelegramDefinition`] is the validated, indexed form the mapper uses.

use crate::error::{DlmsError, DlmsResult};
use crate::transform::TransformationRule;
use config::{Config, File, FileFormat};
use dlms_application::PushLayout;
use dlms_core::{AttributeKey, ObisCode};
use dlms_security::{KeyKind, SecurityKeys};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// `info` section of a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelegramInfo {
    pub id: String,
    pub name: String,
    pub distributer: String,
    pub country: String,
    #[serde(default)]
    pub supported_interfaces: Vec<String>,
    #[serde(default)]
    pub multiple_telegrams: bool,
    /// `authentication_key` and/or `block_cipher_key`
    #[serde(default)]
    pub required_keys: Vec<String>,
}

/// One row of the register lookup table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterEntry {
    pub class_id: u16,
    pub obis: ObisCode,
    #[serde(default = "default_attribute")]
    pub attribute: i8,
    pub name: String,
    /// Unit override; a decimal multiple of the meter's unit is converted
    #[serde(default)]
    pub unit: Option<String>,
    /// Scaler override, replacing the meter's scaler-unit
    #[serde(default)]
    pub scaler: Option<i8>,
    #[serde(default)]
    pub multiplier: Option<f64>,
}

fn default_attribute() -> i8 {
    2
}

impl RegisterEntry {
    pub fn new(class_id: u16, obis: ObisCode, name: impl Into<String>) -> Self {
        Self {
            class_id,
            obis,
            attribute: default_attribute(),
            name: name.into(),
            unit: None,
            scaler: None,
            multiplier: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_scaler(mut self, scaler: i8) -> Self {
        self.scaler = Some(scaler);
        self
    }

    pub fn key(&self) -> AttributeKey {
        AttributeKey::new(self.class_id, self.obis, self.attribute)
    }
}

/// A definition document as read from YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelegramDocument {
    pub version: String,
    pub info: TelegramInfo,
    #[serde(default)]
    pub telegrams: Vec<PushLayout>,
    #[serde(default)]
    pub registers: Vec<RegisterEntry>,
    #[serde(default)]
    pub transformations: Vec<TransformationRule>,
}

impl TelegramDocument {
    /// Read a document from a YAML file
    pub fn from_file(path: &Path) -> DlmsResult<Self> {
        Config::builder()
            .add_source(File::from(path).format(FileFormat::Yaml))
            .build()
            .and_then(|c| c.try_deserialize::<Self>())
            .map_err(|e| DlmsError::Configuration(format!("{}: {}", path.display(), e)))
    }

    /// Parse a document from YAML text
    pub fn from_yaml(content: &str) -> DlmsResult<Self> {
        Config::builder()
            .add_source(File::from_str(content, FileFormat::Yaml))
            .build()
            .and_then(|c| c.try_deserialize::<Self>())
            .map_err(|e| DlmsError::Configuration(e.to_string()))
    }

    /// Every rule the document breaks, empty when it is valid
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.version.trim().is_empty() {
            problems.push("version must not be empty".to_string());
        }
        for (field, value) in [
            ("id", &self.info.id),
            ("name", &self.info.name),
            ("distributer", &self.info.distributer),
            ("country", &self.info.country),
        ] {
            if value.trim().is_empty() {
                problems.push(format!("info.{} must not be empty", field));
            }
        }
        for key in &self.info.required_keys {
            if key.parse::<KeyKind>().is_err() {
                problems.push(format!(
                    "info.required_keys: unknown key '{}' (expected authentication_key or block_cipher_key)",
                    key
                ));
            }
        }

        if self.telegrams.len() > 1 && !self.info.multiple_telegrams {
            problems.push(format!(
                "{} telegram layouts declared but info.multiple_telegrams is false",
                self.telegrams.len()
            ));
        }
        for layout in &self.telegrams {
            if let Err(e) = layout.validate() {
                problems.push(e.to_string());
            }
        }

        let mut seen: HashMap<AttributeKey, &str> = HashMap::new();
        for entry in &self.registers {
            if entry.name.trim().is_empty() {
                problems.push(format!("register {} has an empty name", entry.key()));
            }
            if let Some(previous) = seen.insert(entry.key(), &entry.name) {
                problems.push(format!(
                    "register {} defined twice ('{}' and '{}')",
                    entry.key(),
                    previous,
                    entry.name
                ));
            }
        }

        for rule in &self.transformations {
            problems.extend(rule.problems());
        }

        problems
    }

    pub fn validate(&self) -> DlmsResult<()> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(DlmsError::Configuration(format!(
                "telegram '{}': {}",
                self.info.id,
                problems.join("; ")
            )))
        }
    }
}

/// Validated definition indexed for lookup
#[derive(Debug, Clone)]
pub struct TelegramDefinition {
    id: String,
    name: String,
    layouts: Vec<PushLayout>,
    registers: HashMap<AttributeKey, RegisterEntry>,
    by_obis: HashMap<(ObisCode, i8), AttributeKey>,
    transformations: Vec<TransformationRule>,
    required_keys: Vec<KeyKind>,
}

impl TryFrom<TelegramDocument> for TelegramDefinition {
    type Error = DlmsError;

    fn try_from(document: TelegramDocument) -> DlmsResult<Self> {
        document.validate()?;

        let required_keys = document
            .info
            .required_keys
            .iter()
            .map(|k| k.parse::<KeyKind>())
            .collect::<DlmsResult<Vec<_>>>()?;

        let mut registers = HashMap::with_capacity(document.registers.len());
        let mut by_obis = HashMap::with_capacity(document.registers.len());
        for entry in document.registers {
            by_obis.insert((entry.obis, entry.attribute), entry.key());
            registers.insert(entry.key(), entry);
        }

        Ok(Self {
            id: document.info.id,
            name: document.info.name,
            layouts: document.telegrams,
            registers,
            by_obis,
            transformations: document.transformations,
            required_keys,
        })
    }
}

impl TelegramDefinition {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layouts(&self) -> &[PushLayout] {
        &self.layouts
    }

    pub fn transformations(&self) -> &[TransformationRule] {
        &self.transformations
    }

    pub fn required_keys(&self) -> &[KeyKind] {
        &self.required_keys
    }

    pub fn register_count(&self) -> usize {
        self.registers.len()
    }

    /// Exact lookup by class, OBIS code and attribute
    pub fn lookup(&self, key: &AttributeKey) -> Option<&RegisterEntry> {
        self.registers.get(key)
    }

    /// Lookup ignoring the class id
    ///
    /// Self-describing telegrams do not transmit class ids, so the decoder
    /// can only guess them.
    pub fn lookup_by_obis(&self, obis: ObisCode, attribute: i8) -> Option<&RegisterEntry> {
        self.by_obis
            .get(&(obis, attribute))
            .and_then(|key| self.registers.get(key))
    }

    /// Check that every key the meter requires is configured
    pub fn check_keys(&self, keys: &SecurityKeys) -> DlmsResult<()> {
        let missing: Vec<&str> = self
            .required_keys
            .iter()
            .filter(|k| !keys.has(**k))
            .map(|k| k.as_str())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(DlmsError::Configuration(format!(
                "telegram '{}' requires {} to be configured",
                self.id,
                missing.join(" and ")
            )))
        }
    }
}
