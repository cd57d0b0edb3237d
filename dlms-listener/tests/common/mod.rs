//! Synthetic meter traffic shared by the session scenarios
#![allow(dead_code)]

use async_trait::async_trait;
use dlms_application::DataNotification;
use dlms_core::{DataObject, DlmsError, DlmsResult, ObisCode, ScalerUnit, Unit};
use dlms_listener::{ListenerConfig, ReconnectPolicy, SessionController, SessionHandle, TelegramPipeline};
use dlms_mapper::{TelegramDefinition, TelegramDocument};
use dlms_security::{SecurityControl, SecurityKeys, SecurityLayer, SystemTitle};
use dlms_session::{HdlcAddress, HdlcAddressPair, HdlcFrame};
use dlms_transport::{IoStream, LinkConnector, StreamAccessor};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::Instant;

pub const AUTHENTICATION_KEY: &str = "D0D1D2D3D4D5D6D7D8D9DADBDCDDDEDF";
pub const BLOCK_CIPHER_KEY: &str = "000102030405060708090A0B0C0D0E0F";

pub const DEFINITION: &str = r#"
version: "1.0"
info:
  id: test-meter
  name: Test meter
  distributer: Example Grid
  country: AT
registers:
  - { class_id: 1, obis: "0.0.96.1.0.255", name: SERIAL }
  - { class_id: 3, obis: "1.0.1.8.0.255", name: ACTIVE_ENERGY_IMPORT }
  - { class_id: 3, obis: "1.0.1.7.0.255", name: ACTIVE_POWER_IMPORT, unit: W }
  - { class_id: 3, obis: "1.0.2.7.0.255", name: ACTIVE_POWER_EXPORT, unit: W }
"#;

pub fn definition() -> Arc<TelegramDefinition> {
    let document = TelegramDocument::from_yaml(DEFINITION).unwrap();
    Arc::new(TelegramDefinition::try_from(document).unwrap())
}

pub fn keys() -> SecurityKeys {
    SecurityKeys::from_hex(AUTHENTICATION_KEY, BLOCK_CIPHER_KEY, "").unwrap()
}

/// Defaults with deterministic backoff: 1 s, ×2, capped at 5 s
pub fn config() -> ListenerConfig {
    ListenerConfig {
        reconnect: ReconnectPolicy {
            initial_interval_ms: 1_000,
            max_interval_ms: 5_000,
            multiplier: 2.0,
            randomization_factor: 0.0,
        },
        ..ListenerConfig::default()
    }
}

/// One self-describing entry: OBIS code, value and optional scaler-unit
pub fn entry(obis: ObisCode, value: DataObject, scaler_unit: Option<(i8, Unit)>) -> Vec<DataObject> {
    let mut items = vec![DataObject::OctetString(obis.as_bytes().to_vec()), value];
    if let Some((scaler, unit)) = scaler_unit {
        items.push(ScalerUnit::new(scaler, unit).to_data_object());
    }
    items
}

/// Cleartext data-notification APDU with a flat structure body
pub fn notification(entries: Vec<Vec<DataObject>>) -> Vec<u8> {
    let body = DataObject::Structure(entries.into_iter().flatten().collect());
    DataNotification::new(0x4000_0001, None, body).encode()
}

/// Notification carrying active power import in W
pub fn power_notification(watts: u32) -> Vec<u8> {
    notification(vec![entry(
        ObisCode::new(1, 0, 1, 7, 0, 255),
        DataObject::Unsigned32(watts),
        Some((0, Unit::Watt)),
    )])
}

/// Apply authenticated encryption as the meter would
pub fn protect(plaintext: &[u8], invocation_counter: u32) -> Vec<u8> {
    SecurityLayer::new(keys())
        .protect(
            SystemTitle::new(*b"TST00001"),
            SecurityControl::new(0, true, true, false),
            invocation_counter,
            plaintext,
        )
        .unwrap()
}

pub fn address_pair() -> HdlcAddressPair {
    HdlcAddressPair::new(
        HdlcAddress::new_with_physical(0x01, 0x11).unwrap(),
        HdlcAddress::new(0x10).unwrap(),
    )
}

/// One UI frame with flags around `apdu`
pub fn frame(apdu: &[u8]) -> Vec<u8> {
    HdlcFrame::new_unnumbered_information(address_pair(), apdu.to_vec(), false)
        .encode_with_flags()
        .unwrap()
}

/// `apdu` split into I-frames of at most `max_information` bytes
pub fn segmented(apdu: &[u8], max_information: usize) -> Vec<Vec<u8>> {
    HdlcFrame::segment(address_pair(), apdu, max_information)
        .unwrap()
        .iter()
        .map(|f| f.encode_with_flags().unwrap())
        .collect()
}

pub enum Link {
    Stream(tokio_test::io::Mock),
    Refuse,
}

/// Connector handing out scripted links in order, refusing once exhausted
pub struct ScriptedConnector {
    links: Mutex<VecDeque<Link>>,
    attempts: mpsc::UnboundedSender<Instant>,
    ends_at_eof: bool,
}

impl ScriptedConnector {
    pub fn new(links: Vec<Link>, ends_at_eof: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<Instant>) {
        let (attempts, rx) = mpsc::unbounded_channel();
        let connector = Self {
            links: Mutex::new(links.into()),
            attempts,
            ends_at_eof,
        };
        (Arc::new(connector), rx)
    }
}

#[async_trait]
impl LinkConnector for ScriptedConnector {
    async fn connect(&self) -> DlmsResult<Box<dyn StreamAccessor>> {
        let _ = self.attempts.send(Instant::now());
        let next = self.links.lock().unwrap().pop_front();
        match next {
            Some(Link::Stream(mock)) => Ok(Box::new(IoStream::new(mock))),
            _ => Err(DlmsError::Connection(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no such device",
            ))),
        }
    }

    fn describe(&self) -> String {
        "scripted link".to_string()
    }

    fn ends_at_eof(&self) -> bool {
        self.ends_at_eof
    }
}

pub fn controller(
    connector: Arc<ScriptedConnector>,
    keys: SecurityKeys,
) -> (SessionController, SessionHandle) {
    controller_with_config(connector, keys, config())
}

pub fn controller_with_config(
    connector: Arc<ScriptedConnector>,
    keys: SecurityKeys,
    config: ListenerConfig,
) -> (SessionController, SessionHandle) {
    let pipeline = TelegramPipeline::from_definition(definition(), keys, config.max_apdu_size);
    let controller = SessionController::new(connector, pipeline, config).unwrap();
    let handle = controller.handle();
    (controller, handle)
}
