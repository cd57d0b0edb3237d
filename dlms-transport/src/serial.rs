//! Serial port transport implementation

use crate::error::{DlmsError, DlmsResult};
use crate::stream::{LinkConnector, StreamAccessor, TransportLayer};
use async_trait::async_trait;
use std::fmt;
use std::ops::{Deref, DerefMut};
use tokio::io::AsyncReadExt;
use tokio_serial::{DataBits, FlowControl, Parity, SerialStream, StopBits};

/// Wrapper for SerialStream that implements Debug
struct DebugSerialStream(SerialStream);

impl fmt::Debug for DebugSerialStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialStream").finish()
    }
}

impl Deref for DebugSerialStream {
    type Target = SerialStream;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for DebugSerialStream {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// Serial port transport layer settings
#[derive(Debug, Clone, PartialEq)]
pub struct SerialSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub flow_control: FlowControl,
}

impl SerialSettings {
    /// Create new serial settings with 8N1 framing
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
        }
    }

    /// Build settings from plain configuration values
    ///
    /// `parity` accepts `none`/`even`/`odd` or the single letters `N`/`E`/`O`.
    pub fn from_parts(
        port_name: &str,
        baud_rate: u32,
        data_bits: u8,
        parity: &str,
        stop_bits: u8,
    ) -> DlmsResult<Self> {
        if port_name.trim().is_empty() {
            return Err(DlmsError::Configuration(
                "Serial device path must not be empty".to_string(),
            ));
        }
        if baud_rate == 0 {
            return Err(DlmsError::Configuration(
                "Baud rate must be greater than zero".to_string(),
            ));
        }
        let data_bits = match data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            8 => DataBits::Eight,
            other => {
                return Err(DlmsError::Configuration(format!(
                    "Unsupported data bits: {}",
                    other
                )))
            }
        };
        let parity = match parity.to_ascii_lowercase().as_str() {
            "n" | "none" => Parity::None,
            "e" | "even" => Parity::Even,
            "o" | "odd" => Parity::Odd,
            other => {
                return Err(DlmsError::Configuration(format!(
                    "Unsupported parity: {}",
                    other
                )))
            }
        };
        let stop_bits = match stop_bits {
            1 => StopBits::One,
            2 => StopBits::Two,
            other => {
                return Err(DlmsError::Configuration(format!(
                    "Unsupported stop bits: {}",
                    other
                )))
            }
        };

        Ok(Self {
            port_name: port_name.to_string(),
            baud_rate,
            data_bits,
            stop_bits,
            parity,
            flow_control: FlowControl::None,
        })
    }
}

impl fmt::Display for SerialSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data_bits = match self.data_bits {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        };
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Even => 'E',
            Parity::Odd => 'O',
        };
        let stop_bits = match self.stop_bits {
            StopBits::One => 1,
            StopBits::Two => 2,
        };
        write!(
            f,
            "{} @ {} {}{}{}",
            self.port_name, self.baud_rate, data_bits, parity, stop_bits
        )
    }
}

/// Serial port transport layer implementation
#[derive(Debug)]
pub struct SerialTransport {
    stream: Option<DebugSerialStream>,
    settings: SerialSettings,
    closed: bool,
}

impl SerialTransport {
    /// Create a new serial transport layer
    pub fn new(settings: SerialSettings) -> Self {
        Self {
            stream: None,
            settings,
            closed: true,
        }
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }
}

#[async_trait]
impl TransportLayer for SerialTransport {
    async fn open(&mut self) -> DlmsResult<()> {
        if !self.closed {
            return Err(DlmsError::Connection(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Connection has already been opened",
            )));
        }

        let builder = tokio_serial::new(&self.settings.port_name, self.settings.baud_rate)
            .data_bits(self.settings.data_bits)
            .stop_bits(self.settings.stop_bits)
            .parity(self.settings.parity)
            .flow_control(self.settings.flow_control);

        let stream = SerialStream::open(&builder).map_err(|e| {
            DlmsError::Connection(std::io::Error::other(format!(
                "Failed to open serial port {}: {}",
                self.settings.port_name, e
            )))
        })?;

        self.stream = Some(DebugSerialStream(stream));
        self.closed = false;
        Ok(())
    }
}

#[async_trait]
impl StreamAccessor for SerialTransport {
    async fn read(&mut self, buf: &mut [u8]) -> DlmsResult<usize> {
        let stream = self.stream.as_mut().ok_or_else(|| {
            DlmsError::Connection(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "Serial stream not connected",
            ))
        })?;

        match stream.read(buf).await {
            Ok(0) => {
                self.closed = true;
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) => {
                self.closed = true;
                Err(DlmsError::Connection(e))
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    async fn close(&mut self) -> DlmsResult<()> {
        self.stream = None;
        self.closed = true;
        Ok(())
    }
}

/// Opens the configured serial device on every connection attempt
#[derive(Debug, Clone)]
pub struct SerialConnector {
    settings: SerialSettings,
}

impl SerialConnector {
    pub fn new(settings: SerialSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl LinkConnector for SerialConnector {
    async fn connect(&self) -> DlmsResult<Box<dyn StreamAccessor>> {
        let mut transport = SerialTransport::new(self.settings.clone());
        transport.open().await?;
        Ok(Box::new(transport))
    }

    fn describe(&self) -> String {
        self.settings.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parts_8n1() {
        let settings = SerialSettings::from_parts("/dev/ttyUSB0", 2400, 8, "N", 1).unwrap();
        assert_eq!(settings, SerialSettings::new("/dev/ttyUSB0", 2400));
        assert_eq!(settings.to_string(), "/dev/ttyUSB0 @ 2400 8N1");
    }

    #[test]
    fn test_from_parts_even_parity() {
        let settings = SerialSettings::from_parts("/dev/ttyAMA0", 9600, 7, "even", 2).unwrap();
        assert_eq!(settings.parity, Parity::Even);
        assert_eq!(settings.to_string(), "/dev/ttyAMA0 @ 9600 7E2");
    }

    #[test]
    fn test_from_parts_rejects_invalid_values() {
        assert!(SerialSettings::from_parts("", 2400, 8, "N", 1).is_err());
        assert!(SerialSettings::from_parts("/dev/ttyUSB0", 0, 8, "N", 1).is_err());
        assert!(SerialSettings::from_parts("/dev/ttyUSB0", 2400, 9, "N", 1).is_err());
        assert!(SerialSettings::from_parts("/dev/ttyUSB0", 2400, 8, "mark", 1).is_err());
        assert!(matches!(
            SerialSettings::from_parts("/dev/ttyUSB0", 2400, 8, "N", 3),
            Err(DlmsError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_read_before_open_fails() {
        let mut transport = SerialTransport::new(SerialSettings::new("/dev/null", 2400));
        let mut buf = [0u8; 8];
        assert!(transport.is_closed());
        assert!(transport.read(&mut buf).await.is_err());
    }

    #[tokio::test]
    async fn test_connect_missing_device_is_io_error() {
        let connector = SerialConnector::new(SerialSettings::new("/dev/does-not-exist-dlms", 2400));
        assert!(matches!(
            connector.connect().await,
            Err(DlmsError::Connection(_))
        ));
    }
}
