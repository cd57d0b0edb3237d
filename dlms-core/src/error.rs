use thiserror::Error;

/// Main error type for DLMS push acquisition
#[derive(Error, Debug)]
pub enum DlmsError {
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Security error: {0}")]
    Security(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Ciphered APDU received but no {0} is configured")]
    MissingKey(&'static str),

    #[error("Timeout")]
    Timeout,

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("A-XDR decoding error: {0}")]
    Asn1Decoding(String),

    #[error("Frame invalid: {0}")]
    FrameInvalid(String),

    #[error("Unsupported APDU tag: 0x{0:02X}")]
    UnsupportedApdu(u8),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Mapping error: {0}")]
    Mapping(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Failure category used by the session controller to pick a recovery path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Checksum, length or oversized-buffer problems on the link layer
    Framing,
    /// Missing key or authentication tag mismatch
    Security,
    /// Malformed or unsupported COSEM content
    Decode,
    /// Register mapping could not complete
    Mapping,
    /// The byte stream itself failed
    Io,
    /// Invalid startup input
    Configuration,
}

impl ErrorClass {
    /// Whether a failure of this class counts toward the fault threshold
    pub fn counts_toward_fault(&self) -> bool {
        matches!(
            self,
            ErrorClass::Framing | ErrorClass::Security | ErrorClass::Decode
        )
    }

    /// Whether a failure of this class ends the current connection
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, ErrorClass::Io)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Framing => "framing",
            ErrorClass::Security => "security",
            ErrorClass::Decode => "decode",
            ErrorClass::Mapping => "mapping",
            ErrorClass::Io => "io",
            ErrorClass::Configuration => "configuration",
        }
    }
}

impl DlmsError {
    /// Classify this error
    pub fn class(&self) -> ErrorClass {
        match self {
            DlmsError::FrameInvalid(_) => ErrorClass::Framing,
            DlmsError::Security(_)
            | DlmsError::AuthenticationFailed(_)
            | DlmsError::MissingKey(_) => ErrorClass::Security,
            DlmsError::Protocol(_)
            | DlmsError::InvalidData(_)
            | DlmsError::Asn1Decoding(_)
            | DlmsError::UnsupportedApdu(_)
            | DlmsError::Decode(_) => ErrorClass::Decode,
            DlmsError::Mapping(_) => ErrorClass::Mapping,
            DlmsError::Connection(_) | DlmsError::Timeout => ErrorClass::Io,
            DlmsError::Configuration(_) => ErrorClass::Configuration,
        }
    }
}

/// Result type alias for DLMS operations
pub type DlmsResult<T> = Result<T, DlmsError>;
