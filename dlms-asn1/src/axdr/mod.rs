//! A-XDR encoding/decoding module

pub mod encoder;
pub mod decoder;
pub mod types;

pub use encoder::AxdrEncoder;
pub use decoder::AxdrDecoder;
pub use types::{AxdrTag, LengthEncoding};
