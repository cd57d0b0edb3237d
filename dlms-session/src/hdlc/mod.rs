//! HDLC framing for push telegrams

pub mod address;
pub mod fcs;
pub mod frame;
pub mod reader;
pub mod statistics;

pub use address::{HdlcAddress, HdlcAddressPair};
pub use fcs::FcsCalc;
pub use frame::{strip_llc, FrameDefect, FrameType, HdlcFrame, FLAG, LLC_REQUEST, LLC_RESPONSE};
pub use reader::{
    FrameReaderConfig, HdlcFrameReader, DEFAULT_INTER_FRAME_TIMEOUT, DEFAULT_MAX_APDU_SIZE,
};
pub use statistics::FramingStatistics;
