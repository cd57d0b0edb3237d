//! Application layer for DLMS/COSEM push telegrams
//!
//! Classifies plaintext APDUs, reassembles general-block-transfer, and
//! flattens data- and event-notifications into [`CosemObject`]s tagged with
//! their OBIS codes.
//!
//! [`CosemObject`]: dlms_core::CosemObject

pub mod apdu;
pub mod block;
pub mod decoder;
pub mod error;
pub mod layout;

pub use apdu::{
    ApduKind, CosemAttributeDescriptor, DataNotification, EventNotification,
    LongInvokeIdAndPriority, NotificationKind,
};
pub use block::{BlockTransferAssembler, GeneralBlockTransfer};
pub use decoder::{AxdrDataDecoder, DataDecoder, NotificationDecoder, PushNotification};
pub use error::{DlmsError, DlmsResult};
pub use layout::{CaptureObject, PushLayout, select_layout};
