//! Message framing - the "simple datagram" wire contract.

pub mod datagram;
pub mod kind;

pub use datagram::{FramingError, HEADER_LEN, ReceivedMessage, SendableMessage};
pub use kind::{EncodableKind, MessageKind, RawDatagram};
