//! Message kinds: typed views over a datagram payload.
//!
//! A kind is a zero-sized marker type that carries a pure decode function
//! (payload bytes to typed fields) and, for kinds that can be sent, the
//! matching encode function. The framing layer is generic over the kind
//! instead of dispatching through an overridable method.

use std::fmt;

use super::datagram::FramingError;

/// Decoding half of a message kind.
pub trait MessageKind: fmt::Debug + Clone + Send + Sync + 'static {
    /// Typed fields extracted from the payload.
    type Fields: Clone + fmt::Debug + Default + Send + Sync + 'static;

    /// Short name used in diagnostics.
    const NAME: &'static str;

    /// Decode typed fields from a payload.
    ///
    /// The default hook does nothing and leaves the fields at their default
    /// value; the payload itself is always kept on the message.
    fn parse_payload(payload: &[u8]) -> Result<Self::Fields, FramingError> {
        let _ = payload;
        Ok(Self::Fields::default())
    }
}

/// Encoding half of a message kind, the inverse of [`MessageKind::parse_payload`].
pub trait EncodableKind: MessageKind {
    fn serialize_fields(fields: &Self::Fields) -> Vec<u8>;
}

/// Untyped datagram: only the payload bytes are meaningful.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawDatagram;

impl MessageKind for RawDatagram {
    type Fields = ();

    const NAME: &'static str = "raw";
}
