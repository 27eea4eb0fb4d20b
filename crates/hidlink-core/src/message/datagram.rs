//! Simple datagram framing.
//!
//! A datagram is a reserved header followed by the payload. The header is
//! currently empty; its length is kept as a constant so a future protocol
//! revision can claim it without changing callers.

use std::fmt;
use std::marker::PhantomData;

use thiserror::Error;

use super::kind::{EncodableKind, MessageKind, RawDatagram};
use crate::bytes::CodecError;

/// Length of the reserved datagram header.
pub const HEADER_LEN: usize = 0;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("{what} cannot be absent")]
    NullInput { what: &'static str },

    #[error("Datagram too short: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Invalid {kind} payload: {message}")]
    InvalidPayload { kind: &'static str, message: String },

    #[error("Payload field: {0}")]
    Codec(#[from] CodecError),
}

/// A datagram received from a device, decoded as kind `K`.
pub struct ReceivedMessage<K: MessageKind = RawDatagram> {
    payload: Vec<u8>,
    fields: K::Fields,
    _kind: PhantomData<K>,
}

impl<K: MessageKind> ReceivedMessage<K> {
    /// Build a message from raw datagram bytes.
    ///
    /// Strips the reserved header, keeps the remainder as the payload and
    /// runs the kind's parse hook over it.
    pub fn from_bytes<'a>(data: impl Into<Option<&'a [u8]>>) -> Result<Self, FramingError> {
        let data = data
            .into()
            .ok_or(FramingError::NullInput { what: "datagram" })?;
        let payload = data.get(HEADER_LEN..).ok_or(FramingError::Truncated {
            expected: HEADER_LEN,
            actual: data.len(),
        })?;
        let fields = K::parse_payload(payload)?;

        Ok(Self {
            payload: payload.to_vec(),
            fields,
            _kind: PhantomData,
        })
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Fields produced by the kind's parse hook.
    pub fn fields(&self) -> &K::Fields {
        &self.fields
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

impl<K: MessageKind> Clone for ReceivedMessage<K> {
    fn clone(&self) -> Self {
        Self {
            payload: self.payload.clone(),
            fields: self.fields.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K: MessageKind> fmt::Debug for ReceivedMessage<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceivedMessage")
            .field("kind", &K::NAME)
            .field("payload", &self.payload)
            .field("fields", &self.fields)
            .finish()
    }
}

/// A datagram ready to be written to a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendableMessage {
    payload: Vec<u8>,
}

impl SendableMessage {
    /// Wrap a payload. An empty payload is valid; an absent one is not.
    pub fn new(payload: impl Into<Option<Vec<u8>>>) -> Result<Self, FramingError> {
        let payload = payload
            .into()
            .ok_or(FramingError::NullInput { what: "payload" })?;
        Ok(Self { payload })
    }

    /// Encode typed fields with the kind's serializer.
    pub fn from_fields<K: EncodableKind>(fields: &K::Fields) -> Self {
        Self {
            payload: K::serialize_fields(fields),
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Serialize to wire bytes: reserved header, then payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut datagram = Vec::with_capacity(HEADER_LEN + self.payload.len());
        datagram.extend_from_slice(&[0u8; HEADER_LEN]);
        datagram.extend_from_slice(&self.payload);
        datagram
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytes::{
        big_endian_to_int, int_to_big_endian, int_to_little_endian, little_endian_to_int,
    };

    /// Records the payload its hook was handed.
    #[derive(Debug, Clone)]
    struct Recording;

    impl MessageKind for Recording {
        type Fields = Option<Vec<u8>>;
        const NAME: &'static str = "recording";

        fn parse_payload(payload: &[u8]) -> Result<Self::Fields, FramingError> {
            Ok(Some(payload.to_vec()))
        }
    }

    /// Same fields as `Recording` but keeps the default hook.
    #[derive(Debug, Clone)]
    struct Unparsed;

    impl MessageKind for Unparsed {
        type Fields = Option<Vec<u8>>;
        const NAME: &'static str = "unparsed";
    }

    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    struct Telemetry {
        counter: i32,
        level: i32,
    }

    #[derive(Debug, Clone)]
    struct TelemetryKind;

    impl MessageKind for TelemetryKind {
        type Fields = Telemetry;
        const NAME: &'static str = "telemetry";

        fn parse_payload(payload: &[u8]) -> Result<Self::Fields, FramingError> {
            if payload.len() != 8 {
                return Err(FramingError::InvalidPayload {
                    kind: Self::NAME,
                    message: format!("expected 8 bytes, got {}", payload.len()),
                });
            }
            Ok(Telemetry {
                counter: big_endian_to_int(&payload[..4])?,
                level: little_endian_to_int(&payload[4..])?,
            })
        }
    }

    impl EncodableKind for TelemetryKind {
        fn serialize_fields(fields: &Self::Fields) -> Vec<u8> {
            let mut out = int_to_big_endian(fields.counter).to_vec();
            out.extend_from_slice(&int_to_little_endian(fields.level));
            out
        }
    }

    #[test]
    fn test_received_requires_data() {
        let err = ReceivedMessage::<RawDatagram>::from_bytes(None).unwrap_err();
        assert_eq!(err, FramingError::NullInput { what: "datagram" });
    }

    #[test]
    fn test_received_keeps_payload() {
        let raw = [0x01u8, 0x02, 0x03, 0x04, 0x05, 0x06];
        let msg = ReceivedMessage::<RawDatagram>::from_bytes(&raw[..]).unwrap();
        assert_eq!(msg.payload(), &raw);

        let empty = ReceivedMessage::<RawDatagram>::from_bytes(&[0u8; 0][..]).unwrap();
        assert!(empty.payload().is_empty());
    }

    #[test]
    fn test_parse_hook_sees_payload() {
        let raw = [0x01u8, 0x02, 0x03, 0x04, 0x05, 0x06];
        let msg = ReceivedMessage::<Recording>::from_bytes(&raw[..]).unwrap();
        assert_eq!(msg.fields().as_deref(), Some(msg.payload()));
    }

    #[test]
    fn test_default_parse_hook_is_noop() {
        let raw = [0xAAu8, 0xBB];
        let msg = ReceivedMessage::<Unparsed>::from_bytes(&raw[..]).unwrap();
        assert_eq!(msg.fields(), &None);
        assert_eq!(msg.payload(), &raw);
    }

    #[test]
    fn test_typed_kind_decodes_fields() {
        let raw = [0x00u8, 0x00, 0x01, 0x2C, 0x89, 0x1C, 0x06, 0x00];
        let msg = ReceivedMessage::<TelemetryKind>::from_bytes(&raw[..]).unwrap();
        assert_eq!(
            msg.fields(),
            &Telemetry {
                counter: 300,
                level: 400521
            }
        );

        let echoed = SendableMessage::from_fields::<TelemetryKind>(msg.fields());
        assert_eq!(echoed.to_bytes(), raw);
    }

    #[test]
    fn test_parse_hook_error_propagates() {
        let result = ReceivedMessage::<TelemetryKind>::from_bytes(&[0x01u8][..]);
        let err = result.unwrap_err();
        assert!(matches!(
            err,
            FramingError::InvalidPayload {
                kind: "telemetry",
                ..
            }
        ));
    }

    #[test]
    fn test_sendable_requires_payload() {
        let err = SendableMessage::new(None).unwrap_err();
        assert_eq!(err, FramingError::NullInput { what: "payload" });
    }

    #[test]
    fn test_sendable_to_bytes_is_payload() {
        let payload = vec![0x01, 0x02, 0x03, 0x04, 0x05];
        let msg = SendableMessage::new(payload.clone()).unwrap();
        assert_eq!(msg.payload(), payload.as_slice());
        assert_eq!(msg.to_bytes(), payload);

        let empty = SendableMessage::new(Vec::new()).unwrap();
        assert!(empty.to_bytes().is_empty());
    }
}
