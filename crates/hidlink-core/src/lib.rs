//! hidlink-core: connector for USB HID peripherals.
//!
//! This crate discovers filtered HID devices, keeps at most one of them
//! selected, drives a continuous read loop against it and frames raw report
//! bytes into typed messages.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Bytes**: fixed-width integer codec
//! - **Message**: datagram framing and typed message kinds
//! - **Transport**: HID device abstraction (nusb, mock)
//! - **Registry**: filter list and filtered enumeration
//! - **Connector**: selection state machine, read loop, device listener and writes
//! - **Events**: Observer pattern for decoupling the owner
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use hidlink_core::{Connector, ConnectorConfig, FilterCriterion, NusbTransport};
//!
//! let connector: Connector = Connector::new(Arc::new(NusbTransport), ConnectorConfig::default());
//! connector.add_filter(FilterCriterion::new(0x16C0, Some(0x0486)));
//! connector.connect().expect("no device");
//!
//! let handle = connector.start().expect("start failed");
//! connector.write(&[0x01, 0x02][..]).expect("write failed");
//! handle.shutdown().expect("read loop failed");
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod bytes;
pub mod config;
pub mod connector;
pub mod device;
pub mod error;
pub mod events;
pub mod message;
pub mod registry;
pub mod transport;

// Re-exports for convenience
pub use bytes::{
    CodecError, big_endian_to_int, int_to_big_endian, int_to_little_endian, little_endian_to_int,
};
pub use config::ConnectorConfig;
pub use connector::{CancelToken, ConnectionState, Connector, ConnectorHandle};
pub use device::{DeviceDescriptor, FilterCriterion};
pub use error::ConnectorError;
pub use events::{ChannelObserver, ConnectorEvent, ConnectorObserver, NullObserver, TracingObserver};
pub use message::{
    EncodableKind, FramingError, MessageKind, RawDatagram, ReceivedMessage, SendableMessage,
};
pub use registry::DeviceRegistry;
pub use transport::{HidDevice, HidTransport, MockTransport, NusbTransport, TransportError};

/// Lock a mutex, recovering the data if a panicking thread poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
