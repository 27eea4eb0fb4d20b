//! Event system for decoupling the connector from its owner.
//!
//! The owner registers one observer when building the connector; the
//! connector never reaches for a process-wide bus.

use std::sync::mpsc::Sender;

use crate::connector::ConnectionState;
use crate::device::DeviceDescriptor;
use crate::message::{MessageKind, RawDatagram, ReceivedMessage};

/// Events emitted by a connector.
#[derive(Debug, Clone)]
pub enum ConnectorEvent<K: MessageKind = RawDatagram> {
    /// A filtered device appeared (device listener).
    DeviceConnected { descriptor: DeviceDescriptor },
    /// A filtered device went away (device listener).
    DeviceDisconnected { device_id: String },
    /// Selection slot changed.
    DeviceSelected { device_id: Option<String> },
    /// Connection state changed.
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    /// A datagram was read from the selected device.
    MessageReceived(ReceivedMessage<K>),
    /// The read loop saw the selected device disappear and deselected it.
    DeviceRemoved { device_id: String },
    /// The read loop stopped on an unrecoverable error.
    ReadLoopFailed { message: String },
}

/// Observer trait for receiving connector events.
///
/// Called from the connector's background threads as well as the caller's.
pub trait ConnectorObserver<K: MessageKind = RawDatagram>: Send + Sync {
    fn on_event(&self, event: &ConnectorEvent<K>);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl<K: MessageKind> ConnectorObserver<K> for NullObserver {
    fn on_event(&self, _event: &ConnectorEvent<K>) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl<K: MessageKind> ConnectorObserver<K> for TracingObserver {
    fn on_event(&self, event: &ConnectorEvent<K>) {
        match event {
            ConnectorEvent::DeviceConnected { descriptor } => {
                tracing::info!(
                    device_id = %descriptor.device_id,
                    vid = %format!("{:04X}", descriptor.vendor_id),
                    pid = %format!("{:04X}", descriptor.product_id),
                    "Device connected"
                );
            }
            ConnectorEvent::DeviceDisconnected { device_id } => {
                tracing::info!(device_id = %device_id, "Device disconnected");
            }
            ConnectorEvent::DeviceSelected { device_id } => {
                tracing::info!(device_id = ?device_id, "Device selected");
            }
            ConnectorEvent::StateChanged { from, to } => {
                tracing::debug!(from = %from, to = %to, "State changed");
            }
            ConnectorEvent::MessageReceived(message) => {
                tracing::trace!(
                    kind = K::NAME,
                    len = message.payload().len(),
                    "Message received"
                );
            }
            ConnectorEvent::DeviceRemoved { device_id } => {
                tracing::warn!(device_id = %device_id, "Device removed");
            }
            ConnectorEvent::ReadLoopFailed { message } => {
                tracing::error!("Read loop failed: {}", message);
            }
        }
    }
}

/// Observer that forwards every event into a channel.
pub struct ChannelObserver<K: MessageKind = RawDatagram> {
    sender: Sender<ConnectorEvent<K>>,
}

impl<K: MessageKind> ChannelObserver<K> {
    pub fn new(sender: Sender<ConnectorEvent<K>>) -> Self {
        Self { sender }
    }
}

impl<K: MessageKind> ConnectorObserver<K> for ChannelObserver<K> {
    fn on_event(&self, event: &ConnectorEvent<K>) {
        // The receiver may be gone during shutdown.
        let _ = self.sender.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_channel_observer_forwards() {
        let (tx, rx) = mpsc::channel();
        let observer = ChannelObserver::<RawDatagram>::new(tx);
        observer.on_event(&ConnectorEvent::DeviceDisconnected {
            device_id: "dev-a".into(),
        });

        match rx.try_recv().unwrap() {
            ConnectorEvent::DeviceDisconnected { device_id } => assert_eq!(device_id, "dev-a"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_channel_observer_survives_dropped_receiver() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let observer = ChannelObserver::<RawDatagram>::new(tx);
        observer.on_event(&ConnectorEvent::ReadLoopFailed {
            message: "boom".into(),
        });
    }
}
