//! Continuous read loop over the selected device.

use tracing::{debug, error, info, warn};

use super::{CancelToken, Inner};
use crate::error::ConnectorError;
use crate::events::ConnectorEvent;
use crate::message::{MessageKind, ReceivedMessage};
use crate::transport::TransportError;

/// Map a read failure onto the connector taxonomy.
///
/// `None` means the failure is routine and carries no information (a read
/// timeout). Recoverable outcomes are [`ConnectorError::DeviceRemoved`] and
/// [`ConnectorError::NotYetInitialized`]; anything else is fatal.
pub fn classify_read_error(device_id: &str, err: TransportError) -> Option<ConnectorError> {
    match err {
        TransportError::Timeout { .. } => None,
        TransportError::Disconnected | TransportError::DeviceNotFound { .. } => {
            Some(ConnectorError::DeviceRemoved {
                device_id: device_id.to_string(),
            })
        }
        TransportError::NotInitialized => Some(ConnectorError::NotYetInitialized {
            device_id: device_id.to_string(),
        }),
        other => Some(ConnectorError::ContinuousRead(other)),
    }
}

/// Body of the read thread. Returns when cancelled or on a fatal error.
pub(super) fn run<K: MessageKind>(
    inner: &Inner<K>,
    cancel: &CancelToken,
) -> Result<(), ConnectorError> {
    let idle_backoff = inner.config.idle_backoff();
    let read_timeout = inner.config.read_timeout();
    info!(kind = K::NAME, "Read loop started");

    while !cancel.is_cancelled() {
        let Some((generation, device)) = inner.device_for_read() else {
            cancel.wait_timeout(idle_backoff);
            continue;
        };

        let err = match device.read(read_timeout) {
            Ok(data) => {
                dispatch(inner, device.device_id(), &data);
                continue;
            }
            Err(err) => err,
        };

        match classify_read_error(device.device_id(), err) {
            None => {}
            Some(ConnectorError::DeviceRemoved { device_id }) => {
                warn!(device_id = %device_id, "Device removed, deselecting");
                if !inner.deselect_removed(generation) {
                    debug!(device_id = %device_id, "Selection already changed");
                }
            }
            Some(ConnectorError::NotYetInitialized { device_id }) => {
                debug!(device_id = %device_id, "Device not yet initialized");
                cancel.wait_timeout(idle_backoff);
            }
            Some(fatal) => {
                error!(device_id = %device.device_id(), error = %fatal, "Read loop failed");
                if !inner.release_generation(generation) {
                    debug!(device_id = %device.device_id(), "Selection already changed");
                }
                inner.publish(ConnectorEvent::ReadLoopFailed {
                    message: fatal.to_string(),
                });
                cancel.cancel();
                return Err(fatal);
            }
        }
    }

    info!("Read loop stopped");
    Ok(())
}

fn dispatch<K: MessageKind>(inner: &Inner<K>, device_id: &str, data: &[u8]) {
    match ReceivedMessage::<K>::from_bytes(data) {
        Ok(message) => {
            debug!(device_id = %device_id, len = data.len(), "Message received");
            inner.publish(ConnectorEvent::MessageReceived(message));
        }
        Err(e) => {
            warn!(
                device_id = %device_id,
                len = data.len(),
                error = %e,
                "Dropping unparseable message"
            );
        }
    }
}
