//! Device listener: polls enumeration and reports arrivals and removals.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use super::{CancelToken, Inner};
use crate::device::DeviceDescriptor;
use crate::events::ConnectorEvent;
use crate::lock;
use crate::message::MessageKind;
use crate::registry::apply_interface_filter;

/// Devices that appeared and disappeared between two polls.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeviceChanges {
    pub arrived: Vec<DeviceDescriptor>,
    pub departed: Vec<String>,
}

impl DeviceChanges {
    pub fn is_empty(&self) -> bool {
        self.arrived.is_empty() && self.departed.is_empty()
    }
}

/// Compare two device lists by device id, keeping list order.
pub fn diff_devices(previous: &[DeviceDescriptor], current: &[DeviceDescriptor]) -> DeviceChanges {
    let before: HashSet<&str> = previous.iter().map(|d| d.device_id.as_str()).collect();
    let after: HashSet<&str> = current.iter().map(|d| d.device_id.as_str()).collect();

    DeviceChanges {
        arrived: current
            .iter()
            .filter(|d| !before.contains(d.device_id.as_str()))
            .cloned()
            .collect(),
        departed: previous
            .iter()
            .filter(|d| !after.contains(d.device_id.as_str()))
            .map(|d| d.device_id.clone())
            .collect(),
    }
}

/// Body of the listener thread. Never touches the selection.
pub(super) fn run<K: MessageKind>(inner: &Inner<K>, cancel: &CancelToken) {
    let poll_interval = inner.config.poll_interval();
    let mut known: Vec<DeviceDescriptor> = Vec::new();
    info!(
        interval_ms = poll_interval.as_millis() as u64,
        "Device listener started"
    );

    while !cancel.is_cancelled() {
        let (filters, interface) = {
            let registry = lock(&inner.registry);
            (
                registry.filters().to_vec(),
                registry.interface().to_string(),
            )
        };

        match inner.transport.enumerate(&filters) {
            Ok(devices) => {
                let current = apply_interface_filter(devices, &interface);
                let changes = diff_devices(&known, &current);
                if !changes.is_empty() {
                    debug!(
                        arrived = changes.arrived.len(),
                        departed = changes.departed.len(),
                        "Device list changed"
                    );
                }
                for descriptor in changes.arrived {
                    inner.publish(ConnectorEvent::DeviceConnected { descriptor });
                }
                for device_id in changes.departed {
                    inner.publish(ConnectorEvent::DeviceDisconnected { device_id });
                }
                known = current;
            }
            Err(e) => warn!(error = %e, "Device poll failed"),
        }

        if cancel.wait_timeout(poll_interval) {
            break;
        }
    }

    info!("Device listener stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev(id: &str) -> DeviceDescriptor {
        DeviceDescriptor::new(id, 0x16C0, 0x0486)
    }

    #[test]
    fn test_first_poll_reports_everything() {
        let changes = diff_devices(&[], &[dev("a"), dev("b")]);
        assert_eq!(changes.arrived, vec![dev("a"), dev("b")]);
        assert!(changes.departed.is_empty());
    }

    #[test]
    fn test_arrival_and_departure() {
        let changes = diff_devices(&[dev("a"), dev("b")], &[dev("b"), dev("c")]);
        assert_eq!(changes.arrived, vec![dev("c")]);
        assert_eq!(changes.departed, vec!["a".to_string()]);
    }

    #[test]
    fn test_unchanged_list_is_quiet() {
        let list = [dev("a"), dev("b")];
        assert!(diff_devices(&list, &list).is_empty());
    }
}
