//! Device registry: the filter list and filtered enumeration.

use tracing::{debug, instrument};

use crate::device::{DeviceDescriptor, FilterCriterion, contains_ignore_case};
use crate::error::ConnectorError;
use crate::transport::HidTransport;

/// Holds the enumeration filters and the last filtered device list.
#[derive(Debug, Default, Clone)]
pub struct DeviceRegistry {
    filters: Vec<FilterCriterion>,
    interface: String,
    devices: Vec<DeviceDescriptor>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a filter. Duplicates are kept.
    pub fn add_filter(&mut self, criterion: FilterCriterion) {
        debug!(filter = %criterion, "Added device filter");
        self.filters.push(criterion);
    }

    pub fn filters(&self) -> &[FilterCriterion] {
        &self.filters
    }

    /// Set the interface token applied after enumeration. Empty keeps all.
    pub fn set_interface(&mut self, token: impl Into<String>) {
        self.interface = token.into();
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Devices found by the last successful [`refresh_filtered`](Self::refresh_filtered).
    pub fn devices(&self) -> &[DeviceDescriptor] {
        &self.devices
    }

    /// Enumerate devices matching the filter list.
    ///
    /// A transport failure is returned as-is; no partial list is produced.
    #[instrument(level = "debug", skip(self, transport))]
    pub fn refresh(
        &self,
        transport: &dyn HidTransport,
    ) -> Result<Vec<DeviceDescriptor>, ConnectorError> {
        transport
            .enumerate(&self.filters)
            .map_err(ConnectorError::EnumerationFailed)
    }

    /// Enumerate, apply the interface token and remember the result.
    pub fn refresh_filtered(
        &mut self,
        transport: &dyn HidTransport,
    ) -> Result<&[DeviceDescriptor], ConnectorError> {
        let devices = self.refresh(transport)?;
        self.devices = apply_interface_filter(devices, &self.interface);
        debug!(count = self.devices.len(), "Device list refreshed");
        Ok(&self.devices)
    }
}

/// Keep only devices whose id contains `token`, ignoring case.
///
/// An empty token keeps every device.
pub fn apply_interface_filter(
    mut devices: Vec<DeviceDescriptor>,
    token: &str,
) -> Vec<DeviceDescriptor> {
    devices.retain(|d| contains_ignore_case(&d.device_id, token));
    devices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    fn sample() -> Vec<DeviceDescriptor> {
        vec![
            DeviceDescriptor::new("1-2:16c0:0486:mi_00", 0x16C0, 0x0486),
            DeviceDescriptor::new("1-2:16c0:0486:MI_01", 0x16C0, 0x0486),
        ]
    }

    #[test]
    fn test_empty_token_keeps_all() {
        assert_eq!(apply_interface_filter(sample(), ""), sample());
    }

    #[test]
    fn test_token_matches_ignoring_case() {
        let kept = apply_interface_filter(sample(), "mi_01");
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].device_id, "1-2:16c0:0486:MI_01");
    }

    #[test]
    fn test_non_matching_token_yields_empty() {
        assert!(apply_interface_filter(sample(), "mi_07").is_empty());
    }

    #[test]
    fn test_refresh_uses_filters() {
        let mock = MockTransport::new();
        for desc in sample() {
            mock.add_device(desc, 64);
        }
        mock.add_device(
            DeviceDescriptor::new("2-1:8086:e004:mi_00", 0x8086, 0xE004),
            64,
        );

        let mut registry = DeviceRegistry::new();
        registry.add_filter(FilterCriterion::new(0x16C0, None));
        registry.add_filter(FilterCriterion::new(0x16C0, None));
        assert_eq!(registry.filters().len(), 2);

        let found = registry.refresh(&mock).unwrap();
        assert_eq!(found, sample());

        registry.set_interface("MI_00");
        let filtered = registry.refresh_filtered(&mock).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(registry.devices()[0].device_id, "1-2:16c0:0486:mi_00");
    }

    #[test]
    fn test_refresh_failure_is_not_partial() {
        let mock = MockTransport::new();
        mock.add_device(sample().remove(0), 64);

        let mut registry = DeviceRegistry::new();
        registry.add_filter(FilterCriterion::new(0x16C0, None));
        registry.refresh_filtered(&mock).unwrap();
        assert_eq!(registry.devices().len(), 1);

        mock.fail_enumeration(Some("hub reset"));
        let err = registry.refresh_filtered(&mock).unwrap_err();
        assert!(matches!(err, ConnectorError::EnumerationFailed(_)));
        assert!(err.to_string().contains("hub reset"));
        // Previous list is left untouched
        assert_eq!(registry.devices().len(), 1);
    }
}
