//! Device identity: filter criteria and enumerated descriptors.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One entry of the enumeration filter list.
///
/// `product_id: None` matches any product of the vendor. `interface` is a
/// case-insensitive substring matched against the device id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriterion {
    pub vendor_id: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
}

impl FilterCriterion {
    pub fn new(vendor_id: u16, product_id: Option<u16>) -> Self {
        Self {
            vendor_id,
            product_id,
            interface: None,
        }
    }

    pub fn with_interface(mut self, token: impl Into<String>) -> Self {
        self.interface = Some(token.into());
        self
    }

    pub fn matches(&self, vendor_id: u16, product_id: u16, device_id: &str) -> bool {
        self.vendor_id == vendor_id
            && self.product_id.is_none_or(|pid| pid == product_id)
            && self
                .interface
                .as_deref()
                .is_none_or(|token| contains_ignore_case(device_id, token))
    }
}

impl fmt::Display for FilterCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}:", self.vendor_id)?;
        match self.product_id {
            Some(pid) => write!(f, "{:04X}", pid)?,
            None => write!(f, "*")?,
        }
        if let Some(token) = &self.interface {
            write!(f, " ({})", token)?;
        }
        Ok(())
    }
}

/// A connected device as reported by one enumeration call.
///
/// Descriptors are rebuilt on every enumeration; only `device_id` is
/// meaningful for identity across calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub device_id: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub interface_number: Option<u8>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

impl DeviceDescriptor {
    pub fn new(device_id: impl Into<String>, vendor_id: u16, product_id: u16) -> Self {
        Self {
            device_id: device_id.into(),
            vendor_id,
            product_id,
            interface_number: None,
            product: None,
            serial_number: None,
        }
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{:04X}:{:04X}]",
            self.device_id, self.vendor_id, self.product_id
        )?;
        if let Some(product) = &self.product {
            write!(f, " {}", product)?;
        }
        Ok(())
    }
}

/// Case-insensitive substring test. An empty needle always matches.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_any_product() {
        let filter = FilterCriterion::new(0x16C0, None);
        assert!(filter.matches(0x16C0, 0x0486, "usb-1:16c0:0486:mi_00"));
        assert!(filter.matches(0x16C0, 0x0001, "usb-1:16c0:0001:mi_00"));
        assert!(!filter.matches(0x8086, 0x0486, "usb-1:8086:0486:mi_00"));
    }

    #[test]
    fn test_filter_product_and_interface() {
        let filter = FilterCriterion::new(0x16C0, Some(0x0486));
        let filter = filter.with_interface("MI_01");
        assert!(filter.matches(0x16C0, 0x0486, "usb-1:16c0:0486:mi_01"));
        assert!(!filter.matches(0x16C0, 0x0486, "usb-1:16c0:0486:mi_00"));
        assert!(!filter.matches(0x16C0, 0x0487, "usb-1:16c0:0487:mi_01"));
    }

    #[test]
    fn test_contains_ignore_case() {
        assert!(contains_ignore_case("HID#VID_16C0&MI_00", "mi_00"));
        assert!(contains_ignore_case("anything", ""));
        assert!(!contains_ignore_case("mi_00", "mi_01"));
    }

    #[test]
    fn test_filter_display() {
        assert_eq!(FilterCriterion::new(0x16C0, None).to_string(), "16C0:*");
        assert_eq!(
            FilterCriterion::new(0x16C0, Some(0x0486))
                .with_interface("mi_00")
                .to_string(),
            "16C0:0486 (mi_00)"
        );
    }
}
