//! HID transport abstraction.
//!
//! Defines the `HidTransport` (enumeration) and `HidDevice` (per-device I/O)
//! traits, allowing different implementations (nusb, mock, etc.).

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::device::{DeviceDescriptor, FilterCriterion};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device enumeration failed: {0}")]
    EnumerationFailed(String),

    #[error("Device not found: {device_id}")]
    DeviceNotFound { device_id: String },

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Failed to claim interface {interface}: {message}")]
    ClaimInterfaceFailed { interface: u8, message: String },

    #[error("Endpoint not found: type={ep_type}, direction={direction}")]
    EndpointNotFound { ep_type: String, direction: String },

    #[error("The device has not been initialized")]
    NotInitialized,

    #[error("The device is not connected")]
    Disconnected,

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),
}

/// Enumeration capability.
pub trait HidTransport: Send + Sync {
    /// List connected devices matching any of `filters`.
    fn enumerate(&self, filters: &[FilterCriterion])
    -> Result<Vec<DeviceDescriptor>, TransportError>;

    /// Obtain a handle for `descriptor` without opening it.
    fn device(&self, descriptor: &DeviceDescriptor) -> Result<Arc<dyn HidDevice>, TransportError>;
}

/// A single HID device handle.
///
/// All methods take `&self`; implementations synchronize internally so the
/// read loop and writers can share one handle.
pub trait HidDevice: Send + Sync {
    fn device_id(&self) -> &str;

    /// Open the device and negotiate its report sizes.
    fn initialize(&self) -> Result<(), TransportError>;

    /// Release the device. Closing a closed device does nothing.
    fn close(&self);

    fn is_initialized(&self) -> bool;

    /// Bytes accepted by one write transfer, known once initialized.
    fn write_buffer_size(&self) -> Option<usize>;

    /// Block until one input report arrives or `timeout` elapses.
    fn read(&self, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// Write one output report.
    fn write(&self, data: &[u8]) -> Result<usize, TransportError>;
}
