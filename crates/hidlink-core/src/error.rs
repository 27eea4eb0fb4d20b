//! Connector error taxonomy.

use thiserror::Error;

use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("{what} cannot be absent")]
    NullInput { what: &'static str },

    #[error("Device enumeration failed: {0}")]
    EnumerationFailed(#[source] TransportError),

    /// Opening failed. `device_id` and `source` are absent when open was
    /// requested with nothing selected.
    #[error(
        "Failed to open device {}: {}",
        .device_id.as_deref().unwrap_or("<none>"),
        .source.as_ref().map_or_else(|| "no device selected".to_string(), ToString::to_string)
    )]
    DeviceOpenFailed {
        device_id: Option<String>,
        #[source]
        source: Option<TransportError>,
    },

    #[error("No device is open")]
    NoDeviceSelected,

    #[error("Cannot write {len} bytes: device buffer is {max} bytes")]
    BufferTooLarge { len: usize, max: usize },

    #[error("Device {device_id} was removed")]
    DeviceRemoved { device_id: String },

    #[error("Device {device_id} has not been initialized")]
    NotYetInitialized { device_id: String },

    #[error("Problem in continuous read: {0}")]
    ContinuousRead(#[source] TransportError),

    #[error("Write to device {device_id} failed: {source}")]
    WriteFailed {
        device_id: String,
        #[source]
        source: TransportError,
    },

    #[error("Read loop already started")]
    AlreadyStarted,

    #[error("Failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl ConnectorError {
    /// Whether the read loop recovers from this error on its own.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ConnectorError::DeviceRemoved { .. } | ConnectorError::NotYetInitialized { .. }
        )
    }
}
