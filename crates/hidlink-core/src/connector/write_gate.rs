//! Bounded, zero-padded writes to the open device.

use tracing::{debug, instrument};

use crate::error::ConnectorError;
use crate::transport::HidDevice;

/// Copy `data` into a zeroed buffer of exactly `buffer_size` bytes.
///
/// Oversized data is rejected, never truncated.
pub fn pad_to_buffer(data: &[u8], buffer_size: usize) -> Result<Vec<u8>, ConnectorError> {
    if data.len() > buffer_size {
        return Err(ConnectorError::BufferTooLarge {
            len: data.len(),
            max: buffer_size,
        });
    }
    let mut report = vec![0u8; buffer_size];
    report[..data.len()].copy_from_slice(data);
    Ok(report)
}

/// Write `data` to `device` as one full-size output report.
#[instrument(skip_all, fields(device_id = %device.device_id(), len = data.len()))]
pub fn write_padded(device: &dyn HidDevice, data: &[u8]) -> Result<usize, ConnectorError> {
    let buffer_size = device
        .write_buffer_size()
        .ok_or(ConnectorError::NoDeviceSelected)?;
    let report = pad_to_buffer(data, buffer_size)?;

    let written = device
        .write(&report)
        .map_err(|source| ConnectorError::WriteFailed {
            device_id: device.device_id().to_string(),
            source,
        })?;
    debug!(
        bytes_written = written,
        padding = buffer_size - data.len(),
        "Report written"
    );
    Ok(written)
}
