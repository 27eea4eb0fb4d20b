//! nusb-based HID transport implementation.
//!
//! Talks to HID-class interfaces directly: input reports come from the
//! interrupt IN endpoint, output reports go to the interrupt OUT endpoint or,
//! when the interface has none, through a class SET_REPORT control request.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use nusb::descriptors::TransferType;
use nusb::transfer::{
    Buffer, ControlOut, ControlType, Direction, In, Interrupt, Out, Recipient,
    TransferError as UsbTransferError,
};
use nusb::{DeviceInfo, Endpoint, Interface, MaybeFuture, list_devices};
use tracing::{debug, info, instrument, warn};

use super::traits::{HidDevice, HidTransport, TransportError};
use crate::device::{DeviceDescriptor, FilterCriterion};
use crate::lock;

const HID_CLASS: u8 = 0x03;
const HID_SET_REPORT: u8 = 0x09;
const HID_REPORT_TYPE_OUTPUT: u16 = 0x02;
const WRITE_TIMEOUT: Duration = Duration::from_millis(1000);

/// nusb-based HID transport.
#[derive(Debug, Default, Clone, Copy)]
pub struct NusbTransport;

impl NusbTransport {
    pub fn new() -> Self {
        Self
    }

    fn find_device_info(device_id: &str) -> Result<(DeviceInfo, u8), TransportError> {
        let devices = list_devices()
            .wait()
            .map_err(|e| TransportError::EnumerationFailed(e.to_string()))?;

        for device_info in devices {
            let matched = device_info
                .interfaces()
                .filter(|iface| iface.class() == HID_CLASS)
                .map(|iface| iface.interface_number())
                .find(|&n| hid_device_id(&device_info, n) == device_id);
            if let Some(interface_number) = matched {
                return Ok((device_info, interface_number));
            }
        }

        Err(TransportError::DeviceNotFound {
            device_id: device_id.to_string(),
        })
    }
}

impl HidTransport for NusbTransport {
    #[instrument(level = "debug", skip(self, filters), fields(filters = filters.len()))]
    fn enumerate(
        &self,
        filters: &[FilterCriterion],
    ) -> Result<Vec<DeviceDescriptor>, TransportError> {
        let devices = list_devices()
            .wait()
            .map_err(|e| TransportError::EnumerationFailed(e.to_string()))?;

        let mut found = Vec::new();
        for device_info in devices {
            for iface in device_info.interfaces().filter(|i| i.class() == HID_CLASS) {
                let interface_number = iface.interface_number();
                let device_id = hid_device_id(&device_info, interface_number);
                let (vendor_id, product_id) = (device_info.vendor_id(), device_info.product_id());
                let wanted = filters
                    .iter()
                    .any(|f| f.matches(vendor_id, product_id, &device_id));
                if !wanted {
                    continue;
                }

                found.push(DeviceDescriptor {
                    device_id,
                    vendor_id,
                    product_id,
                    interface_number: Some(interface_number),
                    product: device_info.product_string().map(str::to_string),
                    serial_number: device_info.serial_number().map(str::to_string),
                });
            }
        }

        debug!(count = found.len(), "Enumerated HID interfaces");
        Ok(found)
    }

    fn device(&self, descriptor: &DeviceDescriptor) -> Result<Arc<dyn HidDevice>, TransportError> {
        let (device_info, interface_number) = Self::find_device_info(&descriptor.device_id)?;
        Ok(Arc::new(NusbHidDevice {
            device_id: descriptor.device_id.clone(),
            device_info,
            interface_number,
            open: Mutex::new(None),
        }))
    }
}

/// Stable identity for one HID interface of a device.
fn hid_device_id(device_info: &DeviceInfo, interface_number: u8) -> String {
    let ports = device_info
        .port_chain()
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(".");
    format!(
        "{}-{}:{:04x}:{:04x}:mi_{:02}",
        device_info.bus_id(),
        ports,
        device_info.vendor_id(),
        device_info.product_id(),
        interface_number
    )
}

/// One HID interface, opened lazily by `initialize`.
pub struct NusbHidDevice {
    device_id: String,
    device_info: DeviceInfo,
    interface_number: u8,
    open: Mutex<Option<Arc<OpenInterface>>>,
}

struct OpenInterface {
    interface: Interface,
    reader: Mutex<Endpoint<Interrupt, In>>,
    writer: Option<Mutex<Endpoint<Interrupt, Out>>>,
    read_size: usize,
    write_buffer_size: usize,
}

impl NusbHidDevice {
    fn current(&self) -> Result<Arc<OpenInterface>, TransportError> {
        lock(&self.open)
            .as_ref()
            .cloned()
            .ok_or(TransportError::NotInitialized)
    }

    fn open_interface(&self) -> Result<OpenInterface, TransportError> {
        let device = self
            .device_info
            .open()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        let interface = device
            .detach_and_claim_interface(self.interface_number)
            .wait()
            .map_err(|e| TransportError::ClaimInterfaceFailed {
                interface: self.interface_number,
                message: e.to_string(),
            })?;

        // Find INTERRUPT endpoints
        let mut in_endpoint: Option<(u8, usize)> = None;
        let mut out_endpoint: Option<(u8, usize)> = None;

        for config in device.configurations() {
            for iface in config.interfaces() {
                if iface.interface_number() != self.interface_number {
                    continue;
                }
                for alt in iface.alt_settings() {
                    for ep in alt.endpoints() {
                        if ep.transfer_type() != TransferType::Interrupt {
                            continue;
                        }
                        let found = Some((ep.address(), ep.max_packet_size()));
                        if ep.direction() == Direction::In {
                            in_endpoint = in_endpoint.or(found);
                        } else {
                            out_endpoint = out_endpoint.or(found);
                        }
                    }
                }
            }
        }

        let (in_address, read_size) = in_endpoint.ok_or_else(|| TransportError::EndpointNotFound {
            ep_type: "Interrupt".into(),
            direction: "In".into(),
        })?;

        let reader = interface
            .endpoint::<Interrupt, In>(in_address)
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        let (writer, write_buffer_size) = match out_endpoint {
            Some((out_address, size)) => {
                let ep = interface
                    .endpoint::<Interrupt, Out>(out_address)
                    .map_err(|e| TransportError::OpenFailed(e.to_string()))?;
                (Some(Mutex::new(ep)), size)
            }
            None => {
                debug!(device_id = %self.device_id, "No interrupt OUT endpoint, using SET_REPORT");
                (None, read_size)
            }
        };

        info!(
            device_id = %self.device_id,
            in_ep = %format!("0x{:02X}", in_address),
            write_buffer_size,
            "Device opened successfully"
        );

        Ok(OpenInterface {
            interface,
            reader: Mutex::new(reader),
            writer,
            read_size,
            write_buffer_size,
        })
    }
}

impl HidDevice for NusbHidDevice {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    #[instrument(level = "info", skip(self), fields(device_id = %self.device_id))]
    fn initialize(&self) -> Result<(), TransportError> {
        let mut open = lock(&self.open);
        if open.is_some() {
            return Ok(());
        }
        *open = Some(Arc::new(self.open_interface()?));
        Ok(())
    }

    fn close(&self) {
        let Some(open) = lock(&self.open).take() else {
            return;
        };
        // A reader blocked in the read loop keeps the interface alive until
        // its current transfer completes or times out.
        if let Ok(mut reader) = open.reader.try_lock() {
            reader.cancel_all();
        }
        debug!(device_id = %self.device_id, "Device closed");
    }

    fn is_initialized(&self) -> bool {
        lock(&self.open).is_some()
    }

    fn write_buffer_size(&self) -> Option<usize> {
        lock(&self.open).as_ref().map(|open| open.write_buffer_size)
    }

    fn read(&self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let open = self.current()?;
        let mut reader = lock(&open.reader);

        // A transfer left pending by an earlier timeout is still valid.
        if reader.pending() == 0 {
            let buffer = reader.allocate(open.read_size);
            reader.submit(buffer);
        }

        let Some(completion) = reader.wait_next_complete(timeout) else {
            return Err(TransportError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            });
        };
        completion
            .status
            .map_err(|e| map_transfer_error(e, TransportError::ReadFailed))?;

        Ok(completion.buffer[..completion.actual_len].to_vec())
    }

    #[instrument(skip(self, data), fields(device_id = %self.device_id, len = data.len()))]
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        let open = self.current()?;

        let Some(writer) = &open.writer else {
            open.interface
                .control_out(
                    ControlOut {
                        control_type: ControlType::Class,
                        recipient: Recipient::Interface,
                        request: HID_SET_REPORT,
                        value: HID_REPORT_TYPE_OUTPUT << 8,
                        index: u16::from(self.interface_number),
                        data,
                    },
                    WRITE_TIMEOUT,
                )
                .wait()
                .map_err(|e| map_transfer_error(e, TransportError::WriteFailed))?;
            debug!(bytes_written = data.len(), "SET_REPORT complete");
            return Ok(data.len());
        };

        let mut writer = lock(writer);
        writer.submit(Buffer::from(data.to_vec()));
        let Some(completion) = writer.wait_next_complete(WRITE_TIMEOUT) else {
            warn!("Write timed out, cancelling transfer");
            writer.cancel_all();
            let _ = writer.wait_next_complete(WRITE_TIMEOUT);
            return Err(TransportError::Timeout {
                timeout_ms: WRITE_TIMEOUT.as_millis() as u64,
            });
        };
        completion
            .status
            .map_err(|e| map_transfer_error(e, TransportError::WriteFailed))?;

        debug!(bytes_written = data.len(), "Write complete");
        Ok(data.len())
    }
}

/// Map nusb transfer failures onto structured transport errors.
///
/// A cancelled transfer means `close` raced the caller, which the read loop
/// treats the same as a device that is not open yet.
fn map_transfer_error(
    err: UsbTransferError,
    other: fn(String) -> TransportError,
) -> TransportError {
    match err {
        UsbTransferError::Disconnected => TransportError::Disconnected,
        UsbTransferError::Cancelled => TransportError::NotInitialized,
        e => other(e.to_string()),
    }
}
