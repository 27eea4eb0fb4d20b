//! Mock HID transport for testing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use super::traits::{HidDevice, HidTransport, TransportError};
use crate::device::{DeviceDescriptor, FilterCriterion};

/// Scripted outcome of one `read` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockRead {
    Data(Vec<u8>),
    Disconnected,
    NotInitialized,
    Fault(String),
}

/// Mock transport holding a fixed set of simulated devices.
#[derive(Default)]
pub struct MockTransport {
    devices: Mutex<Vec<Arc<MockDevice>>>,
    /// When set, every enumeration fails with this message.
    enumeration_error: Mutex<Option<String>>,
    /// When set, handles are refused for listed devices with this message.
    handle_error: Mutex<Option<String>>,
    enumerations: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plug in a device and return its handle for scripting.
    pub fn add_device(
        &self,
        descriptor: DeviceDescriptor,
        write_buffer_size: usize,
    ) -> Arc<MockDevice> {
        let device = Arc::new(MockDevice::new(descriptor, write_buffer_size));
        self.devices.lock().unwrap().push(device.clone());
        device
    }

    /// Unplug a device: it disappears from enumeration and its I/O fails.
    pub fn remove_device(&self, device_id: &str) {
        let mut devices = self.devices.lock().unwrap();
        if let Some(pos) = devices.iter().position(|d| d.device_id() == device_id) {
            let device = devices.remove(pos);
            *device.connected.lock().unwrap() = false;
        }
    }

    pub fn fail_enumeration(&self, message: Option<&str>) {
        *self.enumeration_error.lock().unwrap() = message.map(str::to_string);
    }

    /// Make `device` fail for every listed device with `message`.
    pub fn fail_handles(&self, message: Option<&str>) {
        *self.handle_error.lock().unwrap() = message.map(str::to_string);
    }

    pub fn enumeration_count(&self) -> usize {
        self.enumerations.load(Ordering::SeqCst)
    }
}

impl HidTransport for MockTransport {
    fn enumerate(
        &self,
        filters: &[FilterCriterion],
    ) -> Result<Vec<DeviceDescriptor>, TransportError> {
        self.enumerations.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.enumeration_error.lock().unwrap().as_ref() {
            return Err(TransportError::EnumerationFailed(message.clone()));
        }

        Ok(self
            .devices
            .lock()
            .unwrap()
            .iter()
            .map(|d| &d.descriptor)
            .filter(|desc| {
                filters
                    .iter()
                    .any(|f| f.matches(desc.vendor_id, desc.product_id, &desc.device_id))
            })
            .cloned()
            .collect())
    }

    fn device(&self, descriptor: &DeviceDescriptor) -> Result<Arc<dyn HidDevice>, TransportError> {
        if let Some(message) = self.handle_error.lock().unwrap().as_ref() {
            return Err(TransportError::OpenFailed(message.clone()));
        }
        self.devices
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.device_id() == descriptor.device_id)
            .map(|d| d.clone() as Arc<dyn HidDevice>)
            .ok_or_else(|| TransportError::DeviceNotFound {
                device_id: descriptor.device_id.clone(),
            })
    }
}

/// Simulated HID device.
pub struct MockDevice {
    descriptor: DeviceDescriptor,
    write_buffer_size: usize,
    initialized: Mutex<bool>,
    connected: Mutex<bool>,
    /// Queued read outcomes, consumed front first.
    read_script: Mutex<VecDeque<MockRead>>,
    /// Captured writes.
    write_log: Mutex<Vec<Vec<u8>>>,
    initialize_error: Mutex<Option<String>>,
    close_count: AtomicUsize,
}

impl MockDevice {
    fn new(descriptor: DeviceDescriptor, write_buffer_size: usize) -> Self {
        Self {
            descriptor,
            write_buffer_size,
            initialized: Mutex::new(false),
            connected: Mutex::new(true),
            read_script: Mutex::new(VecDeque::new()),
            write_log: Mutex::new(Vec::new()),
            initialize_error: Mutex::new(None),
            close_count: AtomicUsize::new(0),
        }
    }

    pub fn queue_read(&self, read: MockRead) {
        self.read_script.lock().unwrap().push_back(read);
    }

    pub fn queue_data(&self, data: &[u8]) {
        self.queue_read(MockRead::Data(data.to_vec()));
    }

    /// Make the next `initialize` calls fail with `message`.
    pub fn fail_initialize(&self, message: Option<&str>) {
        *self.initialize_error.lock().unwrap() = message.map(str::to_string);
    }

    /// Get all captured writes.
    pub fn get_writes(&self) -> Vec<Vec<u8>> {
        self.write_log.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}

impl HidDevice for MockDevice {
    fn device_id(&self) -> &str {
        &self.descriptor.device_id
    }

    fn initialize(&self) -> Result<(), TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::Disconnected);
        }
        if let Some(message) = self.initialize_error.lock().unwrap().as_ref() {
            return Err(TransportError::OpenFailed(message.clone()));
        }
        *self.initialized.lock().unwrap() = true;
        Ok(())
    }

    fn close(&self) {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        *self.initialized.lock().unwrap() = false;
    }

    fn is_initialized(&self) -> bool {
        *self.initialized.lock().unwrap()
    }

    fn write_buffer_size(&self) -> Option<usize> {
        self.is_initialized().then_some(self.write_buffer_size)
    }

    fn read(&self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let scripted = self.read_script.lock().unwrap().pop_front();
        match scripted {
            Some(MockRead::Data(data)) => Ok(data),
            Some(MockRead::Disconnected) => Err(TransportError::Disconnected),
            Some(MockRead::NotInitialized) => Err(TransportError::NotInitialized),
            Some(MockRead::Fault(message)) => Err(TransportError::ReadFailed(message)),
            None => {
                if !*self.connected.lock().unwrap() {
                    return Err(TransportError::Disconnected);
                }
                if !self.is_initialized() {
                    return Err(TransportError::NotInitialized);
                }
                thread::sleep(timeout);
                Err(TransportError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::Disconnected);
        }
        if !self.is_initialized() {
            return Err(TransportError::NotInitialized);
        }
        self.write_log.lock().unwrap().push(data.to_vec());
        Ok(data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: &str) -> DeviceDescriptor {
        DeviceDescriptor::new(id, 0x16C0, 0x0486)
    }

    #[test]
    fn test_mock_enumeration_filters() {
        let mock = MockTransport::new();
        mock.add_device(descriptor("dev-a:mi_00"), 64);
        mock.add_device(DeviceDescriptor::new("other", 0x8086, 0xE004), 64);

        let found = mock
            .enumerate(&[FilterCriterion::new(0x16C0, Some(0x0486))])
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].device_id, "dev-a:mi_00");
        assert_eq!(mock.enumeration_count(), 1);
    }

    #[test]
    fn test_mock_enumeration_failure() {
        let mock = MockTransport::new();
        mock.fail_enumeration(Some("bus error"));
        let filters = [FilterCriterion::new(0x16C0, None)];
        let err = mock.enumerate(&filters).unwrap_err();
        assert!(err.to_string().contains("bus error"));
    }

    #[test]
    fn test_mock_read_script() {
        let mock = MockTransport::new();
        let device = mock.add_device(descriptor("dev-a"), 64);
        device.initialize().unwrap();
        device.queue_data(b"Hello");
        device.queue_read(MockRead::Disconnected);

        assert_eq!(device.read(Duration::ZERO).unwrap(), b"Hello");
        assert!(matches!(
            device.read(Duration::ZERO),
            Err(TransportError::Disconnected)
        ));
        // Queue is empty now
        assert!(matches!(
            device.read(Duration::ZERO),
            Err(TransportError::Timeout { .. })
        ));
    }

    #[test]
    fn test_mock_write_capture() {
        let mock = MockTransport::new();
        let device = mock.add_device(descriptor("dev-a"), 64);
        assert!(matches!(
            device.write(b"early"),
            Err(TransportError::NotInitialized)
        ));

        device.initialize().unwrap();
        device.write(b"Hello").unwrap();
        device.write(b"World").unwrap();

        let writes = device.get_writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], b"Hello");
        assert_eq!(writes[1], b"World");
    }

    #[test]
    fn test_mock_remove_device() {
        let mock = MockTransport::new();
        let device = mock.add_device(descriptor("dev-a"), 64);
        device.initialize().unwrap();

        mock.remove_device("dev-a");
        let filters = [FilterCriterion::new(0x16C0, None)];
        assert!(mock.enumerate(&filters).unwrap().is_empty());
        assert!(device.write(b"test").is_err());
        assert!(mock.device(&descriptor("dev-a")).is_err());
    }
}
