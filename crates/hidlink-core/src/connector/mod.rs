//! Connector - owns the selected device and drives its lifecycle.
//!
//! Every change to the selection happens under one slot mutex, so
//! select/open/close calls, the read loop and writers never observe a
//! half-finished transition. Blocking I/O runs on a cloned handle outside the
//! lock; the read loop only deselects a removed device if the slot still
//! holds the generation it read from.

pub mod cancel;
mod listener;
mod read_loop;
pub mod state;
pub mod write_gate;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{info, instrument};

use crate::config::ConnectorConfig;
use crate::device::{DeviceDescriptor, FilterCriterion};
use crate::error::ConnectorError;
use crate::events::{ConnectorEvent, ConnectorObserver, TracingObserver};
use crate::lock;
use crate::message::{MessageKind, RawDatagram, SendableMessage};
use crate::registry::DeviceRegistry;
use crate::transport::{HidDevice, HidTransport};

pub use cancel::CancelToken;
pub use listener::{DeviceChanges, diff_devices};
pub use read_loop::classify_read_error;
pub use state::ConnectionState;

use state::{Notice, Slot};

/// State shared between the connector and its background threads.
pub(crate) struct Inner<K: MessageKind> {
    transport: Arc<dyn HidTransport>,
    observer: Arc<dyn ConnectorObserver<K>>,
    config: ConnectorConfig,
    registry: Mutex<DeviceRegistry>,
    slot: Mutex<Slot>,
}

impl<K: MessageKind> Inner<K> {
    fn publish(&self, event: ConnectorEvent<K>) {
        self.observer.on_event(&event);
    }

    /// Run `f` on the slot, then publish what it recorded once unlocked.
    fn with_slot<R>(&self, f: impl FnOnce(&mut Slot) -> R) -> R {
        let (result, notices) = {
            let mut slot = lock(&self.slot);
            let result = f(&mut slot);
            (result, slot.take_notices())
        };
        for notice in notices {
            self.publish(match notice {
                Notice::StateChanged { from, to } => ConnectorEvent::StateChanged { from, to },
                Notice::Selected(device_id) => ConnectorEvent::DeviceSelected { device_id },
                Notice::Removed(device_id) => ConnectorEvent::DeviceRemoved { device_id },
            });
        }
        result
    }

    fn handle_for(
        &self,
        descriptor: &DeviceDescriptor,
    ) -> Result<Arc<dyn HidDevice>, ConnectorError> {
        self.transport
            .device(descriptor)
            .map_err(|source| ConnectorError::DeviceOpenFailed {
                device_id: Some(descriptor.device_id.clone()),
                source: Some(source),
            })
    }

    /// Keep the current selection if it is still listed, else take the first.
    fn select_from(&self, devices: &[DeviceDescriptor]) -> Result<Option<String>, ConnectorError> {
        self.with_slot(|slot| {
            if let Some(current) = slot.device_id()
                && devices.iter().any(|d| d.device_id == current)
            {
                return Ok(Some(current));
            }
            let Some(descriptor) = devices.first() else {
                slot.select(None);
                return Ok(None);
            };
            match self.handle_for(descriptor) {
                Ok(device) => {
                    slot.select(Some(device));
                    Ok(Some(descriptor.device_id.clone()))
                }
                Err(e) => {
                    // The stale selection is not listed anymore
                    slot.select(None);
                    Err(e)
                }
            }
        })
    }

    /// Handle of the open device, if any.
    fn open_device(&self) -> Option<Arc<dyn HidDevice>> {
        let slot = lock(&self.slot);
        slot.device()
            .filter(|d| slot.state().is_open() && d.is_initialized())
            .cloned()
    }

    /// Claim the open device for one read, marking the connector as reading.
    ///
    /// Returns the slot generation alongside the handle.
    fn device_for_read(&self) -> Option<(u64, Arc<dyn HidDevice>)> {
        self.with_slot(|slot| {
            let device = slot.device()?.clone();
            if !slot.state().is_open() || !device.is_initialized() {
                return None;
            }
            slot.goto_state(ConnectionState::Reading);
            Some((slot.generation(), device))
        })
    }

    /// Deselect a device the read loop saw disappear.
    ///
    /// Does nothing if the selection changed since `generation` was taken.
    fn deselect_removed(&self, generation: u64) -> bool {
        self.with_slot(|slot| {
            if slot.generation() != generation {
                return false;
            }
            slot.remove();
            true
        })
    }

    fn release(&self) {
        self.with_slot(Slot::release);
    }

    /// Release the selection only if it is still the one from `generation`.
    fn release_generation(&self, generation: u64) -> bool {
        self.with_slot(|slot| {
            if slot.generation() != generation {
                return false;
            }
            slot.release();
            true
        })
    }
}

/// USB HID connector for one selected device.
pub struct Connector<K: MessageKind = RawDatagram> {
    inner: Arc<Inner<K>>,
    started: AtomicBool,
}

impl<K: MessageKind> Connector<K> {
    /// Create a connector that reports events through tracing.
    pub fn new(transport: Arc<dyn HidTransport>, config: ConnectorConfig) -> Self {
        Self::with_observer(transport, Arc::new(TracingObserver), config)
    }

    /// Create a connector with a custom observer.
    pub fn with_observer(
        transport: Arc<dyn HidTransport>,
        observer: Arc<dyn ConnectorObserver<K>>,
        config: ConnectorConfig,
    ) -> Self {
        let mut registry = DeviceRegistry::new();
        for filter in &config.filters {
            registry.add_filter(filter.clone());
        }
        registry.set_interface(config.interface.clone());

        Self {
            inner: Arc::new(Inner {
                transport,
                observer,
                config,
                registry: Mutex::new(registry),
                slot: Mutex::new(Slot::default()),
            }),
            started: AtomicBool::new(false),
        }
    }

    pub fn add_filter(&self, criterion: FilterCriterion) {
        lock(&self.inner.registry).add_filter(criterion);
    }

    pub fn set_interface(&self, token: impl Into<String>) {
        lock(&self.inner.registry).set_interface(token);
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.inner.slot).state()
    }

    pub fn selected_device_id(&self) -> Option<String> {
        lock(&self.inner.slot).device_id()
    }

    /// Filtered device list from the last refresh.
    pub fn connected_devices(&self) -> Vec<DeviceDescriptor> {
        lock(&self.inner.registry).devices().to_vec()
    }

    /// Enumerate, filter and update the selection.
    ///
    /// The current device stays selected while it is still listed; otherwise
    /// the first listed device is selected, or nothing when the list is
    /// empty. Returns the selected device id.
    #[instrument(level = "debug", skip(self))]
    pub fn refresh_and_select(&self) -> Result<Option<String>, ConnectorError> {
        let devices = lock(&self.inner.registry)
            .refresh_filtered(self.inner.transport.as_ref())?
            .to_vec();
        self.inner.select_from(&devices)
    }

    /// Select a device directly, bypassing enumeration. Does not open it.
    pub fn select_device(
        &self,
        descriptor: Option<&DeviceDescriptor>,
    ) -> Result<(), ConnectorError> {
        let device = descriptor.map(|d| self.inner.handle_for(d)).transpose()?;
        self.inner.with_slot(|slot| slot.select(device));
        Ok(())
    }

    /// Open the selected device.
    ///
    /// On failure the handle is released and the connector is unselected.
    #[instrument(level = "info", skip(self))]
    pub fn open(&self) -> Result<(), ConnectorError> {
        self.inner.with_slot(|slot| {
            let Some(device) = slot.device().cloned() else {
                slot.goto_state(ConnectionState::Unselected);
                return Err(ConnectorError::DeviceOpenFailed {
                    device_id: None,
                    source: None,
                });
            };
            if slot.state().is_open() && device.is_initialized() {
                return Ok(());
            }

            match device.initialize() {
                Ok(()) => {
                    info!(
                        device_id = %device.device_id(),
                        write_buffer_size = ?device.write_buffer_size(),
                        "Device open"
                    );
                    slot.goto_state(ConnectionState::Open);
                    Ok(())
                }
                Err(source) => {
                    slot.release();
                    Err(ConnectorError::DeviceOpenFailed {
                        device_id: Some(device.device_id().to_string()),
                        source: Some(source),
                    })
                }
            }
        })
    }

    /// Close and deselect the device. Closing with nothing open is a no-op.
    pub fn close(&self) {
        self.inner.release();
    }

    /// Refresh, select and open in one step.
    pub fn connect(&self) -> Result<Option<String>, ConnectorError> {
        let selected = self.refresh_and_select()?;
        if selected.is_some() {
            self.open()?;
        }
        Ok(selected)
    }

    /// Write raw bytes, zero-padded to the device's write buffer size.
    ///
    /// Writes may run concurrently with the read loop.
    pub fn write<'a>(&self, data: impl Into<Option<&'a [u8]>>) -> Result<usize, ConnectorError> {
        let data = data
            .into()
            .ok_or(ConnectorError::NullInput { what: "data" })?;
        let device = self
            .inner
            .open_device()
            .ok_or(ConnectorError::NoDeviceSelected)?;
        write_gate::write_padded(device.as_ref(), data)
    }

    /// Serialize a message and write it.
    pub fn send_message<'a>(
        &self,
        message: impl Into<Option<&'a SendableMessage>>,
    ) -> Result<usize, ConnectorError> {
        let message = message
            .into()
            .ok_or(ConnectorError::NullInput { what: "message" })?;
        self.write(message.to_bytes().as_slice())
    }

    /// Spawn the read loop and device listener. Allowed once per connector.
    pub fn start(&self) -> Result<ConnectorHandle, ConnectorError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ConnectorError::AlreadyStarted);
        }

        let cancel = CancelToken::new();

        let read_loop = {
            let inner = self.inner.clone();
            let cancel = cancel.clone();
            thread::Builder::new()
                .name("hidlink-read".into())
                .spawn(move || read_loop::run(&inner, &cancel))
                .map_err(|source| ConnectorError::Spawn {
                    name: "read loop",
                    source,
                })?
        };

        let listener = {
            let inner = self.inner.clone();
            let cancel = cancel.clone();
            thread::Builder::new()
                .name("hidlink-listener".into())
                .spawn(move || listener::run(&inner, &cancel))
        };
        let listener = match listener {
            Ok(handle) => handle,
            Err(source) => {
                cancel.cancel();
                let _ = read_loop.join();
                return Err(ConnectorError::Spawn {
                    name: "device listener",
                    source,
                });
            }
        };

        info!("Connector started");
        Ok(ConnectorHandle {
            cancel,
            read_loop: Some(read_loop),
            listener: Some(listener),
        })
    }
}

/// Owner's handle on the background threads.
///
/// Dropping the handle cancels both threads without waiting for them.
pub struct ConnectorHandle {
    cancel: CancelToken,
    read_loop: Option<JoinHandle<Result<(), ConnectorError>>>,
    listener: Option<JoinHandle<()>>,
}

impl ConnectorHandle {
    /// Ask both threads to stop. In-flight reads finish or time out first.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Whether the read loop has exited.
    pub fn is_finished(&self) -> bool {
        self.read_loop.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Wait for the read loop to exit and return its outcome.
    ///
    /// Returns the escalated error when the loop died on a fatal read
    /// failure. Panics in the loop are propagated.
    pub fn join(mut self) -> Result<(), ConnectorError> {
        let result = match self.read_loop.take() {
            Some(read_loop) => read_loop
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic)),
            None => Ok(()),
        };
        self.cancel.cancel();
        if let Some(listener) = self.listener.take()
            && let Err(panic) = listener.join()
        {
            std::panic::resume_unwind(panic);
        }
        result
    }

    /// Cancel and wait.
    pub fn shutdown(self) -> Result<(), ConnectorError> {
        self.cancel();
        self.join()
    }
}

impl Drop for ConnectorHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
