//! Connection state and the selected-device slot.

use std::fmt;
use std::sync::Arc;

use crate::transport::HidDevice;

/// Lifecycle of the selected device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No device selected.
    #[default]
    Unselected,
    /// A device is selected but not open.
    Selecting,
    /// The device is open; writes are allowed.
    Open,
    /// The device is open and the read loop is consuming it.
    Reading,
    /// The device handle is being released.
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Unselected => write!(f, "UNSELECTED"),
            ConnectionState::Selecting => write!(f, "SELECTING"),
            ConnectionState::Open => write!(f, "OPEN"),
            ConnectionState::Reading => write!(f, "READING"),
            ConnectionState::Closing => write!(f, "CLOSING"),
        }
    }
}

impl ConnectionState {
    /// Whether the device handle is open for I/O.
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open | ConnectionState::Reading)
    }
}

/// Change recorded while the slot lock is held, published after release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Notice {
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    Selected(Option<String>),
    Removed(String),
}

/// The single selected-device slot.
///
/// Only ever touched behind the connector's slot mutex. `generation` changes
/// whenever the held device changes, so a reader can tell whether the device
/// it started with is still the selected one.
#[derive(Default)]
pub(crate) struct Slot {
    state: ConnectionState,
    device: Option<Arc<dyn HidDevice>>,
    generation: u64,
    notices: Vec<Notice>,
}

impl Slot {
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn device(&self) -> Option<&Arc<dyn HidDevice>> {
        self.device.as_ref()
    }

    pub fn device_id(&self) -> Option<String> {
        self.device.as_ref().map(|d| d.device_id().to_string())
    }

    /// Transition to a new state.
    pub fn goto_state(&mut self, new_state: ConnectionState) {
        if self.state == new_state {
            return;
        }
        tracing::debug!(from = %self.state, to = %new_state, "State transition");
        self.notices.push(Notice::StateChanged {
            from: self.state,
            to: new_state,
        });
        self.state = new_state;
    }

    /// Replace the selection, releasing the previous handle first.
    pub fn select(&mut self, device: Option<Arc<dyn HidDevice>>) {
        let previous = self.device_id();
        self.release();
        let device_id = device.as_ref().map(|d| d.device_id().to_string());
        if device.is_some() {
            self.generation += 1;
            self.device = device;
            self.goto_state(ConnectionState::Selecting);
        }
        if previous != device_id {
            self.notices.push(Notice::Selected(device_id));
        }
    }

    /// Close and drop the held handle. Does nothing when the slot is empty.
    pub fn release(&mut self) {
        if let Some(device) = self.device.take() {
            self.goto_state(ConnectionState::Closing);
            device.close();
            self.generation += 1;
        }
        self.goto_state(ConnectionState::Unselected);
    }

    /// Release the handle because the device vanished.
    pub fn remove(&mut self) {
        if let Some(device_id) = self.device_id() {
            self.release();
            self.notices.push(Notice::Removed(device_id));
            self.notices.push(Notice::Selected(None));
        }
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }
}
