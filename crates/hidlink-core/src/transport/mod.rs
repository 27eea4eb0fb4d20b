//! Transport layer module.

pub mod mock;
pub mod nusb;
pub mod traits;

pub use mock::{MockDevice, MockRead, MockTransport};
pub use nusb::{NusbHidDevice, NusbTransport};
pub use traits::{HidDevice, HidTransport, TransportError};
