// Serial line plumbing: the transport capability shared by the flasher and
// the Modbus session, port discovery and reset-line sequencing.

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
mod ports;
pub mod reset;
mod serial;

use std::io::{Read, Write};

use crate::error::Result;

#[cfg(any(test, feature = "test-utils"))]
pub use mock::{MockHandle, MockTransport, Signal};
pub use ports::{available_ports_sorted, find_usb_port, wait_port, ESP_USB_JTAG_PID};
pub use reset::{reboot, ResetMode};
pub use serial::{open_serial_port, SerialTransport, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT};

/// A byte stream with explicit open/close and the two modem control lines
/// the ESP auto-reset circuit is wired to.
///
/// Exactly one owner drives a transport at a time; it moves between the
/// flasher, the Modbus session and the monitor.
pub trait Transport: Read + Write + Send {
    fn open(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
    fn set_dtr(&mut self, level: bool) -> Result<()>;
    fn set_rts(&mut self, level: bool) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn set_dtr(&mut self, level: bool) -> Result<()> {
        (**self).set_dtr(level)
    }

    fn set_rts(&mut self, level: bool) -> Result<()> {
        (**self).set_rts(level)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn set_dtr(&mut self, level: bool) -> Result<()> {
        (**self).set_dtr(level)
    }

    fn set_rts(&mut self, level: bool) -> Result<()> {
        (**self).set_rts(level)
    }
}
