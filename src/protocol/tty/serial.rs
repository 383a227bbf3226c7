use std::{
    io::{self, Read, Write},
    time::Duration,
};

use serialport::{ClearBuffer, DataBits, Parity, SerialPort, StopBits};

use super::Transport;
use crate::error::{Error, Result};

pub const DEFAULT_BAUD_RATE: u32 = 115_200;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Open a serial port at 8N1 with the requested timeout, enabling exclusive
/// access on Unix systems.
pub fn open_serial_port(
    port: &str,
    baud_rate: u32,
    timeout: Duration,
) -> Result<Box<dyn SerialPort>> {
    let builder = serialport::new(port, baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .timeout(timeout);

    #[cfg(unix)]
    {
        let mut handle = builder.open_native().map_err(io::Error::from)?;
        handle.set_exclusive(true).map_err(io::Error::from)?;
        Ok(Box::new(handle))
    }

    #[cfg(not(unix))]
    {
        Ok(builder.open().map_err(io::Error::from)?)
    }
}

/// A named serial device that can be opened and closed repeatedly.
pub struct SerialTransport {
    path: String,
    baud_rate: u32,
    timeout: Duration,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: DEFAULT_TIMEOUT,
            port: None,
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or(Error::PortNotOpen)
    }

    fn port_io(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, Error::PortNotOpen))
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("path", &self.path)
            .field("baud_rate", &self.baud_rate)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Transport for SerialTransport {
    fn open(&mut self) -> Result<()> {
        // Re-opening drops the previous handle first so the exclusive lock is released.
        self.port = None;

        let port = open_serial_port(&self.path, self.baud_rate, self.timeout)?;
        port.clear(ClearBuffer::All).map_err(io::Error::from)?;
        log::debug!("tty: opened {} at {} baud", self.path, self.baud_rate);
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        match self.port.take() {
            Some(_) => {
                log::debug!("tty: closed {}", self.path);
                Ok(())
            }
            None => Err(Error::PortNotOpen),
        }
    }

    fn set_dtr(&mut self, level: bool) -> Result<()> {
        self.port()?
            .write_data_terminal_ready(level)
            .map_err(io::Error::from)?;
        Ok(())
    }

    fn set_rts(&mut self, level: bool) -> Result<()> {
        self.port()?
            .write_request_to_send(level)
            .map_err(io::Error::from)?;
        Ok(())
    }
}

impl Read for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port_io()?.read(buf)
    }
}

impl Write for SerialTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port_io()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port_io()?.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_port_rejects_everything() {
        let mut transport = SerialTransport::new("/dev/does-not-exist");
        assert!(!transport.is_open());
        assert!(matches!(transport.close(), Err(Error::PortNotOpen)));
        assert!(matches!(transport.set_dtr(true), Err(Error::PortNotOpen)));
        assert!(matches!(transport.set_rts(false), Err(Error::PortNotOpen)));

        let err = transport.read(&mut [0u8; 4]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
        let err = transport.write(&[1, 2, 3]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[test]
    fn test_open_missing_device_fails() {
        let mut transport = SerialTransport::new("/dev/does-not-exist").with_baud_rate(9600);
        assert!(transport.open().is_err());
        assert!(!transport.is_open());
        assert_eq!(transport.path(), "/dev/does-not-exist");
    }
}
