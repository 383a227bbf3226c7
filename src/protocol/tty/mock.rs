//! In-memory transport used by tests and simulated devices.
//!
//! Every `write` is recorded and handed to an optional responder closure;
//! whatever the responder returns is queued as input for subsequent reads.
//! A read with nothing queued behaves like a serial read timeout.

use std::{
    collections::VecDeque,
    io::{self, Read, Write},
    sync::{Arc, Mutex, MutexGuard},
    thread,
    time::Duration,
};

use super::Transport;
use crate::error::{Error, Result};

/// A modem line change observed by the mock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Dtr(bool),
    Rts(bool),
}

pub type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

#[derive(Debug, Default)]
struct State {
    open: bool,
    opens: usize,
    closes: usize,
    input: VecDeque<u8>,
    writes: Vec<Vec<u8>>,
    signals: Vec<Signal>,
}

/// Inspection handle that stays valid after the transport has been moved.
#[derive(Debug, Clone, Default)]
pub struct MockHandle {
    state: Arc<Mutex<State>>,
}

impl MockHandle {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue bytes for the next reads.
    pub fn push_input(&self, bytes: &[u8]) {
        self.lock().input.extend(bytes);
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock().writes.clone()
    }

    pub fn signals(&self) -> Vec<Signal> {
        self.lock().signals.clone()
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    pub fn open_count(&self) -> usize {
        self.lock().opens
    }

    pub fn close_count(&self) -> usize {
        self.lock().closes
    }

    pub fn pending_input(&self) -> usize {
        self.lock().input.len()
    }
}

pub struct MockTransport {
    handle: MockHandle,
    responder: Option<Responder>,
    idle: Duration,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            handle: MockHandle::default(),
            responder: None,
            idle: Duration::from_millis(1),
        }
    }

    /// Answer every write with whatever `responder` returns.
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: FnMut(&[u8]) -> Vec<u8> + Send + 'static,
    {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::new()
        }
    }

    pub fn handle(&self) -> MockHandle {
        self.handle.clone()
    }

    fn require_open(&self) -> io::Result<()> {
        if self.handle.lock().open {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::NotConnected, Error::PortNotOpen))
        }
    }
}

impl Transport for MockTransport {
    fn open(&mut self) -> Result<()> {
        let mut state = self.handle.lock();
        state.open = true;
        state.opens += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut state = self.handle.lock();
        if !state.open {
            return Err(Error::PortNotOpen);
        }
        state.open = false;
        state.closes += 1;
        Ok(())
    }

    fn set_dtr(&mut self, level: bool) -> Result<()> {
        let mut state = self.handle.lock();
        if !state.open {
            return Err(Error::PortNotOpen);
        }
        state.signals.push(Signal::Dtr(level));
        Ok(())
    }

    fn set_rts(&mut self, level: bool) -> Result<()> {
        let mut state = self.handle.lock();
        if !state.open {
            return Err(Error::PortNotOpen);
        }
        state.signals.push(Signal::Rts(level));
        Ok(())
    }
}

impl Read for MockTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.require_open()?;
        if buf.is_empty() {
            return Ok(0);
        }

        let mut state = self.handle.lock();
        if state.input.is_empty() {
            drop(state);
            thread::sleep(self.idle);
            return Err(io::ErrorKind::TimedOut.into());
        }

        let n = buf.len().min(state.input.len());
        for (slot, byte) in buf.iter_mut().zip(state.input.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MockTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.require_open()?;
        let reply = self.responder.as_mut().map(|respond| respond(buf));

        let mut state = self.handle.lock();
        state.writes.push(buf.to_vec());
        if let Some(reply) = reply {
            state.input.extend(reply);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
