//! SLIP framing as spoken by the ESP ROM bootloader.

use std::{
    io::{self, Read, Write},
    time::{Duration, Instant},
};

use crate::{
    error::{is_transient, Error, Result},
    protocol::hex,
};

pub const END: u8 = 0xC0;
pub const ESC: u8 = 0xDB;
pub const ESC_END: u8 = 0xDC;
pub const ESC_ESC: u8 = 0xDD;

pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 2);
    out.push(END);
    for &b in payload {
        match b {
            END => out.extend_from_slice(&[ESC, ESC_END]),
            ESC => out.extend_from_slice(&[ESC, ESC_ESC]),
            _ => out.push(b),
        }
    }
    out.push(END);
    out
}

/// Send one frame, continuing after partial writes.
pub fn write_frame<W: Write + ?Sized>(sink: &mut W, payload: &[u8]) -> Result<()> {
    let frame = encode(payload);
    log::trace!("slip: write {} bytes: {}", frame.len(), hex(&frame));

    let mut sent = 0;
    while sent < frame.len() {
        match sink.write(&frame[sent..]) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
            Ok(n) => sent += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    WaitingForHeader,
    ReadingContent,
    InEscape,
}

/// Incremental decoder fed one byte at a time.
#[derive(Debug, Default)]
pub struct SlipDecoder {
    state: State,
    frame: Vec<u8>,
}

impl SlipDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes collected for the frame in progress.
    pub fn received(&self) -> usize {
        self.frame.len()
    }

    /// Feed one byte. Returns the frame once its closing delimiter arrives.
    pub fn push(&mut self, byte: u8) -> Result<Option<Vec<u8>>> {
        match self.state {
            State::WaitingForHeader => {
                if byte == END {
                    self.state = State::ReadingContent;
                }
            }
            State::ReadingContent => match byte {
                END => {
                    self.state = State::WaitingForHeader;
                    return Ok(Some(std::mem::take(&mut self.frame)));
                }
                ESC => self.state = State::InEscape,
                _ => self.frame.push(byte),
            },
            State::InEscape => {
                let unescaped = match byte {
                    ESC_END => END,
                    ESC_ESC => ESC,
                    _ => {
                        self.reset();
                        return Err(Error::Framing { byte });
                    }
                };
                self.frame.push(unescaped);
                self.state = State::ReadingContent;
            }
        }
        Ok(None)
    }

    pub fn reset(&mut self) {
        self.state = State::WaitingForHeader;
        self.frame.clear();
    }
}

/// Read one complete frame, giving up once `timeout` has passed.
///
/// Empty reads and port timeouts are retried until the deadline.
pub fn read_frame<R: Read + ?Sized>(source: &mut R, timeout: Duration) -> Result<Vec<u8>> {
    let started = Instant::now();
    let mut decoder = SlipDecoder::new();
    let mut byte = [0u8; 1];

    loop {
        let elapsed = started.elapsed();
        if elapsed > timeout {
            return Err(Error::Timeout {
                elapsed,
                received: decoder.received(),
            });
        }

        match source.read(&mut byte) {
            Ok(0) => continue,
            Ok(_) => {
                if let Some(frame) = decoder.push(byte[0])? {
                    log::trace!("slip: read {} bytes: {}", frame.len(), hex(&frame));
                    return Ok(frame);
                }
            }
            Err(err) if is_transient(&err) => continue,
            Err(err) => return Err(err.into()),
        }
    }
}
