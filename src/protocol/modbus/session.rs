use std::{io, thread, time::Duration};

use super::{
    codec::{FrameCodec, RtuCodec},
    frame::{Reply, Request},
};
use crate::{
    error::Result,
    protocol::{buffer::RingBuffer, hex, tty::Transport},
};

/// Largest RTU frame on the wire.
pub const FRAME_CAPACITY: usize = 256;

/// Pause between sending a request and reading the reply. Matches what the
/// screen firmware has always been driven with; not verified against RTU
/// turnaround timing.
const TURNAROUND: Duration = Duration::from_micros(20);

/// Single request / single reply Modbus master over one transport.
pub struct ModbusSession<T, C = RtuCodec> {
    transport: T,
    codec: C,
}

impl<T: Transport> ModbusSession<T> {
    pub fn new(transport: T) -> Self {
        Self::with_codec(transport, RtuCodec)
    }
}

impl<T: Transport, C: FrameCodec> ModbusSession<T, C> {
    pub fn with_codec(transport: T, codec: C) -> Self {
        Self { transport, codec }
    }

    pub fn open(&mut self) -> Result<()> {
        self.transport.open()
    }

    pub fn close(&mut self) -> Result<()> {
        self.transport.close()
    }

    /// Send `request` to `slave` and read one reply.
    ///
    /// `Ok(None)` means the request could not be framed or nothing valid came
    /// back; `Err` is reserved for transport failures.
    pub fn exec(&mut self, slave: u8, request: &Request) -> Result<Option<Reply>> {
        let mut frame = RingBuffer::new(FRAME_CAPACITY);
        if !self.codec.encode(slave, request, &mut frame) {
            log::warn!(
                "modbus: request 0x{:02X} to slave {slave} does not fit in a frame",
                request.opcode()
            );
            return Ok(None);
        }
        log::debug!("modbus: tx {}", hex(&frame.to_vec()));

        while !frame.is_empty() {
            if frame.write_to(&mut self.transport)? == 0 {
                return Err(io::Error::from(io::ErrorKind::WriteZero).into());
            }
        }

        thread::sleep(TURNAROUND);

        let mut incoming = RingBuffer::new(FRAME_CAPACITY);
        incoming.read_from(&mut self.transport)?;
        log::debug!("modbus: rx {}", hex(&incoming.to_vec()));

        let reply = self.codec.decode(&mut incoming);
        if reply.is_none() {
            log::debug!("modbus: no valid reply from slave {slave}");
        }
        Ok(reply)
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }
}
