use super::{
    opcode::{self, COIL_OFF, COIL_ON},
    payload::Payload,
};

/// A request addressed to one slave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// First register / coil address.
    pub address: u16,
    opcode: u8,
    len_or_val: u16,
    payload: Option<Payload>,
}

impl Request {
    /// Opcodes that carry data get an empty payload of the matching kind.
    pub fn new(opcode: u8) -> Self {
        Self {
            address: 0,
            opcode,
            len_or_val: 0,
            payload: opcode::request_payload(opcode).map(|kind| Payload::with_length(kind, 0)),
        }
    }

    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    pub fn with_address(mut self, address: u16) -> Self {
        self.address = address;
        self
    }

    /// Element count for reads and multi-writes. Re-sizes the payload.
    pub fn set_length(&mut self, length: u16) {
        self.len_or_val = length;
        if let Some(payload) = self.payload.as_mut() {
            payload.set_length(usize::from(length));
        }
    }

    pub fn with_length(mut self, length: u16) -> Self {
        self.set_length(length);
        self
    }

    /// Coil state for a single-coil write.
    pub fn set_value(&mut self, on: bool) {
        self.len_or_val = if on { COIL_ON } else { COIL_OFF };
    }

    /// Raw value for a single-register write.
    pub fn set_raw_value(&mut self, value: u16) {
        self.len_or_val = value;
    }

    pub fn len_or_val(&self) -> u16 {
        self.len_or_val
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    pub fn payload_mut(&mut self) -> Option<&mut Payload> {
        self.payload.as_mut()
    }
}

/// A decoded reply.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reply {
    /// Slave that answered.
    pub slave: u8,
    pub opcode: u8,
    /// Echoed start address (write replies only).
    pub address: u16,
    pub len_or_val: u16,
    pub payload: Option<Payload>,
}

impl Reply {
    pub fn is_error(&self) -> bool {
        opcode::is_error(self.opcode)
    }

    /// Exception code carried by an error reply.
    pub fn exception_code(&self) -> Option<u8> {
        if !self.is_error() {
            return None;
        }
        self.payload.as_ref()?.raw().first().copied()
    }

    /// Byte count of a read reply, or the echoed quantity of a write reply.
    pub fn length(&self) -> u16 {
        self.len_or_val
    }

    /// Coil state echoed by a single-coil write.
    pub fn value(&self) -> bool {
        self.len_or_val == COIL_ON
    }

    pub fn register(&self, offset: usize) -> Option<u16> {
        self.payload.as_ref()?.register(offset)
    }
}
