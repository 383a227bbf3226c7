use super::opcode::PayloadKind;
use crate::protocol::buffer::RingBuffer;

/// Data section of a request or reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Bit-packed elements, `ceil(n / 8)` bytes.
    Bits(Vec<u8>),
    /// Big-endian registers, two bytes each.
    Registers(Vec<u8>),
}

impl Payload {
    /// Zeroed payload holding `elements` bits or registers.
    pub fn with_length(kind: PayloadKind, elements: usize) -> Self {
        let mut payload = match kind {
            PayloadKind::Bits => Payload::Bits(Vec::new()),
            PayloadKind::Registers => Payload::Registers(Vec::new()),
        };
        payload.set_length(elements);
        payload
    }

    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Bits(_) => PayloadKind::Bits,
            Payload::Registers(_) => PayloadKind::Registers,
        }
    }

    pub fn is_bits(&self) -> bool {
        matches!(self, Payload::Bits(_))
    }

    pub fn is_registers(&self) -> bool {
        matches!(self, Payload::Registers(_))
    }

    /// Re-size the storage for `elements` entries, clearing it.
    pub fn set_length(&mut self, elements: usize) {
        match self {
            Payload::Bits(raw) => *raw = vec![0; elements.div_ceil(8)],
            Payload::Registers(raw) => *raw = vec![0; elements * 2],
        }
    }

    pub fn raw(&self) -> &[u8] {
        match self {
            Payload::Bits(raw) | Payload::Registers(raw) => raw,
        }
    }

    pub fn raw_mut(&mut self) -> &mut [u8] {
        match self {
            Payload::Bits(raw) | Payload::Registers(raw) => raw,
        }
    }

    /// Number of logical elements the storage can hold.
    pub fn count(&self) -> usize {
        match self {
            Payload::Bits(raw) => raw.len() * 8,
            Payload::Registers(raw) => raw.len() / 2,
        }
    }

    pub fn bit(&self, offset: usize) -> Option<bool> {
        let Payload::Bits(raw) = self else {
            return None;
        };
        raw.get(offset / 8).map(|byte| byte & (1 << (offset % 8)) != 0)
    }

    pub fn set_bit(&mut self, offset: usize, value: bool) -> bool {
        let Payload::Bits(raw) = self else {
            return false;
        };
        let Some(byte) = raw.get_mut(offset / 8) else {
            return false;
        };
        let mask = 1u8 << (offset % 8);
        if value {
            *byte |= mask;
        } else {
            *byte &= !mask;
        }
        true
    }

    pub fn register(&self, offset: usize) -> Option<u16> {
        let Payload::Registers(raw) = self else {
            return None;
        };
        let at = offset * 2;
        let bytes = raw.get(at..at + 2)?;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn set_register(&mut self, offset: usize, value: u16) -> bool {
        let Payload::Registers(raw) = self else {
            return false;
        };
        let at = offset * 2;
        match raw.get_mut(at..at + 2) {
            Some(slot) => {
                slot.copy_from_slice(&value.to_be_bytes());
                true
            }
            None => false,
        }
    }

    pub fn registers(&self) -> Vec<u16> {
        (0..self.count()).filter_map(|i| self.register(i)).collect()
    }

    /// Emit the byte-count prefix followed by the raw bytes.
    pub fn write_to(&self, buf: &mut RingBuffer) -> bool {
        let raw = self.raw();
        let Ok(len) = u8::try_from(raw.len()) else {
            return false;
        };
        buf.write_u8(len) && buf.write(raw) == raw.len()
    }
}
