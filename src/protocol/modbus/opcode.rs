//! Function codes understood by the screen firmware and how each one shapes
//! its request and reply frames.

pub const READ_COILS: u8 = 0x01;
pub const READ_DISCRETE_INPUTS: u8 = 0x02;
pub const READ_HOLDING_REGISTERS: u8 = 0x03;
pub const READ_INPUT_REGISTERS: u8 = 0x04;
pub const WRITE_SINGLE_COIL: u8 = 0x05;
pub const WRITE_SINGLE_REGISTER: u8 = 0x06;
pub const WRITE_MULTIPLE_COILS: u8 = 0x0F;
pub const WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

pub const ERROR_MASK: u8 = 0x80;
pub const FUNCTION_MASK: u8 = 0x7F;

/// Value carried by a single-coil write for "on".
pub const COIL_ON: u16 = 0xFF00;
pub const COIL_OFF: u16 = 0x0000;

/// Layout of a frame's data section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// One bit per element, LSB first.
    Bits,
    /// Big-endian 16-bit registers.
    Registers,
}

pub const fn is_error(opcode: u8) -> bool {
    opcode & ERROR_MASK == ERROR_MASK
}

pub const fn function(opcode: u8) -> u8 {
    opcode & FUNCTION_MASK
}

/// Whether this function code (or an error reply to it) is part of the
/// supported subset.
pub const fn is_supported(opcode: u8) -> bool {
    is_error(opcode)
        || matches!(
            function(opcode),
            READ_COILS
                | READ_DISCRETE_INPUTS
                | READ_HOLDING_REGISTERS
                | READ_INPUT_REGISTERS
                | WRITE_SINGLE_COIL
                | WRITE_SINGLE_REGISTER
                | WRITE_MULTIPLE_COILS
                | WRITE_MULTIPLE_REGISTERS
        )
}

pub const fn request_payload(opcode: u8) -> Option<PayloadKind> {
    match opcode {
        WRITE_MULTIPLE_COILS => Some(PayloadKind::Bits),
        WRITE_MULTIPLE_REGISTERS => Some(PayloadKind::Registers),
        _ => None,
    }
}

pub const fn reply_payload(opcode: u8) -> Option<PayloadKind> {
    if is_error(opcode) {
        return Some(PayloadKind::Bits);
    }
    match opcode {
        READ_COILS | READ_DISCRETE_INPUTS => Some(PayloadKind::Bits),
        READ_HOLDING_REGISTERS | READ_INPUT_REGISTERS => Some(PayloadKind::Registers),
        _ => None,
    }
}

/// Write replies echo the address and length/value fields of the request.
pub const fn reply_has_attr(opcode: u8) -> bool {
    matches!(
        opcode,
        WRITE_SINGLE_COIL | WRITE_SINGLE_REGISTER | WRITE_MULTIPLE_COILS | WRITE_MULTIPLE_REGISTERS
    )
}
