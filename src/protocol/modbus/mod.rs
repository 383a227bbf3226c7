//! Modbus RTU master used to talk to the running screen firmware.

mod codec;
mod crc;
mod frame;
pub mod opcode;
mod payload;
mod session;

pub use codec::{FrameCodec, RtuCodec};
pub use crc::{crc16, crc16_buffer};
pub use frame::{Reply, Request};
pub use opcode::PayloadKind;
pub use payload::Payload;
pub use session::{ModbusSession, FRAME_CAPACITY};
