//! Error type shared by the protocol engines.
//!
//! The flasher and the Modbus session return [`Result`]; orchestration code
//! (`api`, `cli`, `main`) wraps these into `anyhow::Error` with context.

use std::time::Duration;

use derive_more::{Display, Error, From};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, From)]
pub enum Error {
    /// The serial line failed underneath us.
    #[display("transport failure: {_0}")]
    #[from]
    Io(std::io::Error),

    #[display("port not open")]
    PortNotOpen,

    /// No complete frame arrived before the deadline.
    #[display("read timeout after {elapsed:?}, received {received} bytes")]
    Timeout { elapsed: Duration, received: usize },

    /// A SLIP escape byte was followed by something other than `DC`/`DD`.
    #[display("unexpected byte 0x{byte:02X} after escape character")]
    Framing { byte: u8 },

    #[display("no reply for opcode 0x{opcode:02X} after {attempts} frames")]
    ReplyMismatch { opcode: u8, attempts: usize },

    #[display("bootloader did not answer sync after {attempts} attempts")]
    SyncFailed { attempts: usize },

    #[display("chip not supported (magic 0x{magic:08X})")]
    UnsupportedChip { magic: u32 },

    #[display("failed to start stub, greeting was {greeting:02X?}")]
    StubStart { greeting: Vec<u8> },

    /// Operation needs the chip profile, which is only known after `open`.
    #[display("chip has not been identified yet")]
    ChipUnknown,

    #[display("failed to load resource '{name}': {reason}")]
    Resource { name: String, reason: String },
}

impl Error {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

/// I/O error kinds a serial read/write reports when nothing moved within the
/// port timeout. Callers treat these like a zero-length transfer.
pub(crate) fn is_transient(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::WouldBlock
            | std::io::ErrorKind::Interrupted
    )
}
