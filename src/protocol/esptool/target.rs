//! Per-chip knowledge: how a chip is recognised and where its loader stub lives.

use derive_more::Display;

use crate::error::{Error, Result};

/// Register holding the chip identification magic.
pub const CHIP_DETECT_MAGIC_REG: u32 = 0x4000_1000;

/// What a chip profile needs from the loader driving it.
pub trait TargetIo {
    fn read_reg(&mut self, addr: u32) -> Result<u32>;
    fn load_resource(&self, name: &str) -> Result<Vec<u8>>;
}

/// A blob to be placed in chip RAM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub addr: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Chip {
    #[display("ESP32-C3")]
    Esp32c3,
}

const MAGIC_TABLE: &[(u32, Chip)] = &[
    (0x6921_506F, Chip::Esp32c3),
    (0x1B31_506F, Chip::Esp32c3),
    (0x4881_606F, Chip::Esp32c3),
    (0x4361_606F, Chip::Esp32c3),
];

impl Chip {
    pub fn from_magic(magic: u32) -> Result<Chip> {
        MAGIC_TABLE
            .iter()
            .find(|(m, _)| *m == magic)
            .map(|(_, chip)| *chip)
            .ok_or(Error::UnsupportedChip { magic })
    }

    /// Bytes to erase before writing `size` bytes at `addr`.
    pub fn erase_size(&self, _addr: u32, size: u32) -> u32 {
        match self {
            Chip::Esp32c3 => size,
        }
    }

    /// Factory MAC address burned into eFuse.
    pub fn read_mac(&self, io: &mut impl TargetIo) -> Result<[u8; 6]> {
        match self {
            Chip::Esp32c3 => {
                let mac0 = io.read_reg(0x6000_8844)?;
                let mac1 = io.read_reg(0x6000_8848)?;
                let [_, _, m0, m1] = mac1.to_be_bytes();
                let [m2, m3, m4, m5] = mac0.to_be_bytes();
                Ok([m0, m1, m2, m3, m4, m5])
            }
        }
    }

    pub fn stub_text(&self, io: &impl TargetIo) -> Result<Segment> {
        match self {
            Chip::Esp32c3 => Ok(Segment {
                addr: 0x4038_0000,
                data: io.load_resource("stub/esp32c3_text.bin")?,
            }),
        }
    }

    pub fn stub_data(&self, io: &impl TargetIo) -> Result<Segment> {
        match self {
            Chip::Esp32c3 => Ok(Segment {
                addr: 0x3FC9_6BB0,
                data: io.load_resource("stub/esp32c3_data.bin")?,
            }),
        }
    }

    pub fn stub_entry(&self) -> u32 {
        match self {
            Chip::Esp32c3 => 0x4038_069C,
        }
    }
}

pub fn format_mac(mac: &[u8; 6]) -> String {
    mac.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}
