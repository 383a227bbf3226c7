//! Driver for the ESP ROM bootloader's serial command protocol.
//!
//! Every command is a SLIP frame `[0x00, op, len (LE u16), checksum (LE u32)]`
//! followed by its payload. Replies echo the opcode in byte 1 and carry a
//! 32-bit value in bytes 4..8.

use std::{io::Write, sync::Arc, thread, time::Duration};

use flate2::{write::ZlibEncoder, Compression};

use super::{
    resources::ResourceLoader,
    slip,
    target::{format_mac, Chip, TargetIo, CHIP_DETECT_MAGIC_REG},
};
use crate::{
    error::{Error, Result},
    protocol::tty::Transport,
};

pub const RAM_BLOCK: u32 = 0x1800;
pub const FLASH_BLOCK: u32 = 0x400;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
const ERASE_TIMEOUT: Duration = Duration::from_secs(20);
const GREETING_TIMEOUT: Duration = Duration::from_secs(10);
const GREETING_DELAY: Duration = Duration::from_micros(100);

const SYNC_ATTEMPTS: usize = 10;
const MAX_REPLY_FRAMES: usize = 16;
const CHECKSUM_SEED: u32 = 0xEF;
const STUB_GREETING: &[u8; 4] = b"OHAI";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    FlashBegin = 0x02,
    MemBegin = 0x05,
    MemEnd = 0x06,
    MemData = 0x07,
    Sync = 0x08,
    ReadReg = 0x0A,
    FlashDeflBegin = 0x10,
    FlashDeflData = 0x11,
    FlashDeflEnd = 0x12,
    EraseFlash = 0xD0,
}

impl Command {
    pub fn opcode(self) -> u8 {
        self as u8
    }
}

/// XOR of all bytes, seeded with `0xEF`.
pub fn checksum(data: &[u8]) -> u32 {
    data.iter().fold(CHECKSUM_SEED, |state, b| state ^ u32::from(*b))
}

fn words(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub struct Loader<T> {
    transport: T,
    resources: Arc<dyn ResourceLoader>,
    chip: Option<Chip>,
    timeout: Duration,
    /// Stub greeting that arrived while a command was waiting for its reply.
    greeting: Option<Vec<u8>>,
}

impl<T: Transport> Loader<T> {
    pub fn new(transport: T, resources: Arc<dyn ResourceLoader>) -> Self {
        Self {
            transport,
            resources,
            chip: None,
            timeout: DEFAULT_TIMEOUT,
            greeting: None,
        }
    }

    /// Per-command reply timeout (1 s unless overridden).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn chip(&self) -> Option<Chip> {
        self.chip
    }

    /// Open the port, sync with the ROM, identify the chip and start the
    /// flasher stub.
    pub fn open(&mut self) -> Result<Chip> {
        self.transport.open()?;
        self.sync(SYNC_ATTEMPTS)?;

        let magic = self.read_reg(CHIP_DETECT_MAGIC_REG)?;
        let chip = Chip::from_magic(magic)?;
        self.chip = Some(chip);
        log::info!("esptool: detected {chip}");

        let mac = self.read_mac()?;
        log::info!("esptool: chip mac({})", format_mac(&mac));

        self.run_stub(chip)?;
        Ok(chip)
    }

    pub fn close(&mut self) -> Result<()> {
        self.transport.close()
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    pub fn sync(&mut self, attempts: usize) -> Result<()> {
        let mut packet = vec![0x07, 0x07, 0x12, 0x20];
        packet.extend_from_slice(&[0x55; 32]);

        for attempt in 1..=attempts {
            match self.exec(Command::Sync, &packet, 0, self.timeout) {
                Ok(_) => {
                    log::debug!("esptool: synced after {attempt} attempt(s)");
                    return Ok(());
                }
                Err(err) => log::debug!("esptool: sync attempt {attempt} failed: {err}"),
            }
        }
        Err(Error::SyncFailed { attempts })
    }

    pub fn read_reg(&mut self, addr: u32) -> Result<u32> {
        let (value, _) = self.exec(Command::ReadReg, &addr.to_le_bytes(), 0, self.timeout)?;
        Ok(value)
    }

    pub fn read_mac(&mut self) -> Result<[u8; 6]> {
        let chip = self.chip.ok_or(Error::ChipUnknown)?;
        chip.read_mac(self)
    }

    pub fn mem_begin(&mut self, size: u32, blocks: u32, block_size: u32, offset: u32) -> Result<()> {
        let packet = words(&[size, blocks, block_size, offset]);
        self.exec(Command::MemBegin, &packet, 0, self.timeout)?;
        Ok(())
    }

    pub fn mem_block(&mut self, data: &[u8]) -> Result<()> {
        self.send_blocks(Command::MemData, data, RAM_BLOCK)
    }

    /// Leave RAM download mode. A non-zero `entry` jumps there.
    pub fn mem_finish(&mut self, entry: u32) -> Result<()> {
        let packet = words(&[u32::from(entry == 0), entry]);
        self.exec(Command::MemEnd, &packet, 0, self.timeout)?;
        Ok(())
    }

    pub fn flash_begin(&mut self, size: u32, addr: u32) -> Result<()> {
        let chip = self.chip.ok_or(Error::ChipUnknown)?;
        let packet = words(&[
            chip.erase_size(addr, size),
            size.div_ceil(FLASH_BLOCK),
            FLASH_BLOCK,
            addr,
        ]);
        self.exec(Command::FlashBegin, &packet, 0, self.timeout)?;
        Ok(())
    }

    pub fn flash_defl_begin(
        &mut self,
        size: u32,
        blocks: u32,
        block_size: u32,
        offset: u32,
    ) -> Result<()> {
        let packet = words(&[size, blocks, block_size, offset]);
        self.exec(Command::FlashDeflBegin, &packet, 0, self.timeout)?;
        Ok(())
    }

    /// End the deflate session. With `reboot == false` the stub stays in
    /// the bootloader.
    pub fn flash_defl_finish(&mut self, reboot: bool) -> Result<()> {
        let packet = words(&[u32::from(!reboot)]);
        self.exec(Command::FlashDeflEnd, &packet, 0, self.timeout)?;
        Ok(())
    }

    pub fn erase_flash(&mut self) -> Result<()> {
        log::info!("esptool: erasing flash (this may take a while)...");
        self.exec(Command::EraseFlash, &[], 0, ERASE_TIMEOUT)?;
        log::info!("esptool: chip erase completed successfully");
        Ok(())
    }

    /// Compress `image` and stream it to flash at `addr`.
    pub fn write_flash(&mut self, addr: u32, image: &[u8]) -> Result<()> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(image)?;
        let compressed = encoder.finish()?;

        let blocks = (compressed.len() as u32).div_ceil(FLASH_BLOCK);
        log::info!(
            "esptool: compressed {} bytes to {} bytes, writing {} blocks at 0x{addr:08X}",
            image.len(),
            compressed.len(),
            blocks
        );

        // the ROM expects the uncompressed size here
        self.flash_defl_begin(image.len() as u32, blocks, FLASH_BLOCK, addr)?;
        self.send_blocks(Command::FlashDeflData, &compressed, FLASH_BLOCK)
    }

    pub fn write_flash_finish(&mut self) -> Result<()> {
        self.flash_begin(0, 0)?;
        self.flash_defl_finish(false)
    }

    /// Send one command and wait for the reply carrying the same opcode.
    /// Returns the reply's value word and trailing data.
    pub fn exec(
        &mut self,
        command: Command,
        data: &[u8],
        checksum: u32,
        timeout: Duration,
    ) -> Result<(u32, Vec<u8>)> {
        let op = command.opcode();
        let mut packet = Vec::with_capacity(8 + data.len());
        packet.push(0x00);
        packet.push(op);
        packet.extend_from_slice(&(data.len() as u16).to_le_bytes());
        packet.extend_from_slice(&checksum.to_le_bytes());
        packet.extend_from_slice(data);

        log::trace!("esptool: command {command:?} data len={}", data.len());
        slip::write_frame(&mut self.transport, &packet)?;

        for _ in 0..MAX_REPLY_FRAMES {
            let reply = slip::read_frame(&mut self.transport, timeout)?;
            if reply.starts_with(STUB_GREETING) {
                log::debug!("esptool: stub greeting arrived while waiting for {command:?}");
                self.greeting = Some(reply);
                continue;
            }
            if reply.len() < 8 || reply[1] != op {
                log::trace!("esptool: skipping unrelated frame while waiting for {command:?}");
                continue;
            }
            let value = u32::from_le_bytes([reply[4], reply[5], reply[6], reply[7]]);
            return Ok((value, reply[8..].to_vec()));
        }

        Err(Error::ReplyMismatch {
            opcode: op,
            attempts: MAX_REPLY_FRAMES,
        })
    }

    fn send_blocks(&mut self, command: Command, data: &[u8], block_size: u32) -> Result<()> {
        let total = data.len();
        let mut sent = 0;

        for (sequence, block) in data.chunks(block_size as usize).enumerate() {
            let mut packet = words(&[block.len() as u32, sequence as u32, 0, 0]);
            packet.extend_from_slice(block);
            self.exec(command, &packet, checksum(block), self.timeout)?;

            sent += block.len();
            log::debug!(
                "esptool: {sent} of {total} - {:.2}%",
                sent as f64 / total as f64 * 100.0
            );
        }
        Ok(())
    }

    fn run_stub(&mut self, chip: Chip) -> Result<()> {
        log::info!("esptool: uploading stub...");
        let segments = [chip.stub_text(&*self)?, chip.stub_data(&*self)?];
        for segment in &segments {
            let size = segment.data.len() as u32;
            self.mem_begin(size, size.div_ceil(RAM_BLOCK), RAM_BLOCK, segment.addr)?;
            self.mem_block(&segment.data)?;
        }

        log::info!("esptool: running stub...");
        self.greeting = None;
        if let Err(err) = self.mem_finish(chip.stub_entry()) {
            // the stub can start before the ROM gets to acknowledge
            log::warn!("esptool: MEM_END not acknowledged: {err}");
        }

        let greeting = match self.greeting.take() {
            Some(greeting) => greeting,
            None => {
                thread::sleep(GREETING_DELAY);
                slip::read_frame(&mut self.transport, GREETING_TIMEOUT)?
            }
        };
        if !greeting.starts_with(STUB_GREETING) {
            return Err(Error::StubStart { greeting });
        }

        log::info!("esptool: stub running...");
        Ok(())
    }
}

impl<T: Transport> TargetIo for Loader<T> {
    fn read_reg(&mut self, addr: u32) -> Result<u32> {
        Loader::read_reg(self, addr)
    }

    fn load_resource(&self, name: &str) -> Result<Vec<u8>> {
        self.resources.load(name)
    }
}
