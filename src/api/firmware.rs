//! Keeping the screen firmware in step with the images shipped alongside us.

use std::{sync::Arc, thread, time::Duration};

use anyhow::{Context, Result};

use super::SCREEN_SLAVE;
use crate::protocol::{
    esptool::{loader, Loader, ResourceLoader},
    modbus::{opcode::READ_HOLDING_REGISTERS, ModbusSession, Request},
    tty::{reboot, reset::SETTLE, ResetMode, Transport},
};

/// Firmware version bundled with this build.
pub const BUNDLED_VERSION: u16 = 0x0005;

/// Image name and flash offset, in write order.
pub const FLASH_LAYOUT: [(&str, u32); 3] = [
    ("bootloader.bin", 0x0000_0000),
    ("nas-ui.bin", 0x0001_0000),
    ("partition-table.bin", 0x0000_8000),
];

/// Holding register the running firmware reports its version in.
const VERSION_REGISTER: u16 = 0;
const POST_FLASH_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    UpToDate { version: u16 },
    Flashed { from: u16, to: u16 },
}

/// Ask the running firmware for its version. A silent device reads as 0.
pub fn hardware_version<T: Transport + ?Sized>(transport: &mut T) -> Result<u16> {
    let mut session = ModbusSession::new(transport);
    session.open().context("failed to open port for version check")?;

    let request = Request::new(READ_HOLDING_REGISTERS)
        .with_address(VERSION_REGISTER)
        .with_length(1);
    let reply = session.exec(SCREEN_SLAVE, &request);
    session.close()?;

    let version = reply?
        .and_then(|reply| reply.register(0))
        .unwrap_or_default();
    Ok(version)
}

pub struct Updater {
    resources: Arc<dyn ResourceLoader>,
    bundled_version: u16,
    settle: Duration,
    post_flash_delay: Duration,
    command_timeout: Duration,
}

impl Updater {
    pub fn new(resources: Arc<dyn ResourceLoader>) -> Self {
        Self {
            resources,
            bundled_version: BUNDLED_VERSION,
            settle: SETTLE,
            post_flash_delay: POST_FLASH_DELAY,
            command_timeout: loader::DEFAULT_TIMEOUT,
        }
    }

    pub fn with_version(mut self, version: u16) -> Self {
        self.bundled_version = version;
        self
    }

    /// Shorten the waits after resets and after flashing.
    pub fn with_delays(mut self, settle: Duration, post_flash: Duration) -> Self {
        self.settle = settle;
        self.post_flash_delay = post_flash;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Boot the application, compare versions and reflash when they differ.
    /// The device is left running the application either way.
    pub fn update<T: Transport + ?Sized>(&self, transport: &mut T) -> Result<UpdateOutcome> {
        reboot(transport, ResetMode::Normal, self.settle).context("failed to reset device")?;

        let current = hardware_version(transport)?;
        log::info!(
            "firmware: hardware({current}) embedded({})",
            self.bundled_version
        );
        if current == self.bundled_version {
            return Ok(UpdateOutcome::UpToDate { version: current });
        }

        log::warn!("firmware: update to {}", self.bundled_version);
        reboot(transport, ResetMode::Download, self.settle)
            .context("failed to reset device into download mode")?;
        self.download(transport)?;

        log::warn!("firmware: update finished, reboot....");
        reboot(transport, ResetMode::Normal, self.settle).context("failed to reset device")?;

        Ok(UpdateOutcome::Flashed {
            from: current,
            to: self.bundled_version,
        })
    }

    fn download<T: Transport + ?Sized>(&self, transport: &mut T) -> Result<()> {
        let mut loader =
            Loader::new(transport, self.resources.clone()).with_timeout(self.command_timeout);
        let opened = loader.open();
        if opened.is_err() {
            if let Err(err) = loader.close() {
                log::warn!("firmware: failed to close port after stub start failure: {err}");
            }
        }
        opened.context("failed to start the flasher stub")?;

        let flashed = self.flash(&mut loader);
        let closed = loader.close();
        flashed?;
        closed?;

        thread::sleep(self.post_flash_delay);
        Ok(())
    }

    fn flash<T: Transport>(&self, loader: &mut Loader<T>) -> Result<()> {
        loader.erase_flash().context("failed to erase flash")?;

        for (name, addr) in FLASH_LAYOUT {
            let image = self.resources.load(name)?;
            log::info!("firmware: writing {name} ({} bytes) at 0x{addr:08X}", image.len());
            loader
                .write_flash(addr, &image)
                .with_context(|| format!("failed to write {name}"))?;
        }

        loader.write_flash_finish().context("failed to finish flashing")?;
        Ok(())
    }
}
