//! DTR/RTS sequences driving the board's auto-reset circuit.

use std::{thread, time::Duration};

use super::Transport;
use crate::error::Result;

/// Settle time after a reset before the port is usable again.
pub const SETTLE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMode {
    /// Boot the application firmware.
    Normal,
    /// Hold the strapping pin so the chip enters the ROM bootloader.
    Download,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Dtr(bool),
    Rts(bool),
    Wait(Duration),
}

const NORMAL: &[Step] = &[
    Step::Dtr(false),
    Step::Rts(true),
    Step::Wait(Duration::from_millis(100)),
    Step::Dtr(true),
    Step::Rts(false),
];

const DOWNLOAD: &[Step] = &[
    Step::Rts(false),
    Step::Dtr(false),
    Step::Wait(Duration::from_micros(100)),
    Step::Dtr(true),
    Step::Rts(false),
    Step::Wait(Duration::from_micros(100)),
    Step::Rts(true),
    Step::Rts(false),
    Step::Rts(true),
    Step::Wait(Duration::from_micros(100)),
    Step::Dtr(false),
    Step::Rts(false),
];

impl ResetMode {
    fn steps(self) -> &'static [Step] {
        match self {
            ResetMode::Normal => NORMAL,
            ResetMode::Download => DOWNLOAD,
        }
    }
}

/// Open the port, play the sequence for `mode`, close it again and sleep
/// `settle` while the chip boots.
pub fn reboot<T: Transport + ?Sized>(
    transport: &mut T,
    mode: ResetMode,
    settle: Duration,
) -> Result<()> {
    log::debug!("tty: reset into {mode:?} mode");
    transport.open()?;

    for step in mode.steps() {
        match *step {
            Step::Dtr(level) => transport.set_dtr(level)?,
            Step::Rts(level) => transport.set_rts(level)?,
            Step::Wait(pause) => thread::sleep(pause),
        }
    }

    transport.close()?;
    thread::sleep(settle);
    Ok(())
}
