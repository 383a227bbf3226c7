//! Flashing the screen's ESP32-C3 through its ROM bootloader.

pub mod loader;
mod resources;
pub mod slip;
pub mod target;

pub use loader::{Command, Loader, FLASH_BLOCK, RAM_BLOCK};
pub use resources::{DirResources, MemoryResources, ResourceLoader};
pub use target::{Chip, TargetIo};
