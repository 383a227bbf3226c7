pub mod firmware;
pub mod monitor;
pub mod router;

/// Modbus address of the screen on the serial line.
pub const SCREEN_SLAVE: u8 = 1;

// Re-export the pieces main wires together
pub use firmware::{hardware_version, UpdateOutcome, Updater, BUNDLED_VERSION, FLASH_LAYOUT};
pub use monitor::Monitor;
pub use router::{NetworkStatus, OpenWrtClient, OpenWrtConfig, StatusProvider, SystemStatus};
