//! nas-screen: drives the status screen co-processor of a NAS over its single
//! USB serial line.
//!
//! On startup the screen firmware is compared against the bundled images and
//! reflashed through the ROM bootloader when they differ (`protocol::esptool`).
//! Afterwards router telemetry is pushed to the screen every two seconds as
//! Modbus RTU register writes (`protocol::modbus`, `api::monitor`).
//!
//! The `api` module holds the orchestration used by the binary; the protocol
//! layers are usable on their own against any [`protocol::tty::Transport`].

pub mod api;
#[doc(hidden)]
pub mod boot;
#[doc(hidden)]
pub mod cli;
pub mod error;
pub mod protocol;

pub use api::*;
