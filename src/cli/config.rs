use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::api::{OpenWrtConfig, BUNDLED_VERSION};
use crate::protocol::tty::DEFAULT_BAUD_RATE;

/// Environment variable consulted when `--config` is absent.
pub const CONFIG_ENV: &str = "CONFIG_FILE";
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Daemon configuration as read from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    /// Serial device of the screen. Detected by USB product id when absent.
    #[serde(default)]
    pub port: Option<String>,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Directory holding `bootloader.bin`, `nas-ui.bin`, `partition-table.bin`
    /// and the flasher stub images `stub/esp32c3_text.bin` and
    /// `stub/esp32c3_data.bin`.
    #[serde(default = "default_firmware_dir")]
    pub firmware_dir: PathBuf,

    /// Version of the images in `firmware_dir`.
    #[serde(default = "default_firmware_version")]
    pub firmware_version: u16,

    pub openwrt: OpenWrtConfig,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_firmware_dir() -> PathBuf {
    PathBuf::from("embed")
}

fn default_firmware_version() -> u16 {
    BUNDLED_VERSION
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("in {}", path.display()))
    }

    /// Load from the `--config` value, the `CONFIG_FILE` variable or
    /// `config.toml`, in that order.
    pub fn load(cli_path: Option<&str>) -> Result<Self> {
        let path = resolve_path(cli_path, std::env::var(CONFIG_ENV).ok());
        log::info!("config: loading {}", path.display());
        Self::from_file(path)
    }

    fn validate(&self) -> Result<()> {
        if self.openwrt.host.trim().is_empty() {
            bail!("openwrt.host is required");
        }
        if self.openwrt.password.is_empty() {
            bail!("openwrt.password is required");
        }
        if self.baud_rate == 0 {
            bail!("baud_rate must be positive");
        }
        Ok(())
    }
}

fn resolve_path(cli_path: Option<&str>, env_path: Option<String>) -> PathBuf {
    cli_path
        .map(PathBuf::from)
        .or_else(|| env_path.filter(|p| !p.is_empty()).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
