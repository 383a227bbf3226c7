//! Router telemetry pulled from the LuCI JSON API of an OpenWrt/iStoreOS box.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{
    de::{DeserializeOwned, IgnoredAny},
    Deserialize, Serialize,
};
use ureq::{
    tls::{TlsConfig, TlsProvider},
    Agent,
};

/// Load, memory and temperature, as shown on the screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SystemStatus {
    /// CPU usage in percent.
    pub cpu: u16,
    /// Memory in use, percent.
    pub mem: u16,
    /// CPU temperature in °C.
    pub temp: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NetworkStatus {
    /// Devices seen on the LAN.
    pub peers: u16,
    /// Upload rate, packed with [`pack_rate`].
    pub up: u16,
    /// Download rate, packed with [`pack_rate`].
    pub down: u16,
}

/// Source of the numbers the monitor pushes to the screen.
pub trait StatusProvider: Send {
    fn system_status(&self) -> Result<SystemStatus>;
    fn network_status(&self) -> Result<NetworkStatus>;
}

/// Pack a byte rate into 16 bits: bits 14-15 count powers of 1024, the low
/// bits hold the scaled value.
pub fn pack_rate(rate: i64) -> u16 {
    let mut value = rate.max(0);
    let mut unit = 0u16;
    while value > 1024 {
        unit = unit.wrapping_add(0x4000);
        value /= 1024;
    }
    unit | value as u16
}

fn saturate(value: i64) -> u16 {
    value.clamp(0, i64::from(u16::MAX)) as u16
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OpenWrtConfig {
    /// Base address, e.g. `http://192.168.100.1`.
    pub host: String,
    /// Path segment of the vendor API under `/cgi-bin/luci/`.
    pub os: String,
    pub username: String,
    pub password: String,
}

impl Default for OpenWrtConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            os: "istore".to_string(),
            username: "root".to_string(),
            password: String::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: i64,
    result: Option<T>,
}

impl<T> Envelope<T> {
    fn into_result(self, what: &str) -> Result<T> {
        if self.success != 0 {
            bail!("openwrt: {what} failed with code {}", self.success);
        }
        self.result
            .ok_or_else(|| anyhow!("openwrt: {what} reply has no result"))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct VersionInfo {
    firmware_version: String,
    kernel_version: String,
    model: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SystemInfo {
    cpu_temperature: i64,
    cpu_usage: i64,
    mem_available_percentage: i64,
}

impl From<SystemInfo> for SystemStatus {
    fn from(info: SystemInfo) -> Self {
        Self {
            cpu: saturate(info.cpu_usage),
            mem: saturate(100 - info.mem_available_percentage),
            temp: saturate(info.cpu_temperature),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DeviceList {
    devices: Vec<IgnoredAny>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Statistics {
    items: Vec<StatisticsItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct StatisticsItem {
    download_speed: i64,
    upload_speed: i64,
}

fn network_status_from(devices: DeviceList, statistics: Statistics) -> Result<NetworkStatus> {
    let latest = statistics
        .items
        .last()
        .ok_or_else(|| anyhow!("openwrt: network statistics are empty"))?;
    Ok(NetworkStatus {
        peers: saturate(devices.devices.len() as i64),
        up: pack_rate(latest.upload_speed),
        down: pack_rate(latest.download_speed),
    })
}

/// Session-cookie client for the LuCI API.
pub struct OpenWrtClient {
    config: OpenWrtConfig,
    agent: Agent,
}

impl OpenWrtClient {
    pub fn new(config: OpenWrtConfig) -> Self {
        let agent_config = Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(5)))
            .tls_config(TlsConfig::builder().provider(TlsProvider::NativeTls).build())
            .build();
        Self {
            config,
            agent: Agent::new_with_config(agent_config),
        }
    }

    fn base_url(&self) -> String {
        format!("{}/cgi-bin/luci/", self.config.host.trim_end_matches('/'))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url(), self.config.os, path)
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<Envelope<T>> {
        let url = self.url(path);
        let envelope = self
            .agent
            .get(&url)
            .call()
            .with_context(|| format!("openwrt: GET {url}"))?
            .body_mut()
            .read_json::<Envelope<T>>()
            .with_context(|| format!("openwrt: decode {url}"))?;
        Ok(envelope)
    }

    /// Log in and keep the session cookie in the agent.
    pub fn sign_in(&self) -> Result<()> {
        let url = self.base_url();
        self.agent
            .post(&url)
            .send_form([
                ("luci_username", self.config.username.as_str()),
                ("luci_password", self.config.password.as_str()),
            ])
            .with_context(|| format!("openwrt: POST {url}"))?;

        let version = self
            .get_json::<VersionInfo>("/u/system/version")?
            .into_result("sign in")?;

        log::info!("openwrt: firmware({})", version.firmware_version);
        log::info!("openwrt: kernel({})", version.kernel_version);
        log::info!("openwrt: model({})", version.model);
        Ok(())
    }
}

impl StatusProvider for OpenWrtClient {
    fn system_status(&self) -> Result<SystemStatus> {
        let mut reply = self.get_json::<SystemInfo>("/system/status")?;
        if reply.success != 0 {
            log::debug!("openwrt: session expired, signing in again");
            self.sign_in()?;
            reply = self.get_json::<SystemInfo>("/system/status")?;
        }
        Ok(reply.into_result("system status")?.into())
    }

    fn network_status(&self) -> Result<NetworkStatus> {
        let devices = self
            .get_json::<DeviceList>("/network/device/list")?
            .into_result("device list")?;
        let statistics = self
            .get_json::<Statistics>("/u/network/statistics")?
            .into_result("network statistics")?;
        network_status_from(devices, statistics)
    }
}
