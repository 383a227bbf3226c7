pub mod config;

use clap::{Arg, ArgMatches, Command};
use serde::Serialize;
use serialport::{SerialPortInfo, SerialPortType};

pub use config::Config;

pub fn build_cli() -> Command {
    Command::new("nas-screen")
        .about("Keeps the NAS status screen flashed and fed with router telemetry")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("FILE")
                .help("Configuration file (defaults to $CONFIG_FILE, then config.toml)"),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .short('p')
                .value_name("PORT")
                .help("Serial port of the screen, overrides the configuration"),
        )
        .arg(
            Arg::new("list-ports")
                .long("list-ports")
                .short('l')
                .help("List available serial ports and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("skip-update")
                .long("skip-update")
                .help("Do not check or flash the screen firmware")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .short('j')
                .help("Print --list-ports output as JSON")
                .action(clap::ArgAction::SetTrue),
        )
}

pub fn parse_args() -> ArgMatches {
    build_cli().get_matches()
}

#[derive(Debug, Serialize)]
struct PortInfo<'a> {
    port_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    vid: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pid: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    serial: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    product: Option<&'a str>,
}

impl<'a> From<&'a SerialPortInfo> for PortInfo<'a> {
    fn from(info: &'a SerialPortInfo) -> Self {
        let mut out = PortInfo {
            port_name: &info.port_name,
            vid: None,
            pid: None,
            serial: None,
            product: None,
        };
        if let SerialPortType::UsbPort(usb) = &info.port_type {
            out.vid = Some(usb.vid);
            out.pid = Some(usb.pid);
            out.serial = usb.serial_number.as_deref();
            out.product = usb.product.as_deref();
        }
        out
    }
}

fn render_ports(ports: &[SerialPortInfo], json: bool) -> anyhow::Result<String> {
    let infos: Vec<PortInfo> = ports.iter().map(PortInfo::from).collect();
    if json {
        return Ok(serde_json::to_string(&infos)?);
    }

    let lines: Vec<String> = infos
        .iter()
        .map(|p| match (p.vid, p.pid) {
            (Some(vid), Some(pid)) => format!("{} (USB {vid:04x}:{pid:04x})", p.port_name),
            _ => p.port_name.to_string(),
        })
        .collect();
    Ok(lines.join("\n"))
}

/// Handle one-shot flags. Returns true when the process should exit.
pub fn run_one_shot(matches: &ArgMatches) -> anyhow::Result<bool> {
    if matches.get_flag("list-ports") {
        let ports = crate::protocol::tty::available_ports_sorted();
        let out = render_ports(&ports, matches.get_flag("json"))?;
        if !out.is_empty() {
            println!("{out}");
        }
        return Ok(true);
    }
    Ok(false)
}
