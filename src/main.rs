use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};

use nas_screen::{
    api::{Monitor, OpenWrtClient, UpdateOutcome, Updater},
    boot,
    cli::{self, Config},
    protocol::{
        esptool::DirResources,
        modbus::ModbusSession,
        tty::{wait_port, SerialTransport, ESP_USB_JTAG_PID},
    },
};

const PORT_POLL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    boot::init_logger();
    let matches = cli::parse_args();

    if cli::run_one_shot(&matches)? {
        return Ok(());
    }

    let config = Config::load(matches.get_one::<String>("config").map(String::as_str))?;

    let client = OpenWrtClient::new(config.openwrt.clone());
    let client = tokio::task::spawn_blocking(move || client.sign_in().map(|()| client))
        .await
        .context("sign-in task failed")?
        .context("failed to sign in to the router")?;

    let port = match matches.get_one::<String>("port").or(config.port.as_ref()) {
        Some(port) => port.clone(),
        None => {
            log::info!("waiting for a screen with product id 0x{ESP_USB_JTAG_PID:04X}");
            tokio::task::spawn_blocking(|| wait_port(ESP_USB_JTAG_PID, PORT_POLL)).await?
        }
    };
    log::info!("using port {port}");

    let mut transport = SerialTransport::new(port).with_baud_rate(config.baud_rate);

    if matches.get_flag("skip-update") {
        log::info!("firmware check skipped");
    } else {
        let updater = Updater::new(Arc::new(DirResources::new(config.firmware_dir.clone())))
            .with_version(config.firmware_version);
        let (outcome, returned) = tokio::task::spawn_blocking(move || {
            let outcome = updater.update(&mut transport);
            (outcome, transport)
        })
        .await
        .context("firmware task failed")?;
        transport = returned;

        match outcome.context("firmware update failed")? {
            UpdateOutcome::UpToDate { version } => {
                log::info!("firmware up to date (version {version})")
            }
            UpdateOutcome::Flashed { from, to } => {
                log::info!("firmware updated from version {from} to {to}")
            }
        }
    }

    let monitor = Monitor::start(ModbusSession::new(transport), client)?;

    let (tx, rx) = flume::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = tx.try_send(());
    })
    .context("failed to install signal handler")?;

    let _ = rx.recv_async().await;
    log::info!("shutting down");

    monitor.stop().await?;
    Ok(())
}
