//! Periodic telemetry push to the screen.

use std::time::Duration;

use anyhow::{Context, Result};
use flume::{Receiver, RecvTimeoutError, Sender};
use tokio::task::JoinHandle;

use super::{
    router::{NetworkStatus, StatusProvider, SystemStatus},
    SCREEN_SLAVE,
};
use crate::protocol::{
    modbus::{opcode::WRITE_MULTIPLE_REGISTERS, ModbusSession, Request},
    tty::Transport,
};

pub const PUSH_INTERVAL: Duration = Duration::from_secs(2);

/// First holding register of the status block on the screen.
pub const STATUS_ADDRESS: u16 = 1;
/// CPU, memory, temperature, upload, download, peers.
pub const STATUS_REGISTERS: u16 = 6;

/// Build the status write. Missing halves leave their registers at zero.
pub fn build_request(system: Option<SystemStatus>, network: Option<NetworkStatus>) -> Request {
    let mut request = Request::new(WRITE_MULTIPLE_REGISTERS)
        .with_address(STATUS_ADDRESS)
        .with_length(STATUS_REGISTERS);

    if let Some(payload) = request.payload_mut() {
        if let Some(system) = system {
            payload.set_register(0, system.cpu);
            payload.set_register(1, system.mem);
            payload.set_register(2, system.temp);
        }
        if let Some(network) = network {
            payload.set_register(3, network.up);
            payload.set_register(4, network.down);
            payload.set_register(5, network.peers);
        }
    }
    request
}

fn collect(provider: &dyn StatusProvider) -> Request {
    let system = provider
        .system_status()
        .inspect_err(|err| log::debug!("monitor: system status unavailable: {err:#}"))
        .ok();
    let network = provider
        .network_status()
        .inspect_err(|err| log::debug!("monitor: network status unavailable: {err:#}"))
        .ok();
    build_request(system, network)
}

fn tick<T: Transport>(session: &mut ModbusSession<T>, provider: &dyn StatusProvider) {
    let request = collect(provider);
    match session.exec(SCREEN_SLAVE, &request) {
        Ok(Some(reply)) if reply.is_error() => {
            log::debug!(
                "monitor: screen rejected status write, exception {:?}",
                reply.exception_code()
            );
        }
        Ok(_) => {}
        Err(err) => log::warn!("monitor: failed to push status: {err}"),
    }
}

fn run<T: Transport>(
    mut session: ModbusSession<T>,
    provider: Box<dyn StatusProvider>,
    stop: Receiver<()>,
    interval: Duration,
) -> ModbusSession<T> {
    loop {
        match stop.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => tick(&mut session, provider.as_ref()),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    log::debug!("monitor: stopped");
    session
}

/// Handle to a running push loop. Must be created inside a tokio runtime.
pub struct Monitor<T> {
    stop: Sender<()>,
    worker: JoinHandle<ModbusSession<T>>,
}

impl<T: Transport + 'static> Monitor<T> {
    pub fn start<P>(session: ModbusSession<T>, provider: P) -> Result<Self>
    where
        P: StatusProvider + 'static,
    {
        Self::start_with_interval(session, provider, PUSH_INTERVAL)
    }

    pub fn start_with_interval<P>(
        mut session: ModbusSession<T>,
        provider: P,
        interval: Duration,
    ) -> Result<Self>
    where
        P: StatusProvider + 'static,
    {
        session.open().context("failed to open port for monitor")?;

        let (stop, stop_rx) = flume::bounded(1);
        let provider: Box<dyn StatusProvider> = Box::new(provider);
        let worker = tokio::task::spawn_blocking(move || run(session, provider, stop_rx, interval));
        log::info!("monitor: pushing status every {interval:?}");

        Ok(Self { stop, worker })
    }

    /// Stop the loop after its current tick, close the port and hand the
    /// transport back.
    pub async fn stop(self) -> Result<T> {
        // the worker may already be gone; joining below reports that
        let _ = self.stop.send(());
        let mut session = self.worker.await.context("monitor worker failed")?;
        session.close()?;
        Ok(session.into_transport())
    }
}
