//! Tokio driver: owns an [`Engine`] and its host, feeds it inputs from a
//! channel and wakes it when the next deadline comes due.

use crate::host::PacketHost;
use crate::machine::Engine;
use fusion_core::packets::InboundPacket;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Duration};
use tracing::{debug, info};

const IDLE_PARK: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, PartialEq)]
pub enum DriverInput {
    Packet(InboundPacket),
    /// Tokens following the `upgrade` command name.
    Command(Vec<String>),
    Shutdown,
}

pub struct Driver<H: PacketHost> {
    engine: Engine,
    host: H,
}

impl<H: PacketHost> Driver<H> {
    pub fn new(engine: Engine, host: H) -> Self {
        Self { engine, host }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Serve inputs until `Shutdown` arrives or every sender is gone, then
    /// tear the session down. The driver is handed back for inspection.
    pub async fn run(mut self, mut rx: mpsc::Receiver<DriverInput>) -> Self {
        info!(event = "driver_start");
        loop {
            let deadline = self.engine.next_deadline();
            let wake = deadline
                .map(tokio::time::Instant::from_std)
                .unwrap_or_else(|| tokio::time::Instant::now() + IDLE_PARK);
            tokio::select! {
                input = rx.recv() => match input {
                    Some(DriverInput::Packet(packet)) => {
                        self.engine.handle_packet(packet, clock_now(), &mut self.host);
                    }
                    Some(DriverInput::Command(args)) => {
                        debug!(event = "command_received", args = ?args);
                        self.engine.handle_command(&args, &mut self.host);
                    }
                    Some(DriverInput::Shutdown) | None => break,
                },
                _ = sleep_until(wake), if deadline.is_some() => {
                    self.engine.on_timer(clock_now(), &mut self.host);
                }
            }
        }
        self.shutdown();
        info!(event = "driver_stop");
        self
    }

    pub fn shutdown(&mut self) {
        self.engine.shutdown(&mut self.host);
    }
}

impl<H: PacketHost> Drop for Driver<H> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Current time on the tokio clock, so paused-time tests drive the engine too.
fn clock_now() -> Instant {
    tokio::time::Instant::now().into_std()
}

pub fn spawn_driver<H>(
    engine: Engine,
    host: H,
    capacity: usize,
) -> (mpsc::Sender<DriverInput>, JoinHandle<Driver<H>>)
where
    H: PacketHost + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity);
    let handle = tokio::spawn(Driver::new(engine, host).run(rx));
    (tx, handle)
}
