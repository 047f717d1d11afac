//! Packet-driven automation of the item fusion ("evolution") contract.
//!
//! The [`Engine`] is a synchronous state machine: it is fed inbound packets,
//! player commands and the current time, and it reacts by sending packets
//! through a [`PacketHost`]. Pending delays are exposed through
//! [`Engine::next_deadline`]; the tokio [`Driver`] sleeps until then and calls
//! [`Engine::on_timer`].

use std::time::Duration;

pub mod accumulator;
pub mod check;
pub mod command;
pub mod host;
pub mod machine;
pub mod protocol;
pub mod runtime;
pub mod session;
pub mod timers;

pub use command::{Command, CommandError, TierSelection};
pub use host::{HookSet, HookToken, PacketHost, SendError};
pub use machine::Engine;
pub use protocol::ProtocolStep;
pub use runtime::{spawn_driver, Driver, DriverInput};
pub use session::{CheckRequest, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Quiet period after the last inventory page before a snapshot is taken.
    pub debounce: Duration,
    /// How long to wait for the contract-opened confirmation.
    pub contract_wait: Duration,
    /// Spacing between register, request and start sends.
    pub step_spacing: Duration,
    /// How long after start-evolution a result is expected.
    pub completion_timeout: Duration,
    pub contract_retry_backoff: Duration,
    pub completion_retry_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(200),
            contract_wait: Duration::from_millis(300),
            step_spacing: Duration::from_millis(300),
            completion_timeout: Duration::from_millis(500),
            contract_retry_backoff: Duration::from_millis(200),
            completion_retry_delay: Duration::from_millis(300),
        }
    }
}

impl EngineConfig {
    /// Slower profile for high-latency connections.
    pub fn conservative() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            contract_wait: Duration::from_millis(1000),
            step_spacing: Duration::from_millis(500),
            completion_timeout: Duration::from_millis(1000),
            ..Self::default()
        }
    }
}
