//! The contract handshake and the register/request/start sequence of one
//! upgrade cycle.

use crate::host::PacketHost;
use crate::machine::Engine;
use fusion_core::packets::{
    ContractOpenedEvent, EvolutionItem, EvolutionResultEvent, OutboundPacket, RegisterAckEvent,
};
use fusion_core::{ItemRef, ANY_CONTRACT, EVOLUTION_CONTRACT_TYPE, EVOLUTION_SUCCESS};
use std::time::Instant;
use tracing::{debug, info, warn};

/// The next thing the cycle does when its delay elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolStep {
    /// Contract requested; give up if no confirmation arrived.
    AwaitContract,
    RetryOpen,
    /// Item registered; ask for the evolution of this item next.
    RequestEvolution(ItemRef),
    StartEvolution,
    /// Start sent; the result should be in by now.
    AwaitResult,
    RetryCycle,
}

impl Engine {
    /// Begin one cycle, opening the contract first when none is held.
    pub(crate) fn start_cycle(&mut self, now: Instant, host: &mut impl PacketHost) {
        let session = &mut self.session;
        if !session.enabled || session.processing || session.target_items.len() < 2 {
            return;
        }
        session.processing = true;

        if session.contract_created && session.contract_id.is_some() {
            self.continue_cycle(now, host);
            return;
        }

        self.session.contract_id = None;
        let request = OutboundPacket::RequestContract {
            contract_type: EVOLUTION_CONTRACT_TYPE,
        };
        if self.send_step(request, host) {
            self.protocol
                .arm(now + self.config.contract_wait, ProtocolStep::AwaitContract);
        }
    }

    /// Register the front item under the held contract.
    fn continue_cycle(&mut self, now: Instant, host: &mut impl PacketHost) {
        let ready = self.session.enabled && self.session.target_items.len() >= 2;
        let (Some(contract), Some(item), true) = (
            self.session.contract_id,
            self.session.target_items.first().copied(),
            ready,
        ) else {
            self.session.processing = false;
            return;
        };

        debug!(
            event = "cycle_started",
            session_id = %self.session.session_label(),
            contract_id = contract,
            dbid = %item.dbid,
            catalog_id = %item.id
        );
        let register = OutboundPacket::RegisterEvolutionItem(EvolutionItem {
            contract,
            dbid: item.dbid,
            id: item.id,
        });
        if self.send_step(register, host) {
            self.protocol.arm(
                now + self.config.step_spacing,
                ProtocolStep::RequestEvolution(item),
            );
        }
    }

    pub(crate) fn fire_step(&mut self, step: ProtocolStep, at: Instant, host: &mut impl PacketHost) {
        match step {
            ProtocolStep::AwaitContract => {
                if self.session.contract_id.is_some() {
                    self.continue_cycle(at, host);
                    return;
                }
                warn!(
                    event = "contract_open_timeout",
                    session_id = %self.session.session_label()
                );
                self.session.processing = false;
                self.session.contract_created = false;
                if self.session.enabled {
                    self.protocol
                        .arm(at + self.config.contract_retry_backoff, ProtocolStep::RetryOpen);
                }
            }
            ProtocolStep::RetryOpen | ProtocolStep::RetryCycle => {
                if self.session.enabled {
                    self.start_cycle(at, host);
                }
            }
            ProtocolStep::RequestEvolution(item) => {
                let Some(contract) = self.resume_contract() else {
                    return;
                };
                let request = OutboundPacket::RequestEvolution(EvolutionItem {
                    contract,
                    dbid: item.dbid,
                    id: item.id,
                });
                if self.send_step(request, host) {
                    self.protocol
                        .arm(at + self.config.step_spacing, ProtocolStep::StartEvolution);
                }
            }
            ProtocolStep::StartEvolution => {
                let Some(contract) = self.resume_contract() else {
                    return;
                };
                if self.send_step(OutboundPacket::StartEvolution { contract }, host) {
                    self.protocol
                        .arm(at + self.config.completion_timeout, ProtocolStep::AwaitResult);
                }
            }
            ProtocolStep::AwaitResult => {
                if !self.session.processing {
                    return;
                }
                warn!(
                    event = "evolution_result_timeout",
                    session_id = %self.session.session_label()
                );
                self.session.processing = false;
                if self.session.enabled && self.session.target_items.len() >= 2 {
                    self.protocol
                        .arm(at + self.config.completion_retry_delay, ProtocolStep::RetryCycle);
                }
            }
        }
    }

    /// Contract to continue under, or `None` when the session was turned off
    /// while the step was pending.
    fn resume_contract(&mut self) -> Option<u64> {
        match self.session.contract_id {
            Some(contract) if self.session.enabled => Some(contract),
            _ => {
                debug!(event = "cycle_interrupted");
                self.session.processing = false;
                None
            }
        }
    }

    fn send_step(&mut self, packet: OutboundPacket, host: &mut impl PacketHost) -> bool {
        let name = packet.packet_name();
        match host.send(packet) {
            Ok(()) => {
                debug!(event = "packet_sent", packet = name);
                true
            }
            Err(err) => {
                warn!(event = "packet_send_failed", packet = name, error = %err);
                self.session.processing = false;
                false
            }
        }
    }

    pub(crate) fn on_contract_opened(
        &mut self,
        event: ContractOpenedEvent,
        now: Instant,
        host: &mut impl PacketHost,
    ) {
        if event.contract_type != EVOLUTION_CONTRACT_TYPE {
            return;
        }
        if !self.session.enabled {
            debug!(event = "contract_opened_idle", contract_id = event.id);
            return;
        }
        info!(
            event = "contract_opened",
            session_id = %self.session.session_label(),
            contract_id = event.id
        );
        self.session.contract_id = Some(event.id);
        self.session.contract_created = true;

        if self.protocol.peek() == Some(&ProtocolStep::AwaitContract) {
            self.protocol.cancel();
            self.continue_cycle(now, host);
        }
    }

    pub(crate) fn on_register_ack(&mut self, event: RegisterAckEvent, host: &mut impl PacketHost) {
        if !self.session.enabled || !self.session.contract_created {
            return;
        }
        let Some(price) = event.price else {
            return;
        };
        if self.session.current_money < price {
            warn!(
                event = "insufficient_funds",
                money = self.session.current_money,
                price
            );
            host.message("No more money");
            self.abandon(host);
        }
    }

    pub(crate) fn on_evolution_result(
        &mut self,
        event: EvolutionResultEvent,
        host: &mut impl PacketHost,
    ) {
        let session = &self.session;
        let matches_contract =
            event.contract == ANY_CONTRACT || session.contract_id == Some(event.contract);
        if !session.enabled
            || !session.contract_created
            || !matches_contract
            || session.last_processed_dbid == Some(event.dbid)
        {
            debug!(
                event = "evolution_result_ignored",
                contract_id = event.contract,
                dbid = %event.dbid
            );
            return;
        }

        self.session.last_processed_dbid = Some(event.dbid);
        if event.result == EVOLUTION_SUCCESS {
            self.session.upgrades_completed += 1;
            info!(
                event = "upgrade_succeeded",
                session_id = %self.session.session_label(),
                dbid = %event.dbid,
                completed = self.session.upgrades_completed
            );
        } else {
            warn!(
                event = "upgrade_failed",
                dbid = %event.dbid,
                result = event.result
            );
            host.message("Upgrade failed");
        }
        self.session.processing = false;
        self.session.should_read_inventory = true;
        self.protocol.cancel();

        if let Some(target) = self.session.target_upgrades {
            if self.session.target_reached() {
                host.message(&format!("All {target} upgrades completed!"));
                self.close_contract(host);
            }
        }
    }
}
