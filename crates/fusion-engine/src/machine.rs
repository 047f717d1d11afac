use crate::accumulator::PacketAccumulator;
use crate::command::{help_lines, Command, CommandError, TierSelection};
use crate::host::{HookSet, PacketHost};
use crate::protocol::ProtocolStep;
use crate::session::Session;
use crate::timers::TimerSlot;
use crate::EngineConfig;
use fusion_core::catalog::Catalog;
use fusion_core::packets::{InboundPacket, ItemListEvent, OutboundPacket};
use fusion_core::{CatalogId, ItemRef, EVOLUTION_CONTRACT_TYPE};
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// The upgrade state machine. All entry points take the current time and the
/// host; nothing here blocks or spawns.
#[derive(Debug)]
pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) catalog: Catalog,
    pub(crate) session: Session,
    pub(crate) accumulator: PacketAccumulator,
    pub(crate) protocol: TimerSlot<ProtocolStep>,
    pub(crate) hooks: HookSet,
}

impl Engine {
    pub fn new(catalog: Catalog, config: EngineConfig) -> Self {
        Self {
            accumulator: PacketAccumulator::new(config.debounce),
            config,
            catalog,
            session: Session::default(),
            protocol: TimerSlot::default(),
            hooks: HookSet::default(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn hooks_held(&self) -> bool {
        !self.hooks.is_empty()
    }

    pub fn pending_step(&self) -> Option<&ProtocolStep> {
        self.protocol.peek()
    }

    /// Earliest pending deadline across the debounce and protocol timers.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.accumulator.deadline(), self.protocol.deadline()) {
            (Some(flush), Some(step)) => Some(flush.min(step)),
            (flush, step) => flush.or(step),
        }
    }

    /// Session, hooks and timers are all at rest.
    pub fn is_idle(&self) -> bool {
        self.session.is_at_rest() && self.hooks.is_empty() && self.next_deadline().is_none()
    }

    pub fn handle_command<S: AsRef<str>>(&mut self, args: &[S], host: &mut impl PacketHost) {
        let command = match Command::parse(args, &self.catalog) {
            Ok(command) => command,
            Err(err) => {
                debug!(event = "command_rejected", error = %err);
                host.message(&err.to_string());
                return;
            }
        };
        match command {
            Command::On {
                item_type,
                selection,
                count,
            } => self.arm_upgrade(item_type, selection, count, host),
            Command::Off => {
                info!(
                    event = "upgrade_disabled",
                    session_id = %self.session.session_label(),
                    completed = self.session.upgrades_completed
                );
                self.cleanup(host);
                host.message("Upgrade disabled");
            }
            Command::Status => host.message(&self.session.status_line()),
            Command::Check { item_type, tier } => {
                if self.session.enabled {
                    host.message(&CommandError::Busy.to_string());
                } else {
                    self.arm_check(item_type, tier, host);
                }
            }
            Command::Help => {
                for line in help_lines(&self.catalog) {
                    host.message(&line);
                }
            }
        }
    }

    /// Route one decoded packet. Kinds without a live subscription are
    /// dropped, as the host would never have delivered them.
    pub fn handle_packet(
        &mut self,
        packet: InboundPacket,
        now: Instant,
        host: &mut impl PacketHost,
    ) {
        let kind = packet.kind();
        if !self.hooks.covers(kind) {
            trace!(event = "packet_unhooked", packet = kind.packet_name());
            return;
        }
        match packet {
            InboundPacket::ItemList(event) => self.on_item_list(event, now, host),
            InboundPacket::ContractOpened(event) => self.on_contract_opened(event, now, host),
            InboundPacket::RegisterAck(event) => self.on_register_ack(event, host),
            InboundPacket::EvolutionResult(event) => self.on_evolution_result(event, host),
        }
    }

    /// Fire every deadline at or before `now`, earliest first. Follow-up
    /// delays are measured from the deadline that fired.
    pub fn on_timer(&mut self, now: Instant, host: &mut impl PacketHost) {
        loop {
            let flush = self.accumulator.deadline().filter(|at| *at <= now);
            let step = self.protocol.deadline().filter(|at| *at <= now);
            match (flush, step) {
                (None, None) => break,
                (Some(flush_at), Some(step_at)) if step_at < flush_at => {
                    self.fire_due_step(step_at, host)
                }
                (Some(flush_at), _) => {
                    if let Some(items) = self.accumulator.take_due(flush_at) {
                        self.process_snapshot(items, flush_at, host);
                    }
                }
                (None, Some(step_at)) => self.fire_due_step(step_at, host),
            }
        }
    }

    fn fire_due_step(&mut self, at: Instant, host: &mut impl PacketHost) {
        if let Some(step) = self.protocol.take_due(at) {
            trace!(event = "protocol_step", step = ?step);
            self.fire_step(step, at, host);
        }
    }

    /// Tear everything down; safe to call repeatedly.
    pub fn shutdown(&mut self, host: &mut impl PacketHost) {
        if self.is_idle() {
            return;
        }
        info!(
            event = "engine_shutdown",
            session_id = %self.session.session_label(),
            enabled = self.session.enabled
        );
        self.cleanup(host);
    }

    fn arm_upgrade(
        &mut self,
        item_type: String,
        selection: TierSelection,
        count: Option<u32>,
        host: &mut impl PacketHost,
    ) {
        let target_item_ids: BTreeSet<CatalogId> = match selection {
            TierSelection::All => self.catalog.ids(&item_type).into_iter().collect(),
            TierSelection::Exact(tier) => self.catalog.id(&item_type, tier).into_iter().collect(),
        };
        if target_item_ids.is_empty() {
            host.message(&CommandError::InvalidItemType.to_string());
            return;
        }
        if self.session.check.is_some() {
            debug!(event = "check_superseded");
        }

        // A contract left over from an earlier session is closed first.
        self.release_contract(host);
        self.accumulator.clear();
        self.protocol.cancel();

        let session_id = Uuid::new_v4();
        self.session = Session {
            session_id: Some(session_id),
            item_type: item_type.clone(),
            enabled: true,
            waiting_for_inventory: true,
            should_read_inventory: true,
            upgrade_all_mode: selection == TierSelection::All,
            target_item_ids,
            target_upgrades: count.map(|count| count / 2),
            ..Session::default()
        };
        self.hooks.acquire(host);

        let tier_label = match selection {
            TierSelection::All => "all tiers".to_string(),
            TierSelection::Exact(tier) => tier.to_string(),
        };
        let count_label = match count {
            Some(count) => format!("({} upgrades)", count / 2),
            None => "(all)".to_string(),
        };
        info!(
            event = "upgrade_enabled",
            session_id = %session_id,
            item_type = %item_type,
            tier = %tier_label,
            target_upgrades = ?self.session.target_upgrades
        );
        host.message(&format!(
            "Upgrade enabled: {item_type} {tier_label} {count_label}"
        ));
        host.message("Open inventory to start...");
    }

    fn on_item_list(&mut self, event: ItemListEvent, now: Instant, host: &mut impl PacketHost) {
        if let Some(player) = host.player_id() {
            if event.game_id != player {
                trace!(event = "inventory_foreign", game_id = event.game_id);
                return;
            }
        }

        let wanted = match &self.session.check {
            Some(check) => &check.ids,
            None if self.session.enabled && self.session.should_read_inventory => {
                self.session.current_money = event.money;
                &self.session.target_item_ids
            }
            None => return,
        };
        let matches: Vec<ItemRef> = event
            .items
            .iter()
            .filter(|stack| wanted.contains(&stack.id))
            .map(|stack| stack.item_ref())
            .collect();
        debug!(
            event = "inventory_page",
            matched = matches.len(),
            buffered = self.accumulator.buffered()
        );
        self.accumulator.push(matches, now);
    }

    fn process_snapshot(&mut self, items: Vec<ItemRef>, now: Instant, host: &mut impl PacketHost) {
        if self.session.check.is_some() {
            self.finish_check(items, host);
            return;
        }
        if !self.session.enabled || !self.session.should_read_inventory {
            debug!(event = "snapshot_dropped", items = items.len());
            return;
        }

        self.session.target_items = items;
        debug!(
            event = "inventory_snapshot",
            session_id = %self.session.session_label(),
            items = self.session.target_items.len(),
            waiting = self.session.waiting_for_inventory,
            processing = self.session.processing
        );

        if self.session.waiting_for_inventory {
            self.session.waiting_for_inventory = false;
            self.session.should_read_inventory = false;
            let found = self.session.target_items.len();
            if found < 2 {
                host.message("Need at least 2 items");
                self.close_contract(host);
                return;
            }
            host.message(&format!("Found {found} items, starting..."));
            if self.session.upgrade_all_mode && !self.prioritize_pairs(host) {
                return;
            }
            self.start_cycle(now, host);
        } else if !self.session.processing {
            self.check_continuation(now, host);
        }
    }

    /// In all-tiers mode, move the lowest tier that still has a pair to the
    /// front. Returns false when no tier has two items and the session ended.
    fn prioritize_pairs(&mut self, host: &mut impl PacketHost) -> bool {
        let items = &self.session.target_items;
        let lead = self
            .session
            .target_item_ids
            .iter()
            .copied()
            .find(|id| items.iter().filter(|item| item.id == *id).count() >= 2);
        match lead {
            Some(lead) => {
                let (mut ordered, rest): (Vec<ItemRef>, Vec<ItemRef>) =
                    std::mem::take(&mut self.session.target_items)
                        .into_iter()
                        .partition(|item| item.id == lead);
                ordered.extend(rest);
                self.session.target_items = ordered;
                debug!(event = "tier_prioritized", catalog_id = %lead);
                true
            }
            None => {
                host.message(&format!(
                    "All upgrades completed! {} items remaining",
                    self.session.target_items.len()
                ));
                self.close_contract(host);
                false
            }
        }
    }

    /// Decide whether another cycle runs after a fresh snapshot.
    fn check_continuation(&mut self, now: Instant, host: &mut impl PacketHost) {
        self.session.should_read_inventory = false;
        if self.session.upgrade_all_mode
            && !self.session.target_reached()
            && !self.prioritize_pairs(host)
        {
            return;
        }
        let available = self.session.target_items.len();
        let completed = self.session.upgrades_completed;

        match self.session.target_upgrades {
            Some(target) if self.session.target_reached() => {
                host.message(&format!("All {target} upgrades completed!"));
                self.close_contract(host);
            }
            Some(target) if available < 2 => {
                host.message(&format!(
                    "Out of materials: {completed}/{target} upgrades completed"
                ));
                self.close_contract(host);
            }
            None if available < 2 => {
                host.message("All upgrades completed!");
                self.close_contract(host);
            }
            _ => self.start_cycle(now, host),
        }
    }

    /// End the session but keep its counters for `status`.
    pub(crate) fn close_contract(&mut self, host: &mut impl PacketHost) {
        info!(
            event = "upgrade_session_closed",
            session_id = %self.session.session_label(),
            completed = self.session.upgrades_completed,
            target = ?self.session.target_upgrades
        );
        self.session.enabled = false;
        self.session.should_read_inventory = false;
        self.session.upgrade_all_mode = false;
        self.session.waiting_for_inventory = false;
        self.release_contract(host);
        self.accumulator.clear();
        self.hooks.release(host);
    }

    /// Best-effort cancel of the open contract, if any.
    pub(crate) fn release_contract(&mut self, host: &mut impl PacketHost) {
        if self.session.contract_id.is_none() && !self.session.contract_created {
            return;
        }
        let cancel = OutboundPacket::CancelContract {
            contract_type: EVOLUTION_CONTRACT_TYPE,
        };
        match host.send(cancel) {
            Ok(()) => debug!(event = "contract_cancelled", contract_id = ?self.session.contract_id),
            Err(err) => warn!(event = "contract_cancel_failed", error = %err),
        }
        self.session.contract_id = None;
        self.session.contract_created = false;
    }

    /// Back to the rest state, cancelling the contract on the way out.
    pub(crate) fn cleanup(&mut self, host: &mut impl PacketHost) {
        self.release_contract(host);
        self.reset(host);
    }

    /// Back to the rest state without touching the contract.
    pub(crate) fn abandon(&mut self, host: &mut impl PacketHost) {
        info!(
            event = "upgrade_session_abandoned",
            session_id = %self.session.session_label(),
            completed = self.session.upgrades_completed
        );
        self.reset(host);
    }

    fn reset(&mut self, host: &mut impl PacketHost) {
        self.session = Session::default();
        self.accumulator.clear();
        self.protocol.cancel();
        self.hooks.release(host);
    }
}
