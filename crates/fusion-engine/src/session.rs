use fusion_core::{CatalogId, Dbid, ItemRef, Tier};
use std::collections::BTreeSet;
use uuid::Uuid;

/// A pending one-shot `upgrade check`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRequest {
    pub item_type: String,
    pub tier: Tier,
    pub ids: BTreeSet<CatalogId>,
}

/// Everything the state machine knows about the current upgrade session.
///
/// At rest every flag is false and every collection empty; `Session::default()`
/// is that rest state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub session_id: Option<Uuid>,
    pub item_type: String,
    pub enabled: bool,
    pub processing: bool,
    pub waiting_for_inventory: bool,
    pub contract_id: Option<u64>,
    pub contract_created: bool,
    pub should_read_inventory: bool,
    pub upgrade_all_mode: bool,
    pub target_item_ids: BTreeSet<CatalogId>,
    /// On-hand matching items; `target_items[0]` is the next item fed.
    pub target_items: Vec<ItemRef>,
    /// Upgrade operations requested; `None` runs until materials run out.
    pub target_upgrades: Option<u32>,
    pub upgrades_completed: u32,
    pub last_processed_dbid: Option<Dbid>,
    pub current_money: u64,
    pub check: Option<CheckRequest>,
}

impl Session {
    pub fn is_at_rest(&self) -> bool {
        *self == Session::default()
    }

    pub fn remaining_upgrades(&self) -> usize {
        match self.target_upgrades {
            Some(target) => target.saturating_sub(self.upgrades_completed) as usize,
            None => self.target_items.len() / 2,
        }
    }

    pub fn target_reached(&self) -> bool {
        self.target_upgrades
            .is_some_and(|target| self.upgrades_completed >= target)
    }

    pub fn status_line(&self) -> String {
        let target = self
            .target_upgrades
            .map(|target| target.to_string())
            .unwrap_or_else(|| "all".to_string());
        format!(
            "Status: {} | Processing: {} | Completed: {}/{}",
            if self.enabled { "ON" } else { "OFF" },
            self.processing,
            self.upgrades_completed,
            target
        )
    }

    pub fn session_label(&self) -> String {
        self.session_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string())
    }
}
