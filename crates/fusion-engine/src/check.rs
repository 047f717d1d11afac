//! `upgrade check`: one inventory snapshot, one feasibility report.

use crate::host::PacketHost;
use crate::machine::Engine;
use crate::session::CheckRequest;
use fusion_core::calculator::{calculate_needs, TierCounts};
use fusion_core::catalog::Catalog;
use fusion_core::{base_type, is_ex_type, ItemRef, Tier};
use tracing::info;

impl Engine {
    pub(crate) fn arm_check(&mut self, item_type: String, tier: Tier, host: &mut impl PacketHost) {
        let ids = self.catalog.check_ids(&item_type);
        self.accumulator.clear();
        info!(event = "check_armed", item_type = %item_type, tier = %tier, ids = ids.len());
        self.session.check = Some(CheckRequest {
            item_type,
            tier,
            ids,
        });
        self.hooks.acquire(host);
        host.message("Open inventory to scan items...");
    }

    pub(crate) fn finish_check(&mut self, items: Vec<ItemRef>, host: &mut impl PacketHost) {
        let Some(check) = self.session.check.take() else {
            return;
        };
        let counts = tier_counts(&self.catalog, &check.item_type, &items);
        let needs = calculate_needs(check.tier, &counts, &check.item_type);
        info!(
            event = "check_completed",
            item_type = %check.item_type,
            target = %needs.target,
            can_upgrade = needs.can_upgrade,
            have = needs.have,
            need = needs.need
        );
        host.message(&needs.message());
        if !self.session.enabled {
            self.hooks.release(host);
        }
    }
}

/// Tally a snapshot per tier. For an ex family its own ids land on the ext
/// ladder and the base family's ids on the base ladder.
pub fn tier_counts(catalog: &Catalog, item_type: &str, items: &[ItemRef]) -> TierCounts {
    let ex = is_ex_type(item_type);
    let mut counts = TierCounts::new();
    for item in items {
        if let Some(tier) = catalog.tier_of(item_type, item.id) {
            counts.add(if ex { tier.to_ext() } else { tier }, item.amount);
        } else if ex {
            if let Some(tier) = catalog.tier_of(base_type(item_type), item.id) {
                counts.add(tier, item.amount);
            }
        }
    }
    counts
}
