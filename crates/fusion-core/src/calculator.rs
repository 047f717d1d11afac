//! T1-equivalent feasibility check behind `upgrade check`.

use crate::{is_ex_type, Tier};
use std::collections::BTreeMap;
use std::fmt;

/// Owned item counts keyed by ladder rung. Base-family items are counted
/// under `Tier::Base`, ex-family items under `Tier::Ext`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierCounts {
    counts: BTreeMap<Tier, u64>,
}

impl TierCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, tier: Tier, amount: u64) {
        let count = self.counts.entry(tier).or_insert(0);
        *count = count.saturating_add(amount);
    }

    pub fn with(mut self, tier: Tier, amount: u64) -> Self {
        self.add(tier, amount);
        self
    }

    pub fn get(&self, tier: Tier) -> u64 {
        self.counts.get(&tier).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeNeeds {
    pub target: Tier,
    pub can_upgrade: bool,
    /// T1-equivalent units on hand.
    pub have: u64,
    /// T1-equivalent units one target item costs.
    pub need: u64,
    /// Full target items the materials cover; only reported for ex targets.
    pub producible: Option<u64>,
}

impl UpgradeNeeds {
    pub fn excess(&self) -> u64 {
        self.have.saturating_sub(self.need)
    }

    pub fn deficit(&self) -> u64 {
        self.need.saturating_sub(self.have)
    }

    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for UpgradeNeeds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tier = self.target.display_upper();
        let totals = format!(
            "You have {} T1 equivalent, need {}.",
            self.have, self.need
        );
        if self.can_upgrade {
            match self.producible {
                Some(count) => write!(f, "[V] You can make {count}x {tier}! {totals}")?,
                None => write!(f, "[V] You can upgrade to {tier}! {totals}")?,
            }
            let excess = self.excess();
            if excess > 0 {
                write!(f, " Excess: {excess} T1 equivalent.")?;
            }
            Ok(())
        } else if self.target.is_ext() {
            write!(f, "[X] You need {} more T1s to make {tier}. {totals}", self.deficit())
        } else {
            write!(
                f,
                "[X] You need {} more T1s to upgrade to {tier}. {totals}",
                self.deficit()
            )
        }
    }
}

/// Decide whether `counts` hold enough material for one `target` item.
///
/// For ex families a base-ladder target is lifted onto the extended ladder
/// (`t2` on `ex_relic` means `ext2`). Base targets only count strictly lower
/// base rungs; ex targets count the whole base ladder plus every lower ext
/// rung.
pub fn calculate_needs(target: Tier, counts: &TierCounts, item_type: &str) -> UpgradeNeeds {
    let target = if is_ex_type(item_type) {
        target.to_ext()
    } else {
        target
    };
    let need = target.t1_weight();

    let weighted = |tier: Tier| counts.get(tier).saturating_mul(tier.t1_weight());
    let (have, producible_reported) = match target {
        Tier::Base(level) => {
            let have = Tier::BASE_LADDER
                .iter()
                .filter(|tier| tier.level() < level)
                .map(|tier| weighted(*tier))
                .fold(0u64, u64::saturating_add);
            (have, false)
        }
        Tier::Ext(level) => {
            let base = Tier::BASE_LADDER
                .iter()
                .map(|tier| weighted(*tier))
                .fold(0u64, u64::saturating_add);
            let ext = (1..level)
                .map(|lower| weighted(Tier::Ext(lower)))
                .fold(0u64, u64::saturating_add);
            (base.saturating_add(ext), true)
        }
    };

    let can_upgrade = have >= need;
    UpgradeNeeds {
        target,
        can_upgrade,
        have,
        need,
        producible: (producible_reported && can_upgrade).then(|| have / need),
    }
}
