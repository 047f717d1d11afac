//! Static item-type -> tier -> catalog id lookup.

use crate::{base_type, is_ex_type, CatalogId, Tier};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("catalog parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid tier '{label}' for item type {item_type}")]
    InvalidTier { item_type: String, label: String },
}

/// Item catalog keyed by lowercase item-type name.
///
/// Documents look like `{"halidom": {"t1": 91001, ..., "t5": 91005}}`. Ex
/// families use the same `t1..t5` labels; callers map them onto the extended
/// ladder with [`Tier::to_ext`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    types: BTreeMap<String, BTreeMap<Tier, CatalogId>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, CatalogError> {
        let parsed: BTreeMap<String, BTreeMap<String, u32>> = serde_json::from_str(raw)?;
        let mut catalog = Catalog::new();
        for (item_type, tiers) in parsed {
            for (label, id) in tiers {
                let tier = match label.parse::<Tier>() {
                    Ok(tier @ Tier::Base(_)) => tier,
                    _ => {
                        return Err(CatalogError::InvalidTier {
                            item_type: item_type.clone(),
                            label,
                        })
                    }
                };
                catalog.insert(&item_type, tier, CatalogId(id));
            }
        }
        Ok(catalog)
    }

    pub fn insert(&mut self, item_type: &str, tier: Tier, id: CatalogId) {
        self.types
            .entry(item_type.to_lowercase())
            .or_default()
            .insert(tier, id);
    }

    pub fn contains(&self, item_type: &str) -> bool {
        self.types.contains_key(item_type)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    pub fn id(&self, item_type: &str, tier: Tier) -> Option<CatalogId> {
        self.types.get(item_type)?.get(&tier).copied()
    }

    /// Every id of a type, ascending.
    pub fn ids(&self, item_type: &str) -> Vec<CatalogId> {
        let mut ids: Vec<CatalogId> = self
            .types
            .get(item_type)
            .map(|tiers| tiers.values().copied().collect())
            .unwrap_or_default();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn tier_of(&self, item_type: &str, id: CatalogId) -> Option<Tier> {
        self.types
            .get(item_type)?
            .iter()
            .find(|(_, candidate)| **candidate == id)
            .map(|(tier, _)| *tier)
    }

    /// Ids a feasibility check scans for: the type's own ids, plus the base
    /// family's ids when `item_type` is an ex family.
    pub fn check_ids(&self, item_type: &str) -> BTreeSet<CatalogId> {
        let mut ids: BTreeSet<CatalogId> = self.ids(item_type).into_iter().collect();
        if is_ex_type(item_type) {
            ids.extend(self.ids(base_type(item_type)));
        }
        ids
    }
}
