use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod calculator;
pub mod catalog;
pub mod frame;
pub mod packets;

/// Contract type used by the fusion/evolution workflow.
pub const EVOLUTION_CONTRACT_TYPE: u32 = 89;
/// Result packets carrying this contract id belong to whichever contract is open.
pub const ANY_CONTRACT: u64 = 0;
/// `result` code of a successful evolution.
pub const EVOLUTION_SUCCESS: u32 = 1;

pub const MAX_TIER_LEVEL: u8 = 5;

pub type GameId = u64;

/// Per-instance database identifier of an item stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Dbid(pub u64);

impl<'de> Deserialize<'de> for Dbid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserialize_u64_lenient(deserializer).map(Dbid)
    }
}

impl fmt::Display for Dbid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Catalog item type identifier (the game's item template id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogId(pub u32);

impl fmt::Display for CatalogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRef {
    pub dbid: Dbid,
    pub id: CatalogId,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TierError {
    #[error("unknown tier label: {0}")]
    Unknown(String),
    #[error("tier level out of range: {0}")]
    OutOfRange(u8),
}

/// A rung on one of the two upgrade ladders.
///
/// `Base(n)` is worth `2^(n-1)` T1 units, `Ext(n)` is worth `2^n * 16`, so
/// every ext rung sits strictly above the base ladder's top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    Base(u8),
    Ext(u8),
}

impl Tier {
    pub const BASE_LADDER: [Tier; 5] = [
        Tier::Base(1),
        Tier::Base(2),
        Tier::Base(3),
        Tier::Base(4),
        Tier::Base(5),
    ];

    pub fn base(level: u8) -> Result<Self, TierError> {
        check_level(level)?;
        Ok(Tier::Base(level))
    }

    pub fn ext(level: u8) -> Result<Self, TierError> {
        check_level(level)?;
        Ok(Tier::Ext(level))
    }

    pub fn level(self) -> u8 {
        match self {
            Tier::Base(level) | Tier::Ext(level) => level,
        }
    }

    pub fn is_ext(self) -> bool {
        matches!(self, Tier::Ext(_))
    }

    /// Same level on the extended ladder.
    pub fn to_ext(self) -> Tier {
        Tier::Ext(self.level())
    }

    pub fn t1_weight(self) -> u64 {
        match self {
            Tier::Base(level) => 1u64 << (level - 1),
            Tier::Ext(level) => (1u64 << level) * 16,
        }
    }

    pub fn display_upper(self) -> String {
        self.to_string().to_uppercase()
    }
}

fn check_level(level: u8) -> Result<(), TierError> {
    if (1..=MAX_TIER_LEVEL).contains(&level) {
        Ok(())
    } else {
        Err(TierError::OutOfRange(level))
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Base(level) => write!(f, "t{level}"),
            Tier::Ext(level) => write!(f, "ext{level}"),
        }
    }
}

impl FromStr for Tier {
    type Err = TierError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase();
        let (ext, digits) = if let Some(rest) = normalized.strip_prefix("ext") {
            (true, rest)
        } else if let Some(rest) = normalized.strip_prefix('t') {
            (false, rest)
        } else {
            return Err(TierError::Unknown(input.to_string()));
        };
        let level = digits
            .parse::<u8>()
            .map_err(|_| TierError::Unknown(input.to_string()))?;
        if ext {
            Tier::ext(level)
        } else {
            Tier::base(level)
        }
    }
}

pub fn is_ex_type(item_type: &str) -> bool {
    item_type.starts_with("ex_")
}

/// `ex_relic` -> `relic`; base types map to themselves.
pub fn base_type(item_type: &str) -> &str {
    item_type.strip_prefix("ex_").unwrap_or(item_type)
}

/// Accept a u64 written either as a JSON number or a decimal string.
///
/// Hosts serialise 64-bit values (currency, dbids) as strings to survive
/// JavaScript number precision.
pub fn deserialize_u64_lenient<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let val: serde_json::Value = serde_json::Value::deserialize(deserializer)?;
    value_to_u64(&val).map_err(serde::de::Error::custom)
}

pub fn deserialize_opt_u64_lenient<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let val: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    match val {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(val) => value_to_u64(&val).map(Some).map_err(serde::de::Error::custom),
    }
}

fn value_to_u64(val: &serde_json::Value) -> Result<u64, String> {
    match val {
        serde_json::Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| format!("expected unsigned integer, got {n}")),
        serde_json::Value::String(s) => s
            .trim()
            .trim_end_matches('n')
            .parse::<u64>()
            .map_err(|err| format!("invalid integer '{s}': {err}")),
        other => Err(format!("expected string or number, got {other}")),
    }
}
