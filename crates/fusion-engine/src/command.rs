//! `upgrade on|off|status|check` argument parsing and validation.

use fusion_core::catalog::Catalog;
use fusion_core::Tier;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierSelection {
    All,
    Exact(Tier),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    On {
        item_type: String,
        selection: TierSelection,
        /// Number of items to feed; always even and >= 2.
        count: Option<u32>,
    },
    Off,
    Status,
    Check {
        item_type: String,
        tier: Tier,
    },
    Help,
}

/// Validation failures. `Display` is the text shown to the player.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Usage: upgrade on [item_type] [tier|all] [count](optional)")]
    OnUsage,
    #[error("Usage: upgrade check [item_type] [tier]")]
    CheckUsage,
    #[error("Invalid item type")]
    InvalidItemType,
    #[error("Invalid item type or tier")]
    InvalidItemTypeOrTier,
    #[error("Count must be even number >= 2")]
    InvalidCount,
    #[error("Invalid tier")]
    InvalidTier,
    #[error("Tier {tier} not found for item type {item_type}")]
    TierNotFound { item_type: String, tier: String },
    #[error("Upgrade session active, turn it off first")]
    Busy,
}

impl Command {
    /// Parse the tokens following the `upgrade` command name. Nothing here
    /// touches session state, so a rejected command leaves it as it was.
    pub fn parse<S: AsRef<str>>(args: &[S], catalog: &Catalog) -> Result<Self, CommandError> {
        let arg = |idx: usize| token(args, idx);
        match arg(0).map(str::to_lowercase).as_deref() {
            Some("on") => {
                let (Some(item_type), Some(tier)) = (arg(1), arg(2)) else {
                    return Err(CommandError::OnUsage);
                };
                parse_on(item_type, tier, arg(3), catalog)
            }
            Some("off") => Ok(Command::Off),
            Some("status") => Ok(Command::Status),
            Some("check") => {
                let (Some(item_type), Some(tier)) = (arg(1), arg(2)) else {
                    return Err(CommandError::CheckUsage);
                };
                parse_check(item_type, tier, catalog)
            }
            _ => Ok(Command::Help),
        }
    }
}

fn token<S: AsRef<str>>(args: &[S], idx: usize) -> Option<&str> {
    args.get(idx).map(|value| value.as_ref().trim())
}

fn parse_on(
    item_type: &str,
    tier: &str,
    count: Option<&str>,
    catalog: &Catalog,
) -> Result<Command, CommandError> {
    let item_type = item_type.to_lowercase();
    let tier = tier.to_lowercase();

    let selection = if tier == "all" {
        if catalog.ids(&item_type).is_empty() {
            return Err(CommandError::InvalidItemType);
        }
        TierSelection::All
    } else {
        let parsed = match tier.parse::<Tier>() {
            Ok(parsed @ Tier::Base(_)) => parsed,
            _ => return Err(CommandError::InvalidItemTypeOrTier),
        };
        if catalog.id(&item_type, parsed).is_none() {
            return Err(CommandError::InvalidItemTypeOrTier);
        }
        TierSelection::Exact(parsed)
    };

    let count = count.map(parse_count).transpose()?;

    Ok(Command::On {
        item_type,
        selection,
        count,
    })
}

fn parse_count(raw: &str) -> Result<u32, CommandError> {
    match raw.parse::<u32>() {
        Ok(count) if count >= 2 && count % 2 == 0 => Ok(count),
        _ => Err(CommandError::InvalidCount),
    }
}

fn parse_check(item_type: &str, tier: &str, catalog: &Catalog) -> Result<Command, CommandError> {
    let item_type = item_type.to_lowercase();
    if !catalog.contains(&item_type) {
        return Err(CommandError::InvalidItemType);
    }
    // Checks always name a base-ladder rung, ex families included.
    let parsed = match tier.to_lowercase().parse::<Tier>() {
        Ok(parsed @ Tier::Base(_)) => parsed,
        _ => return Err(CommandError::InvalidTier),
    };
    if catalog.id(&item_type, parsed).is_none() {
        return Err(CommandError::TierNotFound {
            item_type,
            tier: parsed.to_string(),
        });
    }
    Ok(Command::Check {
        item_type,
        tier: parsed,
    })
}

pub fn help_lines(catalog: &Catalog) -> Vec<String> {
    let types = catalog.type_names().collect::<Vec<_>>().join(", ");
    vec![
        "Usage: upgrade [on|off|status|check]".to_string(),
        "  upgrade on [type] [tier] [count] - Start upgrading".to_string(),
        "  upgrade check [type] [tier] - Calculate upgrade needs".to_string(),
        "  upgrade off - Stop upgrading".to_string(),
        "  upgrade status - Show current status".to_string(),
        format!("Types: {types}"),
        "Tiers: t1-t5".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use fusion_core::CatalogId;

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        for level in 1..=5u8 {
            catalog.insert("halidom", Tier::Base(level), CatalogId(100 + level as u32));
        }
        catalog.insert("relic", Tier::Base(1), CatalogId(301));
        catalog
    }

    #[test]
    fn on_accepts_exact_tier_all_and_counts() {
        let catalog = catalog();
        assert_eq!(
            Command::parse(&["on", "Halidom", "T2", "6"], &catalog),
            Ok(Command::On {
                item_type: "halidom".to_string(),
                selection: TierSelection::Exact(Tier::Base(2)),
                count: Some(6),
            })
        );
        assert_eq!(
            Command::parse(&["on", "relic", "all"], &catalog),
            Ok(Command::On {
                item_type: "relic".to_string(),
                selection: TierSelection::All,
                count: None,
            })
        );
    }

    #[test]
    fn on_rejects_bad_counts() {
        let catalog = catalog();
        for raw in ["0", "1", "3", "-2", "abc", "4x", "2.0", ""] {
            assert_eq!(
                Command::parse(&["on", "halidom", "t1", raw], &catalog),
                Err(CommandError::InvalidCount),
                "count {raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn on_rejects_unknown_types_and_tiers() {
        let catalog = catalog();
        assert_eq!(
            Command::parse(&["on", "halidom"], &catalog),
            Err(CommandError::OnUsage)
        );
        assert_eq!(
            Command::parse(&["on", "sword", "all"], &catalog),
            Err(CommandError::InvalidItemType)
        );
        assert_eq!(
            Command::parse(&["on", "relic", "t2"], &catalog),
            Err(CommandError::InvalidItemTypeOrTier)
        );
        assert_eq!(
            Command::parse(&["on", "halidom", "ext1"], &catalog),
            Err(CommandError::InvalidItemTypeOrTier)
        );
    }

    #[test]
    fn check_validates_tier_labels() {
        let catalog = catalog();
        assert_eq!(
            Command::parse(&["check", "halidom", "t4"], &catalog),
            Ok(Command::Check {
                item_type: "halidom".to_string(),
                tier: Tier::Base(4),
            })
        );
        assert_eq!(
            Command::parse(&["check", "halidom", "ext2"], &catalog),
            Err(CommandError::InvalidTier)
        );
        assert_eq!(
            Command::parse(&["check", "relic", "t3"], &catalog),
            Err(CommandError::TierNotFound {
                item_type: "relic".to_string(),
                tier: "t3".to_string(),
            })
        );
        assert_eq!(
            Command::parse(&["check"], &catalog),
            Err(CommandError::CheckUsage)
        );
        assert_eq!(
            CommandError::TierNotFound {
                item_type: "relic".to_string(),
                tier: "t3".to_string(),
            }
            .to_string(),
            "Tier t3 not found for item type relic"
        );
    }

    #[test]
    fn unknown_subcommands_fall_back_to_help() {
        let catalog = catalog();
        assert_eq!(Command::parse::<&str>(&[], &catalog), Ok(Command::Help));
        assert_eq!(Command::parse(&["dance"], &catalog), Ok(Command::Help));
        assert_eq!(
            help_lines(&catalog).last().map(String::as_str),
            Some("Tiers: t1-t5")
        );
        assert!(help_lines(&catalog).contains(&"Types: halidom, relic".to_string()));
    }
}
