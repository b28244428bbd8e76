//! Role Hierarchy — ordered moderator authority tiers
//!
//! Tiers are structurally ordered (`JuniorMod < SeniorMod < LeadMod < Admin`).
//! The numeric rank attached to each tier is configuration, supplied through
//! [`RoleLevels`], and is what the user directory reports for an account.
//!
//! ```text
//! JuniorMod ──▶ SeniorMod ──▶ LeadMod ──▶ Admin
//!    5             10            15         20     (default levels)
//! ```
//!
//! Escalation only ever moves an item rightwards along this ladder.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Moderator authority tiers, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleTier {
    /// First-line reviewers
    JuniorMod,
    /// Experienced reviewers for sensitive categories
    SeniorMod,
    /// Moderation leads, policy owners
    LeadMod,
    /// Platform administrators
    Admin,
}

impl RoleTier {
    /// All tiers in ascending order
    pub fn all() -> &'static [RoleTier] {
        &[
            RoleTier::JuniorMod,
            RoleTier::SeniorMod,
            RoleTier::LeadMod,
            RoleTier::Admin,
        ]
    }

    /// Stable storage/display name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JuniorMod => "junior_mod",
            Self::SeniorMod => "senior_mod",
            Self::LeadMod => "lead_mod",
            Self::Admin => "admin",
        }
    }

    /// Human-readable title for admin tooling
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::JuniorMod => "Junior Moderator",
            Self::SeniorMod => "Senior Moderator",
            Self::LeadMod => "Lead Moderator",
            Self::Admin => "Administrator",
        }
    }
}

impl std::fmt::Display for RoleTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RoleTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "junior_mod" => Ok(Self::JuniorMod),
            "senior_mod" => Ok(Self::SeniorMod),
            "lead_mod" => Ok(Self::LeadMod),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role tier: {}", other)),
        }
    }
}

/// Numeric level threshold for each tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleLevels {
    pub junior_mod: u32,
    pub senior_mod: u32,
    pub lead_mod: u32,
    pub admin: u32,
}

impl Default for RoleLevels {
    fn default() -> Self {
        Self {
            junior_mod: 5,
            senior_mod: 10,
            lead_mod: 15,
            admin: 20,
        }
    }
}

impl RoleLevels {
    fn level(&self, tier: RoleTier) -> u32 {
        match tier {
            RoleTier::JuniorMod => self.junior_mod,
            RoleTier::SeniorMod => self.senior_mod,
            RoleTier::LeadMod => self.lead_mod,
            RoleTier::Admin => self.admin,
        }
    }

    /// Levels must be strictly increasing in tier order (total order, no
    /// duplicate ranks).
    pub fn validate(&self) -> Result<(), String> {
        for pair in RoleTier::all().windows(2) {
            let (lower, upper) = (pair[0], pair[1]);
            if self.level(lower) >= self.level(upper) {
                return Err(format!(
                    "role level for {} ({}) must be greater than {} ({})",
                    upper,
                    self.level(upper),
                    lower,
                    self.level(lower)
                ));
            }
        }
        Ok(())
    }
}

/// Pure lookup over the configured tier ladder
#[derive(Debug, Clone, Default)]
pub struct RoleHierarchy {
    levels: RoleLevels,
}

impl RoleHierarchy {
    /// Build a hierarchy, rejecting levels that do not form a total order
    pub fn new(levels: RoleLevels) -> Result<Self, String> {
        levels.validate()?;
        Ok(Self { levels })
    }

    pub fn levels(&self) -> &RoleLevels {
        &self.levels
    }

    /// Configured rank of a tier
    pub fn rank_of(&self, tier: RoleTier) -> u32 {
        self.levels.level(tier)
    }

    /// Whether `actor` meets or exceeds the `required` tier.
    ///
    /// Every authority comparison in the crate goes through here.
    pub fn satisfies(&self, actor: RoleTier, required: RoleTier) -> bool {
        self.rank_of(actor) >= self.rank_of(required)
    }

    /// Tiers strictly above `current`, ascending
    pub fn escalation_targets(&self, current: RoleTier) -> Vec<RoleTier> {
        let floor = self.rank_of(current);
        RoleTier::all()
            .iter()
            .copied()
            .filter(|t| self.rank_of(*t) > floor)
            .collect()
    }

    /// Whether `target` is a legal escalation destination from `current`
    pub fn is_escalation_target(&self, current: RoleTier, target: RoleTier) -> bool {
        self.rank_of(target) > self.rank_of(current)
    }

    /// Map a raw account level to the highest tier it reaches.
    ///
    /// `None` means the account is not a moderator at all.
    pub fn tier_for_level(&self, level: u32) -> Option<RoleTier> {
        RoleTier::all()
            .iter()
            .rev()
            .copied()
            .find(|t| level >= self.rank_of(*t))
    }
}
