//! Authorization policy — the one place tier and ownership rules live.
//!
//! Engines and the façade call [`authorize`]; the queue views call
//! [`permits`] to filter what they offer. Neither re-derives the rules.
//!
//! # Rules
//!
//! - Terminal items accept no action (`InvalidState`).
//! - Every action needs the actor's tier to satisfy the item's
//!   `assigned_role`.
//! - A claimed (`reviewing`) item can be escalated or resolved only by its
//!   claimant.

use serde::{Deserialize, Serialize};

use crate::error::{ModerationError, ModerationResult};
use crate::identity::Actor;
use crate::item::{ItemStatus, ModerationItem};
use crate::roles::RoleHierarchy;

/// Workflow actions subject to authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationAction {
    Claim,
    Escalate,
    Resolve,
}

impl std::fmt::Display for ModerationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Claim => write!(f, "claim"),
            Self::Escalate => write!(f, "escalate"),
            Self::Resolve => write!(f, "resolve"),
        }
    }
}

/// Reject any action on a resolved item
pub fn ensure_live(item: &ModerationItem) -> ModerationResult<()> {
    if item.status.is_terminal() {
        return Err(ModerationError::invalid_state(
            &item.id,
            format!("item is already {}", item.status),
        ));
    }
    Ok(())
}

/// Check tier and ownership for `action` on `item`
pub fn authorize(
    hierarchy: &RoleHierarchy,
    actor: &Actor,
    item: &ModerationItem,
    action: ModerationAction,
) -> ModerationResult<()> {
    ensure_live(item)?;

    if !hierarchy.satisfies(actor.role, item.assigned_role) {
        return Err(ModerationError::unauthorized(format!(
            "{} requires {} or above; {} is {}",
            action, item.assigned_role, actor.id, actor.role
        )));
    }

    match action {
        ModerationAction::Claim => Ok(()),
        ModerationAction::Escalate | ModerationAction::Resolve => {
            if item.status == ItemStatus::Reviewing && !item.is_claimed_by(&actor.id) {
                return Err(ModerationError::unauthorized(format!(
                    "item {} is claimed by another moderator",
                    item.id
                )));
            }
            Ok(())
        }
    }
}

/// Non-failing form of [`authorize`] for filtering views
pub fn permits(
    hierarchy: &RoleHierarchy,
    actor: &Actor,
    item: &ModerationItem,
    action: ModerationAction,
) -> bool {
    authorize(hierarchy, actor, item, action).is_ok()
}
