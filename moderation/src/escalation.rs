//! Escalation Engine — audited hand-off to a higher tier
//!
//! ```text
//! JuniorMod claimant ──escalate(SeniorMod, reason)──▶ item unclaimed at SeniorMod
//!                                                     + one history row
//! ```
//!
//! The item update and the history append are one conditional write. If the
//! item moved since it was read, neither happens.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::error::{ModerationError, ModerationResult};
use crate::identity::Actor;
use crate::item::{EscalationHistoryEntry, EscalationMark, ItemStatus, ModerationItem};
use crate::policy::{self, ModerationAction};
use crate::roles::{RoleHierarchy, RoleTier};
use crate::store::SharedStore;

/// Longest accepted escalation reason, in characters
pub const MAX_REASON_CHARS: usize = 1000;

pub struct EscalationEngine {
    store: SharedStore,
    hierarchy: Arc<RoleHierarchy>,
}

impl EscalationEngine {
    pub fn new(store: SharedStore, hierarchy: Arc<RoleHierarchy>) -> Self {
        Self { store, hierarchy }
    }

    /// Hand `item_id` up to `target`, leaving it unclaimed there.
    ///
    /// `target` must be strictly above the actor's own tier. A `pending` item
    /// may be escalated by any qualified actor; a `reviewing` item only by its
    /// claimant. An `escalated` item has to be claimed at its new tier first.
    pub async fn escalate(
        &self,
        item_id: &str,
        actor: &Actor,
        target: RoleTier,
        reason: &str,
    ) -> ModerationResult<ModerationItem> {
        let item = self
            .store
            .get_by_id(item_id)
            .await?
            .ok_or_else(|| ModerationError::not_found(item_id))?;

        policy::ensure_live(&item)?;

        if item.status == ItemStatus::Escalated {
            return Err(ModerationError::invalid_state(
                item_id,
                "escalated items must be claimed at their new tier before escalating again",
            ));
        }

        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ModerationError::validation("an escalation reason is required"));
        }
        if reason.chars().count() > MAX_REASON_CHARS {
            return Err(ModerationError::validation(format!(
                "escalation reason exceeds {} characters",
                MAX_REASON_CHARS
            )));
        }
        if !self.hierarchy.is_escalation_target(actor.role, target) {
            return Err(ModerationError::validation(format!(
                "{} is not above {}; valid targets: {:?}",
                target,
                actor.role,
                self.hierarchy.escalation_targets(actor.role)
            )));
        }

        if let Err(e) = policy::authorize(&self.hierarchy, actor, &item, ModerationAction::Escalate)
        {
            warn!(item_id, actor = %actor.id, role = %actor.role, "Escalation refused");
            return Err(e);
        }

        let now = Utc::now();
        let mut next = item.clone();
        next.status = ItemStatus::Escalated;
        next.assigned_role = target;
        next.assigned_to = None;
        next.escalation = Some(EscalationMark {
            escalated_from: actor.id.clone(),
            escalated_by: actor.id.clone(),
            escalated_at: now,
            reason: reason.to_string(),
        });
        next.updated_at = now;

        let entry = EscalationHistoryEntry::new(
            item.id.clone(),
            actor.role,
            target,
            actor.id.clone(),
            reason.to_string(),
            now,
        );

        let affected = self
            .store
            .cas_update_with_history(item_id, &item.observed(), &next, &entry)
            .await?;

        if affected == 0 {
            warn!(item_id, actor = %actor.id, "Escalation lost race");
            return Err(ModerationError::conflict(
                item_id,
                "item changed while escalating; refetch",
            ));
        }

        info!(
            item_id,
            actor = %actor.id,
            from = %actor.role,
            to = %target,
            "Item escalated"
        );
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::item::{ReasonCode, Subject};
    use crate::store::{MemoryStore, ModerationStore};

    async fn setup() -> (EscalationEngine, SharedStore, ModerationItem) {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let item = ModerationItem::new(
            Subject::Report {
                user_id: "user-4".to_string(),
                post_id: None,
            },
            Some("reporter".to_string()),
            ReasonCode::Harassment,
            None,
            RoleTier::JuniorMod,
        );
        store.insert(&item).await.unwrap();
        let engine = EscalationEngine::new(store.clone(), Arc::new(RoleHierarchy::default()));
        (engine, store, item)
    }

    async fn claim_as(store: &SharedStore, item: &ModerationItem, actor: &str) -> ModerationItem {
        let mut next = item.clone();
        next.status = ItemStatus::Reviewing;
        next.assigned_to = Some(actor.to_string());
        assert_eq!(
            store
                .cas_update(&item.id, &item.observed(), &next)
                .await
                .unwrap(),
            1
        );
        next
    }

    #[tokio::test]
    async fn test_escalate_claimed_item() {
        let (engine, store, item) = setup().await;
        claim_as(&store, &item, "mod-a").await;
        let actor = Actor::new("mod-a", RoleTier::JuniorMod);

        let escalated = engine
            .escalate(&item.id, &actor, RoleTier::SeniorMod, "  needs senior review ")
            .await
            .unwrap();

        assert_eq!(escalated.status, ItemStatus::Escalated);
        assert_eq!(escalated.assigned_role, RoleTier::SeniorMod);
        assert!(escalated.assigned_to.is_none());
        let mark = escalated.escalation.unwrap();
        assert_eq!(mark.escalated_by, "mod-a");
        assert_eq!(mark.reason, "needs senior review");

        let history = store.history_for(&item.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].from_role, RoleTier::JuniorMod);
        assert_eq!(history[0].to_role, RoleTier::SeniorMod);
    }

    #[tokio::test]
    async fn test_escalate_unclaimed_pending_item() {
        let (engine, _store, item) = setup().await;
        let actor = Actor::new("mod-x", RoleTier::SeniorMod);
        let escalated = engine
            .escalate(&item.id, &actor, RoleTier::Admin, "legal")
            .await
            .unwrap();
        assert_eq!(escalated.assigned_role, RoleTier::Admin);
    }

    #[tokio::test]
    async fn test_empty_reason_rejected_without_history() {
        let (engine, store, item) = setup().await;
        let actor = Actor::new("mod-a", RoleTier::JuniorMod);
        let err = engine
            .escalate(&item.id, &actor, RoleTier::SeniorMod, "   ")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert!(store.history_for(&item.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_target_not_above_actor_rejected() {
        let (engine, store, item) = setup().await;
        let actor = Actor::new("mod-s", RoleTier::SeniorMod);

        for target in [RoleTier::JuniorMod, RoleTier::SeniorMod] {
            let err = engine
                .escalate(&item.id, &actor, target, "why not")
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ValidationError);
        }
        let stored = store.get_by_id(&item.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ItemStatus::Pending);
        assert_eq!(stored.assigned_role, RoleTier::JuniorMod);
    }

    #[tokio::test]
    async fn test_non_claimant_cannot_escalate() {
        let (engine, store, item) = setup().await;
        claim_as(&store, &item, "mod-a").await;
        let err = engine
            .escalate(
                &item.id,
                &Actor::new("mod-b", RoleTier::JuniorMod),
                RoleTier::SeniorMod,
                "mine now",
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn test_escalated_item_must_be_claimed_first() {
        let (engine, _store, item) = setup().await;
        let actor = Actor::new("mod-s", RoleTier::SeniorMod);
        engine
            .escalate(&item.id, &actor, RoleTier::LeadMod, "first hop")
            .await
            .unwrap();

        let lead = Actor::new("mod-l", RoleTier::LeadMod);
        let err = engine
            .escalate(&item.id, &lead, RoleTier::Admin, "second hop")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }
}
