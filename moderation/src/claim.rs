//! Claim Coordinator — single ownership of an item
//!
//! A claim is one guarded write: it lands only if the item still shows the
//! `(status, assigned_to, assigned_role)` this request read. Two moderators
//! racing on the same unclaimed item both pass the read, but only one write
//! matches; the other sees zero affected rows and gets `Conflict`.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{ModerationError, ModerationResult};
use crate::identity::Actor;
use crate::item::{ItemStatus, ModerationItem};
use crate::policy::{self, ModerationAction};
use crate::roles::RoleHierarchy;
use crate::store::SharedStore;

pub struct ClaimCoordinator {
    store: SharedStore,
    hierarchy: Arc<RoleHierarchy>,
}

impl ClaimCoordinator {
    pub fn new(store: SharedStore, hierarchy: Arc<RoleHierarchy>) -> Self {
        Self { store, hierarchy }
    }

    /// Take exclusive ownership of `item_id` for `actor`.
    ///
    /// Re-claiming an item the actor already holds returns it unchanged.
    pub async fn claim(&self, item_id: &str, actor: &Actor) -> ModerationResult<ModerationItem> {
        let item = self
            .store
            .get_by_id(item_id)
            .await?
            .ok_or_else(|| ModerationError::not_found(item_id))?;

        policy::ensure_live(&item)?;

        if item.status == ItemStatus::Reviewing {
            if item.is_claimed_by(&actor.id) {
                debug!(item_id, actor = %actor.id, "Claim already held");
                return Ok(item);
            }
            warn!(item_id, actor = %actor.id, holder = ?item.assigned_to, "Item already claimed");
            return Err(ModerationError::conflict(
                item_id,
                "item is already claimed; refetch",
            ));
        }

        if let Err(e) = policy::authorize(&self.hierarchy, actor, &item, ModerationAction::Claim) {
            warn!(
                item_id,
                actor = %actor.id,
                role = %actor.role,
                required = %item.assigned_role,
                "Claim refused"
            );
            return Err(e);
        }

        let mut next = item.clone();
        next.status = ItemStatus::Reviewing;
        next.assigned_to = Some(actor.id.clone());
        next.updated_at = Utc::now();

        let affected = self
            .store
            .cas_update(item_id, &item.observed(), &next)
            .await?;

        if affected == 0 {
            warn!(item_id, actor = %actor.id, "Claim lost race");
            return Err(ModerationError::conflict(
                item_id,
                "item changed while claiming; refetch",
            ));
        }

        info!(
            item_id,
            actor = %actor.id,
            from = %item.status,
            tier = %next.assigned_role,
            "Item claimed"
        );
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::item::{ReasonCode, Subject};
    use crate::roles::RoleTier;
    use crate::store::{MemoryStore, ModerationStore};

    async fn setup(role: RoleTier) -> (ClaimCoordinator, SharedStore, ModerationItem) {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let item = ModerationItem::new(
            Subject::Flag {
                post_id: "post-1".to_string(),
            },
            Some("reporter".to_string()),
            ReasonCode::Spam,
            None,
            role,
        );
        store.insert(&item).await.unwrap();
        let coordinator = ClaimCoordinator::new(store.clone(), Arc::new(RoleHierarchy::default()));
        (coordinator, store, item)
    }

    #[tokio::test]
    async fn test_claim_pending_item() {
        let (claims, store, item) = setup(RoleTier::JuniorMod).await;
        let actor = Actor::new("mod-a", RoleTier::JuniorMod);

        let claimed = claims.claim(&item.id, &actor).await.unwrap();
        assert_eq!(claimed.status, ItemStatus::Reviewing);
        assert_eq!(claimed.assigned_to.as_deref(), Some("mod-a"));

        let stored = store.get_by_id(&item.id).await.unwrap().unwrap();
        assert_eq!(stored, claimed);
    }

    #[tokio::test]
    async fn test_reclaim_by_holder_is_noop() {
        let (claims, _store, item) = setup(RoleTier::JuniorMod).await;
        let actor = Actor::new("mod-a", RoleTier::JuniorMod);

        let first = claims.claim(&item.id, &actor).await.unwrap();
        let second = claims.claim(&item.id, &actor).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_claim_held_by_other_conflicts() {
        let (claims, _store, item) = setup(RoleTier::JuniorMod).await;
        claims
            .claim(&item.id, &Actor::new("mod-a", RoleTier::JuniorMod))
            .await
            .unwrap();

        let err = claims
            .claim(&item.id, &Actor::new("mod-b", RoleTier::Admin))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_claim_below_tier_unauthorized() {
        let (claims, store, item) = setup(RoleTier::SeniorMod).await;
        let err = claims
            .claim(&item.id, &Actor::new("mod-j", RoleTier::JuniorMod))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let stored = store.get_by_id(&item.id).await.unwrap().unwrap();
        assert_eq!(stored, item);
    }

    #[tokio::test]
    async fn test_claim_unknown_item() {
        let (claims, _store, _item) = setup(RoleTier::JuniorMod).await;
        let err = claims
            .claim("missing", &Actor::new("mod-a", RoleTier::Admin))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_claim_resolved_item_invalid_state() {
        let (claims, store, item) = setup(RoleTier::JuniorMod).await;
        let mut closed = item.clone();
        closed.status = ItemStatus::ResolvedDismissed;
        store
            .cas_update(&item.id, &item.observed(), &closed)
            .await
            .unwrap();

        let err = claims
            .claim(&item.id, &Actor::new("mod-a", RoleTier::Admin))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }
}
