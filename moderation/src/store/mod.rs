//! Persistence for moderation items and escalation history
//!
//! Every workflow mutation is a compare-and-swap: the caller passes the
//! `(status, assigned_to, assigned_role)` triple it observed, and the backend
//! applies the new row only if the stored row still carries exactly that
//! triple. The tier only ever rises, so the triple never recurs. The return
//! value is the number of rows affected; zero means someone else got there
//! first.
//!
//! # Backends
//!
//! - [`MemoryStore`]: process-local, for tests and single-node deployments
//! - `RocksStore` (feature `rocksdb-store`): embedded; each record carries
//!   its own history so a transition is a single put
//! - `PostgresStore` (feature `postgres`): shared database, CAS expressed as
//!   a guarded `UPDATE`

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "rocksdb-store")]
pub mod rocks;
#[cfg(feature = "rocksdb-store")]
pub mod schema;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::item::{ActorId, EscalationHistoryEntry, ItemStatus, ModerationItem, StatusFilter};
use crate::roles::RoleTier;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
#[cfg(feature = "rocksdb-store")]
pub use rocks::RocksStore;

/// Shared reference to a store
pub type SharedStore = Arc<dyn ModerationStore>;

/// The guard half of a conditional write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedState {
    pub status: ItemStatus,
    pub assigned_to: Option<ActorId>,
    /// `escalated` and unclaimed recurs after claim then escalate; the tier
    /// tells those apart.
    pub assigned_role: RoleTier,
}

impl ExpectedState {
    pub fn matches(&self, item: &ModerationItem) -> bool {
        item.status == self.status
            && item.assigned_to == self.assigned_to
            && item.assigned_role == self.assigned_role
    }
}

/// Repository consumed by the engines.
///
/// Implementations must make the compare and the write of `cas_update` a
/// single atomic step with respect to every other writer of the same row,
/// including writers in other processes where the backend is shared.
#[async_trait]
pub trait ModerationStore: Send + Sync {
    /// Persist a freshly created item. Fails on a duplicate id.
    async fn insert(&self, item: &ModerationItem) -> StoreResult<()>;

    async fn get_by_id(&self, id: &str) -> StoreResult<Option<ModerationItem>>;

    /// Apply the workflow fields of `next` iff the stored row matches
    /// `expected`. Returns rows affected (0 or 1).
    async fn cas_update(
        &self,
        id: &str,
        expected: &ExpectedState,
        next: &ModerationItem,
    ) -> StoreResult<u64>;

    /// `cas_update` plus a history append, committed together. When the
    /// guard fails nothing is written and 0 is returned.
    async fn cas_update_with_history(
        &self,
        id: &str,
        expected: &ExpectedState,
        next: &ModerationItem,
        entry: &EscalationHistoryEntry,
    ) -> StoreResult<u64>;

    /// Append one audit row
    async fn append_history(&self, entry: &EscalationHistoryEntry) -> StoreResult<()>;

    /// Audit rows for an item, oldest first
    async fn history_for(&self, item_id: &str) -> StoreResult<Vec<EscalationHistoryEntry>>;

    async fn list_by_status(&self, filter: &StatusFilter) -> StoreResult<Vec<ModerationItem>>;
}

/// Copy the fields a workflow transition may change. Identity, subject and
/// creation data are never rewritten.
pub(crate) fn apply_transition(current: &mut ModerationItem, next: &ModerationItem) {
    current.status = next.status;
    current.assigned_to = next.assigned_to.clone();
    current.assigned_role = next.assigned_role;
    current.escalation = next.escalation.clone();
    current.resolution = next.resolution.clone();
    current.updated_at = next.updated_at;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{ReasonCode, Subject};

    #[test]
    fn test_expected_state_matches() {
        let mut item = ModerationItem::new(
            Subject::Flag {
                post_id: "p".to_string(),
            },
            None,
            ReasonCode::Other,
            None,
            RoleTier::JuniorMod,
        );
        let expected = item.observed();
        assert!(expected.matches(&item));

        item.assigned_to = Some("mod-a".to_string());
        assert!(!expected.matches(&item));
    }

    #[test]
    fn test_expected_state_rejects_raised_tier() {
        let mut item = ModerationItem::new(
            Subject::Flag {
                post_id: "p".to_string(),
            },
            None,
            ReasonCode::Spam,
            None,
            RoleTier::SeniorMod,
        );
        item.status = ItemStatus::Escalated;
        let stale = item.observed();

        // claimed and escalated again: same status, still unclaimed
        item.assigned_role = RoleTier::LeadMod;
        assert_eq!(item.status, stale.status);
        assert_eq!(item.assigned_to, stale.assigned_to);
        assert!(!stale.matches(&item));
    }

    #[test]
    fn test_apply_transition_keeps_identity() {
        let mut current = ModerationItem::new(
            Subject::Flag {
                post_id: "p".to_string(),
            },
            None,
            ReasonCode::Spam,
            None,
            RoleTier::JuniorMod,
        );
        let mut next = current.clone();
        next.id = "other".to_string();
        next.status = ItemStatus::Reviewing;
        next.assigned_to = Some("mod-a".to_string());

        apply_transition(&mut current, &next);
        assert_ne!(current.id, "other");
        assert_eq!(current.status, ItemStatus::Reviewing);
        assert_eq!(current.assigned_to.as_deref(), Some("mod-a"));
    }
}
