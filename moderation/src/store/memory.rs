//! In-process store
//!
//! The compare and the write happen under one exclusive lock guard, which
//! gives the same per-row atomicity a database provides for a guarded
//! `UPDATE`. Only usable when every request handler shares the process.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::{apply_transition, ExpectedState, ModerationStore};
use crate::error::{StoreError, StoreResult};
use crate::item::{EscalationHistoryEntry, ItemId, ModerationItem, StatusFilter};

#[derive(Default)]
struct Tables {
    items: HashMap<ItemId, ModerationItem>,
    history: Vec<EscalationHistoryEntry>,
}

impl Tables {
    fn cas(&mut self, id: &str, expected: &ExpectedState, next: &ModerationItem) -> u64 {
        match self.items.get_mut(id) {
            Some(current) if expected.matches(current) => {
                apply_transition(current, next);
                1
            }
            _ => 0,
        }
    }
}

/// Map-backed [`ModerationStore`]
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored items
    pub fn len(&self) -> usize {
        self.tables.read().map(|t| t.items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ModerationStore for MemoryStore {
    async fn insert(&self, item: &ModerationItem) -> StoreResult<()> {
        let mut tables = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
        if tables.items.contains_key(&item.id) {
            return Err(StoreError::Duplicate(item.id.clone()));
        }
        tables.items.insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> StoreResult<Option<ModerationItem>> {
        let tables = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(tables.items.get(id).cloned())
    }

    async fn cas_update(
        &self,
        id: &str,
        expected: &ExpectedState,
        next: &ModerationItem,
    ) -> StoreResult<u64> {
        let mut tables = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(tables.cas(id, expected, next))
    }

    async fn cas_update_with_history(
        &self,
        id: &str,
        expected: &ExpectedState,
        next: &ModerationItem,
        entry: &EscalationHistoryEntry,
    ) -> StoreResult<u64> {
        let mut tables = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
        let affected = tables.cas(id, expected, next);
        if affected == 1 {
            tables.history.push(entry.clone());
        }
        Ok(affected)
    }

    async fn append_history(&self, entry: &EscalationHistoryEntry) -> StoreResult<()> {
        let mut tables = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
        if tables.history.iter().any(|e| e.id == entry.id) {
            return Err(StoreError::Duplicate(entry.id.clone()));
        }
        tables.history.push(entry.clone());
        Ok(())
    }

    async fn history_for(&self, item_id: &str) -> StoreResult<Vec<EscalationHistoryEntry>> {
        let tables = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(tables
            .history
            .iter()
            .filter(|e| e.item_id == item_id)
            .cloned()
            .collect())
    }

    async fn list_by_status(&self, filter: &StatusFilter) -> StoreResult<Vec<ModerationItem>> {
        let tables = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut items: Vec<ModerationItem> = tables
            .items
            .values()
            .filter(|i| filter.matches(i.status))
            .cloned()
            .collect();

        items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{ItemStatus, ReasonCode, Subject};
    use crate::roles::RoleTier;

    fn pending_item() -> ModerationItem {
        ModerationItem::new(
            Subject::Flag {
                post_id: "post-1".to_string(),
            },
            Some("reporter".to_string()),
            ReasonCode::Harassment,
            None,
            RoleTier::JuniorMod,
        )
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = MemoryStore::new();
        let item = pending_item();
        store.insert(&item).await.unwrap();

        let fetched = store.get_by_id(&item.id).await.unwrap().unwrap();
        assert_eq!(fetched, item);
        assert!(store.get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let store = MemoryStore::new();
        let item = pending_item();
        store.insert(&item).await.unwrap();
        assert!(matches!(
            store.insert(&item).await,
            Err(StoreError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn test_cas_applies_once() {
        let store = MemoryStore::new();
        let item = pending_item();
        store.insert(&item).await.unwrap();

        let expected = item.observed();
        let mut next = item.clone();
        next.status = ItemStatus::Reviewing;
        next.assigned_to = Some("mod-a".to_string());

        assert_eq!(store.cas_update(&item.id, &expected, &next).await.unwrap(), 1);
        // Same guard again: the row moved on, so nothing matches
        assert_eq!(store.cas_update(&item.id, &expected, &next).await.unwrap(), 0);
        assert_eq!(store.cas_update("missing", &expected, &next).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_history_only_appended_on_match() {
        let store = MemoryStore::new();
        let item = pending_item();
        store.insert(&item).await.unwrap();

        let stale = ExpectedState {
            status: ItemStatus::Reviewing,
            assigned_to: Some("someone".to_string()),
            assigned_role: item.assigned_role,
        };
        let entry = EscalationHistoryEntry::new(
            item.id.clone(),
            RoleTier::JuniorMod,
            RoleTier::SeniorMod,
            "mod-a".to_string(),
            "needs senior".to_string(),
            chrono::Utc::now(),
        );

        let affected = store
            .cas_update_with_history(&item.id, &stale, &item, &entry)
            .await
            .unwrap();
        assert_eq!(affected, 0);
        assert!(store.history_for(&item.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_by_status() {
        let store = MemoryStore::new();
        let open = pending_item();
        let mut closed = pending_item();
        closed.status = ItemStatus::ResolvedDismissed;
        store.insert(&open).await.unwrap();
        store.insert(&closed).await.unwrap();

        assert_eq!(store.list_by_status(&StatusFilter::All).await.unwrap().len(), 2);
        let open_items = store.list_by_status(&StatusFilter::Open).await.unwrap();
        assert_eq!(open_items.len(), 1);
        assert_eq!(open_items[0].id, open.id);
    }
}
