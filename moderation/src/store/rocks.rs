//! RocksDB-backed moderation store
//!
//! Values are JSON so the database stays inspectable with `ldb`. Each key
//! holds a [`StoredRecord`]: the item together with its audit rows.
//! Conditional writes hold the write half of the lock across the compare and
//! the single `put`, so an escalation's item update and its history row land
//! together or not at all.

use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, Options, DB};

use super::schema::{self, StoredRecord, ALL_CFS};
use super::{apply_transition, ExpectedState, ModerationStore};
use crate::error::{StoreError, StoreResult};
use crate::item::{EscalationHistoryEntry, ModerationItem, StatusFilter};

/// Persistent [`ModerationStore`] on an embedded RocksDB instance
pub struct RocksStore {
    db: RwLock<DB>,
    path: PathBuf,
}

impl RocksStore {
    /// Open or create a store at the given path
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&opts, &path, cf_descriptors)?;

        Ok(Self {
            db: RwLock::new(db),
            path,
        })
    }

    /// Get the database path
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    // =========================================================================
    // Record operations
    // =========================================================================

    fn get_record(db: &DB, item_id: &str) -> StoreResult<Option<StoredRecord>> {
        let cf = db
            .cf_handle(schema::CF_ITEMS)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(schema::CF_ITEMS.to_string()))?;

        match db.get_cf(&cf, schema::keys::item(item_id).as_bytes())? {
            Some(bytes) => {
                let record = serde_json::from_slice(&bytes)
                    .map_err(|e| StoreError::Deserialization(e.to_string()))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn put_record(db: &DB, record: &StoredRecord) -> StoreResult<()> {
        let cf = db
            .cf_handle(schema::CF_ITEMS)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(schema::CF_ITEMS.to_string()))?;

        let bytes =
            serde_json::to_vec(record).map_err(|e| StoreError::Serialization(e.to_string()))?;
        db.put_cf(&cf, schema::keys::item(&record.item.id).as_bytes(), bytes)?;
        Ok(())
    }

    /// Every record, in key order
    fn scan_records(db: &DB) -> StoreResult<Vec<StoredRecord>> {
        let cf = db
            .cf_handle(schema::CF_ITEMS)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(schema::CF_ITEMS.to_string()))?;

        let prefix = schema::keys::ITEM_PREFIX.as_bytes();
        let mut records = Vec::new();
        for result in db.prefix_iterator_cf(&cf, prefix) {
            let (key, value) = result?;
            if !key.starts_with(prefix) {
                break; // Prefix no longer matches
            }
            let record = serde_json::from_slice(&value)
                .map_err(|e| StoreError::Deserialization(e.to_string()))?;
            records.push(record);
        }
        Ok(records)
    }

    /// Compare and write; caller holds the exclusive guard
    fn cas_in(
        db: &DB,
        id: &str,
        expected: &ExpectedState,
        next: &ModerationItem,
        entry: Option<&EscalationHistoryEntry>,
    ) -> StoreResult<u64> {
        let mut record = match Self::get_record(db, id)? {
            Some(record) => record,
            None => return Ok(0),
        };
        if !expected.matches(&record.item) {
            return Ok(0);
        }

        apply_transition(&mut record.item, next);
        if let Some(entry) = entry {
            record.history.push(entry.clone());
        }
        Self::put_record(db, &record)?;
        Ok(1)
    }
}

#[async_trait]
impl ModerationStore for RocksStore {
    async fn insert(&self, item: &ModerationItem) -> StoreResult<()> {
        let db = self.db.write().map_err(|_| StoreError::LockPoisoned)?;
        if Self::get_record(&db, &item.id)?.is_some() {
            return Err(StoreError::Duplicate(item.id.clone()));
        }
        Self::put_record(
            &db,
            &StoredRecord {
                item: item.clone(),
                history: Vec::new(),
            },
        )
    }

    async fn get_by_id(&self, id: &str) -> StoreResult<Option<ModerationItem>> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(Self::get_record(&db, id)?.map(|r| r.item))
    }

    async fn cas_update(
        &self,
        id: &str,
        expected: &ExpectedState,
        next: &ModerationItem,
    ) -> StoreResult<u64> {
        let db = self.db.write().map_err(|_| StoreError::LockPoisoned)?;
        Self::cas_in(&db, id, expected, next, None)
    }

    async fn cas_update_with_history(
        &self,
        id: &str,
        expected: &ExpectedState,
        next: &ModerationItem,
        entry: &EscalationHistoryEntry,
    ) -> StoreResult<u64> {
        let db = self.db.write().map_err(|_| StoreError::LockPoisoned)?;
        Self::cas_in(&db, id, expected, next, Some(entry))
    }

    async fn append_history(&self, entry: &EscalationHistoryEntry) -> StoreResult<()> {
        let db = self.db.write().map_err(|_| StoreError::LockPoisoned)?;
        let mut record =
            Self::get_record(&db, &entry.item_id)?.ok_or_else(|| StoreError::Corrupt {
                id: entry.item_id.clone(),
                message: "history appended for unknown item".to_string(),
            })?;
        if record.history.iter().any(|e| e.id == entry.id) {
            return Err(StoreError::Duplicate(entry.id.clone()));
        }
        record.history.push(entry.clone());
        Self::put_record(&db, &record)
    }

    async fn history_for(&self, item_id: &str) -> StoreResult<Vec<EscalationHistoryEntry>> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(Self::get_record(&db, item_id)?
            .map(|r| r.history)
            .unwrap_or_default())
    }

    async fn list_by_status(&self, filter: &StatusFilter) -> StoreResult<Vec<ModerationItem>> {
        let db = self.db.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut items: Vec<ModerationItem> = Self::scan_records(&db)?
            .into_iter()
            .map(|r| r.item)
            .filter(|i| filter.matches(i.status))
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
    use tempfile::tempdir;

    fn test_store() -> (RocksStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = RocksStore::open(dir.path().join("moderation.db")).unwrap();
        (store, dir)
    }

    fn report() -> ModerationItem {
        ModerationItem::new(
            Subject::Report {
                user_id: "user-7".to_string(),
                post_id: Some("post-3".to_string()),
            },
            Some("reporter".to_string()),
            ReasonCode::Harassment,
            Some("repeated slurs".to_string()),
            RoleTier::JuniorMod,
        )
    }

    fn entry_for(item: &ModerationItem, reason: &str) -> EscalationHistoryEntry {
        EscalationHistoryEntry::new(
            item.id.clone(),
            RoleTier::JuniorMod,
            RoleTier::SeniorMod,
            "mod-a".to_string(),
            reason.to_string(),
            chrono::Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_item_crud() {
        let (store, _dir) = test_store();
        let item = report();
        store.insert(&item).await.unwrap();

        let fetched = store.get_by_id(&item.id).await.unwrap().unwrap();
        assert_eq!(fetched, item);
        assert!(matches!(
            store.insert(&item).await,
            Err(StoreError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn test_cas_and_history_commit_together() {
        let (store, _dir) = test_store();
        let item = report();
        store.insert(&item).await.unwrap();

        let mut next = item.clone();
        next.status = ItemStatus::Escalated;
        next.assigned_role = RoleTier::SeniorMod;
        let entry = entry_for(&item, "context needed");

        let affected = store
            .cas_update_with_history(&item.id, &item.observed(), &next, &entry)
            .await
            .unwrap();
        assert_eq!(affected, 1);

        // Stale guard: no item change, no second audit row
        let affected = store
            .cas_update_with_history(&item.id, &item.observed(), &next, &entry)
            .await
            .unwrap();
        assert_eq!(affected, 0);

        assert_eq!(store.history_for(&item.id).await.unwrap(), vec![entry]);
        let stored = store.get_by_id(&item.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ItemStatus::Escalated);
        assert_eq!(stored.assigned_role, RoleTier::SeniorMod);
    }

    #[tokio::test]
    async fn test_history_preserves_append_order() {
        let (store, _dir) = test_store();
        let item = report();
        store.insert(&item).await.unwrap();

        let reasons: Vec<String> = (0..12).map(|i| format!("reason {}", i)).collect();
        for reason in &reasons {
            store.append_history(&entry_for(&item, reason)).await.unwrap();
        }

        let stored: Vec<String> = store
            .history_for(&item.id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.reason)
            .collect();
        assert_eq!(stored, reasons);
    }

    #[tokio::test]
    async fn test_history_for_unknown_item_fails() {
        let (store, _dir) = test_store();
        let orphan = entry_for(&report(), "nobody home");
        assert!(matches!(
            store.append_history(&orphan).await,
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn test_reopen_keeps_items() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("moderation.db");
        let item = report();
        {
            let store = RocksStore::open(&path).unwrap();
            store.insert(&item).await.unwrap();
        }
        let store = RocksStore::open(&path).unwrap();
        let open = store.list_by_status(&StatusFilter::Open).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, item.id);
    }
}
