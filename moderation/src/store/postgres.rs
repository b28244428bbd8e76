//! Postgres-backed moderation store
//!
//! Shared between any number of stateless request handlers. Each workflow
//! write is a single guarded statement; the database's row lock makes the
//! compare and the write one step. Escalation folds the history insert into
//! the same statement through a data-modifying CTE, so the audit row exists
//! exactly when the item update matched.

use async_trait::async_trait;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{error, info};

use super::{ExpectedState, ModerationStore};
use crate::error::{StoreError, StoreResult};
use crate::item::{
    EscalationHistoryEntry, EscalationMark, ModerationItem, ResolutionMark, StatusFilter,
    Subject,
};

/// DDL applied by [`PostgresStore::migrate`]
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS moderation_items (
    id                TEXT PRIMARY KEY,
    kind              TEXT NOT NULL,
    post_id           TEXT,
    user_id           TEXT,
    originator_id     TEXT,
    reason_code       TEXT NOT NULL,
    free_text         TEXT,
    status            TEXT NOT NULL,
    assigned_to       TEXT,
    assigned_role     TEXT NOT NULL,
    escalated_from    TEXT,
    escalated_by      TEXT,
    escalated_at      TIMESTAMPTZ,
    escalation_reason TEXT,
    resolved_by       TEXT,
    resolution_notes  TEXT,
    resolved_at       TIMESTAMPTZ,
    created_at        TIMESTAMPTZ NOT NULL,
    updated_at        TIMESTAMPTZ NOT NULL,
    CHECK (post_id IS NOT NULL OR user_id IS NOT NULL)
);
CREATE INDEX IF NOT EXISTS moderation_items_status_idx ON moderation_items (status);

CREATE TABLE IF NOT EXISTS escalation_history (
    seq          BIGSERIAL PRIMARY KEY,
    id           TEXT NOT NULL UNIQUE,
    item_id      TEXT NOT NULL REFERENCES moderation_items (id),
    from_role    TEXT NOT NULL,
    to_role      TEXT NOT NULL,
    escalated_by TEXT NOT NULL,
    reason       TEXT NOT NULL,
    created_at   TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS escalation_history_item_idx ON escalation_history (item_id, seq);
"#;

const ITEM_COLUMNS: &str = "id, kind, post_id, user_id, originator_id, reason_code, free_text, \
     status, assigned_to, assigned_role, escalated_from, escalated_by, escalated_at, \
     escalation_reason, resolved_by, resolution_notes, resolved_at, created_at, updated_at";

const CAS_UPDATE: &str = "UPDATE moderation_items SET \
     status = $3, assigned_to = $4, assigned_role = $5, \
     escalated_from = $6, escalated_by = $7, escalated_at = $8, escalation_reason = $9, \
     resolved_by = $10, resolution_notes = $11, resolved_at = $12, updated_at = $13 \
     WHERE id = $1 AND status = $2 AND assigned_to IS NOT DISTINCT FROM $14 \
     AND assigned_role = $15";

const CAS_UPDATE_WITH_HISTORY: &str = "WITH upd AS ( \
     UPDATE moderation_items SET \
     status = $3, assigned_to = $4, assigned_role = $5, \
     escalated_from = $6, escalated_by = $7, escalated_at = $8, escalation_reason = $9, \
     resolved_by = $10, resolution_notes = $11, resolved_at = $12, updated_at = $13 \
     WHERE id = $1 AND status = $2 AND assigned_to IS NOT DISTINCT FROM $14 \
     AND assigned_role = $15 \
     RETURNING id ) \
     INSERT INTO escalation_history (id, item_id, from_role, to_role, escalated_by, reason, created_at) \
     SELECT $16::text, upd.id, $17::text, $18::text, $19::text, $20::text, $21::timestamptz FROM upd";

/// Shared-database [`ModerationStore`]
pub struct PostgresStore {
    client: Client,
}

impl PostgresStore {
    /// Wrap an already-connected client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect and drive the connection on a background task
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let (client, connection) = tokio_postgres::connect(url, NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "Postgres connection closed with error");
            }
        });
        info!("Connected moderation store to Postgres");
        Ok(Self::new(client))
    }

    /// Create tables and indexes if missing
    pub async fn migrate(&self) -> StoreResult<()> {
        self.client.batch_execute(SCHEMA).await?;
        Ok(())
    }

    fn corrupt(id: &str, message: impl Into<String>) -> StoreError {
        StoreError::Corrupt {
            id: id.to_string(),
            message: message.into(),
        }
    }

    fn item_from_row(row: &Row) -> StoreResult<ModerationItem> {
        let id: String = row.try_get("id")?;
        let kind: String = row.try_get("kind")?;
        let post_id: Option<String> = row.try_get("post_id")?;
        let user_id: Option<String> = row.try_get("user_id")?;

        let subject = match (kind.as_str(), post_id, user_id) {
            ("flag", Some(post_id), _) => Subject::Flag { post_id },
            ("report", post_id, Some(user_id)) => Subject::Report { user_id, post_id },
            (other, _, _) => {
                return Err(Self::corrupt(
                    &id,
                    format!("incomplete subject for kind {other}"),
                ))
            }
        };

        let escalated_by: Option<String> = row.try_get("escalated_by")?;
        let escalation = match escalated_by {
            Some(escalated_by) => Some(EscalationMark {
                escalated_from: row
                    .try_get::<_, Option<String>>("escalated_from")?
                    .ok_or_else(|| Self::corrupt(&id, "escalated_from missing"))?,
                escalated_by,
                escalated_at: row
                    .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>("escalated_at")?
                    .ok_or_else(|| Self::corrupt(&id, "escalated_at missing"))?,
                reason: row
                    .try_get::<_, Option<String>>("escalation_reason")?
                    .unwrap_or_default(),
            }),
            None => None,
        };

        let resolved_by: Option<String> = row.try_get("resolved_by")?;
        let resolution = match resolved_by {
            Some(resolved_by) => Some(ResolutionMark {
                resolved_by,
                notes: row
                    .try_get::<_, Option<String>>("resolution_notes")?
                    .unwrap_or_default(),
                resolved_at: row
                    .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>("resolved_at")?
                    .ok_or_else(|| Self::corrupt(&id, "resolved_at missing"))?,
            }),
            None => None,
        };

        let reason_code: String = row.try_get("reason_code")?;
        let status: String = row.try_get("status")?;
        let assigned_role: String = row.try_get("assigned_role")?;

        Ok(ModerationItem {
            subject,
            originator_id: row.try_get("originator_id")?,
            reason_code: reason_code.parse().map_err(|e: String| Self::corrupt(&id, e))?,
            free_text: row.try_get("free_text")?,
            status: status.parse().map_err(|e: String| Self::corrupt(&id, e))?,
            assigned_to: row.try_get("assigned_to")?,
            assigned_role: assigned_role
                .parse()
                .map_err(|e: String| Self::corrupt(&id, e))?,
            escalation,
            resolution,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            id,
        })
    }

    fn entry_from_row(row: &Row) -> StoreResult<EscalationHistoryEntry> {
        let id: String = row.try_get("id")?;
        let from_role: String = row.try_get("from_role")?;
        let to_role: String = row.try_get("to_role")?;
        Ok(EscalationHistoryEntry {
            item_id: row.try_get("item_id")?,
            from_role: from_role.parse().map_err(|e: String| Self::corrupt(&id, e))?,
            to_role: to_role.parse().map_err(|e: String| Self::corrupt(&id, e))?,
            escalated_by: row.try_get("escalated_by")?,
            reason: row.try_get("reason")?,
            created_at: row.try_get("created_at")?,
            id,
        })
    }
}

/// Column values a transition writes, in `$3..=$13` order
struct TransitionParams<'a> {
    status: &'a str,
    assigned_role: &'a str,
    escalated_from: Option<&'a str>,
    escalated_by: Option<&'a str>,
    escalated_at: Option<chrono::DateTime<chrono::Utc>>,
    escalation_reason: Option<&'a str>,
    resolved_by: Option<&'a str>,
    resolution_notes: Option<&'a str>,
    resolved_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl<'a> TransitionParams<'a> {
    fn of(next: &'a ModerationItem) -> Self {
        Self {
            status: next.status.as_str(),
            assigned_role: next.assigned_role.as_str(),
            escalated_from: next.escalation.as_ref().map(|m| m.escalated_from.as_str()),
            escalated_by: next.escalation.as_ref().map(|m| m.escalated_by.as_str()),
            escalated_at: next.escalation.as_ref().map(|m| m.escalated_at),
            escalation_reason: next.escalation.as_ref().map(|m| m.reason.as_str()),
            resolved_by: next.resolution.as_ref().map(|m| m.resolved_by.as_str()),
            resolution_notes: next.resolution.as_ref().map(|m| m.notes.as_str()),
            resolved_at: next.resolution.as_ref().map(|m| m.resolved_at),
        }
    }
}

#[async_trait]
impl ModerationStore for PostgresStore {
    async fn insert(&self, item: &ModerationItem) -> StoreResult<()> {
        let sql = format!(
            "INSERT INTO moderation_items ({ITEM_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19) \
             ON CONFLICT (id) DO NOTHING"
        );
        let t = TransitionParams::of(item);
        let affected = self
            .client
            .execute(
                sql.as_str(),
                &[
                    &item.id,
                    &item.kind().as_str(),
                    &item.subject.post_id(),
                    &item.subject.user_id(),
                    &item.originator_id,
                    &item.reason_code.as_str(),
                    &item.free_text,
                    &t.status,
                    &item.assigned_to,
                    &t.assigned_role,
                    &t.escalated_from,
                    &t.escalated_by,
                    &t.escalated_at,
                    &t.escalation_reason,
                    &t.resolved_by,
                    &t.resolution_notes,
                    &t.resolved_at,
                    &item.created_at,
                    &item.updated_at,
                ],
            )
            .await?;

        if affected == 0 {
            return Err(StoreError::Duplicate(item.id.clone()));
        }
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> StoreResult<Option<ModerationItem>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM moderation_items WHERE id = $1");
        match self.client.query_opt(sql.as_str(), &[&id]).await? {
            Some(row) => Ok(Some(Self::item_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn cas_update(
        &self,
        id: &str,
        expected: &ExpectedState,
        next: &ModerationItem,
    ) -> StoreResult<u64> {
        let t = TransitionParams::of(next);
        let affected = self
            .client
            .execute(
                CAS_UPDATE,
                &[
                    &id,
                    &expected.status.as_str(),
                    &t.status,
                    &next.assigned_to,
                    &t.assigned_role,
                    &t.escalated_from,
                    &t.escalated_by,
                    &t.escalated_at,
                    &t.escalation_reason,
                    &t.resolved_by,
                    &t.resolution_notes,
                    &t.resolved_at,
                    &next.updated_at,
                    &expected.assigned_to,
                    &expected.assigned_role.as_str(),
                ],
            )
            .await?;
        Ok(affected)
    }

    async fn cas_update_with_history(
        &self,
        id: &str,
        expected: &ExpectedState,
        next: &ModerationItem,
        entry: &EscalationHistoryEntry,
    ) -> StoreResult<u64> {
        let t = TransitionParams::of(next);
        let affected = self
            .client
            .execute(
                CAS_UPDATE_WITH_HISTORY,
                &[
                    &id,
                    &expected.status.as_str(),
                    &t.status,
                    &next.assigned_to,
                    &t.assigned_role,
                    &t.escalated_from,
                    &t.escalated_by,
                    &t.escalated_at,
                    &t.escalation_reason,
                    &t.resolved_by,
                    &t.resolution_notes,
                    &t.resolved_at,
                    &next.updated_at,
                    &expected.assigned_to,
                    &expected.assigned_role.as_str(),
                    &entry.id,
                    &entry.from_role.as_str(),
                    &entry.to_role.as_str(),
                    &entry.escalated_by,
                    &entry.reason,
                    &entry.created_at,
                ],
            )
            .await?;
        Ok(affected)
    }

    async fn append_history(&self, entry: &EscalationHistoryEntry) -> StoreResult<()> {
        self.client
            .execute(
                "INSERT INTO escalation_history \
                 (id, item_id, from_role, to_role, escalated_by, reason, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
                &[
                    &entry.id,
                    &entry.item_id,
                    &entry.from_role.as_str(),
                    &entry.to_role.as_str(),
                    &entry.escalated_by,
                    &entry.reason,
                    &entry.created_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn history_for(&self, item_id: &str) -> StoreResult<Vec<EscalationHistoryEntry>> {
        let rows = self
            .client
            .query(
                "SELECT id, item_id, from_role, to_role, escalated_by, reason, created_at \
                 FROM escalation_history WHERE item_id = $1 ORDER BY seq",
                &[&item_id],
            )
            .await?;
        rows.iter().map(Self::entry_from_row).collect()
    }

    async fn list_by_status(&self, filter: &StatusFilter) -> StoreResult<Vec<ModerationItem>> {
        let statuses: Vec<&str> = filter.statuses().iter().map(|s| s.as_str()).collect();
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM moderation_items \
             WHERE status = ANY($1) ORDER BY created_at"
        );
        let rows = self.client.query(sql.as_str(), &[&statuses]).await?;
        rows.iter().map(Self::item_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    //! Run against a disposable database:
    //! `MODERATION_TEST_DATABASE_URL=postgres://... cargo test --features postgres`

    use super::*;
    use crate::item::{ItemStatus, ReasonCode};
    use crate::roles::RoleTier;

    async fn test_store() -> Option<PostgresStore> {
        let url = std::env::var("MODERATION_TEST_DATABASE_URL").ok()?;
        let store = PostgresStore::connect(&url).await.ok()?;
        store.migrate().await.ok()?;
        Some(store)
    }

    fn flag() -> ModerationItem {
        ModerationItem::new(
            Subject::Flag {
                post_id: format!("post-{}", uuid::Uuid::new_v4()),
            },
            None,
            ReasonCode::Illegal,
            Some("automated match".to_string()),
            RoleTier::LeadMod,
        )
    }

    #[tokio::test]
    async fn test_round_trip_and_guarded_update() {
        let Some(store) = test_store().await else {
            return;
        };
        let item = flag();
        store.insert(&item).await.unwrap();

        let fetched = store.get_by_id(&item.id).await.unwrap().unwrap();
        assert_eq!(fetched.subject, item.subject);
        assert_eq!(fetched.assigned_role, RoleTier::LeadMod);
        assert!(fetched.originator_id.is_none());

        let mut next = fetched.clone();
        next.status = ItemStatus::Reviewing;
        next.assigned_to = Some("lead-1".to_string());
        assert_eq!(store.cas_update(&item.id, &item.observed(), &next).await.unwrap(), 1);
        assert_eq!(store.cas_update(&item.id, &item.observed(), &next).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_guard_includes_assigned_role() {
        let Some(store) = test_store().await else {
            return;
        };
        let item = flag();
        store.insert(&item).await.unwrap();

        let mut stale = item.observed();
        stale.assigned_role = RoleTier::SeniorMod;
        let mut next = item.clone();
        next.status = ItemStatus::Reviewing;
        next.assigned_to = Some("lead-1".to_string());
        assert_eq!(store.cas_update(&item.id, &stale, &next).await.unwrap(), 0);

        let stored = store.get_by_id(&item.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ItemStatus::Pending);
    }

    #[tokio::test]
    async fn test_escalation_cte_appends_only_on_match() {
        let Some(store) = test_store().await else {
            return;
        };
        let item = flag();
        store.insert(&item).await.unwrap();

        let mut next = item.clone();
        next.status = ItemStatus::Escalated;
        next.assigned_role = RoleTier::Admin;
        next.escalation = Some(EscalationMark {
            escalated_from: "lead-1".to_string(),
            escalated_by: "lead-1".to_string(),
            escalated_at: chrono::Utc::now(),
            reason: "legal hold".to_string(),
        });
        let entry = EscalationHistoryEntry::new(
            item.id.clone(),
            RoleTier::LeadMod,
            RoleTier::Admin,
            "lead-1".to_string(),
            "legal hold".to_string(),
            chrono::Utc::now(),
        );

        let first = store
            .cas_update_with_history(&item.id, &item.observed(), &next, &entry)
            .await
            .unwrap();
        assert_eq!(first, 1);

        let retry = EscalationHistoryEntry::new(
            item.id.clone(),
            RoleTier::LeadMod,
            RoleTier::Admin,
            "lead-1".to_string(),
            "legal hold".to_string(),
            chrono::Utc::now(),
        );
        let second = store
            .cas_update_with_history(&item.id, &item.observed(), &next, &retry)
            .await
            .unwrap();
        assert_eq!(second, 0);

        let history = store.history_for(&item.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, entry.id);
    }
}
