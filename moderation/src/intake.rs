//! Intake — how items enter the queue
//!
//! User flags, user reports and detector output all land here and leave as a
//! `pending` item at the baseline tier for their reason code. Nothing
//! downstream ever sees an item that skipped this step.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ModerationError, ModerationResult};
use crate::item::{ModerationItem, ReasonCode, Subject};
use crate::roles::RoleTier;
use crate::store::SharedStore;

/// Longest accepted reporter comment, in characters
pub const MAX_FREE_TEXT_CHARS: usize = 2000;

/// Starting tier per reason code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselinePolicy {
    /// Tier for any reason code without an override
    #[serde(default = "default_tier")]
    pub default: RoleTier,

    #[serde(flatten)]
    pub overrides: HashMap<ReasonCode, RoleTier>,
}

fn default_tier() -> RoleTier {
    RoleTier::JuniorMod
}

impl Default for BaselinePolicy {
    fn default() -> Self {
        let overrides = HashMap::from([
            (ReasonCode::MinorSafety, RoleTier::SeniorMod),
            (ReasonCode::NonConsensual, RoleTier::SeniorMod),
            (ReasonCode::Illegal, RoleTier::LeadMod),
        ]);
        Self {
            default: default_tier(),
            overrides,
        }
    }
}

impl BaselinePolicy {
    pub fn tier_for(&self, reason: ReasonCode) -> RoleTier {
        self.overrides.get(&reason).copied().unwrap_or(self.default)
    }
}

pub struct Intake {
    store: SharedStore,
    baseline: BaselinePolicy,
}

impl Intake {
    pub fn new(store: SharedStore, baseline: BaselinePolicy) -> Self {
        Self { store, baseline }
    }

    pub fn baseline(&self) -> &BaselinePolicy {
        &self.baseline
    }

    /// A user flags a post
    pub async fn submit_flag(
        &self,
        post_id: &str,
        originator_id: &str,
        reason: ReasonCode,
        free_text: Option<&str>,
    ) -> ModerationResult<ModerationItem> {
        let post_id = require_id("post_id", post_id)?;
        let originator_id = require_id("originator_id", originator_id)?;
        let subject = Subject::Flag { post_id };
        self.create(subject, Some(originator_id), reason, free_text)
            .await
    }

    /// A user reports another user, optionally citing a post
    pub async fn submit_report(
        &self,
        user_id: &str,
        post_id: Option<&str>,
        originator_id: &str,
        reason: ReasonCode,
        free_text: Option<&str>,
    ) -> ModerationResult<ModerationItem> {
        let user_id = require_id("user_id", user_id)?;
        let post_id = post_id.map(|p| require_id("post_id", p)).transpose()?;
        let originator_id = require_id("originator_id", originator_id)?;
        let subject = Subject::Report { user_id, post_id };
        self.create(subject, Some(originator_id), reason, free_text)
            .await
    }

    /// An automated detector flags a post; there is no human originator
    pub async fn submit_system_flag(
        &self,
        post_id: &str,
        reason: ReasonCode,
        detail: Option<&str>,
    ) -> ModerationResult<ModerationItem> {
        let post_id = require_id("post_id", post_id)?;
        self.create(Subject::Flag { post_id }, None, reason, detail)
            .await
    }

    async fn create(
        &self,
        subject: Subject,
        originator_id: Option<String>,
        reason: ReasonCode,
        free_text: Option<&str>,
    ) -> ModerationResult<ModerationItem> {
        let free_text = normalize_free_text(free_text)?;
        let item = ModerationItem::new(
            subject,
            originator_id,
            reason,
            free_text,
            self.baseline.tier_for(reason),
        );
        self.store.insert(&item).await?;

        info!(
            item_id = %item.id,
            kind = item.kind().as_str(),
            reason = %reason,
            tier = %item.assigned_role,
            system = item.is_system_generated(),
            "Item submitted"
        );
        Ok(item)
    }
}

fn require_id(field: &str, value: &str) -> ModerationResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ModerationError::validation(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

fn normalize_free_text(text: Option<&str>) -> ModerationResult<Option<String>> {
    let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    if text.chars().count() > MAX_FREE_TEXT_CHARS {
        return Err(ModerationError::validation(format!(
            "free text exceeds {} characters",
            MAX_FREE_TEXT_CHARS
        )));
    }
    Ok(Some(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::item::{ItemKind, ItemStatus, StatusFilter};
    use crate::store::{MemoryStore, ModerationStore};
    use std::sync::Arc;

    fn intake() -> (Intake, SharedStore) {
        let store: SharedStore = Arc::new(MemoryStore::new());
        (Intake::new(store.clone(), BaselinePolicy::default()), store)
    }

    #[test]
    fn test_baseline_overrides() {
        let policy = BaselinePolicy::default();
        assert_eq!(policy.tier_for(ReasonCode::Spam), RoleTier::JuniorMod);
        assert_eq!(policy.tier_for(ReasonCode::MinorSafety), RoleTier::SeniorMod);
        assert_eq!(policy.tier_for(ReasonCode::Illegal), RoleTier::LeadMod);
    }

    #[tokio::test]
    async fn test_submit_flag_uses_baseline_tier() {
        let (intake, store) = intake();
        let item = intake
            .submit_flag("post-1", "user-1", ReasonCode::Illegal, Some("  see attachment "))
            .await
            .unwrap();

        assert_eq!(item.status, ItemStatus::Pending);
        assert_eq!(item.assigned_role, RoleTier::LeadMod);
        assert_eq!(item.free_text.as_deref(), Some("see attachment"));
        assert_eq!(store.get_by_id(&item.id).await.unwrap(), Some(item));
    }

    #[tokio::test]
    async fn test_submit_report_with_optional_post() {
        let (intake, _store) = intake();
        let item = intake
            .submit_report("user-2", None, "user-1", ReasonCode::Harassment, Some("   "))
            .await
            .unwrap();
        assert_eq!(item.kind(), ItemKind::Report);
        assert_eq!(item.subject.post_id(), None);
        assert!(item.free_text.is_none());
    }

    #[tokio::test]
    async fn test_system_flag_has_no_originator() {
        let (intake, _store) = intake();
        let item = intake
            .submit_system_flag("post-3", ReasonCode::Spam, Some("score=0.97"))
            .await
            .unwrap();
        assert!(item.is_system_generated());
    }

    #[tokio::test]
    async fn test_invalid_input_creates_nothing() {
        let (intake, store) = intake();

        let err = intake
            .submit_flag(" ", "user-1", ReasonCode::Spam, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);

        let long = "x".repeat(MAX_FREE_TEXT_CHARS + 1);
        let err = intake
            .submit_flag("post-1", "user-1", ReasonCode::Spam, Some(&long))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);

        assert!(store
            .list_by_status(&StatusFilter::All)
            .await
            .unwrap()
            .is_empty());
    }
}
