//! ModerationService — the action surface handed to UI and admin tooling
//!
//! Every call resolves the acting user's tier through [`Identity`] first and
//! threads the resulting [`Actor`] into the engines. Nothing is cached
//! between calls, so a demotion takes effect on the next request.
//!
//! Results never carry a raw error across this boundary. Each operation
//! returns an [`ActionResult`], which serializes as
//!
//! ```json
//! { "ok": true,  "item": { ... } }
//! { "ok": false, "error_kind": "conflict", "message": "...",
//!   "recovery_action": "...", "retryable": true }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize, Serializer};
use tracing::{debug, error, warn};

use crate::claim::ClaimCoordinator;
use crate::config::ModerationConfig;
use crate::error::{ErrorKind, ModerationError, ModerationResult};
use crate::escalation::EscalationEngine;
use crate::identity::{Actor, Identity};
use crate::intake::{BaselinePolicy, Intake};
use crate::item::{
    Disposition, EscalationHistoryEntry, ItemId, ItemStatus, ModerationItem, ReasonCode,
    StatusFilter,
};
use crate::policy::{self, ModerationAction};
use crate::posts::{PostAction, PostsModeration};
use crate::resolution::{Resolution, ResolutionEngine};
use crate::roles::{RoleHierarchy, RoleTier};
use crate::store::SharedStore;

// ============================================================================
// Result envelope
// ============================================================================

/// Caller-facing failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionError {
    pub error_kind: ErrorKind,

    pub message: String,

    /// What the caller should do next
    pub recovery_action: String,

    pub retryable: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<ItemId>,
}

impl From<ModerationError> for ActionError {
    fn from(err: ModerationError) -> Self {
        let kind = err.kind();
        let item_id = match &err {
            ModerationError::NotFound { item_id }
            | ModerationError::Conflict { item_id, .. }
            | ModerationError::InvalidState { item_id, .. } => Some(item_id.clone()),
            _ => None,
        };

        // Storage and directory details stay in the log
        let message = match kind {
            ErrorKind::Internal => {
                error!(error = %err, "Moderation operation failed");
                "Something went wrong on our side; try again.".to_string()
            }
            _ => err.to_string(),
        };

        Self {
            error_kind: kind,
            message,
            recovery_action: kind.recovery_action().to_string(),
            retryable: kind.is_retryable(),
            item_id,
        }
    }
}

impl std::fmt::Display for ActionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.error_kind, self.message)
    }
}

/// Discriminated outcome of a façade call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionResult<T> {
    Ok(T),
    Err(ActionError),
}

impl<T> ActionResult<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Self::Ok(body) => Some(body),
            Self::Err(_) => None,
        }
    }

    pub fn err(self) -> Option<ActionError> {
        match self {
            Self::Ok(_) => None,
            Self::Err(e) => Some(e),
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Ok(_) => None,
            Self::Err(e) => Some(e.error_kind),
        }
    }

    pub fn into_result(self) -> Result<T, ActionError> {
        match self {
            Self::Ok(body) => Ok(body),
            Self::Err(e) => Err(e),
        }
    }
}

impl<T> From<ModerationResult<T>> for ActionResult<T> {
    fn from(result: ModerationResult<T>) -> Self {
        match result {
            Ok(body) => Self::Ok(body),
            Err(e) => Self::Err(e.into()),
        }
    }
}

#[derive(Serialize)]
struct OkEnvelope<'a, T> {
    ok: bool,
    #[serde(flatten)]
    body: &'a T,
}

#[derive(Serialize)]
struct ErrEnvelope<'a> {
    ok: bool,
    #[serde(flatten)]
    error: &'a ActionError,
}

impl<T: Serialize> Serialize for ActionResult<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Ok(body) => OkEnvelope { ok: true, body }.serialize(serializer),
            Self::Err(error) => ErrEnvelope { ok: false, error }.serialize(serializer),
        }
    }
}

// ============================================================================
// Response bodies
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemOutcome {
    pub item: ModerationItem,

    /// Set on resolve only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_action: Option<PostAction>,
}

impl From<ModerationItem> for ItemOutcome {
    fn from(item: ModerationItem) -> Self {
        Self {
            item,
            post_action: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemList {
    pub items: Vec<ModerationItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct History {
    pub item_id: ItemId,
    pub entries: Vec<EscalationHistoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueSummary {
    /// Every status, including those with no items
    pub counts: BTreeMap<String, usize>,
    pub open: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EscalationTargets {
    pub role: RoleTier,
    pub targets: Vec<RoleTier>,
}

// ============================================================================
// Façade
// ============================================================================

pub struct ModerationService {
    store: SharedStore,
    hierarchy: Arc<RoleHierarchy>,
    identity: Arc<dyn Identity>,
    intake: Intake,
    claims: ClaimCoordinator,
    escalations: EscalationEngine,
    resolutions: ResolutionEngine,
}

impl ModerationService {
    pub fn new(
        store: SharedStore,
        hierarchy: RoleHierarchy,
        baseline: BaselinePolicy,
        identity: Arc<dyn Identity>,
        posts: Arc<dyn PostsModeration>,
    ) -> Self {
        let hierarchy = Arc::new(hierarchy);
        Self {
            intake: Intake::new(store.clone(), baseline),
            claims: ClaimCoordinator::new(store.clone(), hierarchy.clone()),
            escalations: EscalationEngine::new(store.clone(), hierarchy.clone()),
            resolutions: ResolutionEngine::new(store.clone(), hierarchy.clone(), posts),
            store,
            hierarchy,
            identity,
        }
    }

    /// Build from loaded configuration and an already-opened store
    pub fn from_config(
        config: &ModerationConfig,
        store: SharedStore,
        identity: Arc<dyn Identity>,
        posts: Arc<dyn PostsModeration>,
    ) -> anyhow::Result<Self> {
        Ok(Self::new(
            store,
            config.hierarchy()?,
            config.baseline.clone(),
            identity,
            posts,
        ))
    }

    pub fn hierarchy(&self) -> &RoleHierarchy {
        &self.hierarchy
    }

    async fn actor(&self, actor_id: &str) -> ModerationResult<Actor> {
        match self.identity.role_of(actor_id).await? {
            Some(role) => Ok(Actor::new(actor_id, role)),
            None => {
                warn!(actor = %actor_id, "Rejected request from non-moderator");
                Err(ModerationError::unauthorized(format!(
                    "{} is not a moderator",
                    actor_id
                )))
            }
        }
    }

    // ------------------------------------------------------------------------
    // Workflow
    // ------------------------------------------------------------------------

    /// Items matching `filter`; `None` lists every item.
    pub async fn list_items(&self, filter: Option<StatusFilter>) -> ActionResult<ItemList> {
        let filter = filter.unwrap_or_default();
        let result = self.store.list_by_status(&filter).await;
        debug!(?filter, count = result.as_ref().map_or(0, Vec::len), "Listed items");
        result
            .map(|items| ItemList { items })
            .map_err(ModerationError::from)
            .into()
    }

    pub async fn claim(&self, actor_id: &str, item_id: &str) -> ActionResult<ItemOutcome> {
        let result: ModerationResult<ModerationItem> = async {
            let actor = self.actor(actor_id).await?;
            self.claims.claim(item_id, &actor).await
        }
        .await;
        result.map(ItemOutcome::from).into()
    }

    pub async fn escalate(
        &self,
        actor_id: &str,
        item_id: &str,
        target: RoleTier,
        reason: &str,
    ) -> ActionResult<ItemOutcome> {
        let result: ModerationResult<ModerationItem> = async {
            let actor = self.actor(actor_id).await?;
            self.escalations
                .escalate(item_id, &actor, target, reason)
                .await
        }
        .await;
        result.map(ItemOutcome::from).into()
    }

    pub async fn resolve(
        &self,
        actor_id: &str,
        item_id: &str,
        disposition: Disposition,
        notes: &str,
    ) -> ActionResult<ItemOutcome> {
        let result: ModerationResult<Resolution> = async {
            let actor = self.actor(actor_id).await?;
            self.resolutions
                .resolve(item_id, &actor, disposition, notes)
                .await
        }
        .await;
        result
            .map(|resolution| ItemOutcome {
                item: resolution.item,
                post_action: Some(resolution.post_action),
            })
            .into()
    }

    // ------------------------------------------------------------------------
    // Read-only views
    // ------------------------------------------------------------------------

    /// Escalation trail for one item, oldest first
    pub async fn history(&self, actor_id: &str, item_id: &str) -> ActionResult<History> {
        let result: ModerationResult<History> = async {
            self.actor(actor_id).await?;
            if self.store.get_by_id(item_id).await?.is_none() {
                return Err(ModerationError::not_found(item_id));
            }
            let entries = self.store.history_for(item_id).await?;
            debug!(item_id, entries = entries.len(), "Read escalation history");
            Ok(History {
                item_id: item_id.to_string(),
                entries,
            })
        }
        .await;
        result.into()
    }

    pub async fn queue_summary(&self, actor_id: &str) -> ActionResult<QueueSummary> {
        let result: ModerationResult<QueueSummary> = async {
            self.actor(actor_id).await?;
            let items = self.store.list_by_status(&StatusFilter::All).await?;

            let mut counts: BTreeMap<String, usize> = ItemStatus::all()
                .iter()
                .map(|s| (s.as_str().to_string(), 0))
                .collect();
            for item in &items {
                *counts.entry(item.status.as_str().to_string()).or_insert(0) += 1;
            }
            let open = items.iter().filter(|i| !i.status.is_terminal()).count();

            debug!(total = items.len(), open, "Computed queue summary");
            Ok(QueueSummary {
                counts,
                open,
                total: items.len(),
            })
        }
        .await;
        result.into()
    }

    /// Unclaimed open items the actor is allowed to claim
    pub async fn claimable_by(&self, actor_id: &str) -> ActionResult<ItemList> {
        let result: ModerationResult<ItemList> = async {
            let actor = self.actor(actor_id).await?;
            let items = self
                .store
                .list_by_status(&StatusFilter::Open)
                .await?
                .into_iter()
                .filter(|item| item.status.is_claimable() && item.assigned_to.is_none())
                .filter(|item| {
                    policy::permits(&self.hierarchy, &actor, item, ModerationAction::Claim)
                })
                .collect::<Vec<_>>();
            debug!(actor = %actor.id, count = items.len(), "Listed claimable items");
            Ok(ItemList { items })
        }
        .await;
        result.into()
    }

    /// Tiers the actor may hand items up to
    pub async fn escalation_targets_for(&self, actor_id: &str) -> ActionResult<EscalationTargets> {
        let result: ModerationResult<EscalationTargets> = async {
            let actor = self.actor(actor_id).await?;
            Ok(EscalationTargets {
                role: actor.role,
                targets: self.hierarchy.escalation_targets(actor.role),
            })
        }
        .await;
        result.into()
    }

    // ------------------------------------------------------------------------
    // Intake
    // ------------------------------------------------------------------------

    pub async fn submit_flag(
        &self,
        originator_id: &str,
        post_id: &str,
        reason: ReasonCode,
        free_text: Option<&str>,
    ) -> ActionResult<ItemOutcome> {
        self.intake
            .submit_flag(post_id, originator_id, reason, free_text)
            .await
            .map(ItemOutcome::from)
            .into()
    }

    pub async fn submit_report(
        &self,
        originator_id: &str,
        user_id: &str,
        post_id: Option<&str>,
        reason: ReasonCode,
        free_text: Option<&str>,
    ) -> ActionResult<ItemOutcome> {
        self.intake
            .submit_report(user_id, post_id, originator_id, reason, free_text)
            .await
            .map(ItemOutcome::from)
            .into()
    }

    pub async fn submit_system_flag(
        &self,
        post_id: &str,
        reason: ReasonCode,
        detail: Option<&str>,
    ) -> ActionResult<ItemOutcome> {
        self.intake
            .submit_system_flag(post_id, reason, detail)
            .await
            .map(ItemOutcome::from)
            .into()
    }
}
