//! Moderation items and their audit trail
//!
//! A content flag and a user report share one record type and one workflow;
//! only the [`Subject`] differs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::roles::RoleTier;

/// Unique identifier for moderation items
pub type ItemId = String;

/// Identifier of a user acting on (or originating) an item
pub type ActorId = String;

/// What a moderation item is about.
///
/// Flags always point at a post. Reports point at a user and may cite a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Subject {
    Flag {
        post_id: String,
    },
    Report {
        user_id: String,
        post_id: Option<String>,
    },
}

impl Subject {
    pub fn kind(&self) -> ItemKind {
        match self {
            Self::Flag { .. } => ItemKind::Flag,
            Self::Report { .. } => ItemKind::Report,
        }
    }

    /// The post a resolution would act on, if any
    pub fn post_id(&self) -> Option<&str> {
        match self {
            Self::Flag { post_id } => Some(post_id),
            Self::Report { post_id, .. } => post_id.as_deref(),
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Flag { .. } => None,
            Self::Report { user_id, .. } => Some(user_id),
        }
    }
}

/// Discriminator for [`Subject`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Flag,
    Report,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Report => "report",
        }
    }
}

/// Reporter-selected category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    Spam,
    Harassment,
    MinorSafety,
    NonConsensual,
    Illegal,
    Misinformation,
    Copyright,
    Other,
}

impl ReasonCode {
    pub fn all() -> &'static [ReasonCode] {
        &[
            ReasonCode::Spam,
            ReasonCode::Harassment,
            ReasonCode::MinorSafety,
            ReasonCode::NonConsensual,
            ReasonCode::Illegal,
            ReasonCode::Misinformation,
            ReasonCode::Copyright,
            ReasonCode::Other,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spam => "spam",
            Self::Harassment => "harassment",
            Self::MinorSafety => "minor_safety",
            Self::NonConsensual => "non_consensual",
            Self::Illegal => "illegal",
            Self::Misinformation => "misinformation",
            Self::Copyright => "copyright",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReasonCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReasonCode::all()
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown reason code: {}", s))
    }
}

/// Workflow state of an item
///
/// ```text
/// pending ──claim──▶ reviewing ──resolve──▶ resolved_*
///    │                  │
///    └──escalate──▶ escalated ◀──escalate──┘
///                       │
///                       ├──claim──▶ reviewing
///                       └──resolve──▶ resolved_*
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Reviewing,
    Escalated,
    ResolvedRemoved,
    ResolvedFlagged,
    ResolvedDismissed,
}

impl ItemStatus {
    pub fn all() -> &'static [ItemStatus] {
        &[
            ItemStatus::Pending,
            ItemStatus::Reviewing,
            ItemStatus::Escalated,
            ItemStatus::ResolvedRemoved,
            ItemStatus::ResolvedFlagged,
            ItemStatus::ResolvedDismissed,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Reviewing => "reviewing",
            Self::Escalated => "escalated",
            Self::ResolvedRemoved => "resolved_removed",
            Self::ResolvedFlagged => "resolved_flagged",
            Self::ResolvedDismissed => "resolved_dismissed",
        }
    }

    /// No transitions leave a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ResolvedRemoved | Self::ResolvedFlagged | Self::ResolvedDismissed
        )
    }

    /// States an unclaimed item can be claimed from
    pub fn is_claimable(&self) -> bool {
        matches!(self, Self::Pending | Self::Escalated)
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ItemStatus::all()
            .iter()
            .copied()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| format!("unknown item status: {}", s))
    }
}

/// Terminal outcome chosen by the resolving moderator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Soft takedown of the referenced post
    Removed,
    /// Post stays up behind a sensitive-content interstitial
    Flagged,
    /// No action
    Dismissed,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Removed => "removed",
            Self::Flagged => "flagged",
            Self::Dismissed => "dismissed",
        }
    }

    pub fn terminal_status(&self) -> ItemStatus {
        match self {
            Self::Removed => ItemStatus::ResolvedRemoved,
            Self::Flagged => ItemStatus::ResolvedFlagged,
            Self::Dismissed => ItemStatus::ResolvedDismissed,
        }
    }
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Disposition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "removed" => Ok(Self::Removed),
            "flagged" => Ok(Self::Flagged),
            "dismissed" => Ok(Self::Dismissed),
            other => Err(format!("unknown disposition: {}", other)),
        }
    }
}

/// Fields written by the most recent escalation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationMark {
    /// Claimant the item was taken from
    pub escalated_from: ActorId,
    pub escalated_by: ActorId,
    pub escalated_at: DateTime<Utc>,
    pub reason: String,
}

/// Fields written on the terminal transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionMark {
    pub resolved_by: ActorId,
    pub notes: String,
    pub resolved_at: DateTime<Utc>,
}

/// A flag or report moving through review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationItem {
    pub id: ItemId,

    #[serde(flatten)]
    pub subject: Subject,

    /// `None` for system-generated flags
    pub originator_id: Option<ActorId>,

    pub reason_code: ReasonCode,

    pub free_text: Option<String>,

    pub status: ItemStatus,

    /// Current claimant; `None` means unclaimed at the current tier
    pub assigned_to: Option<ActorId>,

    /// Tier required to act at the current stage. Never decreases.
    pub assigned_role: RoleTier,

    pub escalation: Option<EscalationMark>,

    pub resolution: Option<ResolutionMark>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl ModerationItem {
    /// Create a new pending item at its baseline tier
    pub fn new(
        subject: Subject,
        originator_id: Option<ActorId>,
        reason_code: ReasonCode,
        free_text: Option<String>,
        baseline: RoleTier,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            subject,
            originator_id,
            reason_code,
            free_text,
            status: ItemStatus::Pending,
            assigned_to: None,
            assigned_role: baseline,
            escalation: None,
            resolution: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn kind(&self) -> ItemKind {
        self.subject.kind()
    }

    pub fn is_system_generated(&self) -> bool {
        self.originator_id.is_none()
    }

    pub fn is_claimed_by(&self, actor_id: &str) -> bool {
        self.assigned_to.as_deref() == Some(actor_id)
    }

    /// Snapshot of the fields every conditional write is guarded on
    pub fn observed(&self) -> crate::store::ExpectedState {
        crate::store::ExpectedState {
            status: self.status,
            assigned_to: self.assigned_to.clone(),
            assigned_role: self.assigned_role,
        }
    }
}

/// One audit row per successful escalation. Written once, never changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationHistoryEntry {
    pub id: String,
    pub item_id: ItemId,
    pub from_role: RoleTier,
    pub to_role: RoleTier,
    pub escalated_by: ActorId,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl EscalationHistoryEntry {
    pub fn new(
        item_id: ItemId,
        from_role: RoleTier,
        to_role: RoleTier,
        escalated_by: ActorId,
        reason: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            item_id,
            from_role,
            to_role,
            escalated_by,
            reason,
            created_at,
        }
    }
}

/// Which statuses a listing should include
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    /// Every item, terminal or not
    #[default]
    All,
    /// pending, reviewing, escalated
    Open,
    /// Any resolved_* status
    Resolved,
    /// Exactly these statuses
    Only(Vec<ItemStatus>),
}

impl StatusFilter {
    pub fn matches(&self, status: ItemStatus) -> bool {
        match self {
            Self::All => true,
            Self::Open => !status.is_terminal(),
            Self::Resolved => status.is_terminal(),
            Self::Only(set) => set.contains(&status),
        }
    }

    /// Concrete status set, for backends that filter server-side
    pub fn statuses(&self) -> Vec<ItemStatus> {
        ItemStatus::all()
            .iter()
            .copied()
            .filter(|s| self.matches(*s))
            .collect()
    }
}

impl From<ItemStatus> for StatusFilter {
    fn from(status: ItemStatus) -> Self {
        Self::Only(vec![status])
    }
}
