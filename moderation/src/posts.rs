//! Posts collaborator — where resolutions take effect

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PostsError;

/// Sink for post-level moderation side effects
#[async_trait]
pub trait PostsModeration: Send + Sync {
    /// Soft takedown: the post stays in storage with a removed status
    async fn mark_removed(
        &self,
        post_id: &str,
        reason: &str,
        actor_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), PostsError>;

    /// Hide behind a sensitive-content interstitial
    async fn mark_sensitive(
        &self,
        post_id: &str,
        actor_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), PostsError>;
}

/// What happened to the referenced post after a resolution was recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PostAction {
    Removed {
        post_id: String,
    },
    MarkedSensitive {
        post_id: String,
    },
    /// Dismissal, or an item with no post to act on
    None,
    /// The resolution stands; the post change needs a manual retry
    Failed {
        post_id: String,
        message: String,
    },
}

impl PostAction {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}
