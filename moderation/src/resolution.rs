//! Resolution Engine — terminal transitions and post side effects
//!
//! The decision is recorded first, as one guarded write. The post change is
//! dispatched afterwards; if the posts sink fails, the item stays resolved
//! and the failure comes back in [`Resolution::post_action`].

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{ModerationError, ModerationResult};
use crate::identity::Actor;
use crate::item::{Disposition, ModerationItem, ResolutionMark};
use crate::policy::{self, ModerationAction};
use crate::posts::{PostAction, PostsModeration};
use crate::roles::RoleHierarchy;
use crate::store::SharedStore;

/// Longest accepted resolution note, in characters
pub const MAX_NOTES_CHARS: usize = 4000;

/// Outcome of a successful resolve
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub item: ModerationItem,
    pub post_action: PostAction,
}

pub struct ResolutionEngine {
    store: SharedStore,
    hierarchy: Arc<RoleHierarchy>,
    posts: Arc<dyn PostsModeration>,
}

impl ResolutionEngine {
    pub fn new(
        store: SharedStore,
        hierarchy: Arc<RoleHierarchy>,
        posts: Arc<dyn PostsModeration>,
    ) -> Self {
        Self {
            store,
            hierarchy,
            posts,
        }
    }

    /// Close `item_id` with `disposition`.
    ///
    /// Pending and escalated items may be resolved by any actor at or above
    /// the item's tier; a reviewing item only by its claimant.
    pub async fn resolve(
        &self,
        item_id: &str,
        actor: &Actor,
        disposition: Disposition,
        notes: &str,
    ) -> ModerationResult<Resolution> {
        let item = self
            .store
            .get_by_id(item_id)
            .await?
            .ok_or_else(|| ModerationError::not_found(item_id))?;

        policy::ensure_live(&item)?;

        let notes = notes.trim();
        if notes.is_empty() {
            return Err(ModerationError::validation("resolution notes are required"));
        }
        if notes.chars().count() > MAX_NOTES_CHARS {
            return Err(ModerationError::validation(format!(
                "resolution notes exceed {} characters",
                MAX_NOTES_CHARS
            )));
        }

        if let Err(e) = policy::authorize(&self.hierarchy, actor, &item, ModerationAction::Resolve)
        {
            warn!(item_id, actor = %actor.id, role = %actor.role, "Resolution refused");
            return Err(e);
        }

        let now = Utc::now();
        let mut next = item.clone();
        next.status = disposition.terminal_status();
        next.resolution = Some(ResolutionMark {
            resolved_by: actor.id.clone(),
            notes: notes.to_string(),
            resolved_at: now,
        });
        next.updated_at = now;

        let affected = self
            .store
            .cas_update(item_id, &item.observed(), &next)
            .await?;

        if affected == 0 {
            warn!(item_id, actor = %actor.id, "Resolution lost race");
            return Err(ModerationError::conflict(
                item_id,
                "item changed while resolving; refetch",
            ));
        }

        info!(
            item_id,
            actor = %actor.id,
            from = %item.status,
            to = %next.status,
            "Item resolved"
        );

        let post_action = self.dispatch(&next, disposition, actor, notes).await;
        Ok(Resolution {
            item: next,
            post_action,
        })
    }

    async fn dispatch(
        &self,
        item: &ModerationItem,
        disposition: Disposition,
        actor: &Actor,
        notes: &str,
    ) -> PostAction {
        let Some(post_id) = item.subject.post_id() else {
            return PostAction::None;
        };
        let at = item.updated_at;

        let post = post_id.to_string();
        let (result, done) = match disposition {
            Disposition::Dismissed => return PostAction::None,
            Disposition::Removed => (
                self.posts.mark_removed(post_id, notes, &actor.id, at).await,
                PostAction::Removed { post_id: post },
            ),
            Disposition::Flagged => (
                self.posts.mark_sensitive(post_id, &actor.id, at).await,
                PostAction::MarkedSensitive { post_id: post },
            ),
        };

        match result {
            Ok(()) => done,
            Err(e) => {
                warn!(
                    item_id = %item.id,
                    post_id,
                    disposition = %disposition,
                    error = %e,
                    "Post update failed; resolution kept"
                );
                PostAction::Failed {
                    post_id: post_id.to_string(),
                    message: e.to_string(),
                }
            }
        }
    }
}
