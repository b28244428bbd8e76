//! Identity collaborator — who is acting, at what tier
//!
//! The engines never trust a role supplied by the caller. The façade resolves
//! the acting user's tier through [`Identity`] on every request and threads
//! the resulting [`Actor`] through each call explicitly.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IdentityError;
use crate::item::ActorId;
use crate::roles::{RoleHierarchy, RoleTier};

/// A resolved caller: id plus current authority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub role: RoleTier,
}

impl Actor {
    pub fn new(id: impl Into<ActorId>, role: RoleTier) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
}

/// User directory lookup
#[async_trait]
pub trait Identity: Send + Sync {
    /// Current tier of `actor_id`; `None` when the account holds no
    /// moderator authority (or does not exist).
    async fn role_of(&self, actor_id: &str) -> Result<Option<RoleTier>, IdentityError>;
}

/// Directory keyed by raw account level, the way user profiles store it.
///
/// Levels are mapped to tiers through the configured [`RoleHierarchy`], so
/// moving a threshold in config re-tiers every account without touching
/// stored profiles.
pub struct LevelDirectory {
    hierarchy: Arc<RoleHierarchy>,
    levels: RwLock<HashMap<ActorId, u32>>,
}

impl LevelDirectory {
    pub fn new(hierarchy: Arc<RoleHierarchy>) -> Self {
        Self {
            hierarchy,
            levels: RwLock::new(HashMap::new()),
        }
    }

    /// Builder-style seeding
    pub fn with_level(self, actor_id: impl Into<ActorId>, level: u32) -> Self {
        self.set_level(actor_id, level);
        self
    }

    pub fn set_level(&self, actor_id: impl Into<ActorId>, level: u32) {
        if let Ok(mut levels) = self.levels.write() {
            levels.insert(actor_id.into(), level);
        }
    }

    pub fn remove(&self, actor_id: &str) {
        if let Ok(mut levels) = self.levels.write() {
            levels.remove(actor_id);
        }
    }
}

#[async_trait]
impl Identity for LevelDirectory {
    async fn role_of(&self, actor_id: &str) -> Result<Option<RoleTier>, IdentityError> {
        let levels = self
            .levels
            .read()
            .map_err(|_| IdentityError::Lookup("directory lock poisoned".to_string()))?;
        Ok(levels
            .get(actor_id)
            .and_then(|level| self.hierarchy.tier_for_level(*level)))
    }
}
