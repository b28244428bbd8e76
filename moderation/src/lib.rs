//! Moderation Escalation Engine
//!
//! This library provides:
//! - A tiered moderator hierarchy with configurable level thresholds
//! - Single-owner claims on flags and reports, enforced by conditional writes
//! - Audited escalation to a higher tier, with an append-only history
//! - Terminal resolution that drives soft takedown or sensitive marking of
//!   the referenced post
//!
//! # Workflow
//!
//! ```text
//!              claim                  resolve
//!   pending ──────────▶ reviewing ──────────────▶ resolved_removed
//!      │                  │    ▲                   resolved_flagged
//!      │ escalate         │    │ claim             resolved_dismissed
//!      ▼                  ▼    │                         ▲
//!   escalated ◀───────────┘────┘                         │
//!      └─────────────────────────── resolve ─────────────┘
//! ```
//!
//! Resolved states are terminal. Every mutation is a compare-and-swap on the
//! item's `(status, assigned_to, assigned_role)`; a write that matches
//! nothing is a `Conflict`, never a silent success.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use moderation::{config, LevelDirectory, ModerationConfig, ModerationService, PostsModeration};
//!
//! # async fn run(posts: Arc<dyn PostsModeration>) -> anyhow::Result<()> {
//! let config = ModerationConfig::from_env()?;
//! let store = config::open_store(&config.store).await?;
//! let directory = Arc::new(LevelDirectory::new(Arc::new(config.hierarchy()?)));
//! let service = ModerationService::from_config(&config, store, directory, posts)?;
//!
//! let result = service.claim("mod-17", "item-id").await;
//! println!("{}", serde_json::to_string(&result)?);
//! # Ok(())
//! # }
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod claim;
pub mod config;
pub mod error;
pub mod escalation;
pub mod identity;
pub mod intake;
pub mod item;
pub mod policy;
pub mod posts;
pub mod resolution;
pub mod roles;
pub mod service;
pub mod store;

// Re-export key types
pub use claim::ClaimCoordinator;
pub use config::{ModerationConfig, StoreConfig};
pub use error::{
    ErrorKind, IdentityError, ModerationError, ModerationResult, PostsError, StoreError,
    StoreResult,
};
pub use escalation::EscalationEngine;
pub use identity::{Actor, Identity, LevelDirectory};
pub use intake::{BaselinePolicy, Intake};
pub use item::{
    ActorId, Disposition, EscalationHistoryEntry, EscalationMark, ItemId, ItemKind, ItemStatus,
    ModerationItem, ReasonCode, ResolutionMark, StatusFilter, Subject,
};
pub use policy::ModerationAction;
pub use posts::{PostAction, PostsModeration};
pub use resolution::{Resolution, ResolutionEngine};
pub use roles::{RoleHierarchy, RoleLevels, RoleTier};
pub use service::{
    ActionError, ActionResult, EscalationTargets, History, ItemList, ItemOutcome,
    ModerationService, QueueSummary,
};
pub use store::{ExpectedState, MemoryStore, ModerationStore, SharedStore};
