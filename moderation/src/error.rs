//! Error types for the moderation engine
//!
//! Each collaborator seam has its own error enum. Engine operations return
//! [`ModerationError`], whose variants map one-to-one onto the caller-facing
//! [`ErrorKind`] taxonomy used by the service façade.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for engine operations
pub type ModerationResult<T> = Result<T, ModerationError>;

/// Errors raised by persistence backends
#[derive(Debug, Error)]
pub enum StoreError {
    #[cfg(feature = "rocksdb-store")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    #[cfg(feature = "postgres")]
    #[error("Postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Duplicate key: {0}")]
    Duplicate(String),

    #[error("Corrupt record {id}: {message}")]
    Corrupt { id: String, message: String },

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("Column family not found: {0}")]
    ColumnFamilyNotFound(String),
}

/// Errors from the user directory
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Identity lookup failed: {0}")]
    Lookup(String),
}

/// Errors from the posts collaborator
#[derive(Debug, Error)]
pub enum PostsError {
    #[error("Post not found: {0}")]
    PostNotFound(String),

    #[error("Posts update failed: {0}")]
    UpdateFailed(String),
}

/// Caller-facing error discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    ValidationError,
    Conflict,
    InvalidState,
    Internal,
}

impl ErrorKind {
    /// Conflicts and storage hiccups may succeed on a fresh attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict | Self::Internal)
    }

    /// What the caller should do next
    pub fn recovery_action(&self) -> &'static str {
        match self {
            Self::NotFound => "Refresh the queue; the item id is unknown.",
            Self::Unauthorized => {
                "Ask a moderator with the required tier, or the current claimant, to act."
            }
            Self::ValidationError => "Correct the highlighted input and submit again.",
            Self::Conflict => "Refetch the item; it changed since it was last read.",
            Self::InvalidState => "The item's workflow does not allow this action any more.",
            Self::Internal => "Try again shortly.",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotFound => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::ValidationError => "validation_error",
            Self::Conflict => "conflict",
            Self::InvalidState => "invalid_state",
            Self::Internal => "internal",
        };
        write!(f, "{}", s)
    }
}

/// Errors produced by claim, escalation and resolution
#[derive(Debug, Error)]
pub enum ModerationError {
    /// Item id unknown
    #[error("Moderation item not found: {item_id}")]
    NotFound { item_id: String },

    /// Actor lacks the tier, or does not hold the claim
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// Bad input (reason, notes, target tier)
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Conditional write matched zero rows
    #[error("Conflict on item {item_id}: {message}")]
    Conflict { item_id: String, message: String },

    /// Transition not permitted from the item's current status
    #[error("Invalid state for item {item_id}: {message}")]
    InvalidState { item_id: String, message: String },

    /// Storage failure
    #[error("Storage error: {0}")]
    Internal(#[from] StoreError),

    /// User directory failure
    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),
}

impl ModerationError {
    pub fn not_found(item_id: impl Into<String>) -> Self {
        Self::NotFound {
            item_id: item_id.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn conflict(item_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            item_id: item_id.into(),
            message: message.into(),
        }
    }

    pub fn invalid_state(item_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidState {
            item_id: item_id.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::Validation { .. } => ErrorKind::ValidationError,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::Internal(_) | Self::Identity(_) => ErrorKind::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}
