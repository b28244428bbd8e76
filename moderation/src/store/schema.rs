//! Column family definitions for the RocksDB store
//!
//! An item and its escalation history live in one record under one key, so
//! a single `put` commits both.

use serde::{Deserialize, Serialize};

use crate::item::{EscalationHistoryEntry, ModerationItem};

/// Column family for moderation records
pub const CF_ITEMS: &str = "items";

/// All column family names
pub const ALL_CFS: &[&str] = &[CF_ITEMS];

/// On-disk value: the item plus its audit rows, oldest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub item: ModerationItem,
    #[serde(default)]
    pub history: Vec<EscalationHistoryEntry>,
}

/// Key prefixes for compound keys
pub mod keys {
    /// Prefix shared by every item key
    pub const ITEM_PREFIX: &str = "item:";

    /// Create an item key
    pub fn item(item_id: &str) -> String {
        format!("item:{}", item_id)
    }
}
