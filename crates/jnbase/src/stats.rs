use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time statistics of a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Number of collections in the document
    pub collections:       usize,
    /// Total number of records across all collections
    pub records:           usize,
    /// Number of successful atomic replaces of the backing file since the store was opened
    pub persist_count:     u64,
    /// When the backing file was last replaced, if ever during this process
    pub last_persisted_at: Option<DateTime<Utc>>,
}
