use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Admission priority of a recognition work item.
///
/// Bulk ingestion enqueues at `Low`; interactive work (e.g. a guest's
/// single-photo face search) enqueues at `Normal` and is considered for
/// admission first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
}

/// One unit of recognition work derived from a stored photo.
///
/// Ownership transfers to the processing queue at enqueue time; the
/// submitting side never mutates an item after handoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub item_id: Uuid,
    pub submitter_id: String,
    pub photo_id: Uuid,
    pub storage_key: String,
    pub priority: Priority,
    pub enqueued_at: DateTime<Utc>,
}

impl QueueItem {
    pub fn new(
        submitter_id: impl Into<String>,
        photo_id: Uuid,
        storage_key: impl Into<String>,
        priority: Priority,
    ) -> Self {
        Self {
            item_id: Uuid::new_v4(),
            submitter_id: submitter_id.into(),
            photo_id,
            storage_key: storage_key.into(),
            priority,
            enqueued_at: Utc::now(),
        }
    }
}

/// Global queue snapshot, recomputed from live state on every read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatus {
    pub queue_size: usize,
    pub active_processing: usize,
    pub max_concurrent: usize,
    pub user_concurrency_limit: usize,
    pub active_users: usize,
    pub processed_count: u64,
    pub error_count: u64,
    pub avg_processing_ms: u64,
    pub throughput_per_minute: f64,
    pub uptime_secs: u64,
}

/// Queue snapshot scoped to one submitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserQueueStatus {
    pub queued_items: usize,
    pub processing_items: usize,
    pub max_allowed: usize,
    /// 1-based rank of this submitter's earliest queued item among all
    /// queued items, or `None` if nothing is queued.
    pub position: Option<usize>,
}
