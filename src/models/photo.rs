use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Durable record of one ingested photo.
///
/// `thumbnail_key` is null when thumbnail derivation failed; the original
/// is still searchable and servable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoRecord {
    pub id: Uuid,
    pub collection_id: Uuid,
    pub submitter_id: String,
    pub storage_key: String,
    pub thumbnail_key: Option<String>,
    pub content_type: String,
    pub size_bytes: i64,
    pub uploaded_at: DateTime<Utc>,
}
