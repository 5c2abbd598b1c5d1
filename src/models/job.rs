use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a batch upload job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// One tracked batch-upload request and its aggregate progress.
///
/// Jobs are operational artifacts, not permanent records: terminal jobs are
/// swept out after a retention horizon. `errors` holds per-file messages;
/// a populated list does not prevent the job from reaching `Completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadJob {
    pub id: Uuid,
    pub submitter_id: String,
    pub collection_id: Uuid,
    pub total_items: usize,
    pub processed_items: usize,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub errors: Vec<String>,
}

impl UploadJob {
    pub fn new(submitter_id: impl Into<String>, collection_id: Uuid, total_items: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            submitter_id: submitter_id.into(),
            collection_id,
            total_items,
            processed_items: 0,
            status: JobStatus::Queued,
            started_at: Utc::now(),
            finished_at: None,
            errors: Vec::new(),
        }
    }
}

/// Response after submitting a batch for ingestion.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: Uuid,
    pub status: String,
    pub total_items: usize,
}

/// Response for listing a submitter's jobs.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobListResponse {
    pub jobs: Vec<UploadJob>,
}
