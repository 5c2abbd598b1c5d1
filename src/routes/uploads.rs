use axum::extract::{Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::job::{JobListResponse, SubmitResponse};
use crate::services::jobs::UploadFile;

/// Batch metadata carried alongside the files.
#[derive(Debug, Validate)]
pub struct UploadMeta {
    #[garde(length(min = 1, max = 64))]
    pub submitter_id: String,

    #[garde(skip)]
    pub collection_id: Uuid,
}

/// Submitter identity, as set by the auth proxy in front of this service.
pub fn submitter_from_headers(headers: &HeaderMap) -> Result<String, StatusCode> {
    headers
        .get("x-submitter-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or(StatusCode::BAD_REQUEST)
}

/// POST /api/v1/uploads — accept a batch of photos for background ingestion.
///
/// Returns 202 with the job id as soon as the batch is registered; callers
/// poll `/api/v1/upload-jobs` for progress.
pub async fn submit_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SubmitResponse>), StatusCode> {
    let submitter_id = submitter_from_headers(&headers)?;

    let mut files: Vec<UploadFile> = Vec::new();
    let mut collection_id: Option<Uuid> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        match field.name() {
            Some("collection_id") => {
                let text = field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                collection_id = Some(text.parse().map_err(|_| StatusCode::BAD_REQUEST)?);
            }
            Some("files") => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| "photo".to_string());
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                let data = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;

                // Reject non-image payloads at the door; processing errors
                // deeper in the pipeline are recorded per file instead.
                image::guess_format(&data).map_err(|_| StatusCode::UNSUPPORTED_MEDIA_TYPE)?;

                files.push(UploadFile {
                    filename,
                    content_type,
                    bytes: data.to_vec(),
                });
            }
            _ => {}
        }
    }

    let collection_id = collection_id.ok_or(StatusCode::BAD_REQUEST)?;
    if files.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let meta = UploadMeta {
        submitter_id,
        collection_id,
    };
    meta.validate().map_err(|_| StatusCode::BAD_REQUEST)?;

    let total_items = files.len();
    let job_id = state
        .manager
        .submit_batch(files, meta.collection_id, &meta.submitter_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to register upload job");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id,
            status: "queued".to_string(),
            total_items,
        }),
    ))
}

/// GET /api/v1/upload-jobs — the calling submitter's jobs, newest first.
pub async fn list_jobs(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<JobListResponse>, StatusCode> {
    let submitter_id = submitter_from_headers(&headers)?;

    let jobs = state
        .manager
        .list_jobs(&submitter_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to list upload jobs");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(JobListResponse { jobs }))
}

/// GET /api/v1/upload-jobs/:job_id — progress of one job.
pub async fn get_job(
    State(state): State<AppState>,
    axum::extract::Path(job_id): axum::extract::Path<Uuid>,
) -> Result<Json<crate::models::job::UploadJob>, StatusCode> {
    let job = state
        .manager
        .get_job(job_id)
        .await
        .map_err(|e| {
            tracing::error!(job_id = %job_id, error = %e, "Failed to load upload job");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(job))
}
