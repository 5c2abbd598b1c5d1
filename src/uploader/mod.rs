//! Client-side batch uploader with adaptive pacing.
//!
//! Decides how many files to transmit concurrently from the batch's own
//! characteristics, then runs a bounded pool of upload workers over a shared
//! pending list. Progress (counts plus throughput) is reported to a caller
//! supplied callback after every per-file state change.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::multipart;
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

const MIN_CONCURRENCY: usize = 4;
const MAX_CONCURRENCY: usize = 16;

/// One file queued for upload on the client side.
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Per-file upload state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Pending,
    Uploading,
    Completed,
    Error,
}

#[derive(Debug, Clone)]
struct FileProgress {
    filename: String,
    state: FileState,
    error: Option<String>,
}

/// Aggregate progress snapshot handed to the progress callback.
#[derive(Debug, Clone)]
pub struct UploadProgress {
    pub total: usize,
    pub completed: usize,
    pub uploading: usize,
    pub pending: usize,
    pub errors: usize,
    /// Completed files per second since the batch started.
    pub throughput_per_sec: f64,
}

/// Outcome of a finished batch.
#[derive(Debug)]
pub struct BatchSummary {
    pub total: usize,
    pub completed: usize,
    pub errors: Vec<String>,
    pub job_ids: Vec<Uuid>,
    pub elapsed_secs: f64,
}

/// Choose the upload concurrency for a batch before any network call.
///
/// Larger batches and larger average file sizes lower the limit so neither
/// the network nor the server ingestion path is flooded; the result is
/// always within 4..=16.
pub fn plan_concurrency(file_count: usize, total_bytes: u64) -> usize {
    let mut limit = MAX_CONCURRENCY;

    if file_count > 500 {
        limit /= 4;
    } else if file_count > 100 {
        limit /= 2;
    }

    let avg_bytes = total_bytes / file_count.max(1) as u64;
    if avg_bytes > 8 * 1024 * 1024 {
        limit /= 2;
    } else if avg_bytes > 2 * 1024 * 1024 {
        limit = limit * 3 / 4;
    }

    limit.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY)
}

/// Transport used to send one file to the ingestion endpoint.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn send(&self, file: &LocalFile, collection_id: Uuid) -> Result<Uuid, UploadError>;
}

#[derive(Deserialize)]
struct SubmitResponse {
    job_id: Uuid,
}

/// HTTP transport posting one file per request to `POST /api/v1/uploads`.
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    submitter_id: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, submitter_id: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            submitter_id: submitter_id.into(),
        }
    }
}

#[async_trait]
impl UploadTransport for HttpTransport {
    async fn send(&self, file: &LocalFile, collection_id: Uuid) -> Result<Uuid, UploadError> {
        let part = multipart::Part::bytes(file.bytes.clone())
            .file_name(file.filename.clone())
            .mime_str(&file.content_type)
            .map_err(UploadError::Http)?;

        let form = multipart::Form::new()
            .part("files", part)
            .text("collection_id", collection_id.to_string());

        let response = self
            .http
            .post(format!("{}/api/v1/uploads", self.base_url))
            .header("X-Submitter-Id", &self.submitter_id)
            .multipart(form)
            .send()
            .await
            .map_err(UploadError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::Rejected(format!("{status}: {body}")));
        }

        let parsed: SubmitResponse = response.json().await.map_err(UploadError::Http)?;
        Ok(parsed.job_id)
    }
}

struct UploaderState {
    files: Vec<FileProgress>,
    job_ids: Vec<Uuid>,
}

/// Adaptive batch uploader: a fixed pool of workers drains the pending
/// list, each immediately pulling the next file when one finishes. A failed
/// upload is recorded and never halts the rest of the batch.
pub struct BatchUploader {
    transport: Arc<dyn UploadTransport>,
}

impl BatchUploader {
    pub fn new(transport: Arc<dyn UploadTransport>) -> Self {
        Self { transport }
    }

    pub async fn upload_batch(
        &self,
        files: Vec<LocalFile>,
        collection_id: Uuid,
        on_progress: impl Fn(&UploadProgress) + Send + 'static,
    ) -> BatchSummary {
        let total = files.len();
        let total_bytes: u64 = files.iter().map(|f| f.bytes.len() as u64).sum();
        let concurrency = plan_concurrency(total, total_bytes).min(total.max(1));

        tracing::info!(
            total,
            total_bytes,
            concurrency,
            "Starting batch upload"
        );

        let state = Arc::new(Mutex::new(UploaderState {
            files: files
                .iter()
                .map(|f| FileProgress {
                    filename: f.filename.clone(),
                    state: FileState::Pending,
                    error: None,
                })
                .collect(),
            job_ids: Vec::new(),
        }));
        let pending: Arc<Mutex<VecDeque<(usize, LocalFile)>>> =
            Arc::new(Mutex::new(files.into_iter().enumerate().collect()));
        let started = Instant::now();

        // Snapshots are queued under the state lock and delivered by this
        // task, so a slow progress consumer never stalls an upload worker.
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<UploadProgress>();
        let reporter = tokio::spawn(async move {
            while let Some(snapshot) = progress_rx.recv().await {
                on_progress(&snapshot);
            }
        });

        let workers: Vec<_> = (0..concurrency)
            .map(|_| {
                let transport = Arc::clone(&self.transport);
                let state = Arc::clone(&state);
                let pending = Arc::clone(&pending);
                let progress_tx = progress_tx.clone();

                tokio::spawn(async move {
                    loop {
                        let next = lock(&pending).pop_front();
                        let Some((idx, file)) = next else {
                            return;
                        };

                        set_state(&state, idx, FileState::Uploading, None, None);
                        report(&state, total, started, &progress_tx);

                        match transport.send(&file, collection_id).await {
                            Ok(job_id) => {
                                set_state(&state, idx, FileState::Completed, None, Some(job_id));
                            }
                            Err(e) => {
                                tracing::warn!(
                                    filename = %file.filename,
                                    error = %e,
                                    "File upload failed"
                                );
                                set_state(&state, idx, FileState::Error, Some(e.to_string()), None);
                            }
                        }
                        report(&state, total, started, &progress_tx);
                    }
                })
            })
            .collect();
        drop(progress_tx);
        join_all(workers).await;
        // Every queued snapshot is delivered before the summary is built.
        let _ = reporter.await;

        let state = lock(&state);
        let completed = state
            .files
            .iter()
            .filter(|f| f.state == FileState::Completed)
            .count();
        let errors = state
            .files
            .iter()
            .filter_map(|f| {
                f.error
                    .as_ref()
                    .map(|e| format!("{}: {e}", f.filename))
            })
            .collect();

        BatchSummary {
            total,
            completed,
            errors,
            job_ids: state.job_ids.clone(),
            elapsed_secs: started.elapsed().as_secs_f64(),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn set_state(
    state: &Mutex<UploaderState>,
    idx: usize,
    new_state: FileState,
    error: Option<String>,
    job_id: Option<Uuid>,
) {
    let mut guard = lock(state);
    guard.files[idx].state = new_state;
    guard.files[idx].error = error;
    if let Some(id) = job_id {
        guard.job_ids.push(id);
    }
}

fn report(
    state: &Mutex<UploaderState>,
    total: usize,
    started: Instant,
    progress_tx: &mpsc::UnboundedSender<UploadProgress>,
) {
    // Taken and queued while the state lock is held, so the reporter task
    // receives snapshots in the order the state changed.
    let guard = lock(state);
    let count = |s: FileState| guard.files.iter().filter(|f| f.state == s).count();
    let completed = count(FileState::Completed);
    let elapsed = started.elapsed().as_secs_f64();
    let snapshot = UploadProgress {
        total,
        completed,
        uploading: count(FileState::Uploading),
        pending: count(FileState::Pending),
        errors: count(FileState::Error),
        throughput_per_sec: if elapsed > 0.0 {
            completed as f64 / elapsed
        } else {
            0.0
        },
    };
    let _ = progress_tx.send(snapshot);
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upload rejected: {0}")]
    Rejected(String),
}
