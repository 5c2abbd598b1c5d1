use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::db::queries::PhotoCatalog;
use crate::models::job::{JobStatus, UploadJob};
use crate::models::photo::PhotoRecord;
use crate::models::queue::{Priority, QueueItem};
use crate::services::queue::RecognitionQueue;
use crate::services::storage::ContentStore;
use crate::services::thumbnail;

/// One file of a submitted batch, already read off the wire.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Store for job progress records.
///
/// Jobs are short-lived operational state, so the default implementation is
/// a process-local map; the trait keeps the manager's logic independent of
/// where that state lives.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: UploadJob) -> anyhow::Result<()>;
    async fn get(&self, id: Uuid) -> anyhow::Result<Option<UploadJob>>;
    /// All jobs for one submitter, most recent first.
    async fn list_for_submitter(&self, submitter_id: &str) -> anyhow::Result<Vec<UploadJob>>;
    async fn mark_processing(&self, id: Uuid) -> anyhow::Result<()>;
    /// Count one attempted file, with an optional per-file error message.
    async fn record_item(&self, id: Uuid, error: Option<String>) -> anyhow::Result<()>;
    async fn mark_completed(&self, id: Uuid) -> anyhow::Result<()>;
    async fn mark_failed(&self, id: Uuid, message: &str) -> anyhow::Result<()>;
    /// Drop terminal jobs whose `finished_at` predates the cutoff.
    async fn purge_finished_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<usize>;
}

/// Mutex-guarded in-memory job store.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<Uuid, UploadJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, UploadJob>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: UploadJob) -> anyhow::Result<()> {
        self.lock().insert(job.id, job);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<UploadJob>> {
        Ok(self.lock().get(&id).cloned())
    }

    async fn list_for_submitter(&self, submitter_id: &str) -> anyhow::Result<Vec<UploadJob>> {
        let mut jobs: Vec<UploadJob> = self
            .lock()
            .values()
            .filter(|j| j.submitter_id == submitter_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(jobs)
    }

    async fn mark_processing(&self, id: Uuid) -> anyhow::Result<()> {
        if let Some(job) = self.lock().get_mut(&id) {
            if job.status == JobStatus::Queued {
                job.status = JobStatus::Processing;
            }
        }
        Ok(())
    }

    async fn record_item(&self, id: Uuid, error: Option<String>) -> anyhow::Result<()> {
        if let Some(job) = self.lock().get_mut(&id) {
            if job.processed_items < job.total_items {
                job.processed_items += 1;
            }
            if let Some(message) = error {
                job.errors.push(message);
            }
        }
        Ok(())
    }

    async fn mark_completed(&self, id: Uuid) -> anyhow::Result<()> {
        if let Some(job) = self.lock().get_mut(&id) {
            if !job.status.is_terminal() {
                job.status = JobStatus::Completed;
                job.finished_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, message: &str) -> anyhow::Result<()> {
        if let Some(job) = self.lock().get_mut(&id) {
            job.status = JobStatus::Failed;
            job.finished_at = Some(Utc::now());
            job.errors.push(message.to_string());
        }
        Ok(())
    }

    async fn purge_finished_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<usize> {
        let mut jobs = self.lock();
        let before = jobs.len();
        jobs.retain(|_, job| {
            !(job.status.is_terminal() && job.finished_at.is_some_and(|t| t < cutoff))
        });
        Ok(before - jobs.len())
    }
}

/// Tunables for the job manager.
#[derive(Debug, Clone, Copy)]
pub struct ManagerConfig {
    /// Files ingested concurrently within one sub-batch.
    pub chunk_size: usize,
    /// Bounding box for derived thumbnails, in pixels.
    pub thumbnail_max_px: u32,
    /// How long terminal jobs are kept before the sweep removes them.
    pub retention: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 20,
            thumbnail_max_px: 512,
            retention: Duration::from_secs(3600),
        }
    }
}

/// Turns one client-submitted batch into a tracked job and drives it to a
/// terminal state in the background.
///
/// One failing file never aborts the batch: its error is appended to the
/// job and ingestion moves on. Only an error outside the per-file scope
/// (store bookkeeping, collection accounting) marks the job `Failed`.
pub struct UploadJobManager {
    store: Arc<dyn JobStore>,
    content: Arc<dyn ContentStore>,
    catalog: Arc<dyn PhotoCatalog>,
    queue: Arc<RecognitionQueue>,
    config: ManagerConfig,
}

impl UploadJobManager {
    pub fn new(
        store: Arc<dyn JobStore>,
        content: Arc<dyn ContentStore>,
        catalog: Arc<dyn PhotoCatalog>,
        queue: Arc<RecognitionQueue>,
        config: ManagerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            content,
            catalog,
            queue,
            config,
        })
    }

    /// Register the batch and return its job id immediately; all file work
    /// happens in a background task.
    pub async fn submit_batch(
        self: &Arc<Self>,
        files: Vec<UploadFile>,
        collection_id: Uuid,
        submitter_id: &str,
    ) -> anyhow::Result<Uuid> {
        let job = UploadJob::new(submitter_id, collection_id, files.len());
        let job_id = job.id;
        self.store.insert(job).await?;

        metrics::counter!("upload_jobs_total").increment(1);
        tracing::info!(
            job_id = %job_id,
            collection_id = %collection_id,
            submitter = %submitter_id,
            total_items = files.len(),
            "Batch accepted"
        );

        let manager = Arc::clone(self);
        let submitter = submitter_id.to_string();
        tokio::spawn(async move {
            manager.run_batch(job_id, files, collection_id, submitter).await;
        });

        Ok(job_id)
    }

    pub async fn get_job(&self, id: Uuid) -> anyhow::Result<Option<UploadJob>> {
        self.store.get(id).await
    }

    pub async fn list_jobs(&self, submitter_id: &str) -> anyhow::Result<Vec<UploadJob>> {
        self.store.list_for_submitter(submitter_id).await
    }

    /// Periodically purge terminal jobs past the retention horizon.
    pub fn spawn_retention_sweep(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let cutoff = Utc::now()
                    - chrono::Duration::from_std(manager.config.retention)
                        .unwrap_or_else(|_| chrono::Duration::hours(1));
                match manager.store.purge_finished_before(cutoff).await {
                    Ok(0) => {}
                    Ok(purged) => tracing::debug!(purged, "Swept finished upload jobs"),
                    Err(e) => tracing::warn!(error = %e, "Job retention sweep failed"),
                }
            }
        })
    }

    async fn run_batch(
        &self,
        job_id: Uuid,
        files: Vec<UploadFile>,
        collection_id: Uuid,
        submitter: String,
    ) {
        match self
            .run_batch_inner(job_id, files, collection_id, &submitter)
            .await
        {
            Ok(successes) => {
                metrics::counter!("upload_jobs_completed").increment(1);
                tracing::info!(job_id = %job_id, successes, "Batch completed");
            }
            Err(e) => {
                metrics::counter!("upload_jobs_failed").increment(1);
                tracing::error!(job_id = %job_id, error = %format!("{e:#}"), "Batch failed");
                if let Err(store_err) = self.store.mark_failed(job_id, &format!("{e:#}")).await {
                    tracing::error!(
                        job_id = %job_id,
                        error = %store_err,
                        "Could not record batch failure"
                    );
                }
            }
        }
    }

    /// Process every file in fixed-size sub-batches: chunks run
    /// sequentially, files within a chunk concurrently. Returns the number
    /// of successfully ingested files.
    async fn run_batch_inner(
        &self,
        job_id: Uuid,
        mut files: Vec<UploadFile>,
        collection_id: Uuid,
        submitter: &str,
    ) -> anyhow::Result<usize> {
        self.store.mark_processing(job_id).await?;

        let mut successes = 0usize;
        while !files.is_empty() {
            let take = self.config.chunk_size.min(files.len());
            let chunk: Vec<UploadFile> = files.drain(..take).collect();

            let results = join_all(
                chunk
                    .into_iter()
                    .map(|file| self.ingest_one(job_id, collection_id, submitter, file)),
            )
            .await;

            for outcome in results {
                if outcome? {
                    successes += 1;
                }
            }
        }

        if successes > 0 {
            self.catalog
                .add_to_collection_count(collection_id, successes as i64)
                .await?;
        }
        self.store.mark_completed(job_id).await?;
        Ok(successes)
    }

    /// Ingest one file and record the attempt on the job. `Ok(true)` means
    /// the photo was fully ingested, `Ok(false)` that its error was
    /// recorded; `Err` is reserved for job-store failures, which are fatal
    /// to the batch.
    async fn ingest_one(
        &self,
        job_id: Uuid,
        collection_id: Uuid,
        submitter: &str,
        file: UploadFile,
    ) -> anyhow::Result<bool> {
        let filename = file.filename.clone();
        match self.ingest_file(collection_id, submitter, file).await {
            Ok(photo_id) => {
                metrics::counter!("photos_processed_total").increment(1);
                tracing::debug!(job_id = %job_id, photo_id = %photo_id, "Photo ingested");
                self.store.record_item(job_id, None).await?;
                Ok(true)
            }
            Err(e) => {
                metrics::counter!("photos_failed_total").increment(1);
                tracing::warn!(
                    job_id = %job_id,
                    filename = %filename,
                    error = %format!("{e:#}"),
                    "File ingestion failed"
                );
                self.store
                    .record_item(job_id, Some(format!("{filename}: {e:#}")))
                    .await?;
                Ok(false)
            }
        }
    }

    /// Store the original, derive a best-effort thumbnail, create the photo
    /// record, and hand the photo to the recognition queue.
    async fn ingest_file(
        &self,
        collection_id: Uuid,
        submitter: &str,
        file: UploadFile,
    ) -> anyhow::Result<Uuid> {
        use anyhow::Context;

        let photo_id = Uuid::new_v4();
        let storage_key = photo_key(collection_id, photo_id, &file.filename);

        self.content
            .put(&storage_key, &file.bytes, &file.content_type)
            .await
            .context("storing original")?;

        // Thumbnail derivation is best-effort: a photo without a thumbnail
        // is still a valid asset and search candidate.
        let thumbnail_key = match thumbnail::derive(file.bytes.clone(), self.config.thumbnail_max_px)
            .await
        {
            Ok(jpeg) => {
                let key = format!("thumbs/{collection_id}/{photo_id}.jpg");
                match self.content.put(&key, &jpeg, "image/jpeg").await {
                    Ok(()) => Some(key),
                    Err(e) => {
                        tracing::warn!(photo_id = %photo_id, error = %e, "Thumbnail store failed");
                        None
                    }
                }
            }
            Err(e) => {
                tracing::warn!(photo_id = %photo_id, error = %e, "Thumbnail derivation failed");
                None
            }
        };

        let record = PhotoRecord {
            id: photo_id,
            collection_id,
            submitter_id: submitter.to_string(),
            storage_key: storage_key.clone(),
            thumbnail_key,
            content_type: file.content_type,
            size_bytes: file.bytes.len() as i64,
            uploaded_at: Utc::now(),
        };
        self.catalog
            .insert_photo(&record)
            .await
            .context("creating photo record")?;

        // Bulk ingestion always enqueues at low priority so interactive
        // searches keep precedence.
        self.queue.enqueue(QueueItem::new(
            submitter,
            photo_id,
            storage_key,
            Priority::Low,
        ));

        Ok(photo_id)
    }
}

fn photo_key(collection_id: Uuid, photo_id: Uuid, filename: &str) -> String {
    let ext = std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("jpg")
        .to_ascii_lowercase();
    format!("photos/{collection_id}/{photo_id}.{ext}")
}
