//! Upload job manager tests: progress conservation, per-file error
//! isolation, and handoff to the recognition queue.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use common::{sample_png, wait_for_terminal, FailingStore};
use photo_ingest::db::queries::MemoryCatalog;
use photo_ingest::models::job::JobStatus;
use photo_ingest::services::jobs::{
    InMemoryJobStore, JobStore, ManagerConfig, UploadFile, UploadJobManager,
};
use photo_ingest::services::queue::{QueueConfig, RecognitionQueue};
use photo_ingest::services::storage::MemoryStore;

struct Harness {
    manager: Arc<UploadJobManager>,
    store: Arc<InMemoryJobStore>,
    catalog: Arc<MemoryCatalog>,
    queue: Arc<RecognitionQueue>,
}

fn harness(content: Arc<dyn photo_ingest::services::storage::ContentStore>) -> Harness {
    let store = Arc::new(InMemoryJobStore::new());
    let catalog = Arc::new(MemoryCatalog::new());
    // No workers are started: enqueued items stay visible in the backlog.
    let queue = RecognitionQueue::new(QueueConfig::default());
    let manager = UploadJobManager::new(
        store.clone(),
        content,
        catalog.clone(),
        Arc::clone(&queue),
        ManagerConfig {
            chunk_size: 2,
            ..ManagerConfig::default()
        },
    );
    Harness {
        manager,
        store,
        catalog,
        queue,
    }
}

fn png_file(name: &str) -> UploadFile {
    UploadFile {
        filename: name.to_string(),
        content_type: "image/png".to_string(),
        bytes: sample_png(),
    }
}

/// Submitting returns immediately; the job then runs to completion with
/// one photo record and one queued recognition item per file.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn batch_runs_to_completion() {
    let h = harness(Arc::new(MemoryStore::new()));
    let collection = Uuid::new_v4();

    let files = vec![png_file("a.png"), png_file("b.png"), png_file("c.png")];
    let job_id = h
        .manager
        .submit_batch(files, collection, "alice")
        .await
        .expect("submit");

    let accepted = h
        .manager
        .get_job(job_id)
        .await
        .unwrap()
        .expect("job visible immediately");
    assert!(matches!(
        accepted.status,
        JobStatus::Queued | JobStatus::Processing | JobStatus::Completed
    ));
    assert_eq!(accepted.total_items, 3);

    let job = wait_for_terminal(&h.manager, job_id, Duration::from_secs(5)).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.processed_items, 3);
    assert!(job.errors.is_empty());
    assert!(job.finished_at.is_some());

    assert_eq!(h.catalog.photo_count(), 3);
    assert_eq!(h.catalog.collection_count(collection), 3);
    assert_eq!(h.queue.status().queue_size, 3);

    // Every record points at a stored original and a stored thumbnail.
    for photo in h.catalog.photos_in_collection(collection) {
        assert_eq!(photo.submitter_id, "alice");
        assert!(photo.thumbnail_key.is_some());
    }
}

/// A file whose storage write always fails is recorded in `errors` and
/// never aborts the batch.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failing_file_does_not_abort_batch() {
    let poison = b"not really a png".to_vec();
    let h = harness(Arc::new(FailingStore::new(poison.clone())));
    let collection = Uuid::new_v4();

    let mut files: Vec<UploadFile> = (0..5).map(|i| png_file(&format!("ok{i}.png"))).collect();
    files.insert(
        2,
        UploadFile {
            filename: "broken.png".to_string(),
            content_type: "image/png".to_string(),
            bytes: poison,
        },
    );

    let job_id = h
        .manager
        .submit_batch(files, collection, "alice")
        .await
        .expect("submit");
    let job = wait_for_terminal(&h.manager, job_id, Duration::from_secs(5)).await;

    assert_eq!(job.status, JobStatus::Completed, "partial success is normal");
    assert_eq!(job.processed_items, 6);
    assert_eq!(job.errors.len(), 1);
    assert!(job.errors[0].contains("broken.png"));

    // Only successful files reach the catalog, the collection count, and
    // the recognition queue.
    assert_eq!(h.catalog.photo_count(), 5);
    assert_eq!(h.catalog.collection_count(collection), 5);
    assert_eq!(h.queue.status().queue_size, 5);
}

/// Thumbnail derivation failure is best-effort: the photo is still stored,
/// recorded, and queued, with no entry in `errors`.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn thumbnail_failure_is_not_an_error() {
    let h = harness(Arc::new(MemoryStore::new()));
    let collection = Uuid::new_v4();

    // File 2 stores fine but cannot be decoded as an image.
    let files = vec![
        png_file("one.png"),
        UploadFile {
            filename: "two.png".to_string(),
            content_type: "image/png".to_string(),
            bytes: b"this is not image data".to_vec(),
        },
        png_file("three.png"),
    ];

    let job_id = h
        .manager
        .submit_batch(files, collection, "alice")
        .await
        .expect("submit");
    let job = wait_for_terminal(&h.manager, job_id, Duration::from_secs(5)).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.processed_items, 3);
    assert!(job.errors.is_empty());

    let photos = h.catalog.photos_in_collection(collection);
    assert_eq!(photos.len(), 3);
    let without_thumb = photos.iter().filter(|p| p.thumbnail_key.is_none()).count();
    assert_eq!(without_thumb, 1, "exactly the undecodable file lacks a thumbnail");
    assert_eq!(h.queue.status().queue_size, 3);
}

/// Jobs list most-recent-first, scoped to the submitter.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn job_listing_is_scoped_and_ordered() {
    let h = harness(Arc::new(MemoryStore::new()));
    let collection = Uuid::new_v4();

    let first = h
        .manager
        .submit_batch(vec![png_file("a.png")], collection, "alice")
        .await
        .unwrap();
    wait_for_terminal(&h.manager, first, Duration::from_secs(5)).await;

    let second = h
        .manager
        .submit_batch(vec![png_file("b.png")], collection, "alice")
        .await
        .unwrap();
    wait_for_terminal(&h.manager, second, Duration::from_secs(5)).await;

    h.manager
        .submit_batch(vec![png_file("c.png")], collection, "bob")
        .await
        .unwrap();

    let jobs = h.manager.list_jobs("alice").await.unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].id, second, "newest job listed first");
    assert_eq!(jobs[1].id, first);
}

/// The retention sweep removes terminal jobs past the horizon and leaves
/// everything else alone.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn purge_removes_only_old_terminal_jobs() {
    let h = harness(Arc::new(MemoryStore::new()));
    let collection = Uuid::new_v4();

    let done = h
        .manager
        .submit_batch(vec![png_file("a.png")], collection, "alice")
        .await
        .unwrap();
    wait_for_terminal(&h.manager, done, Duration::from_secs(5)).await;

    // Cutoff in the future: the finished job qualifies for removal.
    let purged = h
        .store
        .purge_finished_before(Utc::now() + chrono::Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(purged, 1);
    assert!(h.manager.get_job(done).await.unwrap().is_none());

    // Cutoff in the past removes nothing.
    let fresh = h
        .manager
        .submit_batch(vec![png_file("b.png")], collection, "alice")
        .await
        .unwrap();
    wait_for_terminal(&h.manager, fresh, Duration::from_secs(5)).await;
    let purged = h
        .store
        .purge_finished_before(Utc::now() - chrono::Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(purged, 0);
    assert!(h.manager.get_job(fresh).await.unwrap().is_some());
}

/// `processed_items` never exceeds `total_items` even when the store sees
/// concurrent per-file completions.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn processed_items_is_conserved() {
    let h = harness(Arc::new(MemoryStore::new()));
    let collection = Uuid::new_v4();

    let files: Vec<UploadFile> = (0..25).map(|i| png_file(&format!("p{i}.png"))).collect();
    let job_id = h
        .manager
        .submit_batch(files, collection, "alice")
        .await
        .unwrap();

    // Sample progress while the batch runs.
    loop {
        let job = h.manager.get_job(job_id).await.unwrap().expect("job exists");
        assert!(job.processed_items <= job.total_items);
        if job.status.is_terminal() {
            assert_eq!(job.status, JobStatus::Completed);
            assert_eq!(job.processed_items, 25);
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
