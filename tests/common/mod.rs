//! Shared test doubles for queue and job manager tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use photo_ingest::models::queue::QueueItem;
use photo_ingest::services::recognition::{RecognitionError, Recognizer};
use photo_ingest::services::storage::{ContentStore, StorageError};

/// Recognizer double that records concurrency high-water marks and the
/// order items were admitted in.
pub struct MockRecognizer {
    pub delay: Duration,
    pub fail_submitters: HashSet<String>,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
    per_user: Mutex<HashMap<String, usize>>,
    pub max_per_user: Mutex<HashMap<String, usize>>,
    pub admitted_order: Mutex<Vec<Uuid>>,
}

impl MockRecognizer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            fail_submitters: HashSet::new(),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            per_user: Mutex::new(HashMap::new()),
            max_per_user: Mutex::new(HashMap::new()),
            admitted_order: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_for(delay: Duration, submitter: &str) -> Self {
        let mut mock = Self::new(delay);
        mock.fail_submitters.insert(submitter.to_string());
        mock
    }

    pub fn max_seen_for(&self, submitter: &str) -> usize {
        self.max_per_user
            .lock()
            .unwrap()
            .get(submitter)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl Recognizer for MockRecognizer {
    async fn process(&self, item: &QueueItem) -> Result<(), RecognitionError> {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        {
            let mut per_user = self.per_user.lock().unwrap();
            let count = per_user.entry(item.submitter_id.clone()).or_insert(0);
            *count += 1;
            let mut max_per_user = self.max_per_user.lock().unwrap();
            let max = max_per_user.entry(item.submitter_id.clone()).or_insert(0);
            *max = (*max).max(*count);
        }
        self.admitted_order.lock().unwrap().push(item.item_id);

        tokio::time::sleep(self.delay).await;

        {
            let mut per_user = self.per_user.lock().unwrap();
            if let Some(count) = per_user.get_mut(&item.submitter_id) {
                *count -= 1;
            }
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.fail_submitters.contains(&item.submitter_id) {
            Err(RecognitionError::Service("mock failure".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Content store double that rejects writes whose payload equals a marker.
pub struct FailingStore {
    inner: photo_ingest::services::storage::MemoryStore,
    fail_marker: Vec<u8>,
}

impl FailingStore {
    pub fn new(fail_marker: Vec<u8>) -> Self {
        Self {
            inner: photo_ingest::services::storage::MemoryStore::new(),
            fail_marker,
        }
    }
}

#[async_trait]
impl ContentStore for FailingStore {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError> {
        if data == self.fail_marker.as_slice() {
            return Err(StorageError::Config("simulated write failure".to_string()));
        }
        self.inner.put(key, data, content_type).await
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.inner.delete(key).await
    }
}

/// A small valid PNG for ingestion tests.
pub fn sample_png() -> Vec<u8> {
    use std::io::Cursor;
    let img = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
        8,
        8,
        image::Rgb([120, 40, 200]),
    ));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)
        .expect("encode sample png");
    out.into_inner()
}

/// Poll a job until it reaches a terminal state; panics on timeout.
pub async fn wait_for_terminal(
    manager: &photo_ingest::services::jobs::UploadJobManager,
    job_id: Uuid,
    timeout: Duration,
) -> photo_ingest::models::job::UploadJob {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let job = manager
            .get_job(job_id)
            .await
            .expect("job store read failed")
            .expect("job missing before terminal state");
        if job.status.is_terminal() {
            return job;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("job {job_id} did not finish within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Poll until `cond` holds or the timeout elapses; panics on timeout.
pub async fn wait_until<F>(timeout: Duration, what: &str, mut cond: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while !cond() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
