use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::models::queue::{Priority, QueueItem, QueueStatus, UserQueueStatus};
use crate::services::recognition::Recognizer;

/// Concurrency ceilings for the processing queue.
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    /// Global cap on items processing at once. Also the worker pool size.
    pub max_concurrent: usize,
    /// Cap on items one submitter may have processing at once.
    pub user_concurrency_limit: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 16,
            user_concurrency_limit: 4,
        }
    }
}

struct QueueInner {
    backlog: VecDeque<QueueItem>,
    active: HashMap<Uuid, QueueItem>,
    active_per_user: HashMap<String, usize>,
    processed_count: u64,
    error_count: u64,
    total_processing_ms: u64,
}

/// In-process admission-controlled queue feeding the recognition service.
///
/// Admission holds two caps simultaneously: a global ceiling protecting the
/// recognition backend, and a per-submitter ceiling so one bulk upload of
/// thousands of photos cannot starve other users' work. The backlog itself
/// is unbounded; backpressure shows up as wait time, never rejection.
///
/// A fixed pool of worker tasks (one per global slot) pulls from the
/// backlog; the per-submitter guard is checked under the queue lock before
/// a worker takes an item, so no interleaving can overshoot either cap.
pub struct RecognitionQueue {
    inner: Mutex<QueueInner>,
    wake: Notify,
    config: QueueConfig,
    started: Instant,
    shutdown: AtomicBool,
}

impl RecognitionQueue {
    pub fn new(config: QueueConfig) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(QueueInner {
                backlog: VecDeque::new(),
                active: HashMap::new(),
                active_per_user: HashMap::new(),
                processed_count: 0,
                error_count: 0,
                total_processing_ms: 0,
            }),
            wake: Notify::new(),
            config,
            started: Instant::now(),
            shutdown: AtomicBool::new(false),
        })
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn the worker pool, one task per global concurrency slot.
    pub fn start_workers(
        self: &Arc<Self>,
        recognizer: Arc<dyn Recognizer>,
    ) -> Vec<JoinHandle<()>> {
        (0..self.config.max_concurrent)
            .map(|worker_id| {
                let queue = Arc::clone(self);
                let recognizer = Arc::clone(&recognizer);
                tokio::spawn(async move {
                    queue.worker_loop(recognizer, worker_id).await;
                })
            })
            .collect()
    }

    /// Add an item to the backlog. Always accepted.
    pub fn enqueue(&self, item: QueueItem) {
        let depth;
        {
            let mut inner = self.lock();
            tracing::debug!(
                item_id = %item.item_id,
                submitter = %item.submitter_id,
                priority = %item.priority,
                "Item enqueued"
            );
            inner.backlog.push_back(item);
            depth = inner.backlog.len();
        }
        metrics::gauge!("recognition_queue_depth").set(depth as f64);
        // A new arrival can unblock at most one worker.
        self.wake.notify_one();
    }

    /// Remove an item from the active set and fold its outcome into the
    /// running counters, then let a waiting worker re-check admission.
    pub fn mark_done(&self, item_id: Uuid, success: bool, duration: Duration) {
        {
            let mut inner = self.lock();
            let Some(item) = inner.active.remove(&item_id) else {
                tracing::warn!(item_id = %item_id, "mark_done for unknown item");
                return;
            };

            match inner.active_per_user.get_mut(&item.submitter_id) {
                Some(count) if *count > 1 => *count -= 1,
                _ => {
                    inner.active_per_user.remove(&item.submitter_id);
                }
            }

            if success {
                inner.processed_count += 1;
            } else {
                inner.error_count += 1;
            }
            inner.total_processing_ms += duration.as_millis() as u64;

            metrics::gauge!("recognition_queue_active").set(inner.active.len() as f64);
        }

        if success {
            metrics::counter!("recognition_items_processed_total").increment(1);
        } else {
            metrics::counter!("recognition_items_failed_total").increment(1);
        }
        metrics::histogram!("recognition_processing_seconds").record(duration.as_secs_f64());

        self.wake.notify_one();
    }

    /// Stop workers once their in-flight items finish.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.wake.notify_waiters();
    }

    /// Global snapshot, recomputed from live state plus running counters.
    pub fn status(&self) -> QueueStatus {
        let inner = self.lock();
        let attempts = inner.processed_count + inner.error_count;
        let avg_processing_ms = if attempts > 0 {
            inner.total_processing_ms / attempts
        } else {
            0
        };

        let uptime = self.started.elapsed();
        let throughput_per_minute = if uptime.as_secs_f64() > 0.0 {
            inner.processed_count as f64 / (uptime.as_secs_f64() / 60.0)
        } else {
            0.0
        };

        QueueStatus {
            queue_size: inner.backlog.len(),
            active_processing: inner.active.len(),
            max_concurrent: self.config.max_concurrent,
            user_concurrency_limit: self.config.user_concurrency_limit,
            active_users: inner.active_per_user.len(),
            processed_count: inner.processed_count,
            error_count: inner.error_count,
            avg_processing_ms,
            throughput_per_minute,
            uptime_secs: uptime.as_secs(),
        }
    }

    /// Snapshot scoped to one submitter, including their backlog position.
    pub fn user_status(&self, submitter_id: &str) -> UserQueueStatus {
        let inner = self.lock();

        let queued_items = inner
            .backlog
            .iter()
            .filter(|i| i.submitter_id == submitter_id)
            .count();

        let position = inner
            .backlog
            .iter()
            .position(|i| i.submitter_id == submitter_id)
            .map(|idx| idx + 1);

        UserQueueStatus {
            queued_items,
            processing_items: inner
                .active_per_user
                .get(submitter_id)
                .copied()
                .unwrap_or(0),
            max_allowed: self.config.user_concurrency_limit,
            position,
        }
    }

    async fn worker_loop(self: Arc<Self>, recognizer: Arc<dyn Recognizer>, worker_id: usize) {
        loop {
            let item = loop {
                if self.shutdown.load(Ordering::Acquire) {
                    tracing::debug!(worker_id, "Worker shutting down");
                    return;
                }
                match self.take_next() {
                    Some(item) => break item,
                    None => self.wake.notified().await,
                }
            };

            tracing::debug!(
                worker_id,
                item_id = %item.item_id,
                submitter = %item.submitter_id,
                "Processing recognition item"
            );

            let start = Instant::now();
            let result = recognizer.process(&item).await;
            let elapsed = start.elapsed();

            match &result {
                Ok(()) => tracing::debug!(
                    worker_id,
                    item_id = %item.item_id,
                    duration_ms = elapsed.as_millis() as u64,
                    "Recognition item done"
                ),
                // No automatic retry: the slot is freed and the failure is
                // surfaced through error_count.
                Err(e) => tracing::warn!(
                    worker_id,
                    item_id = %item.item_id,
                    error = %e,
                    "Recognition item failed"
                ),
            }

            self.mark_done(item.item_id, result.is_ok(), elapsed);
        }
    }

    /// Admit the next eligible backlog item, if any, moving it to the
    /// active set under both caps.
    fn take_next(&self) -> Option<QueueItem> {
        let mut inner = self.lock();

        if inner.active.len() >= self.config.max_concurrent {
            return None;
        }

        let idx = self.admissible_index(&inner)?;
        let item = inner
            .backlog
            .remove(idx)
            .expect("index from admissible_index is in bounds");

        *inner
            .active_per_user
            .entry(item.submitter_id.clone())
            .or_insert(0) += 1;
        inner.active.insert(item.item_id, item.clone());

        metrics::gauge!("recognition_queue_depth").set(inner.backlog.len() as f64);
        metrics::gauge!("recognition_queue_active").set(inner.active.len() as f64);

        Some(item)
    }

    /// Index of the oldest admissible item: normal priority first, FIFO
    /// within a class, skipping submitters at their concurrency cap.
    fn admissible_index(&self, inner: &QueueInner) -> Option<usize> {
        let under_cap = |item: &QueueItem| {
            inner
                .active_per_user
                .get(&item.submitter_id)
                .copied()
                .unwrap_or(0)
                < self.config.user_concurrency_limit
        };

        for wanted in [Priority::Normal, Priority::Low] {
            if let Some(idx) = inner
                .backlog
                .iter()
                .position(|item| item.priority == wanted && under_cap(item))
            {
                return Some(idx);
            }
        }
        None
    }
}
