//! Async Revalidator (§4.13): a bounded worker pool running
//! stale-while-revalidate jobs in the background, enforcing at-most-one
//! in-flight revalidation per cache-key.
//!
//! The core/transient split below is an approximation of real thread-pool
//! idle-teardown semantics over cooperative tasks -- see the Open Question
//! resolution in DESIGN.md. `core_workers` tasks are long-lived and never
//! exit; up to `max_workers - core_workers` additional tasks are spawned
//! under backpressure and self-terminate after `idle_lifetime_s` with no
//! work, since a `tokio::task::JoinHandle` has no "idle OS thread" to
//! return to a pool the way a native thread would.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;

use crate::failure_cache::FailureCache;

/// A unit of background work: revalidate the entry at `key`. `attempt`
/// carries the failure count observed at schedule time, so the job can
/// implement its own back-off (e.g. skip if `attempt >= 2^n`).
pub struct RevalidationJob {
    /// The cache key being revalidated.
    pub key: String,
    /// The consecutive-failure count observed at schedule time.
    pub attempt: u32,
    /// The job body: one conditional request plus a store write.
    pub task: Pin<Box<dyn Future<Output = JobResult> + Send>>,
}

impl std::fmt::Debug for RevalidationJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevalidationJob").field("key", &self.key).field("attempt", &self.attempt).finish_non_exhaustive()
    }
}

/// The outcome of one background revalidation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobResult {
    /// The job completed without error (whether or not the entry changed).
    Success,
    /// The job's origin call or store write failed.
    Failure,
}

struct Shared {
    in_flight: Mutex<HashSet<String>>,
    shutting_down: AtomicBool,
    active_workers: AtomicUsize,
}

/// The revalidator handle. Cloning shares the same worker pool and
/// in-flight registry.
#[derive(Clone)]
pub struct AsyncRevalidator {
    shared: Arc<Shared>,
    sender: mpsc::Sender<RevalidationJob>,
    receiver: Arc<AsyncMutex<mpsc::Receiver<RevalidationJob>>>,
    failure_cache: Arc<dyn FailureCache>,
    max_workers: usize,
    idle_lifetime: Duration,
}

impl std::fmt::Debug for AsyncRevalidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncRevalidator").finish_non_exhaustive()
    }
}

impl AsyncRevalidator {
    /// Builds a revalidator and spawns its `core_workers` long-lived
    /// workers. `queue_capacity` bounds how many jobs may be pending before
    /// `schedule` starts rejecting submissions.
    pub fn start(
        core_workers: usize,
        max_workers: usize,
        idle_lifetime_s: u64,
        queue_capacity: usize,
        failure_cache: Arc<dyn FailureCache>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let revalidator = Self {
            shared: Arc::new(Shared {
                in_flight: Mutex::new(HashSet::new()),
                shutting_down: AtomicBool::new(false),
                active_workers: AtomicUsize::new(0),
            }),
            sender,
            receiver: Arc::new(AsyncMutex::new(receiver)),
            failure_cache,
            max_workers: max_workers.max(core_workers),
            idle_lifetime: Duration::from_secs(idle_lifetime_s),
        };
        for _ in 0..core_workers {
            revalidator.spawn_worker(None);
        }
        revalidator
    }

    fn spawn_worker(&self, idle_timeout: Option<Duration>) {
        let receiver = self.receiver.clone();
        let shared = self.shared.clone();
        let failure_cache = self.failure_cache.clone();
        shared.active_workers.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            loop {
                if shared.shutting_down.load(Ordering::SeqCst) {
                    break;
                }
                let mut guard = receiver.lock().await;
                let next = match idle_timeout {
                    None => guard.recv().await,
                    Some(timeout) => match tokio::time::timeout(timeout, guard.recv()).await {
                        Ok(job) => job,
                        Err(_) => {
                            drop(guard);
                            break; // idle timeout elapsed: transient worker exits
                        }
                    },
                };
                drop(guard);
                let Some(job) = next else { break };
                let result = job.task.await;
                {
                    let mut in_flight = shared.in_flight.lock().unwrap();
                    in_flight.remove(&job.key);
                }
                match result {
                    JobResult::Success => failure_cache.reset(&job.key).await,
                    JobResult::Failure => {
                        failure_cache.increase(&job.key).await;
                    }
                }
            }
            shared.active_workers.fetch_sub(1, Ordering::SeqCst);
        });
    }

    /// Enqueues `job` unless its key already has a revalidation in flight,
    /// or the queue is full (in which case the job is dropped and
    /// debug-logged).
    pub fn schedule(&self, job: RevalidationJob) {
        if self.shared.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        {
            let mut in_flight = self.shared.in_flight.lock().unwrap();
            if in_flight.contains(&job.key) {
                log::debug!("revalidation for {} already in flight, skipping", job.key);
                return;
            }
            in_flight.insert(job.key.clone());
        }

        if self.active_workers() < self.max_workers && self.queue_is_busy() {
            self.spawn_worker(Some(self.idle_lifetime));
        }

        let key = job.key.clone();
        if self.sender.try_send(job).is_err() {
            log::debug!("revalidation queue full, dropping job for {key}");
            let mut in_flight = self.shared.in_flight.lock().unwrap();
            in_flight.remove(&key);
        }
    }

    fn active_workers(&self) -> usize {
        self.shared.active_workers.load(Ordering::SeqCst)
    }

    fn queue_is_busy(&self) -> bool {
        self.sender.capacity() == 0
    }

    /// True if `key` currently has a revalidation in flight.
    pub fn is_in_flight(&self, key: &str) -> bool {
        self.shared.in_flight.lock().unwrap().contains(key)
    }

    /// Stops accepting new jobs. In-flight jobs run to completion; core
    /// workers exit once the channel is closed and drained.
    pub fn shutdown(&self) {
        self.shared.shutting_down.store(true, Ordering::SeqCst);
    }
}
