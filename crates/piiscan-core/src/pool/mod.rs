//! Bounded worker pool for scan jobs.
//!
//! Scans are CPU-bound, so each one runs on tokio's blocking thread pool.
//! Two semaphores bound the work:
//!
//! - `workers` holds `pool_size` permits and caps how many scans run at once.
//! - `capacity` caps jobs in flight (running plus waiting for a worker).
//!   Submission takes a slot with `try_acquire`, so a full pool rejects at
//!   once with [`ScanError::PoolSaturated`] instead of queueing without bound.
//!
//! Both permits are owned by the blocking closure. A job that outlives its
//! timeout keeps its worker until it notices the cancelled budget, so a
//! timeout never frees a worker that is still busy.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{oneshot, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::budget::JobBudget;
use crate::error::{ErrorKind, Result, ScanError};
use crate::metrics::MetricsHandle;
use crate::models::{Document, DocumentMeta, ScanResult, StageTimings};
use crate::scan::{ScanCoordinator, ScanOutcome, OP_SCAN, OP_SCAN_AND_REDACT};
use crate::sink::ResultSink;

/// Waiting slots per worker on top of the running jobs.
pub const QUEUE_SLOTS_PER_WORKER: usize = 2;

const SHUT_DOWN: &str = "worker pool is shut down";

/// Something a job resolves to.
pub trait JobOutput: Send + 'static {
    /// Output for a job that never produced one.
    fn failed(meta: DocumentMeta, error: &ScanError, elapsed: Duration) -> Self;

    /// The scan result to forward to the sink.
    fn result(&self) -> &ScanResult;
}

impl JobOutput for ScanResult {
    fn failed(meta: DocumentMeta, error: &ScanError, elapsed: Duration) -> Self {
        ScanResult::failed(meta, error, elapsed, StageTimings::default())
    }

    fn result(&self) -> &ScanResult {
        self
    }
}

impl JobOutput for ScanOutcome {
    fn failed(meta: DocumentMeta, error: &ScanError, elapsed: Duration) -> Self {
        ScanOutcome {
            result: ScanResult::failed(meta, error, elapsed, StageTimings::default()),
            redaction: None,
        }
    }

    fn result(&self) -> &ScanResult {
        &self.result
    }
}

/// Handle to a submitted job.
#[derive(Debug)]
pub struct Job<T> {
    meta: DocumentMeta,
    rx: oneshot::Receiver<T>,
}

/// A submitted scan.
pub type ScanJob = Job<ScanResult>;

/// A submitted scan-and-redact.
pub type RedactionJob = Job<ScanOutcome>;

impl<T: JobOutput> Job<T> {
    pub fn document_id(&self) -> Uuid {
        self.meta.id
    }

    /// Wait for the job to finish.
    pub async fn wait(self) -> T {
        match self.rx.await {
            Ok(output) => output,
            Err(_) => {
                let err = ScanError::Internal("job was dropped before completing".to_string());
                T::failed(self.meta, &err, Duration::ZERO)
            }
        }
    }
}

/// Runs scans with bounded parallelism and bounded admission.
pub struct WorkerPool {
    coordinator: Arc<ScanCoordinator>,
    workers: Arc<Semaphore>,
    capacity: Arc<Semaphore>,
    pool_size: usize,
    max_in_flight: usize,
    timeout: Duration,
    sink: Option<Arc<dyn ResultSink>>,
    metrics: Option<MetricsHandle>,
}

impl WorkerPool {
    /// Size the pool and job timeout from the coordinator's configuration.
    pub fn new(coordinator: Arc<ScanCoordinator>) -> Self {
        let pool_size = coordinator.config().pool.pool_size.max(1);
        let max_in_flight = pool_size + pool_size * QUEUE_SLOTS_PER_WORKER;
        let timeout = coordinator.config().limits.timeout();

        Self {
            coordinator,
            workers: Arc::new(Semaphore::new(pool_size)),
            capacity: Arc::new(Semaphore::new(max_in_flight)),
            pool_size,
            max_in_flight,
            timeout,
            sink: None,
            metrics: None,
        }
    }

    /// Forward every result to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Count rejections and sink failures.
    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Override the per-job timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Maximum jobs in flight.
    pub fn capacity(&self) -> usize {
        self.max_in_flight
    }

    /// Jobs admitted and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.max_in_flight - self.capacity.available_permits()
    }

    /// Workers not currently running a scan.
    pub fn available_workers(&self) -> usize {
        self.workers.available_permits()
    }

    /// Hand a document to the pool.
    ///
    /// Returns as soon as the job is admitted. Must be called from within a
    /// tokio runtime.
    pub fn submit(&self, document: Document) -> Result<ScanJob> {
        self.dispatch(document, OP_SCAN, |coordinator, document, budget| {
            coordinator.scan_with_budget(document, budget)
        })
    }

    /// Like [`WorkerPool::submit`], redacting findings after the scan.
    pub fn submit_redaction(&self, document: Document) -> Result<RedactionJob> {
        self.dispatch(document, OP_SCAN_AND_REDACT, |coordinator, document, budget| {
            coordinator.scan_and_redact_with_budget(document, budget)
        })
    }

    /// Submit and wait.
    pub async fn scan(&self, document: Document) -> Result<ScanResult> {
        Ok(self.submit(document)?.wait().await)
    }

    /// Stop admitting jobs and wait for the ones in flight, including their
    /// sink delivery.
    pub async fn shutdown(&self) {
        info!("Shutting down worker pool, {} jobs in flight", self.in_flight());
        match self.capacity.acquire_many(self.max_in_flight as u32).await {
            Ok(_all) => self.capacity.close(),
            Err(_) => debug!("Worker pool already shut down"),
        }
    }

    fn dispatch<T, F>(&self, document: Document, operation: &'static str, work: F) -> Result<Job<T>>
    where
        T: JobOutput,
        F: FnOnce(&ScanCoordinator, Document, &JobBudget) -> T + Send + 'static,
    {
        let slot = match Arc::clone(&self.capacity).try_acquire_owned() {
            Ok(slot) => slot,
            Err(TryAcquireError::NoPermits) => {
                warn!("Rejecting {}: {} jobs in flight", document.filename, self.max_in_flight);
                if let Some(metrics) = &self.metrics {
                    metrics.record_error(ErrorKind::PoolSaturated, operation);
                }
                return Err(ScanError::PoolSaturated {
                    capacity: self.max_in_flight,
                });
            }
            Err(TryAcquireError::Closed) => return Err(ScanError::Internal(SHUT_DOWN.to_string())),
        };

        let meta = DocumentMeta::from(&document);
        debug!("Admitted {} ({})", meta.id, meta.filename);

        let (tx, rx) = oneshot::channel();
        let job = JobContext {
            coordinator: Arc::clone(&self.coordinator),
            workers: Arc::clone(&self.workers),
            slot: Arc::new(slot),
            timeout: self.timeout,
            operation,
            metrics: self.metrics.clone(),
        };
        let sink = self.sink.clone();
        let metrics = self.metrics.clone();

        tokio::spawn(async move {
            let slot = Arc::clone(&job.slot);
            let output = job.run(document, work).await;

            let stored = sink.as_ref().map(|_| output.result().clone());
            if tx.send(output).is_err() {
                debug!("Caller stopped waiting for its job");
            }

            if let (Some(sink), Some(result)) = (sink, stored) {
                deliver(sink.as_ref(), &result, metrics.as_ref()).await;
            }
            drop(slot);
        });

        Ok(Job { meta, rx })
    }
}

/// Everything a job needs once admitted.
struct JobContext {
    coordinator: Arc<ScanCoordinator>,
    workers: Arc<Semaphore>,
    slot: Arc<OwnedSemaphorePermit>,
    timeout: Duration,
    operation: &'static str,
    metrics: Option<MetricsHandle>,
}

impl JobContext {
    async fn run<T, F>(self, document: Document, work: F) -> T
    where
        T: JobOutput,
        F: FnOnce(&ScanCoordinator, Document, &JobBudget) -> T + Send + 'static,
    {
        let meta = DocumentMeta::from(&document);

        let worker = match Arc::clone(&self.workers).acquire_owned().await {
            Ok(worker) => worker,
            Err(_) => return T::failed(meta, &ScanError::Internal(SHUT_DOWN.to_string()), Duration::ZERO),
        };

        let started = Instant::now();
        let budget = JobBudget::new(self.timeout);
        let job_budget = budget.clone();
        let coordinator = self.coordinator;
        let slot = self.slot;

        // Locals drop in reverse: the worker is free before the slot is.
        let task = tokio::task::spawn_blocking(move || {
            let _slot = slot;
            let _worker = worker;
            work(&coordinator, document, &job_budget)
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                error!("Worker failed on {}: {}", meta.id, e);
                if let Some(metrics) = &self.metrics {
                    metrics.record_error(ErrorKind::Internal, self.operation);
                }
                let err = ScanError::Internal(format!("worker failed: {}", e));
                T::failed(meta, &err, started.elapsed())
            }
            Err(_) => {
                budget.cancel();
                warn!("Job {} exceeded {:?}, cancelling", meta.id, self.timeout);
                let err = ScanError::ProcessingTimeout { limit: self.timeout };
                T::failed(meta, &err, started.elapsed())
            }
        }
    }
}

async fn deliver(sink: &dyn ResultSink, result: &ScanResult, metrics: Option<&MetricsHandle>) {
    match sink.store(result).await {
        Ok(()) => debug!("Stored result for {}", result.document_id),
        Err(e) => {
            let err = ScanError::SinkUnavailable(e);
            warn!("Could not store result for {}: {}", result.document_id, err);
            if let Some(metrics) = metrics {
                metrics.record_error(err.kind(), "store");
            }
        }
    }
}
