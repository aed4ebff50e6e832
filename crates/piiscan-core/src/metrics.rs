//! Aggregated pipeline metrics.
//!
//! A single collector task owns a Prometheus registry. Workers hold a
//! cheap [`MetricsHandle`] and send samples over an unbounded channel, so
//! recording never blocks a scan and concurrent workers never race on shared
//! counters. Samples are counted exactly once, when the collector receives
//! them.

use std::collections::BTreeMap;
use std::time::Duration;

use prometheus::proto::MetricFamily;
use prometheus::{Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::error::{ErrorKind, Result, ScanError};
use crate::models::{FindingKind, ScanResult, ScanStatus, StageTimings};

/// Processing duration buckets, in seconds.
pub const DURATION_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0];

/// Stage duration buckets, in seconds.
pub const STAGE_BUCKETS: &[f64] = &[0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0];

/// File size buckets, in bytes (1 KiB to 100 MiB).
pub const FILE_SIZE_BUCKETS: &[f64] = &[1024.0, 10240.0, 102400.0, 1048576.0, 10485760.0, 104857600.0];

/// One completed scan, as reported by a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSample {
    pub operation: &'static str,
    pub status: ScanStatus,
    pub file_size: u64,
    pub pages: u32,
    pub findings: BTreeMap<FindingKind, usize>,
    pub duration: Duration,
    pub timings: StageTimings,
    pub error_kind: Option<ErrorKind>,
}

impl ScanSample {
    pub fn from_result(operation: &'static str, result: &ScanResult) -> Self {
        Self {
            operation,
            status: result.status,
            file_size: result.file_size,
            pages: result.total_pages,
            findings: result.counts_by_kind(),
            duration: Duration::from_millis(result.processing_time_ms),
            timings: result.timings,
            error_kind: result.error_kind,
        }
    }
}

enum MetricsEvent {
    Scan(ScanSample),
    Error { kind: ErrorKind, operation: &'static str },
    Snapshot(oneshot::Sender<MetricsSnapshot>),
}

/// Cloneable sender side of the collector.
#[derive(Debug, Clone)]
pub struct MetricsHandle {
    tx: mpsc::UnboundedSender<MetricsEvent>,
}

impl std::fmt::Debug for MetricsEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricsEvent::Scan(sample) => f.debug_tuple("Scan").field(sample).finish(),
            MetricsEvent::Error { kind, operation } => {
                f.debug_struct("Error").field("kind", kind).field("operation", operation).finish()
            }
            MetricsEvent::Snapshot(_) => f.write_str("Snapshot"),
        }
    }
}

impl MetricsHandle {
    /// Record a finished scan.
    pub fn record_scan(&self, sample: ScanSample) {
        self.send(MetricsEvent::Scan(sample));
    }

    /// Record an error that did not produce a scan sample, such as a
    /// rejected submission or a failed sink delivery.
    pub fn record_error(&self, kind: ErrorKind, operation: &'static str) {
        self.send(MetricsEvent::Error { kind, operation });
    }

    /// Current aggregate values, or `None` once the collector has stopped.
    pub async fn snapshot(&self) -> Option<MetricsSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(MetricsEvent::Snapshot(tx));
        rx.await.ok()
    }

    fn send(&self, event: MetricsEvent) {
        if let Err(e) = self.tx.send(event) {
            trace!("Metrics collector stopped, dropping {:?}", e.0);
        }
    }
}

/// The aggregation task.
pub struct MetricsCollector;

impl MetricsCollector {
    /// Start the collector on the current tokio runtime.
    ///
    /// The task ends when every handle is dropped and yields the final
    /// snapshot. Fails only if the metric families cannot be registered.
    pub fn spawn() -> Result<(MetricsHandle, JoinHandle<MetricsSnapshot>)> {
        let metrics = PipelineMetrics::new()?;
        let (tx, mut rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    MetricsEvent::Scan(sample) => metrics.apply_scan(&sample),
                    MetricsEvent::Error { kind, operation } => metrics.apply_error(kind, operation),
                    MetricsEvent::Snapshot(reply) => {
                        let _ = reply.send(metrics.snapshot());
                    }
                }
            }
            let snapshot = metrics.snapshot();
            debug!("Metrics collector stopped after {} documents", snapshot.documents_processed());
            snapshot
        });

        Ok((MetricsHandle { tx }, task))
    }
}

/// Metric families owned by the collector task.
struct PipelineMetrics {
    registry: Registry,
    requests: IntCounterVec,
    processing_duration: HistogramVec,
    stage_duration: HistogramVec,
    findings: IntCounterVec,
    file_size: Histogram,
    pages_processed: IntCounter,
    errors: IntCounterVec,
    pool_rejections: IntCounterVec,
}

impl PipelineMetrics {
    fn new() -> Result<Self> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("pdf_requests_total", "Total number of PDF processing requests"),
            &["operation_type", "status"],
        )?;
        let processing_duration = HistogramVec::new(
            HistogramOpts::new("pdf_processing_duration_seconds", "Time spent processing PDFs")
                .buckets(DURATION_BUCKETS.to_vec()),
            &["operation_type"],
        )?;
        let stage_duration = HistogramVec::new(
            HistogramOpts::new("pdf_stage_duration_seconds", "Time spent in each pipeline stage")
                .buckets(STAGE_BUCKETS.to_vec()),
            &["stage"],
        )?;
        let findings = IntCounterVec::new(
            Opts::new("pdf_findings_total", "Total number of sensitive data findings"),
            &["finding_type"],
        )?;
        let file_size = Histogram::with_opts(
            HistogramOpts::new("pdf_file_size_bytes", "Size of processed PDF files")
                .buckets(FILE_SIZE_BUCKETS.to_vec()),
        )?;
        let pages_processed = IntCounter::new("pdf_pages_processed_total", "Total number of PDF pages processed")?;
        let errors = IntCounterVec::new(
            Opts::new("pdf_errors_total", "Total number of processing errors"),
            &["error_type", "operation"],
        )?;
        let pool_rejections = IntCounterVec::new(
            Opts::new("pdf_pool_rejections_total", "Submissions rejected by a saturated worker pool"),
            &["operation"],
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(processing_duration.clone()))?;
        registry.register(Box::new(stage_duration.clone()))?;
        registry.register(Box::new(findings.clone()))?;
        registry.register(Box::new(file_size.clone()))?;
        registry.register(Box::new(pages_processed.clone()))?;
        registry.register(Box::new(errors.clone()))?;
        registry.register(Box::new(pool_rejections.clone()))?;

        Ok(Self {
            registry,
            requests,
            processing_duration,
            stage_duration,
            findings,
            file_size,
            pages_processed,
            errors,
            pool_rejections,
        })
    }

    fn apply_scan(&self, sample: &ScanSample) {
        self.requests
            .with_label_values(&[sample.operation, sample.status.as_str()])
            .inc();
        self.processing_duration
            .with_label_values(&[sample.operation])
            .observe(sample.duration.as_secs_f64());

        for (stage, seconds) in sample.timings.stages() {
            self.stage_duration.with_label_values(&[stage]).observe(seconds);
        }

        for (kind, count) in &sample.findings {
            self.findings.with_label_values(&[kind.as_str()]).inc_by(*count as u64);
        }

        self.file_size.observe(sample.file_size as f64);
        self.pages_processed.inc_by(sample.pages as u64);

        if let Some(kind) = sample.error_kind {
            self.apply_error(kind, sample.operation);
        }
    }

    fn apply_error(&self, kind: ErrorKind, operation: &str) {
        self.errors.with_label_values(&[kind.as_str(), operation]).inc();
        if kind == ErrorKind::PoolSaturated {
            self.pool_rejections.with_label_values(&[operation]).inc();
        }
    }

    fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            families: self.registry.gather(),
        }
    }
}

/// Gathered metric families at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    families: Vec<MetricFamily>,
}

impl MetricsSnapshot {
    /// Scans recorded, across operations and statuses.
    pub fn documents_processed(&self) -> u64 {
        self.counter_sum("pdf_requests_total", &[])
    }

    /// Scans of one operation that ended with `status`.
    pub fn requests(&self, operation: &str, status: ScanStatus) -> u64 {
        self.counter_sum(
            "pdf_requests_total",
            &[("operation_type", operation), ("status", status.as_str())],
        )
    }

    pub fn pages_processed(&self) -> u64 {
        self.counter_sum("pdf_pages_processed_total", &[])
    }

    /// Total findings of one kind.
    pub fn findings_of(&self, kind: FindingKind) -> u64 {
        self.counter_sum("pdf_findings_total", &[("finding_type", kind.as_str())])
    }

    /// Total errors of one kind across operations.
    pub fn errors_of(&self, kind: ErrorKind) -> u64 {
        self.counter_sum("pdf_errors_total", &[("error_type", kind.as_str())])
    }

    /// Render in the Prometheus text exposition format.
    pub fn render_prometheus(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| ScanError::Internal(format!("metrics output is not UTF-8: {}", e)))
    }

    /// Sum of a counter family over the series matching every label pair.
    fn counter_sum(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.families
            .iter()
            .filter(|family| family.get_name() == name)
            .flat_map(|family| family.get_metric())
            .filter(|metric| {
                labels.iter().all(|(key, value)| {
                    metric
                        .get_label()
                        .iter()
                        .any(|pair| pair.get_name() == *key && pair.get_value() == *value)
                })
            })
            .map(|metric| metric.get_counter().get_value() as u64)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample(status: ScanStatus, emails: usize, ssns: usize) -> ScanSample {
        let mut findings = BTreeMap::new();
        if emails > 0 {
            findings.insert(FindingKind::Email, emails);
        }
        if ssns > 0 {
            findings.insert(FindingKind::Ssn, ssns);
        }
        ScanSample {
            operation: "scan",
            status,
            file_size: 2048,
            pages: 3,
            findings,
            duration: Duration::from_millis(250),
            timings: StageTimings {
                validate_ms: 0.1,
                extract_ms: 200.0,
                match_ms: 2.0,
            },
            error_kind: None,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_samples_are_counted_once() {
        let (handle, task) = MetricsCollector::spawn().unwrap();

        let mut workers = Vec::new();
        for _ in 0..8 {
            let handle = handle.clone();
            workers.push(std::thread::spawn(move || {
                for _ in 0..25 {
                    handle.record_scan(sample(ScanStatus::Success, 1, 2));
                }
            }));
        }
        for worker in workers {
            worker.join().unwrap();
        }

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.documents_processed(), 200);
        assert_eq!(snapshot.findings_of(FindingKind::Email), 200);
        assert_eq!(snapshot.findings_of(FindingKind::Ssn), 400);
        assert_eq!(snapshot.pages_processed(), 600);
        assert_eq!(snapshot.requests("scan", ScanStatus::Success), 200);

        drop(handle);
        let last = task.await.unwrap();
        assert_eq!(last.documents_processed(), 200);
    }

    #[tokio::test]
    async fn test_errors_by_kind() {
        let (handle, _task) = MetricsCollector::spawn().unwrap();

        let mut failed = sample(ScanStatus::Failed, 0, 0);
        failed.error_kind = Some(ErrorKind::ProcessingTimeout);
        handle.record_scan(failed);
        handle.record_error(ErrorKind::PoolSaturated, "submit");
        handle.record_error(ErrorKind::PoolSaturated, "submit");

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.errors_of(ErrorKind::ProcessingTimeout), 1);
        assert_eq!(snapshot.errors_of(ErrorKind::PoolSaturated), 2);
        assert_eq!(snapshot.requests("scan", ScanStatus::Failed), 1);

        let text = snapshot.render_prometheus().unwrap();
        assert!(text.contains("pdf_pool_rejections_total{operation=\"submit\"} 2"));
        assert!(text.contains("pdf_errors_total{error_type=\"processing_timeout\",operation=\"scan\"} 1"));
    }

    #[tokio::test]
    async fn test_prometheus_rendering() {
        let (handle, _task) = MetricsCollector::spawn().unwrap();
        handle.record_scan(sample(ScanStatus::Success, 2, 0));

        let text = handle.snapshot().await.unwrap().render_prometheus().unwrap();
        assert!(text.contains("pdf_requests_total{operation_type=\"scan\",status=\"success\"} 1"));
        assert!(text.contains("pdf_findings_total{finding_type=\"email\"} 2"));
        assert!(text.contains("pdf_processing_duration_seconds_bucket{operation_type=\"scan\",le=\"0.5\"} 1"));
        assert!(text.contains("pdf_file_size_bytes_bucket{le=\"+Inf\"} 1"));
        assert!(text.contains("pdf_pages_processed_total 3"));
    }
}
