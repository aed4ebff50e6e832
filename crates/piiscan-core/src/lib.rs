//! Core library for scanning PDF documents for sensitive personal data.
//!
//! This crate provides:
//! - PDF text extraction with a fallback strategy and resource ceilings
//! - Email and SSN detection with per-page character offsets
//! - Redaction of findings in the source PDF
//! - A bounded worker pool with backpressure and per-job timeouts
//! - Metrics aggregation and result sinks

pub mod budget;
pub mod detect;
pub mod error;
pub mod metrics;
pub mod models;
pub mod pdf;
pub mod pool;
pub mod redact;
pub mod scan;
pub mod sink;

#[cfg(test)]
pub(crate) mod testing;

pub use budget::JobBudget;
pub use detect::{EmailMatcher, PatternMatcher, SensitiveDataMatcher, SsnMatcher};
pub use error::{ErrorKind, PdfError, Result, ScanError, SinkError};
pub use metrics::{MetricsCollector, MetricsHandle, MetricsSnapshot};
pub use models::{Document, Finding, FindingKind, Page, ScanConfig, ScanResult, ScanStatus};
pub use pdf::{DocumentInfo, ExtractionLimits, PdfExtractor, TextExtractor};
pub use pool::{RedactionJob, ScanJob, WorkerPool};
pub use redact::{RedactionReport, RedactionStatus, RedactionWarning, Redactor};
pub use scan::{ScanCoordinator, ScanOutcome};
pub use sink::{DocumentQuery, JsonlSink, MemorySink, ResultSink};
