//! Error types for the piiscan-core library.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the scanning pipeline.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Not a well-formed PDF, or an empty upload.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Declared or measured size is over the configured ceiling.
    #[error("file size {actual} bytes exceeds limit of {limit} bytes")]
    SizeExceeded { limit: u64, actual: u64 },

    /// Declared or measured page count is over the configured ceiling.
    #[error("page count {actual} exceeds limit of {limit} pages")]
    PageCountExceeded { limit: u32, actual: u32 },

    /// Wall-clock budget for the job ran out.
    #[error("processing exceeded time limit of {}ms", limit.as_millis())]
    ProcessingTimeout { limit: Duration },

    /// Some pages yielded no text. Non-fatal.
    #[error("text extraction degraded on pages {pages:?}")]
    ExtractionDegraded { pages: Vec<u32> },

    /// The worker pool has no free capacity.
    #[error("worker pool saturated ({capacity} jobs in flight)")]
    PoolSaturated { capacity: usize },

    /// Result or metrics delivery failed.
    #[error("sink unavailable: {0}")]
    SinkUnavailable(#[from] SinkError),

    /// Low-level PDF error.
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Metric registration or encoding failed.
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// A worker died unexpectedly.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ScanError {
    /// Classify the error for scan results and metrics.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScanError::InvalidInput(_) | ScanError::Pdf(_) => ErrorKind::InvalidInput,
            ScanError::SizeExceeded { .. } => ErrorKind::SizeExceeded,
            ScanError::PageCountExceeded { .. } => ErrorKind::PageCountExceeded,
            ScanError::ProcessingTimeout { .. } => ErrorKind::ProcessingTimeout,
            ScanError::ExtractionDegraded { .. } => ErrorKind::ExtractionDegraded,
            ScanError::PoolSaturated { .. } => ErrorKind::PoolSaturated,
            ScanError::SinkUnavailable(_) => ErrorKind::SinkUnavailable,
            ScanError::Io(_) | ScanError::Config(_) | ScanError::Metrics(_) | ScanError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// Serializable classification of a [`ScanError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    SizeExceeded,
    PageCountExceeded,
    ProcessingTimeout,
    ExtractionDegraded,
    PoolSaturated,
    SinkUnavailable,
    Internal,
}

impl ErrorKind {
    /// Stable label used in metrics and sink rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::SizeExceeded => "size_exceeded",
            ErrorKind::PageCountExceeded => "page_count_exceeded",
            ErrorKind::ProcessingTimeout => "processing_timeout",
            ErrorKind::ExtractionDegraded => "extraction_degraded",
            ErrorKind::PoolSaturated => "pool_saturated",
            ErrorKind::SinkUnavailable => "sink_unavailable",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors related to PDF processing.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Failed to extract text from PDF.
    #[error("failed to extract text: {0}")]
    TextExtraction(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// Failed to write a modified document.
    #[error("failed to write PDF: {0}")]
    Write(String),
}

/// Errors raised by result sinks.
#[derive(Error, Debug)]
pub enum SinkError {
    /// Backing store could not be reached or written.
    #[error("storage failure: {0}")]
    Storage(String),

    /// A stored row could not be encoded or decoded.
    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for the piiscan library.
pub type Result<T> = std::result::Result<T, ScanError>;
