//! Scan results.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::document::Document;
use super::finding::{Finding, FindingKind};
use crate::error::{ErrorKind, ScanError};

/// Outcome of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    /// Extraction and matching completed on every page.
    Success,
    /// Completed, but at least one page contributed no text.
    Partial,
    /// No pages could be established.
    Failed,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Success => "success",
            ScanStatus::Partial => "partial",
            ScanStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durations of the individual pipeline stages, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTimings {
    pub validate_ms: f64,
    pub extract_ms: f64,
    pub match_ms: f64,
}

impl StageTimings {
    /// `(stage, seconds)` pairs for metrics.
    pub fn stages(&self) -> [(&'static str, f64); 3] {
        [
            ("validate", self.validate_ms / 1000.0),
            ("extract", self.extract_ms / 1000.0),
            ("match", self.match_ms / 1000.0),
        ]
    }
}

/// Identity of the scanned document, kept after its bytes are released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMeta {
    pub id: Uuid,
    pub filename: String,
    pub file_size: u64,
}

impl From<&Document> for DocumentMeta {
    fn from(document: &Document) -> Self {
        Self {
            id: document.id,
            filename: document.filename.clone(),
            file_size: document.byte_size(),
        }
    }
}

/// Complete outcome of scanning one document.
///
/// `findings_count` always equals `findings.len()`; `error` and `error_kind`
/// are present exactly when `status` is not [`ScanStatus::Success`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub document_id: Uuid,
    pub filename: String,
    pub file_size: u64,
    pub total_pages: u32,
    pub status: ScanStatus,
    pub findings: Vec<Finding>,
    pub findings_count: usize,
    pub processing_time_ms: u64,
    pub timings: StageTimings,
    pub processed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded_pages: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScanResult {
    /// Build the result of a scan that established its pages.
    ///
    /// Status is `partial` when `degraded_pages` is non-empty.
    pub fn completed(
        meta: DocumentMeta,
        total_pages: u32,
        findings: Vec<Finding>,
        degraded_pages: Vec<u32>,
        elapsed: Duration,
        timings: StageTimings,
    ) -> Self {
        let (status, error_kind, error) = if degraded_pages.is_empty() {
            (ScanStatus::Success, None, None)
        } else {
            let err = ScanError::ExtractionDegraded {
                pages: degraded_pages.clone(),
            };
            (ScanStatus::Partial, Some(err.kind()), Some(err.to_string()))
        };

        Self {
            document_id: meta.id,
            filename: meta.filename,
            file_size: meta.file_size,
            total_pages,
            status,
            findings_count: findings.len(),
            findings,
            processing_time_ms: elapsed.as_millis() as u64,
            timings,
            processed_at: Utc::now(),
            degraded_pages,
            error_kind,
            error,
        }
    }

    /// Build the result of a scan that could not proceed.
    pub fn failed(meta: DocumentMeta, error: &ScanError, elapsed: Duration, timings: StageTimings) -> Self {
        Self {
            document_id: meta.id,
            filename: meta.filename,
            file_size: meta.file_size,
            total_pages: 0,
            status: ScanStatus::Failed,
            findings: Vec::new(),
            findings_count: 0,
            processing_time_ms: elapsed.as_millis() as u64,
            timings,
            processed_at: Utc::now(),
            degraded_pages: Vec::new(),
            error_kind: Some(error.kind()),
            error: Some(error.to_string()),
        }
    }

    /// Number of findings per kind.
    pub fn counts_by_kind(&self) -> BTreeMap<FindingKind, usize> {
        let mut counts = BTreeMap::new();
        for finding in &self.findings {
            *counts.entry(finding.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Findings on a single page, in detection order.
    pub fn findings_on_page(&self, page: u32) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.page == page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn meta() -> DocumentMeta {
        DocumentMeta {
            id: Uuid::new_v4(),
            filename: "a.pdf".to_string(),
            file_size: 42,
        }
    }

    #[test]
    fn test_completed_counts_findings() {
        let findings = vec![
            Finding::new(FindingKind::Email, "a@b.io", 1, 0, 6),
            Finding::new(FindingKind::Ssn, "123456789", 2, 4, 13),
            Finding::new(FindingKind::Email, "c@d.io", 2, 20, 26),
        ];
        let result = ScanResult::completed(meta(), 2, findings, vec![], Duration::from_millis(12), StageTimings::default());

        assert_eq!(result.status, ScanStatus::Success);
        assert_eq!(result.findings_count, 3);
        assert_eq!(result.error, None);
        assert_eq!(result.counts_by_kind()[&FindingKind::Email], 2);
        assert_eq!(result.findings_on_page(2).count(), 2);
    }

    #[test]
    fn test_degraded_pages_make_partial() {
        let result = ScanResult::completed(meta(), 3, vec![], vec![2], Duration::ZERO, StageTimings::default());
        assert_eq!(result.status, ScanStatus::Partial);
        assert_eq!(result.error_kind, Some(ErrorKind::ExtractionDegraded));
        assert!(result.error.unwrap().contains("[2]"));
    }

    #[test]
    fn test_failed_has_no_findings() {
        let err = ScanError::InvalidInput("not a PDF".into());
        let result = ScanResult::failed(meta(), &err, Duration::ZERO, StageTimings::default());
        assert_eq!(result.status, ScanStatus::Failed);
        assert_eq!(result.findings_count, 0);
        assert_eq!(result.total_pages, 0);
        assert_eq!(result.error.as_deref(), Some("invalid input: not a PDF"));
    }
}
