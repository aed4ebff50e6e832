//! Persistence collaborators for scan results.
//!
//! A sink stores one [`DocumentRecord`] per scan and one [`FindingRecord`]
//! per finding, keyed by document id, and serves them back newest first.

mod jsonl;
mod memory;

pub use jsonl::JsonlSink;
pub use memory::MemorySink;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SinkError;
use crate::models::ScanResult;

/// Default number of documents returned by a query.
pub const DEFAULT_QUERY_LIMIT: usize = 50;

/// One row per scanned document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: Uuid,
    pub filename: String,
    pub file_size: u64,
    pub total_pages: u32,
    pub processed_at: DateTime<Utc>,
    pub status: String,
    pub error_message: String,
    pub findings_count: u32,
    pub processing_time_ms: u64,
}

/// One row per finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindingRecord {
    pub document_id: Uuid,
    pub finding_type: String,
    pub finding_value: String,
    pub page_number: u32,
    pub position_start: Option<u32>,
    pub position_end: Option<u32>,
    pub detected_at: DateTime<Utc>,
}

/// A stored document with its findings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    #[serde(flatten)]
    pub document: DocumentRecord,
    pub findings: Vec<FindingRecord>,
}

/// Retrieval filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentQuery {
    pub document_id: Option<Uuid>,
    pub limit: usize,
}

impl Default for DocumentQuery {
    fn default() -> Self {
        Self {
            document_id: None,
            limit: DEFAULT_QUERY_LIMIT,
        }
    }
}

impl DocumentQuery {
    pub fn by_id(id: Uuid) -> Self {
        Self {
            document_id: Some(id),
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Aggregates over successfully scanned documents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SinkStats {
    pub total_documents: u64,
    pub total_findings: u64,
    pub avg_processing_time_ms: f64,
    pub total_file_size_bytes: u64,
}

/// Trait for result persistence.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Store a completed scan.
    async fn store(&self, result: &ScanResult) -> Result<(), SinkError>;

    /// Stored documents matching `query`, newest first.
    async fn query(&self, query: &DocumentQuery) -> Result<Vec<StoredDocument>, SinkError>;

    /// Aggregates over successful scans.
    async fn stats(&self) -> Result<SinkStats, SinkError>;

    /// Whether the backing store is reachable.
    async fn health_check(&self) -> bool {
        true
    }
}

/// Split a scan result into its rows.
pub fn rows_for(result: &ScanResult) -> (DocumentRecord, Vec<FindingRecord>) {
    let document = DocumentRecord {
        id: result.document_id,
        filename: result.filename.clone(),
        file_size: result.file_size,
        total_pages: result.total_pages,
        processed_at: result.processed_at,
        status: result.status.as_str().to_string(),
        error_message: result.error.clone().unwrap_or_default(),
        findings_count: result.findings_count as u32,
        processing_time_ms: result.processing_time_ms,
    };

    let findings = result
        .findings
        .iter()
        .map(|f| FindingRecord {
            document_id: result.document_id,
            finding_type: f.kind.as_str().to_string(),
            finding_value: f.value.clone(),
            page_number: f.page,
            position_start: Some(f.start as u32),
            position_end: Some(f.end as u32),
            detected_at: result.processed_at,
        })
        .collect();

    (document, findings)
}

/// Join rows into query results, newest first.
pub(crate) fn assemble(
    documents: &[DocumentRecord],
    findings: &[FindingRecord],
    query: &DocumentQuery,
) -> Vec<StoredDocument> {
    let mut selected: Vec<&DocumentRecord> = documents
        .iter()
        .filter(|d| query.document_id.is_none_or(|id| d.id == id))
        .collect();
    selected.sort_by(|a, b| b.processed_at.cmp(&a.processed_at));
    selected.truncate(query.limit);

    selected
        .into_iter()
        .map(|document| StoredDocument {
            document: document.clone(),
            findings: findings
                .iter()
                .filter(|f| f.document_id == document.id)
                .cloned()
                .collect(),
        })
        .collect()
}

pub(crate) fn compute_stats(documents: &[DocumentRecord]) -> SinkStats {
    let successful: Vec<&DocumentRecord> = documents.iter().filter(|d| d.status == "success").collect();
    if successful.is_empty() {
        return SinkStats::default();
    }

    let total_time: u64 = successful.iter().map(|d| d.processing_time_ms).sum();
    SinkStats {
        total_documents: successful.len() as u64,
        total_findings: successful.iter().map(|d| d.findings_count as u64).sum(),
        avg_processing_time_ms: total_time as f64 / successful.len() as f64,
        total_file_size_bytes: successful.iter().map(|d| d.file_size).sum(),
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rows_for() {
        let result = result_with("a.pdf", two_findings());
        let (document, findings) = rows_for(&result);

        assert_eq!(document.id, result.document_id);
        assert_eq!(document.status, "success");
        assert_eq!(document.error_message, "");
        assert_eq!(document.findings_count, 2);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[1].finding_type, "ssn");
        assert_eq!(findings[1].page_number, 2);
        assert_eq!(findings[1].position_start, Some(5));
    }

    #[test]
    fn test_stats_ignore_failures() {
        let (ok, _) = rows_for(&result_with("a.pdf", two_findings()));
        let mut failed = ok.clone();
        failed.status = "failed".to_string();
        failed.findings_count = 0;

        let stats = compute_stats(&[ok, failed]);
        assert_eq!(stats.total_documents, 1);
        assert_eq!(stats.total_findings, 2);
        assert_eq!(stats.avg_processing_time_ms, 40.0);
    }
}
