//! In-process result sink.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{assemble, compute_stats, rows_for, DocumentQuery, DocumentRecord, FindingRecord, ResultSink, SinkStats, StoredDocument};
use crate::error::SinkError;
use crate::models::ScanResult;

#[derive(Debug, Default)]
struct Tables {
    documents: Vec<DocumentRecord>,
    findings: Vec<FindingRecord>,
}

/// Keeps all rows in memory. Useful for tests and one-shot CLI runs.
#[derive(Debug, Default)]
pub struct MemorySink {
    tables: RwLock<Tables>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored document rows.
    pub async fn document_count(&self) -> usize {
        self.tables.read().await.documents.len()
    }

    /// Number of stored finding rows.
    pub async fn finding_count(&self) -> usize {
        self.tables.read().await.findings.len()
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn store(&self, result: &ScanResult) -> Result<(), SinkError> {
        let (document, findings) = rows_for(result);
        let mut tables = self.tables.write().await;
        tables.documents.push(document);
        tables.findings.extend(findings);
        Ok(())
    }

    async fn query(&self, query: &DocumentQuery) -> Result<Vec<StoredDocument>, SinkError> {
        let tables = self.tables.read().await;
        Ok(assemble(&tables.documents, &tables.findings, query))
    }

    async fn stats(&self) -> Result<SinkStats, SinkError> {
        Ok(compute_stats(&self.tables.read().await.documents))
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_store_and_query_by_id() {
        let sink = MemorySink::new();
        let first = result_with("first.pdf", two_findings());
        let second = result_with("second.pdf", vec![]);
        sink.store(&first).await.unwrap();
        sink.store(&second).await.unwrap();

        assert_eq!(sink.document_count().await, 2);
        assert_eq!(sink.finding_count().await, 2);

        let found = sink.query(&DocumentQuery::by_id(first.document_id)).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].document.filename, "first.pdf");
        assert_eq!(found[0].findings.len(), 2);
    }

    #[tokio::test]
    async fn test_limit_and_order() {
        let sink = MemorySink::new();
        for i in 0..5 {
            sink.store(&result_with(&format!("{}.pdf", i), vec![])).await.unwrap();
        }

        let found = sink.query(&DocumentQuery::default().with_limit(2)).await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(found[0].document.processed_at >= found[1].document.processed_at);
        assert_eq!(sink.stats().await.unwrap().total_documents, 5);
    }
}
