//! Append-only JSON lines sink.
//!
//! Each line is one row tagged with the table it belongs to, so a single
//! file holds both documents and findings.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use super::{assemble, compute_stats, rows_for, DocumentQuery, DocumentRecord, FindingRecord, ResultSink, SinkStats, StoredDocument};
use crate::error::SinkError;
use crate::models::ScanResult;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "table", rename_all = "snake_case")]
enum Row {
    Document(DocumentRecord),
    Finding(FindingRecord),
}

/// Stores rows in a JSON lines file.
#[derive(Debug)]
pub struct JsonlSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<(Vec<DocumentRecord>, Vec<FindingRecord>), SinkError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        let mut documents = Vec::new();
        let mut findings = Vec::new();
        for (n, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Row>(line) {
                Ok(Row::Document(d)) => documents.push(d),
                Ok(Row::Finding(f)) => findings.push(f),
                Err(e) => {
                    return Err(SinkError::Storage(format!(
                        "{}:{}: {}",
                        self.path.display(),
                        n + 1,
                        e
                    )));
                }
            }
        }
        Ok((documents, findings))
    }
}

#[async_trait]
impl ResultSink for JsonlSink {
    async fn store(&self, result: &ScanResult) -> Result<(), SinkError> {
        let (document, findings) = rows_for(result);

        let mut buffer = String::new();
        buffer.push_str(&serde_json::to_string(&Row::Document(document))?);
        buffer.push('\n');
        for finding in findings {
            buffer.push_str(&serde_json::to_string(&Row::Finding(finding))?);
            buffer.push('\n');
        }

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(buffer.as_bytes()).await?;
        file.flush().await?;

        debug!("Stored {} in {}", result.document_id, self.path.display());
        Ok(())
    }

    async fn query(&self, query: &DocumentQuery) -> Result<Vec<StoredDocument>, SinkError> {
        let (documents, findings) = self.load().await?;
        Ok(assemble(&documents, &findings, query))
    }

    async fn stats(&self) -> Result<SinkStats, SinkError> {
        let (documents, _) = self.load().await?;
        Ok(compute_stats(&documents))
    }

    async fn health_check(&self) -> bool {
        match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => fs::metadata(parent).await.map(|m| m.is_dir()).unwrap_or(false),
            None => true,
        }
    }
}
