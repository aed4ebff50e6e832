//! Data models for documents, findings, results and configuration.

pub mod config;
pub mod document;
pub mod finding;
pub mod result;

pub use config::{LimitsConfig, PoolConfig, ScanConfig};
pub use document::{Document, Page};
pub use finding::{Finding, FindingKind};
pub use result::{DocumentMeta, ScanResult, ScanStatus, StageTimings};
