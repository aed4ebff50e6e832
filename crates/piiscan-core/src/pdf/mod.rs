//! PDF processing module.

mod extractor;
pub mod normalize;

pub use extractor::{ExtractionLimits, PdfExtractor};
pub use normalize::normalize_text;

use serde::{Deserialize, Serialize};

use crate::budget::JobBudget;
use crate::error::Result;
use crate::models::Page;

/// Pages extracted from one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    /// Pages in ascending order, one per page of the document.
    pub pages: Vec<Page>,
    /// Page count reported by the document.
    pub total_pages: u32,
}

impl ExtractedDocument {
    /// Pages for which no strategy produced text.
    pub fn degraded_pages(&self) -> Vec<u32> {
        self.pages.iter().filter(|p| p.degraded).map(|p| p.number).collect()
    }
}

/// Basic facts about a PDF, without extracting its text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub file_size: u64,
    pub total_pages: u32,
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Trait for text extraction implementations.
pub trait TextExtractor: Send + Sync {
    /// Extract normalized per-page text, enforcing resource ceilings.
    ///
    /// Fails the whole document only when no pages can be established.
    fn extract(&self, data: &[u8], budget: &JobBudget) -> Result<ExtractedDocument>;
}
