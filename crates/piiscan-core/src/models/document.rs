//! Uploaded documents and their extracted pages.

use uuid::Uuid;

/// A document submitted for scanning.
///
/// The raw content lives only as long as the scan job that owns it.
#[derive(Debug, Clone)]
pub struct Document {
    /// Unique identifier assigned at upload time.
    pub id: Uuid,
    /// Original filename as declared by the uploader.
    pub filename: String,
    /// Size claimed by the uploader, in bytes.
    pub declared_size: u64,
    /// Page count claimed by the uploader, if any.
    pub declared_pages: Option<u32>,
    /// Raw PDF bytes.
    pub content: Vec<u8>,
}

impl Document {
    /// Create a document whose declared size is its actual size.
    pub fn new(filename: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            filename: filename.into(),
            declared_size: content.len() as u64,
            declared_pages: None,
            content,
        }
    }

    /// Override the size claimed by the uploader.
    pub fn with_declared_size(mut self, size: u64) -> Self {
        self.declared_size = size;
        self
    }

    /// Record the page count claimed by the uploader.
    pub fn with_declared_pages(mut self, pages: u32) -> Self {
        self.declared_pages = Some(pages);
        self
    }

    /// Measured size of the content in bytes.
    pub fn byte_size(&self) -> u64 {
        self.content.len() as u64
    }
}

/// Text of a single page after normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Page number (1-indexed).
    pub number: u32,
    /// Normalized text. Empty when nothing could be extracted.
    pub text: String,
    /// Both extraction strategies failed for this page.
    pub degraded: bool,
}

impl Page {
    pub fn new(number: u32, text: String) -> Self {
        Self {
            number,
            text,
            degraded: false,
        }
    }

    pub fn degraded(number: u32) -> Self {
        Self {
            number,
            text: String::new(),
            degraded: true,
        }
    }
}
