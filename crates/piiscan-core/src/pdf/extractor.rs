//! PDF text extraction using pdf-extract with a lopdf fallback.

use std::borrow::Cow;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use lopdf::Document;
use tracing::{debug, trace, warn};

use super::normalize::normalize_text;
use super::{DocumentInfo, ExtractedDocument, TextExtractor};
use crate::budget::JobBudget;
use crate::error::{PdfError, Result, ScanError};
use crate::models::config::LimitsConfig;
use crate::models::Page;

const PDF_MAGIC: &[u8] = b"%PDF";

/// Resource ceilings enforced during extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionLimits {
    /// Largest accepted input, inclusive.
    pub max_file_size: u64,
    /// Largest accepted page count, inclusive.
    pub max_pages: u32,
    /// Wall-clock budget for one document.
    pub timeout: Duration,
}

impl Default for ExtractionLimits {
    fn default() -> Self {
        Self::from(&LimitsConfig::default())
    }
}

impl From<&LimitsConfig> for ExtractionLimits {
    fn from(config: &LimitsConfig) -> Self {
        Self {
            max_file_size: config.max_file_size,
            max_pages: config.max_pages,
            timeout: config.timeout(),
        }
    }
}

/// PDF text extractor.
///
/// The primary strategy renders each page with pdf-extract; pages it leaves
/// blank or fails on go through lopdf's own text extraction. The budget is
/// checked before every page. Both run under `catch_unwind` since malformed
/// input can panic deep inside font decoding.
#[derive(Debug, Clone, Default)]
pub struct PdfExtractor {
    limits: ExtractionLimits,
}

/// A parsed document plus the bytes the extractors should read.
pub(crate) struct LoadedPdf<'a> {
    pub(crate) document: Document,
    raw: Cow<'a, [u8]>,
}

impl PdfExtractor {
    /// Create an extractor with the given ceilings.
    pub fn new(limits: ExtractionLimits) -> Self {
        Self { limits }
    }

    /// Fail if `size` is over the ceiling. Exactly at the ceiling passes.
    pub fn check_size(&self, size: u64) -> Result<()> {
        if size > self.limits.max_file_size {
            return Err(ScanError::SizeExceeded {
                limit: self.limits.max_file_size,
                actual: size,
            });
        }
        Ok(())
    }

    /// Fail if `pages` is over the ceiling.
    pub fn check_page_count(&self, pages: u32) -> Result<()> {
        if pages > self.limits.max_pages {
            return Err(ScanError::PageCountExceeded {
                limit: self.limits.max_pages,
                actual: pages,
            });
        }
        Ok(())
    }

    /// Report size, page count and validity without extracting text.
    pub fn inspect(&self, data: &[u8]) -> DocumentInfo {
        let file_size = data.len() as u64;
        match self.load(data) {
            Ok(loaded) => DocumentInfo {
                file_size,
                total_pages: loaded.document.get_pages().len() as u32,
                is_valid: true,
                error: None,
            },
            Err(e) => DocumentInfo {
                file_size,
                total_pages: 0,
                is_valid: false,
                error: Some(e.to_string()),
            },
        }
    }

    pub(crate) fn load<'a>(&self, data: &'a [u8]) -> Result<LoadedPdf<'a>> {
        if data.is_empty() {
            return Err(ScanError::InvalidInput("empty upload".to_string()));
        }
        self.check_size(data.len() as u64)?;

        if !data.starts_with(PDF_MAGIC) {
            return Err(ScanError::InvalidInput("missing %PDF header".to_string()));
        }

        let mut document = Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;

        // Handle PDFs with empty password encryption
        let raw = if document.is_encrypted() {
            if document.decrypt("").is_err() {
                return Err(PdfError::Encrypted.into());
            }
            debug!("Decrypted PDF with empty password");

            // Save decrypted document so pdf-extract sees plain streams
            let mut decrypted = Vec::new();
            document
                .save_to(&mut decrypted)
                .map_err(|e| PdfError::Write(format!("failed to save decrypted PDF: {}", e)))?;
            Cow::Owned(decrypted)
        } else {
            Cow::Borrowed(data)
        };

        if document.get_pages().is_empty() {
            return Err(PdfError::NoPages.into());
        }

        Ok(LoadedPdf { document, raw })
    }

    /// Parse the bytes with pdf-extract's own lopdf so pages render one at a time.
    fn primary_document(raw: &[u8]) -> Option<pdf_extract::Document> {
        match panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::Document::load_mem(raw))) {
            Ok(Ok(document)) => Some(document),
            Ok(Err(e)) => {
                debug!("Primary extractor could not parse document: {}", e);
                None
            }
            Err(_) => {
                warn!("Primary extractor panicked while parsing, falling back to lopdf");
                None
            }
        }
    }

    fn primary_page_text(document: &pdf_extract::Document, page: u32) -> Option<String> {
        let render = || -> std::result::Result<String, pdf_extract::OutputError> {
            let mut text = String::new();
            {
                let mut output = pdf_extract::PlainTextOutput::new(&mut text);
                pdf_extract::output_doc_page(document, &mut output, page)?;
            }
            Ok(text)
        };

        match panic::catch_unwind(AssertUnwindSafe(render)) {
            Ok(Ok(text)) => Some(text),
            Ok(Err(e)) => {
                debug!("Primary extraction failed on page {}: {}", page, e);
                None
            }
            Err(_) => {
                warn!("Primary extraction panicked on page {}, falling back to lopdf", page);
                None
            }
        }
    }

    fn secondary_page_text(document: &Document, page: u32) -> std::result::Result<String, PdfError> {
        match panic::catch_unwind(AssertUnwindSafe(|| document.extract_text(&[page]))) {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(PdfError::TextExtraction(e.to_string())),
            Err(_) => Err(PdfError::TextExtraction(format!("extractor panicked on page {}", page))),
        }
    }
}

impl TextExtractor for PdfExtractor {
    fn extract(&self, data: &[u8], budget: &JobBudget) -> Result<ExtractedDocument> {
        let loaded = self.load(data)?;
        let total_pages = loaded.document.get_pages().len() as u32;
        self.check_page_count(total_pages)?;
        budget.check()?;

        let primary = Self::primary_document(&loaded.raw);
        budget.check()?;

        let mut pages = Vec::with_capacity(total_pages as usize);
        for number in 1..=total_pages {
            budget.check()?;

            let primary_text = primary.as_ref().and_then(|doc| Self::primary_page_text(doc, number));
            let primary_ok = primary_text.is_some();

            let page = match primary_text.filter(|text| !text.trim().is_empty()) {
                Some(text) => Page::new(number, normalize_text(&text)),
                None => match Self::secondary_page_text(&loaded.document, number) {
                    Ok(text) => {
                        trace!("Page {} extracted by fallback", number);
                        Page::new(number, normalize_text(&text))
                    }
                    // Primary rendered the page and found nothing: a blank page.
                    Err(e) if primary_ok => {
                        trace!("Page {} is blank ({})", number, e);
                        Page::new(number, String::new())
                    }
                    Err(e) => {
                        warn!("No text on page {} after both strategies: {}", number, e);
                        Page::degraded(number)
                    }
                },
            };
            pages.push(page);
        }

        debug!(
            "Extracted {} pages, {} chars, {} degraded",
            total_pages,
            pages.iter().map(|p| p.text.len()).sum::<usize>(),
            pages.iter().filter(|p| p.degraded).count()
        );

        Ok(ExtractedDocument { pages, total_pages })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::pdf_with_pages;
    use pretty_assertions::assert_eq;

    fn limits(max_file_size: u64, max_pages: u32) -> ExtractionLimits {
        ExtractionLimits {
            max_file_size,
            max_pages,
            timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_extracts_pages_in_order() {
        let pdf = pdf_with_pages(&[&["Contact: alice@corp.io"], &["SSN: 987-65-4320"], &["Nothing here"]]);
        let extracted = PdfExtractor::default()
            .extract(&pdf, &JobBudget::unlimited())
            .unwrap();

        assert_eq!(extracted.total_pages, 3);
        assert_eq!(extracted.pages.iter().map(|p| p.number).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(extracted.pages[0].text.contains("alice@corp.io"));
        assert!(extracted.pages[1].text.contains("987-65-4320"));
        assert!(extracted.degraded_pages().is_empty());
    }

    #[test]
    fn test_primary_renders_one_page() {
        let pdf = pdf_with_pages(&[&["first page"], &["second page"]]);
        let document = PdfExtractor::primary_document(&pdf).unwrap();

        let second = PdfExtractor::primary_page_text(&document, 2).unwrap();
        assert!(second.contains("second"));
        assert!(!second.contains("first"));
        assert!(PdfExtractor::primary_page_text(&document, 3).is_none());
    }

    #[test]
    fn test_cancelled_budget_stops_extraction() {
        let pdf = pdf_with_pages(&[&["a"], &["b"], &["c"]]);
        let budget = JobBudget::unlimited();
        budget.cancel();
        let result = PdfExtractor::default().extract(&pdf, &budget);
        assert!(matches!(result, Err(ScanError::ProcessingTimeout { .. })));
    }

    #[test]
    fn test_deterministic() {
        let pdf = pdf_with_pages(&[&["one  two", "three"]]);
        let extractor = PdfExtractor::default();
        let a = extractor.extract(&pdf, &JobBudget::unlimited()).unwrap();
        let b = extractor.extract(&pdf, &JobBudget::unlimited()).unwrap();
        assert_eq!(a.pages, b.pages);
    }

    #[test]
    fn test_size_boundary() {
        let pdf = pdf_with_pages(&[&["hello"]]);
        let size = pdf.len() as u64;

        let at_limit = PdfExtractor::new(limits(size, 10));
        assert!(at_limit.extract(&pdf, &JobBudget::unlimited()).is_ok());

        let under = PdfExtractor::new(limits(size - 1, 10));
        match under.extract(&pdf, &JobBudget::unlimited()) {
            Err(ScanError::SizeExceeded { limit, actual }) => {
                assert_eq!(limit, size - 1);
                assert_eq!(actual, size);
            }
            other => panic!("expected SizeExceeded, got {:?}", other),
        }
    }

    #[test]
    fn test_page_ceiling() {
        let pdf = pdf_with_pages(&[&["a"], &["b"], &["c"]]);
        let result = PdfExtractor::new(limits(1 << 20, 2)).extract(&pdf, &JobBudget::unlimited());
        assert!(matches!(result, Err(ScanError::PageCountExceeded { limit: 2, actual: 3 })));
    }

    #[test]
    fn test_rejects_garbage() {
        let extractor = PdfExtractor::default();
        let budget = JobBudget::unlimited();

        assert!(matches!(extractor.extract(b"", &budget), Err(ScanError::InvalidInput(_))));
        assert!(matches!(
            extractor.extract(b"hello, not a pdf", &budget),
            Err(ScanError::InvalidInput(_))
        ));
        let truncated = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog";
        assert_eq!(
            extractor.extract(truncated, &budget).unwrap_err().kind(),
            crate::ErrorKind::InvalidInput
        );
    }

    #[test]
    fn test_expired_budget_times_out() {
        let pdf = pdf_with_pages(&[&["a"]]);
        let result = PdfExtractor::default().extract(&pdf, &JobBudget::new(Duration::ZERO));
        assert!(matches!(result, Err(ScanError::ProcessingTimeout { .. })));
    }

    #[test]
    fn test_inspect() {
        let pdf = pdf_with_pages(&[&["a"], &["b"]]);
        let info = PdfExtractor::default().inspect(&pdf);
        assert!(info.is_valid);
        assert_eq!(info.total_pages, 2);
        assert_eq!(info.file_size, pdf.len() as u64);

        let info = PdfExtractor::default().inspect(b"nope");
        assert!(!info.is_valid);
        assert!(info.error.is_some());
    }
}
