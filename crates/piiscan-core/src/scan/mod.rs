//! Scan coordination: validate, extract, match, assemble.

use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::budget::JobBudget;
use crate::detect::SensitiveDataMatcher;
use crate::error::{Result, ScanError};
use crate::metrics::{MetricsHandle, ScanSample};
use crate::models::{Document, DocumentMeta, Finding, ScanConfig, ScanResult, ScanStatus, StageTimings};
use crate::pdf::{ExtractionLimits, PdfExtractor, TextExtractor};
use crate::redact::{RedactionReport, Redactor};

/// Operation label for plain scans.
pub const OP_SCAN: &str = "scan";

/// Operation label for scans followed by redaction.
pub const OP_SCAN_AND_REDACT: &str = "scan_and_redact";

/// A scan result plus the redacted document, when redaction ran.
#[derive(Debug)]
pub struct ScanOutcome {
    pub result: ScanResult,
    /// `None` when the scan failed; otherwise the redaction attempt.
    pub redaction: Option<Result<RedactionReport>>,
}

/// Runs one document through the pipeline.
///
/// A coordinator holds no per-document state and is shared by every worker.
pub struct ScanCoordinator {
    config: ScanConfig,
    extractor: Box<dyn TextExtractor>,
    matcher: SensitiveDataMatcher,
    redactor: Redactor,
    metrics: Option<MetricsHandle>,
}

impl ScanCoordinator {
    /// Create a coordinator with the default extractor and matchers.
    pub fn new(config: ScanConfig) -> Self {
        let limits = ExtractionLimits::from(&config.limits);
        Self {
            extractor: Box::new(PdfExtractor::new(limits)),
            matcher: SensitiveDataMatcher::new(),
            redactor: Redactor::new(limits),
            metrics: None,
            config,
        }
    }

    /// Report a sample per scan to `metrics`.
    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Replace the text extractor.
    pub fn with_extractor(mut self, extractor: Box<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Replace the matcher set.
    pub fn with_matcher(mut self, matcher: SensitiveDataMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scan with a fresh budget of the configured timeout.
    pub fn scan(&self, document: Document) -> ScanResult {
        let budget = JobBudget::new(self.config.limits.timeout());
        self.scan_with_budget(document, &budget)
    }

    /// Scan under a caller-owned budget. The document is dropped on return.
    pub fn scan_with_budget(&self, document: Document, budget: &JobBudget) -> ScanResult {
        let result = self.run(&document, budget);
        drop(document);
        self.record(OP_SCAN, &result);
        result
    }

    /// Scan, then redact the findings out of the original bytes.
    pub fn scan_and_redact(&self, document: Document) -> ScanOutcome {
        let budget = JobBudget::new(self.config.limits.timeout());
        self.scan_and_redact_with_budget(document, &budget)
    }

    pub fn scan_and_redact_with_budget(&self, document: Document, budget: &JobBudget) -> ScanOutcome {
        let result = self.run(&document, budget);
        self.record(OP_SCAN_AND_REDACT, &result);

        let redaction = match result.status {
            ScanStatus::Failed => None,
            _ => {
                let start = Instant::now();
                let report = self.redactor.redact(&document.content, &result.findings);
                match &report {
                    Ok(r) => debug!(
                        "Redaction of {} finished in {:?}: {} redacted, {} warnings",
                        result.document_id,
                        start.elapsed(),
                        r.redacted_count,
                        r.warnings.len()
                    ),
                    Err(e) => warn!("Redaction of {} failed: {}", result.document_id, e),
                }
                Some(report)
            }
        };

        ScanOutcome { result, redaction }
    }

    fn run(&self, document: &Document, budget: &JobBudget) -> ScanResult {
        let start = Instant::now();
        let meta = DocumentMeta::from(document);
        let mut timings = StageTimings::default();

        info!("Scanning {} ({}, {} bytes)", document.id, document.filename, meta.file_size);

        let stage = Instant::now();
        let validated = self.validate(document);
        timings.validate_ms = elapsed_ms(stage);
        if let Err(e) = validated {
            return self.failed(meta, &e, start, timings);
        }

        let stage = Instant::now();
        let extracted = self.extractor.extract(&document.content, budget);
        timings.extract_ms = elapsed_ms(stage);
        let extracted = match extracted {
            Ok(extracted) => extracted,
            Err(e) => return self.failed(meta, &e, start, timings),
        };

        if let Some(declared) = document.declared_pages.filter(|&d| d != extracted.total_pages) {
            debug!(
                "Document {} declared {} pages, has {}",
                document.id, declared, extracted.total_pages
            );
        }

        let stage = Instant::now();
        let mut degraded = extracted.degraded_pages();
        let mut findings: Vec<Finding> = Vec::new();
        for page in &extracted.pages {
            if let Err(e) = budget.check() {
                timings.match_ms = elapsed_ms(stage);
                return self.failed(meta, &e, start, timings);
            }
            if page.degraded {
                continue;
            }

            let matched = panic::catch_unwind(AssertUnwindSafe(|| self.matcher.find_all(&page.text, page.number)));
            match matched {
                Ok(page_findings) => findings.extend(page_findings),
                Err(_) => {
                    warn!("Matcher panicked on page {} of {}", page.number, document.id);
                    degraded.push(page.number);
                }
            }
        }
        timings.match_ms = elapsed_ms(stage);
        degraded.sort_unstable();

        let result = ScanResult::completed(meta, extracted.total_pages, findings, degraded, start.elapsed(), timings);
        info!(
            "Scanned {} in {}ms: {} findings, status {}",
            result.document_id, result.processing_time_ms, result.findings_count, result.status
        );
        result
    }

    /// Checks that need no parsing: emptiness and the declared figures.
    fn validate(&self, document: &Document) -> Result<()> {
        let limits = &self.config.limits;

        if document.content.is_empty() {
            return Err(ScanError::InvalidInput("empty upload".to_string()));
        }

        for size in [document.declared_size, document.byte_size()] {
            if size > limits.max_file_size {
                return Err(ScanError::SizeExceeded {
                    limit: limits.max_file_size,
                    actual: size,
                });
            }
        }

        if let Some(pages) = document.declared_pages.filter(|&p| p > limits.max_pages) {
            return Err(ScanError::PageCountExceeded {
                limit: limits.max_pages,
                actual: pages,
            });
        }

        Ok(())
    }

    fn failed(&self, meta: DocumentMeta, error: &ScanError, start: Instant, timings: StageTimings) -> ScanResult {
        warn!("Scan of {} ({}) failed: {}", meta.id, meta.filename, error);
        ScanResult::failed(meta, error, start.elapsed(), timings)
    }

    fn record(&self, operation: &'static str, result: &ScanResult) {
        if let Some(metrics) = &self.metrics {
            metrics.record_scan(ScanSample::from_result(operation, result));
        }
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::metrics::MetricsCollector;
    use crate::models::{FindingKind, Page};
    use crate::pdf::ExtractedDocument;
    use crate::redact::RedactionStatus;
    use crate::testing::{page_text, pdf_with_pages};
    use pretty_assertions::assert_eq;

    fn three_pages() -> Vec<u8> {
        pdf_with_pages(&[&["Contact: alice@corp.io"], &["SSN: 987-65-4320"], &["Nothing here."]])
    }

    #[test]
    fn test_end_to_end_three_pages() {
        let coordinator = ScanCoordinator::new(ScanConfig::default());
        let result = coordinator.scan(Document::new("contacts.pdf", three_pages()));

        assert_eq!(result.status, ScanStatus::Success);
        assert_eq!(result.total_pages, 3);
        assert_eq!(result.findings_count, 2);
        assert_eq!(result.findings.len(), 2);
        assert!(result.error.is_none());

        let email = &result.findings[0];
        assert_eq!(email.kind, FindingKind::Email);
        assert_eq!(email.value, "alice@corp.io");
        assert_eq!(email.page, 1);

        let ssn = &result.findings[1];
        assert_eq!(ssn.kind, FindingKind::Ssn);
        assert_eq!(ssn.value, "987-65-4320");
        assert_eq!(ssn.page, 2);
    }

    #[test]
    fn test_offsets_point_into_page_text() {
        let pdf = three_pages();
        let coordinator = ScanCoordinator::new(ScanConfig::default());
        let result = coordinator.scan(Document::new("contacts.pdf", pdf.clone()));

        for finding in &result.findings {
            let text = page_text(&pdf, finding.page);
            let slice: String = text.chars().skip(finding.start).take(finding.len()).collect();
            assert_eq!(slice, finding.value);
            assert!(finding.end <= text.chars().count());
        }
    }

    #[test]
    fn test_idempotent() {
        let pdf = three_pages();
        let coordinator = ScanCoordinator::new(ScanConfig::default());
        let first = coordinator.scan(Document::new("a.pdf", pdf.clone()));
        let second = coordinator.scan(Document::new("a.pdf", pdf));
        assert_eq!(first.findings, second.findings);
    }

    #[test]
    fn test_size_boundary() {
        let pdf = three_pages();
        let mut config = ScanConfig::default();
        config.limits.max_file_size = pdf.len() as u64;

        let at_limit = ScanCoordinator::new(config.clone()).scan(Document::new("a.pdf", pdf.clone()));
        assert_eq!(at_limit.status, ScanStatus::Success);

        config.limits.max_file_size = pdf.len() as u64 - 1;
        let over = ScanCoordinator::new(config).scan(Document::new("a.pdf", pdf));
        assert_eq!(over.status, ScanStatus::Failed);
        assert_eq!(over.error_kind, Some(ErrorKind::SizeExceeded));
        assert_eq!(over.findings_count, 0);
    }

    #[test]
    fn test_declared_figures_checked_before_parsing() {
        let mut config = ScanConfig::default();
        config.limits.max_pages = 10;
        let coordinator = ScanCoordinator::new(config);

        let oversized = Document::new("a.pdf", b"not even a pdf".to_vec()).with_declared_size(u64::MAX);
        assert_eq!(coordinator.scan(oversized).error_kind, Some(ErrorKind::SizeExceeded));

        let too_long = Document::new("a.pdf", b"not even a pdf".to_vec()).with_declared_pages(11);
        assert_eq!(coordinator.scan(too_long).error_kind, Some(ErrorKind::PageCountExceeded));
    }

    #[test]
    fn test_unparsable_fails_cleanly() {
        let coordinator = ScanCoordinator::new(ScanConfig::default());

        for content in [Vec::new(), b"%PDF-1.4 garbage".to_vec(), b"hello".to_vec()] {
            let result = coordinator.scan(Document::new("bad.pdf", content));
            assert_eq!(result.status, ScanStatus::Failed);
            assert_eq!(result.findings_count, 0);
            assert_eq!(result.error_kind, Some(ErrorKind::InvalidInput));
            assert!(!result.error.unwrap().is_empty());
        }
    }

    #[test]
    fn test_zero_page_document_fails() {
        let coordinator = ScanCoordinator::new(ScanConfig::default());
        let result = coordinator.scan(Document::new("empty.pdf", pdf_with_pages(&[])));

        assert_eq!(result.status, ScanStatus::Failed);
        assert_eq!(result.total_pages, 0);
        assert_eq!(result.findings_count, 0);
        assert!(result.findings.is_empty());
        assert_eq!(result.error_kind, Some(ErrorKind::InvalidInput));
        assert!(result.error.unwrap().contains("no pages"));
    }

    struct FixedExtractor(Vec<Page>);

    impl TextExtractor for FixedExtractor {
        fn extract(&self, _data: &[u8], _budget: &JobBudget) -> Result<ExtractedDocument> {
            Ok(ExtractedDocument {
                total_pages: self.0.len() as u32,
                pages: self.0.clone(),
            })
        }
    }

    #[test]
    fn test_degraded_page_makes_partial() {
        let pages = vec![
            Page::new(1, "mail bob@corp.io".to_string()),
            Page::degraded(2),
            Page::new(3, "123-45-6789".to_string()),
        ];
        let coordinator =
            ScanCoordinator::new(ScanConfig::default()).with_extractor(Box::new(FixedExtractor(pages)));

        let result = coordinator.scan(Document::new("a.pdf", b"%PDF".to_vec()));
        assert_eq!(result.status, ScanStatus::Partial);
        assert_eq!(result.degraded_pages, vec![2]);
        assert_eq!(result.error_kind, Some(ErrorKind::ExtractionDegraded));
        assert_eq!(result.findings_count, 2);
        assert_eq!(result.findings[1].page, 3);
    }

    struct PanickyMatcher;

    impl crate::detect::PatternMatcher for PanickyMatcher {
        fn kind(&self) -> FindingKind {
            FindingKind::Email
        }

        fn find_all(&self, text: &str, _page: u32) -> Vec<Finding> {
            if text.contains("boom") {
                panic!("matcher failure");
            }
            Vec::new()
        }
    }

    #[test]
    fn test_matcher_panic_degrades_only_that_page() {
        let pages = vec![Page::new(1, "boom".to_string()), Page::new(2, "123-45-6789".to_string())];
        let matcher = SensitiveDataMatcher::with_matchers(vec![
            Box::new(PanickyMatcher),
            Box::new(crate::detect::SsnMatcher::new()),
        ]);
        let coordinator = ScanCoordinator::new(ScanConfig::default())
            .with_extractor(Box::new(FixedExtractor(pages)))
            .with_matcher(matcher);

        let result = coordinator.scan(Document::new("a.pdf", b"%PDF".to_vec()));
        assert_eq!(result.status, ScanStatus::Partial);
        assert_eq!(result.degraded_pages, vec![1]);
        assert_eq!(result.findings_count, 1);
        assert_eq!(result.findings[0].page, 2);
    }

    #[test]
    fn test_expired_budget_fails_with_timeout() {
        let coordinator = ScanCoordinator::new(ScanConfig::default());
        let budget = JobBudget::new(std::time::Duration::ZERO);
        let result = coordinator.scan_with_budget(Document::new("a.pdf", three_pages()), &budget);
        assert_eq!(result.status, ScanStatus::Failed);
        assert_eq!(result.error_kind, Some(ErrorKind::ProcessingTimeout));
    }

    #[test]
    fn test_scan_and_redact() {
        let coordinator = ScanCoordinator::new(ScanConfig::default());
        let outcome = coordinator.scan_and_redact(Document::new("a.pdf", three_pages()));

        assert_eq!(outcome.result.findings_count, 2);
        let report = outcome.redaction.unwrap().unwrap();
        assert_eq!(report.status, RedactionStatus::Redacted);
        assert_eq!(report.redacted_count, 2);
        assert!(!page_text(&report.pdf, 1).contains("alice@corp.io"));
        assert!(!page_text(&report.pdf, 2).contains("987-65-4320"));

        let failed = coordinator.scan_and_redact(Document::new("a.pdf", b"junk".to_vec()));
        assert!(failed.redaction.is_none());
    }

    #[tokio::test]
    async fn test_records_one_sample_per_scan() {
        let (metrics, _task) = MetricsCollector::spawn().unwrap();
        let coordinator = ScanCoordinator::new(ScanConfig::default()).with_metrics(metrics.clone());

        coordinator.scan(Document::new("a.pdf", three_pages()));
        coordinator.scan(Document::new("b.pdf", b"junk".to_vec()));

        let snapshot = metrics.snapshot().await.unwrap();
        assert_eq!(snapshot.documents_processed(), 2);
        assert_eq!(snapshot.findings_of(FindingKind::Email), 1);
        assert_eq!(snapshot.findings_of(FindingKind::Ssn), 1);
        assert_eq!(snapshot.errors_of(ErrorKind::InvalidInput), 1);
    }
}
