//! Redaction of detected values in the source PDF.
//!
//! Values are located in the text-showing operators of each page's content
//! stream. Matched bytes are overwritten with spaces, so the value no longer
//! extracts, and a filled black box is painted over the estimated glyph area.
//! Glyph widths are not read from font metrics; the box is an estimate based
//! on the current font size and text matrix.

use std::collections::BTreeMap;

use lopdf::content::Operation;
use lopdf::{Document, Object, ObjectId};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{PdfError, Result};
use crate::models::{Finding, FindingKind};
use crate::pdf::{ExtractionLimits, PdfExtractor};

/// Average glyph advance as a fraction of the font size.
const GLYPH_WIDTH: f32 = 0.55;
const BOX_HEIGHT: f32 = 1.2;
const DESCENT: f32 = 0.2;
const DEFAULT_FONT_SIZE: f32 = 12.0;
const IDENTITY: [f32; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// Whether anything had to be redacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedactionStatus {
    Redacted,
    NotNeeded,
}

/// A finding that could not be redacted. Carries no sensitive value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactionWarning {
    pub page: u32,
    pub kind: FindingKind,
    pub reason: String,
}

/// Outcome of redacting one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedactionReport {
    pub status: RedactionStatus,
    /// Occurrences blanked across all pages.
    pub redacted_count: usize,
    pub warnings: Vec<RedactionWarning>,
    #[serde(skip)]
    pub pdf: Vec<u8>,
}

impl RedactionReport {
    fn not_needed(pdf: Vec<u8>) -> Self {
        Self {
            status: RedactionStatus::NotNeeded,
            redacted_count: 0,
            warnings: Vec::new(),
            pdf,
        }
    }
}

/// Rewrites PDFs with findings blanked and boxed out.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    extractor: PdfExtractor,
}

impl Redactor {
    pub fn new(limits: ExtractionLimits) -> Self {
        Self {
            extractor: PdfExtractor::new(limits),
        }
    }

    /// Redact every finding from `data`.
    ///
    /// Findings that cannot be located become warnings. Fails only when the
    /// document cannot be loaded or written back.
    pub fn redact(&self, data: &[u8], findings: &[Finding]) -> Result<RedactionReport> {
        if findings.is_empty() {
            return Ok(RedactionReport::not_needed(data.to_vec()));
        }

        let mut document = self.extractor.load(data)?.document;
        let pages = document.get_pages();

        let mut targets: BTreeMap<u32, BTreeMap<&str, FindingKind>> = BTreeMap::new();
        for finding in findings {
            targets
                .entry(finding.page)
                .or_default()
                .insert(finding.value.as_str(), finding.kind);
        }

        let mut redacted_count = 0;
        let mut warnings = Vec::new();

        for (page, values) in targets {
            let Some(&page_id) = pages.get(&page) else {
                warn!("Cannot redact on page {}: page does not exist", page);
                warnings.extend(values.values().map(|&kind| RedactionWarning {
                    page,
                    kind,
                    reason: format!("page {} does not exist", page),
                }));
                continue;
            };

            let needles: Vec<&str> = values.keys().copied().collect();
            match redact_page(&mut document, page_id, &needles) {
                Ok(hits) => {
                    for (value, count) in needles.iter().zip(hits) {
                        if count == 0 {
                            let kind = values[value];
                            debug!("No {} occurrence located in page {} content", kind, page);
                            warnings.push(RedactionWarning {
                                page,
                                kind,
                                reason: "value not found in page content".to_string(),
                            });
                        }
                        redacted_count += count;
                    }
                }
                Err(e) => {
                    warn!("Cannot redact page {}: {}", page, e);
                    warnings.extend(values.values().map(|&kind| RedactionWarning {
                        page,
                        kind,
                        reason: e.to_string(),
                    }));
                }
            }
        }

        let mut pdf = Vec::new();
        document
            .save_to(&mut pdf)
            .map_err(|e| PdfError::Write(e.to_string()))?;

        debug!("Redacted {} occurrences, {} warnings", redacted_count, warnings.len());

        Ok(RedactionReport {
            status: RedactionStatus::Redacted,
            redacted_count,
            warnings,
            pdf,
        })
    }
}

/// Blank every occurrence of each needle on one page.
///
/// Returns the number of occurrences found per needle. The page content is
/// only rewritten when something was found.
fn redact_page(document: &mut Document, page_id: ObjectId, needles: &[&str]) -> std::result::Result<Vec<usize>, PdfError> {
    let content = document
        .get_and_decode_page_content(page_id)
        .map_err(|e| PdfError::Parse(e.to_string()))?;

    let mut state = TextState::default();
    let mut hits = vec![0usize; needles.len()];
    let mut boxes = Vec::new();
    let mut operations = Vec::with_capacity(content.operations.len() + 4);
    operations.push(Operation::new("q", vec![]));

    for mut op in content.operations {
        state.apply(&op);

        let mut shown = shown_strings(&mut op);
        if !shown.is_empty() {
            let shown_len: usize = shown.iter().map(|s| s.len()).sum();
            for (i, needle) in needles.iter().enumerate() {
                let len = needle.chars().count();
                for start in blank_occurrences(&mut shown, needle.as_bytes()) {
                    hits[i] += 1;
                    boxes.push(state.glyph_box(start, len));
                }
            }
            state.advance(shown_len);
        }

        operations.push(op);
    }
    operations.push(Operation::new("Q", vec![]));

    if boxes.is_empty() {
        return Ok(hits);
    }

    operations.push(Operation::new("q", vec![]));
    operations.push(Operation::new("g", vec![0.into()]));
    for [x, y, w, h] in boxes {
        operations.push(Operation::new("re", vec![x.into(), y.into(), w.into(), h.into()]));
        operations.push(Operation::new("f", vec![]));
    }
    operations.push(Operation::new("Q", vec![]));

    let encoded = lopdf::content::Content { operations }
        .encode()
        .map_err(|e| PdfError::Write(e.to_string()))?;
    document
        .change_page_content(page_id, encoded)
        .map_err(|e| PdfError::Write(e.to_string()))?;

    Ok(hits)
}

/// String operands drawn by a text-showing operator.
fn shown_strings(op: &mut Operation) -> Vec<&mut Vec<u8>> {
    let index = match op.operator.as_str() {
        "Tj" | "TJ" | "'" => 0,
        "\"" => 2,
        _ => return Vec::new(),
    };

    match op.operands.get_mut(index) {
        Some(Object::String(bytes, _)) => vec![bytes],
        Some(Object::Array(items)) => items
            .iter_mut()
            .filter_map(|item| match item {
                Object::String(bytes, _) => Some(bytes),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Overwrite non-overlapping occurrences of `needle` with spaces.
///
/// The pieces are searched as one run so a value split across `TJ` array
/// elements is still found. Returns the start offset of each occurrence.
fn blank_occurrences(pieces: &mut [&mut Vec<u8>], needle: &[u8]) -> Vec<usize> {
    if needle.is_empty() {
        return Vec::new();
    }

    let joined: Vec<u8> = pieces.iter().flat_map(|p| p.iter().copied()).collect();
    let mut starts = Vec::new();
    let mut i = 0;
    while i + needle.len() <= joined.len() {
        if &joined[i..i + needle.len()] == needle {
            starts.push(i);
            i += needle.len();
        } else {
            i += 1;
        }
    }
    if starts.is_empty() {
        return starts;
    }

    let mut offset = 0;
    for piece in pieces.iter_mut() {
        for (j, byte) in piece.iter_mut().enumerate() {
            let pos = offset + j;
            if starts.iter().any(|&s| pos >= s && pos < s + needle.len()) {
                *byte = b' ';
            }
        }
        offset += piece.len();
    }
    starts
}

/// Text positioning state, enough to place a box over shown text.
#[derive(Debug, Clone, Copy)]
struct TextState {
    matrix: [f32; 6],
    line: [f32; 6],
    font_size: f32,
    leading: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            matrix: IDENTITY,
            line: IDENTITY,
            font_size: DEFAULT_FONT_SIZE,
            leading: 0.0,
        }
    }
}

impl TextState {
    fn apply(&mut self, op: &Operation) {
        let nums: Vec<f32> = op.operands.iter().filter_map(|o| o.as_float().ok()).collect();
        match op.operator.as_str() {
            "BT" => {
                self.matrix = IDENTITY;
                self.line = IDENTITY;
            }
            "Tf" => {
                if let Some(&size) = nums.first() {
                    self.font_size = size;
                }
            }
            "TL" => {
                if let Some(&leading) = nums.first() {
                    self.leading = leading;
                }
            }
            "Td" => {
                if let &[tx, ty] = nums.as_slice() {
                    self.next_line(tx, ty);
                }
            }
            "TD" => {
                if let &[tx, ty] = nums.as_slice() {
                    self.leading = -ty;
                    self.next_line(tx, ty);
                }
            }
            "Tm" => {
                if let &[a, b, c, d, e, f] = nums.as_slice() {
                    self.matrix = [a, b, c, d, e, f];
                    self.line = self.matrix;
                }
            }
            "T*" | "'" | "\"" => self.next_line(0.0, -self.leading),
            _ => {}
        }
    }

    fn next_line(&mut self, tx: f32, ty: f32) {
        let [a, b, c, d, e, f] = self.line;
        self.line = [a, b, c, d, e + tx * a + ty * c, f + tx * b + ty * d];
        self.matrix = self.line;
    }

    fn scale(&self) -> (f32, f32) {
        let sx = if self.matrix[0] == 0.0 { 1.0 } else { self.matrix[0].abs() };
        let sy = if self.matrix[3] == 0.0 { 1.0 } else { self.matrix[3].abs() };
        (sx, sy)
    }

    fn advance(&mut self, glyphs: usize) {
        let (sx, _) = self.scale();
        self.matrix[4] += glyphs as f32 * GLYPH_WIDTH * self.font_size * sx;
    }

    /// `[x, y, width, height]` covering `len` glyphs starting `start` glyphs
    /// after the current position.
    fn glyph_box(&self, start: usize, len: usize) -> [f32; 4] {
        let (sx, sy) = self.scale();
        let advance = GLYPH_WIDTH * self.font_size * sx;
        [
            self.matrix[4] + start as f32 * advance,
            self.matrix[5] - DESCENT * self.font_size * sy,
            len as f32 * advance,
            BOX_HEIGHT * self.font_size * sy,
        ]
    }
}
