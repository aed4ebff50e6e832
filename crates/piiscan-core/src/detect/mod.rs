//! Rule-based detection of sensitive data in page text.

pub mod email;
pub mod patterns;
pub mod ssn;

pub use email::EmailMatcher;
pub use ssn::{is_issuable, SsnMatcher};

use crate::models::{Finding, FindingKind};

/// Trait for sensitive data matchers.
///
/// Implementations are pure: the same text always yields the same findings.
pub trait PatternMatcher: Send + Sync {
    /// The kind of finding this matcher produces.
    fn kind(&self) -> FindingKind;

    /// Find every occurrence in `text`, left to right.
    fn find_all(&self, text: &str, page: u32) -> Vec<Finding>;
}

/// Runs every enabled matcher over a page and merges the results.
pub struct SensitiveDataMatcher {
    matchers: Vec<Box<dyn PatternMatcher>>,
}

impl SensitiveDataMatcher {
    /// Email and structural SSN matching.
    pub fn new() -> Self {
        Self {
            matchers: vec![Box::new(EmailMatcher::new()), Box::new(SsnMatcher::new())],
        }
    }

    /// Build from an explicit matcher set.
    pub fn with_matchers(matchers: Vec<Box<dyn PatternMatcher>>) -> Self {
        Self { matchers }
    }

    /// All findings on a page ordered by start offset; ties keep kind order.
    pub fn find_all(&self, text: &str, page: u32) -> Vec<Finding> {
        let mut findings: Vec<Finding> = self
            .matchers
            .iter()
            .flat_map(|m| m.find_all(text, page))
            .collect();
        findings.sort_by(|a, b| (a.start, a.kind).cmp(&(b.start, b.kind)));
        findings
    }
}

impl Default for SensitiveDataMatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts increasing byte offsets into character offsets in one pass.
pub(crate) struct CharIndex<'a> {
    text: &'a str,
    byte: usize,
    chars: usize,
}

impl<'a> CharIndex<'a> {
    pub(crate) fn new(text: &'a str) -> Self {
        Self {
            text,
            byte: 0,
            chars: 0,
        }
    }

    /// Character offset of `byte`, which must lie on a char boundary.
    pub(crate) fn char_offset(&mut self, byte: usize) -> usize {
        if byte < self.byte {
            self.byte = 0;
            self.chars = 0;
        }
        self.chars += self.text[self.byte..byte].chars().count();
        self.byte = byte;
        self.chars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_merged_in_scan_order() {
        let text = "SSN 123-45-6789 belongs to jane@doe.org; alt 987654321";
        let findings = SensitiveDataMatcher::new().find_all(text, 1);

        let summary: Vec<_> = findings.iter().map(|f| (f.kind, f.value.as_str())).collect();
        assert_eq!(
            summary,
            vec![
                (FindingKind::Ssn, "123-45-6789"),
                (FindingKind::Email, "jane@doe.org"),
                (FindingKind::Ssn, "987654321"),
            ]
        );
    }

    #[test]
    fn test_offsets_point_at_values() {
        let text = "ünïcödé first: alice@corp.io\nSSN: 123 45 6789";
        for f in SensitiveDataMatcher::new().find_all(text, 1) {
            let slice: String = text.chars().skip(f.start).take(f.end - f.start).collect();
            assert_eq!(slice, f.value);
            assert!(f.start < f.end && f.end <= text.chars().count());
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "a@b.io 123456789 c@d.io";
        let matcher = SensitiveDataMatcher::new();
        assert_eq!(matcher.find_all(text, 4), matcher.find_all(text, 4));
    }

    #[test]
    fn test_char_index_resets() {
        let mut index = CharIndex::new("héllo");
        assert_eq!(index.char_offset(3), 2);
        assert_eq!(index.char_offset(1), 1);
    }
}
