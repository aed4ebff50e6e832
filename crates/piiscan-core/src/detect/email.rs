//! Email address detection.

use super::patterns::EMAIL;
use super::{CharIndex, PatternMatcher};
use crate::models::{Finding, FindingKind};

/// Matches RFC-shaped `local@domain.tld` tokens.
///
/// No RFC 5322 validation is done; near-miss strings may match.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmailMatcher;

impl EmailMatcher {
    pub fn new() -> Self {
        Self
    }
}

impl PatternMatcher for EmailMatcher {
    fn kind(&self) -> FindingKind {
        FindingKind::Email
    }

    fn find_all(&self, text: &str, page: u32) -> Vec<Finding> {
        let mut index = CharIndex::new(text);
        EMAIL
            .find_iter(text)
            .map(|m| {
                let start = index.char_offset(m.start());
                let end = index.char_offset(m.end());
                Finding::new(FindingKind::Email, m.as_str(), page, start, end)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_single_email() {
        let findings = EmailMatcher::new().find_all("Contact: user@example.com today", 1);
        assert_eq!(findings, vec![Finding::new(FindingKind::Email, "user@example.com", 1, 9, 25)]);
    }

    #[test]
    fn test_common_formats() {
        let text = "first.last+tag@mail.example.co.uk, a_b%c-d@x-y.org";
        let values: Vec<_> = EmailMatcher::new()
            .find_all(text, 1)
            .into_iter()
            .map(|f| f.value)
            .collect();
        assert_eq!(values, vec!["first.last+tag@mail.example.co.uk", "a_b%c-d@x-y.org"]);
    }

    #[test]
    fn test_rejects_single_letter_tld() {
        assert!(EmailMatcher::new().find_all("user@example.c", 1).is_empty());
        assert!(EmailMatcher::new().find_all("no at sign here", 1).is_empty());
    }

    #[test]
    fn test_offsets_are_characters() {
        let text = "Łódź · bob@corp.io";
        let findings = EmailMatcher::new().find_all(text, 3);
        assert_eq!(findings.len(), 1);
        let f = &findings[0];
        let slice: String = text.chars().skip(f.start).take(f.len()).collect();
        assert_eq!(slice, "bob@corp.io");
        assert_eq!(f.start, 7);
        assert_eq!(f.page, 3);
    }
}
