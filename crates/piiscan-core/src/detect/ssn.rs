//! US Social Security number detection.

use super::patterns::SSN;
use super::{CharIndex, PatternMatcher};
use crate::models::{Finding, FindingKind};

/// Matches SSN-shaped digit groups (3-2-4) separated uniformly by `-`,
/// a single space, or nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct SsnMatcher {
    validate_area: bool,
}

impl SsnMatcher {
    /// Create a structural matcher (no number-range rules).
    pub fn new() -> Self {
        Self { validate_area: false }
    }

    /// Reject numbers the SSA never issues (area `000`, `666`, `9xx`,
    /// group `00`, serial `0000`).
    pub fn with_area_validation(mut self, validate: bool) -> Self {
        self.validate_area = validate;
        self
    }
}

impl PatternMatcher for SsnMatcher {
    fn kind(&self) -> FindingKind {
        FindingKind::Ssn
    }

    fn find_all(&self, text: &str, page: u32) -> Vec<Finding> {
        let mut index = CharIndex::new(text);
        let mut results = Vec::new();

        for caps in SSN.captures_iter(text) {
            let Some(full_match) = caps.get(0) else {
                continue;
            };
            if joined_to_digits(&text[..full_match.start()], &text[full_match.end()..]) {
                continue;
            }

            // Exactly one of the three alternatives participated.
            let groups = [(1, 2, 3), (4, 5, 6), (7, 8, 9)]
                .into_iter()
                .find_map(|(a, g, s)| Some((caps.get(a)?, caps.get(g)?, caps.get(s)?)));

            if self.validate_area {
                let Some((area, group, serial)) = groups else {
                    continue;
                };
                if !is_issuable(area.as_str(), group.as_str(), serial.as_str()) {
                    continue;
                }
            }

            let start = index.char_offset(full_match.start());
            let end = index.char_offset(full_match.end());
            results.push(Finding::new(FindingKind::Ssn, full_match.as_str(), page, start, end));
        }

        results
    }
}

/// Whether a match continues a separated digit run on either side, as in
/// `555-123-45-6789` or `4111 123 45 6789 0000`.
fn joined_to_digits(before: &str, after: &str) -> bool {
    let is_separator = |c: char| c == '-' || c.is_whitespace();

    let mut left = before.chars().rev();
    let left_joined = left.next().is_some_and(is_separator) && left.next().is_some_and(|c| c.is_ascii_digit());

    let mut right = after.chars();
    let right_joined = right.next().is_some_and(is_separator) && right.next().is_some_and(|c| c.is_ascii_digit());

    left_joined || right_joined
}

/// Whether an area/group/serial triple could have been issued.
pub fn is_issuable(area: &str, group: &str, serial: &str) -> bool {
    if area == "000" || area == "666" || area.starts_with('9') {
        return false;
    }
    group != "00" && serial != "0000"
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn values(text: &str) -> Vec<String> {
        SsnMatcher::new()
            .find_all(text, 1)
            .into_iter()
            .map(|f| f.value)
            .collect()
    }

    #[test]
    fn test_three_formats() {
        assert_eq!(values("SSN: 123-45-6789"), vec!["123-45-6789"]);
        assert_eq!(values("SSN: 123 45 6789"), vec!["123 45 6789"]);
        assert_eq!(values("SSN: 123456789"), vec!["123456789"]);
    }

    #[test]
    fn test_offsets() {
        let findings = SsnMatcher::new().find_all("SSN: 987-65-4320", 2);
        assert_eq!(findings, vec![Finding::new(FindingKind::Ssn, "987-65-4320", 2, 5, 16)]);
    }

    #[test]
    fn test_mixed_separators_rejected() {
        assert!(values("123-45 6789").is_empty());
        assert!(values("123 45-6789").is_empty());
        assert!(values("12345-6789").is_empty());
    }

    #[test]
    fn test_longer_digit_runs_rejected() {
        assert!(values("1234567890").is_empty());
        assert!(values("acct 98765432101234").is_empty());
        assert!(values("1123-45-6789").is_empty());
        assert!(values("123-45-67890").is_empty());
        assert!(values("call 555 123 4567 ext 1234567890").is_empty());
    }

    #[test]
    fn test_separated_longer_runs_rejected() {
        assert!(values("555-123-45-6789").is_empty());
        assert!(values("123-45-6789-1234").is_empty());
        assert!(values("4111 123 45 6789 0000").is_empty());
        assert!(values("ref 12 123456789").is_empty());

        // Words and punctuation next to the separator are fine.
        assert_eq!(values("SSN - 123-45-6789 - verified"), vec!["123-45-6789"]);
        assert_eq!(values("id 123-45-6789, 5 pages"), vec!["123-45-6789"]);
    }

    #[test]
    fn test_one_finding_per_occurrence() {
        let text = "123-45-6789 and again 123-45-6789, plus 111223333";
        assert_eq!(values(text), vec!["123-45-6789", "123-45-6789", "111223333"]);
    }

    #[test]
    fn test_area_validation() {
        let strict = SsnMatcher::new().with_area_validation(true);
        assert!(strict.find_all("000-12-3456", 1).is_empty());
        assert!(strict.find_all("666 12 3456", 1).is_empty());
        assert!(strict.find_all("912345678", 1).is_empty());
        assert_eq!(strict.find_all("123-45-6789", 1).len(), 1);

        // Structural matching keeps them.
        assert_eq!(values("000-12-3456"), vec!["000-12-3456"]);
    }

    #[test]
    fn test_is_issuable() {
        assert!(is_issuable("123", "45", "6789"));
        assert!(!is_issuable("123", "00", "6789"));
        assert!(!is_issuable("123", "45", "0000"));
    }
}
