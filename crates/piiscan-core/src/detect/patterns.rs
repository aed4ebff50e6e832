//! Regex patterns for sensitive data detection.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Email: local-part@domain, final label at least two letters
    pub static ref EMAIL: Regex = Regex::new(
        r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b"
    ).unwrap();

    // SSN: XXX-XX-XXXX, XXX XX XXXX or XXXXXXXXX, one separator style per match.
    // The word boundaries keep longer digit runs from matching; runs joined by a
    // separator are rejected by the matcher.
    pub static ref SSN: Regex = Regex::new(
        r"\b(?:([0-9]{3})-([0-9]{2})-([0-9]{4})|([0-9]{3}) ([0-9]{2}) ([0-9]{4})|([0-9]{3})([0-9]{2})([0-9]{4}))\b"
    ).unwrap();
}
