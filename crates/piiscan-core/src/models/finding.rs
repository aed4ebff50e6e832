//! Sensitive data findings.

use serde::{Deserialize, Serialize};

/// Kind of sensitive data detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingKind {
    Email,
    Ssn,
}

impl FindingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingKind::Email => "email",
            FindingKind::Ssn => "ssn",
        }
    }
}

impl std::fmt::Display for FindingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected occurrence of sensitive data.
///
/// `start` and `end` are character offsets into the normalized text of
/// `page`; `end` is exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Finding {
    #[serde(rename = "type")]
    pub kind: FindingKind,
    pub value: String,
    pub page: u32,
    pub start: usize,
    pub end: usize,
}

impl Finding {
    pub fn new(kind: FindingKind, value: impl Into<String>, page: u32, start: usize, end: usize) -> Self {
        Self {
            kind,
            value: value.into(),
            page,
            start,
            end,
        }
    }

    /// Number of characters covered.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}
