//! Identifier validation and case addressing.
//!
//! Suite, case and result ids double as directory and file names in the
//! archive and golden store, so each must be a single safe path component.

use std::fmt;

use hdat_error::{HdatError, Result};
use serde::{Deserialize, Serialize};

/// Separator between the parts of a case or result address.
pub const ADDRESS_SEPARATOR: char = '/';

fn validate_component(kind: &'static str, value: &str) -> Result<()> {
    let detail = if value.is_empty() {
        Some("must be non-empty")
    } else if value.contains(ADDRESS_SEPARATOR) || value.contains('\\') {
        Some("must not contain a path separator")
    } else if value.starts_with('.') {
        Some("must not start with '.'")
    } else if value.chars().any(char::is_control) {
        Some("must not contain control characters")
    } else {
        None
    };
    match detail {
        Some(detail) => Err(HdatError::InvalidIdentifier {
            kind,
            value: value.to_owned(),
            detail: detail.to_owned(),
        }),
        None => Ok(()),
    }
}

/// Validate a suite id.
pub fn validate_suite_id(suite_id: &str) -> Result<()> {
    validate_component("suite id", suite_id)
}

/// Validate a case id.
pub fn validate_case_id(case_id: &str) -> Result<()> {
    validate_component("case id", case_id)
}

/// Validate a result id.
pub fn validate_result_id(result_id: &str) -> Result<()> {
    validate_component("result id", result_id)
}

/// A `(suite_id, case_id)` pair, rendered as `suite/case`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CaseAddress {
    pub suite_id: String,
    pub case_id: String,
}

impl CaseAddress {
    pub fn new(suite_id: impl Into<String>, case_id: impl Into<String>) -> Self {
        Self {
            suite_id: suite_id.into(),
            case_id: case_id.into(),
        }
    }
}

impl fmt::Display for CaseAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{ADDRESS_SEPARATOR}{}", self.suite_id, self.case_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_ids() {
        validate_suite_id("example-suite").expect("plain suite id");
        validate_case_id("chicken").expect("plain case id");
        validate_result_id("1589912345.123456_abc123").expect("timestamped result id");
    }

    #[test]
    fn rejects_separator_and_traversal() {
        for bad in ["", "a/b", "a\\b", ".hidden", "..", "tab\there"] {
            let err = validate_suite_id(bad).expect_err("must be rejected");
            assert!(
                matches!(err, HdatError::InvalidIdentifier { kind: "suite id", .. }),
                "case=reject value={bad:?} err={err}"
            );
        }
    }

    #[test]
    fn case_address_display() {
        assert_eq!(CaseAddress::new("a", "1").to_string(), "a/1");
    }
}
