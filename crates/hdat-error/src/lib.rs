//! Error taxonomy for hdat.
//!
//! Every fallible operation in the archive, golden store, resolver and run
//! controller returns [`Result`]. Messages always name the offending
//! identifier and, where one exists, the set of viable alternatives so the
//! command line stays debuggable from CI logs.

use std::fmt;
use std::path::PathBuf;

/// Accepted resultspec shapes, quoted in [`HdatError::InvalidResultSpec`].
pub const RESULTSPEC_SHAPES: &str =
    "\"SUITE\", \"SUITE/CASE\", \"SUITE/CASE/RESULT_ID\" or \"SUITE/CASE/~N\"";

/// Primary error type for hdat operations.
#[derive(Debug, thiserror::Error)]
pub enum HdatError {
    // === Addressing ===
    /// Malformed resultspec. User-correctable.
    #[error("invalid resultspec \"{spec}\": {detail}; accepted shapes are a result file path, {shapes}", shapes = RESULTSPEC_SHAPES)]
    InvalidResultSpec { spec: String, detail: String },

    /// Malformed case specifier.
    #[error("invalid case specifier \"{spec}\"; accepted shapes are \"\", \"SUITE\" or \"SUITE/CASE\"")]
    InvalidCaseSpec { spec: String },

    /// Identifier that cannot be used as a path component.
    #[error("invalid {kind} \"{value}\": {detail}")]
    InvalidIdentifier {
        kind: &'static str,
        value: String,
        detail: String,
    },

    /// Suite id not present in the registry.
    #[error("unknown suite id \"{suite_id}\"; available suites: {}", Listing(.known))]
    UnknownSuite { suite_id: String, known: Vec<String> },

    /// Two suites registered under one id.
    #[error("duplicate suite id \"{suite_id}\"")]
    DuplicateSuite { suite_id: String },

    /// Case id unknown to its suite's case collection.
    #[error("unknown case id \"{case_id}\" in suite \"{suite_id}\"; available cases: {}", Listing(.known))]
    MissingCase {
        suite_id: String,
        case_id: String,
        known: Vec<String>,
    },

    /// Known case(s) without any archived result.
    #[error(
        "no result recorded for {}; run the case or suite first",
        Listing(.cases)
    )]
    UnusedCase { cases: Vec<String> },

    /// Exact result address with no artifact behind it.
    #[error("unable to locate result \"{spec}\" in the archive at {}", .archive_root.display())]
    ResultNotFound { spec: String, archive_root: PathBuf },

    /// Relative index beyond the available history.
    #[error("index ~{index} is out of range for \"{location}\": only {available} result(s) recorded")]
    OutOfRange {
        location: String,
        index: u64,
        available: usize,
    },

    // === Storage ===
    /// Corrupt or unreadable result artifact.
    #[error("unable to read result artifact {}: {detail}", .path.display())]
    UnreadableResult { path: PathBuf, detail: String },

    /// Structural problem found while decoding an artifact.
    #[error("corrupt result artifact: {detail}")]
    CorruptArtifact { detail: String },

    /// Re-insertion under an existing archive key.
    #[error("result \"{suite_id}/{case_id}/{result_id}\" already exists at {}", .path.display())]
    DuplicateResult {
        suite_id: String,
        case_id: String,
        result_id: String,
        path: PathBuf,
    },

    /// Metric value that cannot be persisted in a golden file.
    #[error("metric \"{metric}\" cannot be stored: {detail}")]
    InvalidMetric { metric: String, detail: String },

    // === Suite collaborators ===
    /// A suite's run operation broke its output contract.
    #[error("suite \"{suite_id}\" violated its contract on case \"{case_id}\": {detail}")]
    SuiteContractViolation {
        suite_id: String,
        case_id: String,
        detail: String,
    },

    /// A suite operation (collect, run, check, show, diff) failed.
    #[error("suite \"{suite_id}\" failed during {operation}: {detail}")]
    SuiteOperation {
        suite_id: String,
        operation: &'static str,
        detail: String,
    },

    // === Environment ===
    /// Source-control metadata could not be read.
    #[error("source control: {detail}")]
    SourceControl { detail: String },

    /// Startup configuration problem.
    #[error("configuration: {detail}")]
    Config { detail: String },

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using [`HdatError`].
pub type Result<T> = std::result::Result<T, HdatError>;

impl HdatError {
    /// Whether the error is something the operator can fix by changing the
    /// command line, as opposed to a storage or collaborator failure.
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidResultSpec { .. }
                | Self::InvalidCaseSpec { .. }
                | Self::InvalidIdentifier { .. }
                | Self::UnknownSuite { .. }
                | Self::MissingCase { .. }
                | Self::UnusedCase { .. }
                | Self::ResultNotFound { .. }
                | Self::OutOfRange { .. }
        )
    }

    /// Create an invalid-resultspec error.
    pub fn invalid_resultspec(spec: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::InvalidResultSpec {
            spec: spec.into(),
            detail: detail.into(),
        }
    }

    /// Create a corrupt-artifact error.
    pub fn corrupt(detail: impl Into<String>) -> Self {
        Self::CorruptArtifact {
            detail: detail.into(),
        }
    }

    /// Attach an artifact path, turning any error into [`HdatError::UnreadableResult`].
    #[must_use]
    pub fn unreadable_at(self, path: impl Into<PathBuf>) -> Self {
        let detail = match self {
            Self::CorruptArtifact { detail } | Self::UnreadableResult { detail, .. } => detail,
            other => other.to_string(),
        };
        Self::UnreadableResult {
            path: path.into(),
            detail,
        }
    }
}

/// Renders a list of identifiers as `"a", "b"`, or `(none)` when empty.
struct Listing<'a>(&'a [String]);

impl fmt::Display for Listing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("(none)");
        }
        for (index, item) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "\"{item}\"")?;
        }
        Ok(())
    }
}
