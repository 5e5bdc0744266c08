//! Durable storage for hdat: the append-only result archive, the golden
//! store, and the binary artifact codec they share.

pub mod archive;
pub mod codec;
pub mod golden;
pub mod recency;

use std::collections::BTreeMap;

use hdat_error::Result;

pub use archive::{Archive, ArchiveEntry};
pub use codec::{ArtifactHeader, RESULT_FILE_EXTENSION, decode_result, encode_result, read_header};
pub use golden::GoldenStore;
pub use recency::{RecencyChain, RecencyKey, StoredRanOn, TimestampPrefix};

/// Registered suites and their declared cases, as seen by the archive.
///
/// The archive consults it to tell an unknown case from a known case that
/// simply has no results yet.
pub trait CaseCatalog {
    /// Registered suite ids, sorted.
    fn suite_ids(&self) -> Vec<String>;

    /// Declared case ids of `suite_id` in declaration order, or `None` if
    /// the suite is not registered.
    fn case_ids(&self, suite_id: &str) -> Result<Option<Vec<String>>>;
}

impl CaseCatalog for BTreeMap<String, Vec<String>> {
    fn suite_ids(&self) -> Vec<String> {
        self.keys().cloned().collect()
    }

    fn case_ids(&self, suite_id: &str) -> Result<Option<Vec<String>>> {
        Ok(self.get(suite_id).cloned())
    }
}
