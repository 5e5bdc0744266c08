//! Archived results and their golden projection.

use std::fmt;

use hdat_error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::Context;
use crate::id::{CaseAddress, validate_case_id, validate_result_id, validate_suite_id};
use crate::metric::Metrics;

/// Opaque per-case input handed to a suite's run operation.
pub type CaseInput = Value;

/// Outcome vocabulary of a case run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// No golden baseline existed to compare against.
    Unknown,
    Pass,
    Fail,
    Error,
}

impl Status {
    pub const ALL: [Self; 4] = [Self::Pass, Self::Fail, Self::Unknown, Self::Error];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Error => "ERROR",
        }
    }

    /// Tag byte used by the binary artifact codec.
    pub const fn wire_tag(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Pass => 1,
            Self::Fail => 2,
            Self::Error => 3,
        }
    }

    pub const fn from_wire_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Unknown),
            1 => Some(Self::Pass),
            2 => Some(Self::Fail),
            3 => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One archived run of one case. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub suite_id: String,
    pub case_id: String,
    pub result_id: String,
    pub case_input: CaseInput,
    pub metrics: Metrics,
    pub context: Context,
    pub commit: String,
    pub repo_dirty: bool,
    /// UTC seconds since the Unix epoch.
    pub ran_on: f64,
    pub status: Status,
}

impl ResultRecord {
    pub fn address(&self) -> CaseAddress {
        CaseAddress::new(&self.suite_id, &self.case_id)
    }

    /// Fully-qualified resultspec `suite/case/result_id`.
    pub fn resultspec(&self) -> String {
        format!("{}/{}/{}", self.suite_id, self.case_id, self.result_id)
    }

    /// Check that the archive key is usable as a path.
    pub fn validate_key(&self) -> Result<()> {
        validate_suite_id(&self.suite_id)?;
        validate_case_id(&self.case_id)?;
        validate_result_id(&self.result_id)
    }

    /// Golden projection: everything but context and case input.
    pub fn to_golden(&self) -> GoldenRecord {
        GoldenRecord::from(self)
    }

    /// Bit-level equality, see [`Context::is_identical`].
    pub fn is_identical(&self, other: &Self) -> bool {
        self.suite_id == other.suite_id
            && self.case_id == other.case_id
            && self.result_id == other.result_id
            && self.case_input == other.case_input
            && self.metrics.len() == other.metrics.len()
            && self
                .metrics
                .iter()
                .zip(&other.metrics)
                .all(|((ka, va), (kb, vb))| ka == kb && va.is_identical(vb))
            && self.context.is_identical(&other.context)
            && self.commit == other.commit
            && self.repo_dirty == other.repo_dirty
            && self.ran_on.to_bits() == other.ran_on.to_bits()
            && self.status == other.status
    }
}

/// Accepted baseline for one case.
///
/// Fields are declared alphabetically: with order-preserving JSON maps this
/// keeps golden files in a stable, reviewable key order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldenRecord {
    pub case_id: String,
    pub commit: String,
    pub metrics: Metrics,
    pub ran_on: f64,
    pub repo_dirty: bool,
    pub result_id: String,
    pub status: Status,
    pub suite_id: String,
}

impl From<&ResultRecord> for GoldenRecord {
    fn from(result: &ResultRecord) -> Self {
        Self {
            case_id: result.case_id.clone(),
            commit: result.commit.clone(),
            metrics: result.metrics.clone(),
            ran_on: result.ran_on,
            repo_dirty: result.repo_dirty,
            result_id: result.result_id.clone(),
            status: result.status,
            suite_id: result.suite_id.clone(),
        }
    }
}

/// Derive a result id from the run timestamp and source revision.
///
/// The leading `<seconds>.<micros>` part is what recency sorting parses
/// without opening the artifact.
pub fn build_result_id(ran_on: f64, commit: &str) -> String {
    let revision: String = commit
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let revision = if revision.is_empty() {
        "unknown".to_owned()
    } else {
        revision
    };
    format!("{ran_on:.6}_{revision}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::MetricValue;

    fn sample() -> ResultRecord {
        let mut metrics = Metrics::new();
        metrics.insert("x".to_owned(), MetricValue::Int(10));
        ResultRecord {
            suite_id: "a".to_owned(),
            case_id: "1".to_owned(),
            result_id: build_result_id(100.5, "abc"),
            case_input: serde_json::json!({"path": "data/1.png"}),
            metrics,
            context: Context::Bytes(vec![1, 2, 3]),
            commit: "abc".to_owned(),
            repo_dirty: false,
            ran_on: 100.5,
            status: Status::Unknown,
        }
    }

    #[test]
    fn result_id_has_timestamp_prefix() {
        assert_eq!(build_result_id(100.5, "abc"), "100.500000_abc");
        assert_eq!(build_result_id(1.0, ""), "1.000000_unknown");
        let odd = build_result_id(2.0, "feat/x y");
        assert_eq!(odd, "2.000000_feat-x-y");
        validate_result_id(&odd).expect("sanitized id is a valid path component");
    }

    #[test]
    fn golden_projection_drops_context_and_input() {
        let result = sample();
        let golden = result.to_golden();
        let json = serde_json::to_value(&golden).expect("golden serializes");
        assert!(json.get("context").is_none());
        assert!(json.get("case_input").is_none());
        assert_eq!(json["metrics"]["x"], serde_json::json!(10));
        assert_eq!(json["status"], serde_json::json!("UNKNOWN"));
    }

    #[test]
    fn golden_keys_are_alphabetical() {
        let json = serde_json::to_string(&sample().to_golden()).expect("golden serializes");
        let value: serde_json::Value = serde_json::from_str(&json).expect("round trip");
        let keys: Vec<&String> = value.as_object().expect("object").keys().collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    proptest::proptest! {
        #[test]
        fn distinct_microseconds_give_distinct_ids(
            a in 0u64..2_000_000_000_000_000,
            b in 0u64..2_000_000_000_000_000,
        ) {
            proptest::prop_assume!(a != b);
            let id_a = build_result_id(a as f64 / 1e6, "abc");
            let id_b = build_result_id(b as f64 / 1e6, "abc");
            proptest::prop_assert_ne!(id_a, id_b);
        }
    }

    #[test]
    fn status_tags_round_trip() {
        for status in Status::ALL {
            assert_eq!(Status::from_wire_tag(status.wire_tag()), Some(status));
        }
        assert_eq!(Status::from_wire_tag(9), None);
    }
}
