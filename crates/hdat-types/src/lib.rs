//! Core data model for hdat: archived results, golden baselines, metrics and
//! run context.

pub mod context;
pub mod id;
pub mod metric;
pub mod record;

pub use context::{ArrayData, Context};
pub use id::{
    ADDRESS_SEPARATOR, CaseAddress, validate_case_id, validate_result_id, validate_suite_id,
};
pub use metric::{MetricValue, Metrics};
pub use record::{CaseInput, GoldenRecord, ResultRecord, Status, build_result_id};
