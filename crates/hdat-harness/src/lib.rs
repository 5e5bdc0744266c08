//! hdat harness: suites, metric checks, result addressing and the run
//! lifecycle that ties them to the archive and golden store.

pub mod casespec;
pub mod checker;
pub mod clock;
pub mod config;
pub mod log;
pub mod report;
pub mod resultspec;
pub mod runner;
pub mod source_control;
pub mod suite;

pub use casespec::{resolve_casespec, resolve_casespecs};
pub use checker::{DEFAULT_ABS_TOL, DEFAULT_REL_TOL, MetricsChecker};
pub use clock::{Clock, FixedClock, SteppingClock, SystemClock, micros_to_seconds};
pub use config::{HdatConfig, HdatContext, find_repo_root};
pub use log::{LOG_ENV, LogFormat, init_logging};
pub use report::{DEFAULT_CSV_KEYS, write_csv};
pub use resultspec::{ResultResolver, ResultSpec};
pub use runner::{CaseOutcome, LifecyclePhase, NO_BASELINE_COMMENT, RunController, RunSummary};
pub use source_control::{GitCli, RevisionInfo, RevisionSource, StaticRevision};
pub use suite::{Case, RunOutput, Suite, SuiteRegistry, Verdict};
