//! Run lifecycle: collect, execute, compare, persist, classify.
//!
//! Every case ends in exactly one terminal [`Status`]. Failures inside one
//! case, panics included, become ERROR for that case and never abort the
//! rest of a batch. Once a suite's run operation has produced output, the
//! result is archived whatever the outcome.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use hdat_error::{HdatError, Result};
use hdat_types::{
    CaseAddress, CaseInput, MetricValue, Metrics, ResultRecord, Status, build_result_id,
};
use tracing::{debug, error, info, warn};

use crate::clock::micros_to_seconds;
use crate::config::HdatContext;
use crate::suite::{RunOutput, Suite, Verdict};

/// Comment recorded when a case has no golden baseline.
pub const NO_BASELINE_COMMENT: &str = "no golden result present; no baseline yet";

/// Non-terminal lifecycle phases, logged as a case progresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Started,
    Executing,
    Comparing,
    NoBaseline,
}

impl LifecyclePhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Executing => "executing",
            Self::Comparing => "comparing",
            Self::NoBaseline => "no_baseline",
        }
    }
}

/// Terminal outcome of one case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseOutcome {
    pub address: CaseAddress,
    pub status: Status,
    pub comment: String,
    /// Set when a result was archived.
    pub result_id: Option<String>,
}

/// Outcomes of a batch, in run order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub outcomes: Vec<CaseOutcome>,
}

impl RunSummary {
    pub fn count(&self, status: Status) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status == status)
            .count()
    }

    /// True when every case passed. An empty batch passes.
    pub fn all_passed(&self) -> bool {
        self.outcomes
            .iter()
            .all(|outcome| outcome.status == Status::Pass)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PASS: {}, FAIL: {}, UNKNOWN: {}, ERROR: {}",
            self.count(Status::Pass),
            self.count(Status::Fail),
            self.count(Status::Unknown),
            self.count(Status::Error)
        )
    }
}

/// Drives cases through the lifecycle against one [`HdatContext`].
#[derive(Debug)]
pub struct RunController<'ctx> {
    ctx: &'ctx HdatContext,
}

impl<'ctx> RunController<'ctx> {
    pub const fn new(ctx: &'ctx HdatContext) -> Self {
        Self { ctx }
    }

    /// Run every case independently and tally the outcomes.
    pub fn run_cases(&self, cases: &[CaseAddress]) -> RunSummary {
        let mut summary = RunSummary::default();
        for address in cases {
            summary.outcomes.push(self.run_case(address));
        }
        info!(
            cases = cases.len(),
            pass = summary.count(Status::Pass),
            fail = summary.count(Status::Fail),
            unknown = summary.count(Status::Unknown),
            error = summary.count(Status::Error),
            "batch finished"
        );
        summary
    }

    /// Run one case to its terminal status. Never fails: errors become
    /// [`Status::Error`] outcomes.
    pub fn run_case(&self, address: &CaseAddress) -> CaseOutcome {
        log_phase(address, LifecyclePhase::Started);
        let outcome = match self.execute(address) {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(case = %address, error = %err, "case failed before producing output");
                CaseOutcome {
                    address: address.clone(),
                    status: Status::Error,
                    comment: err.to_string(),
                    result_id: None,
                }
            }
        };
        info!(
            case = %address,
            status = %outcome.status,
            result_id = outcome.result_id.as_deref().unwrap_or("-"),
            "case finished"
        );
        outcome
    }

    fn execute(&self, address: &CaseAddress) -> Result<CaseOutcome> {
        let suite = self.ctx.registry().get(&address.suite_id)?;
        let cases = guarded(suite, "collect", || self.ctx.registry().cases(&address.suite_id))?;
        let case = cases
            .into_iter()
            .find(|case| case.id == address.case_id)
            .ok_or_else(|| HdatError::SuiteContractViolation {
                suite_id: address.suite_id.clone(),
                case_id: address.case_id.clone(),
                detail: "case is not in the suite's case collection".to_owned(),
            })?;

        log_phase(address, LifecyclePhase::Executing);
        let output = guarded(suite, "run", || suite.run(&case.input))?;

        let (status, comment) = match self.judge(suite, address, &output) {
            Ok(Some(verdict)) if verdict.passed => (Status::Pass, verdict.comment),
            Ok(Some(verdict)) => (Status::Fail, verdict.comment),
            Ok(None) => (Status::Unknown, NO_BASELINE_COMMENT.to_owned()),
            Err(err) => {
                warn!(case = %address, error = %err, "case errored after run");
                (Status::Error, err.to_string())
            }
        };

        let result = self.build_result(address, case.input, output, status);
        let result_id = result.result_id.clone();
        match self.ctx.archive().insert(&result) {
            Ok(_) => Ok(CaseOutcome {
                address: address.clone(),
                status,
                comment,
                result_id: Some(result_id),
            }),
            Err(err) => Ok(CaseOutcome {
                address: address.clone(),
                status: Status::Error,
                comment: format!("{comment}\nfailed to archive result: {err}"),
                result_id: None,
            }),
        }
    }

    /// `Ok(None)` when there is no baseline to compare against.
    fn judge(
        &self,
        suite: &dyn Suite,
        address: &CaseAddress,
        output: &RunOutput,
    ) -> Result<Option<Verdict>> {
        validate_output(address, &output.metrics)?;
        let Some(golden) = self
            .ctx
            .golden()
            .select_golden(&address.suite_id, &address.case_id)?
        else {
            log_phase(address, LifecyclePhase::NoBaseline);
            return Ok(None);
        };
        log_phase(address, LifecyclePhase::Comparing);
        guarded(suite, "check", || suite.check(&golden.metrics, &output.metrics)).map(Some)
    }

    fn build_result(
        &self,
        address: &CaseAddress,
        case_input: CaseInput,
        output: RunOutput,
        status: Status,
    ) -> ResultRecord {
        let ran_on = micros_to_seconds(self.ctx.next_micros());
        let revision = self.ctx.revision();
        ResultRecord {
            suite_id: address.suite_id.clone(),
            case_id: address.case_id.clone(),
            result_id: build_result_id(ran_on, &revision.commit),
            case_input,
            metrics: output.metrics,
            context: output.context,
            commit: revision.commit.clone(),
            repo_dirty: revision.dirty,
            ran_on,
            status,
        }
    }
}

fn log_phase(address: &CaseAddress, phase: LifecyclePhase) {
    debug!(case = %address, phase = phase.as_str(), "lifecycle");
}

/// Metric names must be non-empty without whitespace or `.`, and floats
/// must be finite.
fn validate_output(address: &CaseAddress, metrics: &Metrics) -> Result<()> {
    let violation = |detail: String| HdatError::SuiteContractViolation {
        suite_id: address.suite_id.clone(),
        case_id: address.case_id.clone(),
        detail,
    };
    for (name, value) in metrics {
        if name.is_empty() || name.contains('.') || name.chars().any(char::is_whitespace) {
            return Err(violation(format!(
                "metric name \"{name}\" must be non-empty without whitespace or '.'"
            )));
        }
        if matches!(value, MetricValue::Float(number) if !number.is_finite()) {
            return Err(violation(format!("metric \"{name}\" is not finite: {value}")));
        }
    }
    Ok(())
}

/// Call a suite operation, turning a panic into [`HdatError::SuiteOperation`].
fn guarded<T>(
    suite: &dyn Suite,
    operation: &'static str,
    call: impl FnOnce() -> Result<T>,
) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|payload| {
        Err(HdatError::SuiteOperation {
            suite_id: suite.id().to_owned(),
            operation,
            detail: format!("panicked: {}", panic_message(payload.as_ref())),
        })
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}
