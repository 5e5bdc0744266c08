//! Scripted suites and a throwaway workspace for harness integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use hdat_error::{HdatError, Result};
use hdat_harness::{
    Case, Clock, HdatConfig, HdatContext, MetricsChecker, RunOutput, SteppingClock, Suite,
    SuiteRegistry, Verdict,
};
use hdat_types::{CaseInput, Context, MetricValue, Metrics};
use serde_json::json;

pub const COMMIT: &str = "0123abcd";

/// Per-case metric `x`, adjustable between runs.
pub type Outputs = Arc<Mutex<BTreeMap<String, i64>>>;

/// Suite whose cases emit `{x: <scripted value>}` and are judged with an
/// exact check on `x`.
pub struct ScriptedSuite {
    id: String,
    cases: Vec<String>,
    outputs: Outputs,
}

impl ScriptedSuite {
    pub fn new(id: &str, cases: &[&str], outputs: Outputs) -> Self {
        Self {
            id: id.to_owned(),
            cases: cases.iter().map(|case| (*case).to_owned()).collect(),
            outputs,
        }
    }
}

impl Suite for ScriptedSuite {
    fn id(&self) -> &str {
        &self.id
    }

    fn collect(&self) -> Result<Vec<Case>> {
        Ok(self
            .cases
            .iter()
            .map(|case_id| Case::new(case_id.clone(), json!({ "case": case_id })))
            .collect())
    }

    fn run(&self, input: &CaseInput) -> Result<RunOutput> {
        let case_id = input["case"].as_str().unwrap_or_default();
        match case_id {
            "boom" => panic!("scripted panic in {case_id}"),
            "broken" => Err(HdatError::SuiteOperation {
                suite_id: self.id.clone(),
                operation: "run",
                detail: "scripted failure".to_owned(),
            }),
            _ => {
                let x = self
                    .outputs
                    .lock()
                    .expect("outputs lock")
                    .get(case_id)
                    .copied()
                    .unwrap_or(0);
                let metrics = Metrics::from([("x".to_owned(), MetricValue::Int(x))]);
                Ok(RunOutput::new(metrics, Context::Bytes(vec![x as u8; 4])))
            }
        }
    }

    fn check(&self, golden: &Metrics, metrics: &Metrics) -> Result<Verdict> {
        if metrics.get("x") == Some(&MetricValue::Int(-1)) {
            return Err(HdatError::SuiteOperation {
                suite_id: self.id.clone(),
                operation: "check",
                detail: "scripted check failure".to_owned(),
            });
        }
        let mut checker = MetricsChecker::new(golden, metrics);
        checker.exact("x");
        Ok(checker.verdict())
    }
}

/// Temp workspace plus a context over suites `a` (cases `1`, `2`) and `b`
/// (case `1`).
pub struct Workspace {
    pub dir: tempfile::TempDir,
    pub outputs: Outputs,
    pub ctx: HdatContext,
}

impl Workspace {
    pub fn new() -> Self {
        Self::with_cases(&["1", "2"])
    }

    pub fn with_cases(a_cases: &[&str]) -> Self {
        Self::with_clock(
            a_cases,
            Box::new(SteppingClock::new(1_700_000_000_000_000, 1_000_000)),
        )
    }

    pub fn with_clock(a_cases: &[&str], clock: Box<dyn Clock>) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let outputs = Outputs::default();
        let registry = SuiteRegistry::new()
            .with_suite(ScriptedSuite::new("a", a_cases, Arc::clone(&outputs)))
            .expect("register a")
            .with_suite(ScriptedSuite::new("b", &["1"], Arc::clone(&outputs)))
            .expect("register b");
        let ctx = HdatContext::new(
            HdatConfig::for_repo(dir.path()),
            registry,
            hdat_harness::RevisionInfo {
                commit: COMMIT.to_owned(),
                dirty: false,
            },
            clock,
        )
        .expect("context");
        Self { dir, outputs, ctx }
    }

    pub fn set_x(&self, case_id: &str, x: i64) {
        self.outputs
            .lock()
            .expect("outputs lock")
            .insert(case_id.to_owned(), x);
    }
}
