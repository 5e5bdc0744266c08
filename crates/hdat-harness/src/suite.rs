//! Suite collaborator contract and the explicit suite registry.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use hdat_error::{HdatError, Result};
use hdat_store::CaseCatalog;
use hdat_types::{CaseInput, Context, Metrics, ResultRecord, validate_case_id, validate_suite_id};
use tracing::debug;

/// One named unit of work and the input handed to [`Suite::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    pub id: String,
    pub input: CaseInput,
}

impl Case {
    pub fn new(id: impl Into<String>, input: CaseInput) -> Self {
        Self {
            id: id.into(),
            input,
        }
    }
}

/// What a suite's run operation produces: compared metrics and opaque context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOutput {
    pub metrics: Metrics,
    pub context: Context,
}

impl RunOutput {
    pub const fn new(metrics: Metrics, context: Context) -> Self {
        Self { metrics, context }
    }
}

/// Judgment returned by [`Suite::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub passed: bool,
    pub comment: String,
}

impl Verdict {
    pub fn new(passed: bool, comment: impl Into<String>) -> Self {
        Self {
            passed,
            comment: comment.into(),
        }
    }
}

/// A suite of algorithm test cases.
///
/// Implementations collect their cases, run the algorithm on one case, and
/// judge new metrics against golden ones. `show` and `diff` are optional
/// visualizations.
pub trait Suite: Send + Sync {
    /// Stable identifier; must be a valid path component.
    fn id(&self) -> &str;

    /// Cases in declaration order. Case ids must be unique.
    fn collect(&self) -> Result<Vec<Case>>;

    fn run(&self, input: &CaseInput) -> Result<RunOutput>;

    fn check(&self, golden: &Metrics, metrics: &Metrics) -> Result<Verdict>;

    /// Render one archived result.
    fn show(&self, _result: &ResultRecord, _out: &mut dyn Write) -> Result<()> {
        Err(not_supported(self.id(), "show"))
    }

    /// Render the difference between two archived results of this suite.
    fn diff(
        &self,
        _golden: &ResultRecord,
        _result: &ResultRecord,
        _out: &mut dyn Write,
    ) -> Result<()> {
        Err(not_supported(self.id(), "diff"))
    }
}

fn not_supported(suite_id: &str, operation: &'static str) -> HdatError {
    HdatError::SuiteOperation {
        suite_id: suite_id.to_owned(),
        operation,
        detail: "not supported by this suite".to_owned(),
    }
}

/// Suites registered by id at startup.
#[derive(Default)]
pub struct SuiteRegistry {
    suites: BTreeMap<String, Box<dyn Suite>>,
}

impl SuiteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a suite.
    ///
    /// # Errors
    ///
    /// [`HdatError::InvalidIdentifier`] for an id that is not a single path
    /// component, [`HdatError::DuplicateSuite`] if the id is taken.
    pub fn register(&mut self, suite: Box<dyn Suite>) -> Result<()> {
        let suite_id = suite.id().to_owned();
        validate_suite_id(&suite_id)?;
        if self.suites.contains_key(&suite_id) {
            return Err(HdatError::DuplicateSuite { suite_id });
        }
        debug!(suite_id = %suite_id, "registered suite");
        self.suites.insert(suite_id, suite);
        Ok(())
    }

    /// Builder form of [`SuiteRegistry::register`].
    pub fn with_suite(mut self, suite: impl Suite + 'static) -> Result<Self> {
        self.register(Box::new(suite))?;
        Ok(self)
    }

    pub fn get(&self, suite_id: &str) -> Result<&dyn Suite> {
        self.suites
            .get(suite_id)
            .map(|suite| &**suite)
            .ok_or_else(|| HdatError::UnknownSuite {
                suite_id: suite_id.to_owned(),
                known: self.ids(),
            })
    }

    pub fn ids(&self) -> Vec<String> {
        self.suites.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &dyn Suite)> {
        self.suites
            .iter()
            .map(|(id, suite)| (id.as_str(), &**suite))
    }

    pub fn len(&self) -> usize {
        self.suites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suites.is_empty()
    }

    /// Collect a suite's cases and check their ids.
    pub fn cases(&self, suite_id: &str) -> Result<Vec<Case>> {
        let suite = self.get(suite_id)?;
        let cases = suite.collect()?;
        let mut seen = BTreeSet::new();
        for case in &cases {
            validate_case_id(&case.id)?;
            if !seen.insert(case.id.as_str()) {
                return Err(HdatError::SuiteOperation {
                    suite_id: suite_id.to_owned(),
                    operation: "collect",
                    detail: format!("duplicate case id \"{}\"", case.id),
                });
            }
        }
        Ok(cases)
    }
}

impl std::fmt::Debug for SuiteRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuiteRegistry")
            .field("suites", &self.ids())
            .finish()
    }
}

impl CaseCatalog for SuiteRegistry {
    fn suite_ids(&self) -> Vec<String> {
        self.ids()
    }

    fn case_ids(&self, suite_id: &str) -> Result<Option<Vec<String>>> {
        if !self.suites.contains_key(suite_id) {
            return Ok(None);
        }
        let cases = self.cases(suite_id)?;
        Ok(Some(cases.into_iter().map(|case| case.id).collect()))
    }
}
