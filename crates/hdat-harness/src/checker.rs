//! Declarative comparison of new metrics against golden metrics.
//!
//! A [`MetricsChecker`] accumulates independent per-metric judgments so a
//! failing check reports every violation, not just the first one.
//!
//! ```
//! use hdat_harness::MetricsChecker;
//! use hdat_types::{MetricValue, Metrics};
//!
//! let old = Metrics::from([("mean".to_owned(), MetricValue::Float(1.0))]);
//! let new = Metrics::from([("mean".to_owned(), MetricValue::Float(1.0 + 1e-12))]);
//! let mut checker = MetricsChecker::new(&old, &new);
//! checker.close("mean");
//! assert!(checker.matches());
//! ```

use hdat_types::{MetricValue, Metrics};

use crate::suite::Verdict;

/// Default relative tolerance of [`MetricsChecker::close`].
pub const DEFAULT_REL_TOL: f64 = 1e-9;
/// Default absolute tolerance of [`MetricsChecker::close`].
pub const DEFAULT_ABS_TOL: f64 = 0.0;

/// Tolerance-based comparator over two metric mappings.
#[derive(Debug, Clone)]
pub struct MetricsChecker<'a> {
    old: &'a Metrics,
    new: &'a Metrics,
    matches: bool,
    messages: Vec<String>,
    notes: Vec<String>,
}

impl<'a> MetricsChecker<'a> {
    /// Start a comparison. Metrics present in `old` but missing from `new`
    /// fail immediately; metrics only in `new` are noted.
    pub fn new(old: &'a Metrics, new: &'a Metrics) -> Self {
        let mut checker = Self {
            old,
            new,
            matches: true,
            messages: Vec::new(),
            notes: Vec::new(),
        };
        for name in old.keys().filter(|name| !new.contains_key(*name)) {
            checker.fail(format!("{name}: missing from new metrics"));
        }
        for name in new.keys().filter(|name| !old.contains_key(*name)) {
            checker
                .notes
                .push(format!("{name}: new metric, not present in golden"));
        }
        checker
    }

    /// Overall verdict so far: the AND of every recorded check.
    pub const fn matches(&self) -> bool {
        self.matches
    }

    /// One message per failed check, in check order.
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Informational notes that do not affect the verdict.
    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    /// Fail unless the two values are bit-identical.
    pub fn exact(&mut self, name: &str) -> &mut Self {
        if let Some((old, new)) = self.pair(name) {
            if !old.is_identical(new) {
                self.fail(format!(
                    "{name}: expected exact match, old={old}, new={new}"
                ));
            }
        }
        self
    }

    /// [`MetricsChecker::close_within`] with the default tolerances.
    pub fn close(&mut self, name: &str) -> &mut Self {
        self.close_within(name, DEFAULT_REL_TOL, DEFAULT_ABS_TOL)
    }

    /// Fail unless `|old - new| <= max(rel_tol * max(|old|, |new|), abs_tol)`.
    pub fn close_within(&mut self, name: &str, rel_tol: f64, abs_tol: f64) -> &mut Self {
        if let Some((old, new)) = self.numeric_pair(name) {
            let tolerance = (rel_tol * old.abs().max(new.abs())).max(abs_tol);
            let delta = (old - new).abs();
            if !(delta <= tolerance) {
                self.fail(format!(
                    "{name}: not close, old={old}, new={new}, \
                     |old-new|={delta} exceeds tolerance {tolerance}"
                ));
            }
        }
        self
    }

    /// Fail if new is lower than old by more than `abs_tol`.
    pub fn can_increase(&mut self, name: &str, abs_tol: f64) -> &mut Self {
        if let Some((old, new)) = self.numeric_pair(name) {
            if !(old - new <= abs_tol) {
                self.fail(format!(
                    "{name}: decreased beyond tolerance {abs_tol}, old={old}, new={new}"
                ));
            }
        }
        self
    }

    /// Fail if new is higher than old by more than `abs_tol`.
    pub fn can_decrease(&mut self, name: &str, abs_tol: f64) -> &mut Self {
        if let Some((old, new)) = self.numeric_pair(name) {
            if !(new - old <= abs_tol) {
                self.fail(format!(
                    "{name}: increased beyond tolerance {abs_tol}, old={old}, new={new}"
                ));
            }
        }
        self
    }

    /// Delegate to `predicate(old, new) -> (passed, message)`. The message is
    /// recorded only on failure.
    pub fn custom<F>(&mut self, name: &str, predicate: F) -> &mut Self
    where
        F: FnOnce(&MetricValue, &MetricValue) -> (bool, String),
    {
        if let Some((old, new)) = self.pair(name) {
            let (passed, message) = predicate(old, new);
            if !passed {
                self.fail(format!("{name}: {message}"));
            }
        }
        self
    }

    /// Fold the checks into a [`Verdict`] whose comment lists every failure
    /// followed by the notes.
    pub fn verdict(&self) -> Verdict {
        let mut lines: Vec<String> = self.messages.clone();
        lines.extend(self.notes.iter().map(|note| format!("note: {note}")));
        let comment = if lines.is_empty() {
            "all checked metrics match".to_owned()
        } else {
            lines.join("\n")
        };
        Verdict::new(self.matches, comment)
    }

    fn pair(&self, name: &str) -> Option<(&'a MetricValue, &'a MetricValue)> {
        Some((self.old.get(name)?, self.new.get(name)?))
    }

    fn numeric_pair(&mut self, name: &str) -> Option<(f64, f64)> {
        let (old, new) = self.pair(name)?;
        match (old.as_f64(), new.as_f64()) {
            (Some(old), Some(new)) => Some((old, new)),
            _ => {
                self.fail(format!(
                    "{name}: numeric check on non-numeric values, old={old} ({}), new={new} ({})",
                    old.type_name(),
                    new.type_name()
                ));
                None
            }
        }
    }

    fn fail(&mut self, message: String) {
        self.matches = false;
        self.messages.push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(pairs: &[(&str, MetricValue)]) -> Metrics {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_owned(), value.clone()))
            .collect()
    }

    fn even(old: &MetricValue, new: &MetricValue) -> (bool, String) {
        let is_even = |value: &MetricValue| matches!(value, MetricValue::Int(n) if n % 2 == 0);
        (is_even(old) && is_even(new), "not even".to_owned())
    }

    #[test]
    fn close_with_default_tolerance() {
        let old = metrics(&[("x", MetricValue::Float(1.0))]);
        let near = metrics(&[("x", MetricValue::Float(1.0 + 1e-12))]);
        let far = metrics(&[("x", MetricValue::Float(1.1))]);

        let mut checker = MetricsChecker::new(&old, &near);
        checker.close("x");
        assert!(checker.matches(), "case=within_rel_tol");

        let mut checker = MetricsChecker::new(&old, &far);
        checker.close("x");
        assert!(!checker.matches(), "case=beyond_rel_tol");
    }

    #[test]
    fn missing_metric_fails_once_and_new_metric_is_noted() {
        let old = metrics(&[("key1", MetricValue::Int(1))]);
        let new = metrics(&[("key2", MetricValue::Int(1))]);
        let mut checker = MetricsChecker::new(&old, &new);
        checker.exact("key1").close("key2");
        assert!(!checker.matches());
        assert_eq!(checker.messages().len(), 1, "messages={:?}", checker.messages());
        assert_eq!(checker.notes().len(), 1);
    }

    #[test]
    fn all_checks_pass() {
        let old = metrics(&[
            ("float", MetricValue::Float(1.0)),
            ("float_increase", MetricValue::Float(1.0)),
            ("float_decrease", MetricValue::Float(1.0)),
            ("string", MetricValue::from("one")),
            ("custom", MetricValue::Int(2)),
        ]);
        let new = metrics(&[
            ("float", MetricValue::Float(1.000_000_000_1)),
            ("float_increase", MetricValue::Float(1.1)),
            ("float_decrease", MetricValue::Float(0.9)),
            ("string", MetricValue::from("one")),
            ("custom", MetricValue::Int(4)),
        ]);
        let mut checker = MetricsChecker::new(&old, &new);
        checker
            .close("float")
            .can_increase("float_increase", 0.0)
            .can_decrease("float_decrease", 0.0)
            .exact("string")
            .custom("custom", even);
        assert!(checker.matches(), "messages={:?}", checker.messages());
        assert!(checker.verdict().passed);
    }

    #[test]
    fn every_failure_is_reported() {
        let old = metrics(&[
            ("float", MetricValue::Float(1.0)),
            ("float_increase", MetricValue::Float(1.0)),
            ("float_decrease", MetricValue::Float(1.0)),
            ("string", MetricValue::from("one")),
            ("custom", MetricValue::Int(2)),
        ]);
        let new = metrics(&[
            ("float", MetricValue::Float(1.01)),
            ("float_increase", MetricValue::Float(0.89)),
            ("float_decrease", MetricValue::Float(1.11)),
            ("string", MetricValue::from("two")),
            ("custom", MetricValue::Int(5)),
        ]);
        let mut checker = MetricsChecker::new(&old, &new);
        checker
            .close("float")
            .can_increase("float_increase", 0.1)
            .can_decrease("float_decrease", 0.1)
            .exact("string")
            .custom("custom", even);
        assert!(!checker.matches());
        assert_eq!(checker.messages().len(), 5, "messages={:?}", checker.messages());
        let verdict = checker.verdict();
        assert!(!verdict.passed);
        assert!(verdict.comment.contains("custom: not even"), "comment={}", verdict.comment);
    }

    fn passes(old: f64, new: f64, check: impl Fn(&mut MetricsChecker<'_>)) -> bool {
        let old = metrics(&[("x", MetricValue::Float(old))]);
        let new = metrics(&[("x", MetricValue::Float(new))]);
        let mut checker = MetricsChecker::new(&old, &new);
        check(&mut checker);
        checker.matches()
    }

    fn metric_value() -> impl proptest::strategy::Strategy<Value = MetricValue> {
        use proptest::prelude::*;
        prop_oneof![
            any::<i64>().prop_map(MetricValue::Int),
            any::<f64>().prop_map(MetricValue::Float),
            any::<bool>().prop_map(MetricValue::Bool),
            "[a-z0-9 ]{0,12}".prop_map(MetricValue::Text),
        ]
    }

    proptest::proptest! {
        #[test]
        fn closeness_is_symmetric(
            a in -1e6f64..1e6,
            b in -1e6f64..1e6,
            rel in 0.0f64..0.5,
            abs in 0.0f64..10.0,
        ) {
            proptest::prop_assert_eq!(
                passes(a, b, |c| { c.close_within("x", rel, abs); }),
                passes(b, a, |c| { c.close_within("x", rel, abs); })
            );
        }

        #[test]
        fn increase_mirrors_decrease(
            a in -1e6f64..1e6,
            b in -1e6f64..1e6,
            tol in 0.0f64..100.0,
        ) {
            proptest::prop_assert_eq!(
                passes(a, b, |c| { c.can_increase("x", tol); }),
                passes(b, a, |c| { c.can_decrease("x", tol); })
            );
        }

        #[test]
        fn every_metric_is_exactly_itself(value in metric_value()) {
            let both = metrics(&[("x", value)]);
            let mut checker = MetricsChecker::new(&both, &both);
            checker.exact("x");
            proptest::prop_assert!(checker.matches(), "messages={:?}", checker.messages());
        }
    }

    #[test]
    fn exact_message_cites_both_values() {
        let old = metrics(&[("x", MetricValue::Int(10))]);
        let new = metrics(&[("x", MetricValue::Int(11))]);
        let mut checker = MetricsChecker::new(&old, &new);
        checker.exact("x");
        assert_eq!(checker.messages(), ["x: expected exact match, old=10, new=11"]);
    }

    #[test]
    fn nan_is_never_close() {
        let old = metrics(&[("x", MetricValue::Float(f64::NAN))]);
        let mut checker = MetricsChecker::new(&old, &old);
        checker.close_within("x", 1.0, 1.0);
        assert!(!checker.matches());
        checker = MetricsChecker::new(&old, &old);
        checker.exact("x");
        assert!(checker.matches(), "case=nan_bitwise_exact");
    }
}
