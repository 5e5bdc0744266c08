//! Built-in `signal-stats` suite.
//!
//! Each case synthesizes a waveform and reports its summary statistics.
//! The sampled signal is kept as the run context so `show` can sketch it
//! and `diff` can compare two runs sample by sample.

use std::f64::consts::TAU;
use std::io::Write;

use hdat_error::{HdatError, Result};
use hdat_harness::{Case, MetricsChecker, RunOutput, Suite, SuiteRegistry, Verdict};
use hdat_types::{ArrayData, CaseInput, Context, MetricValue, Metrics, ResultRecord};
use serde::{Deserialize, Serialize};

pub const SUITE_ID: &str = "signal-stats";

const SPARK_LEVELS: &[u8] = b" .:-=+*#%@";
const SPARK_WIDTH: usize = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Waveform {
    Sine,
    Ramp,
    Square,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SignalSpec {
    waveform: Waveform,
    samples: usize,
    amplitude: f64,
    cycles: f64,
}

impl SignalSpec {
    fn synthesize(&self) -> Vec<f64> {
        let n = self.samples as f64;
        (0..self.samples)
            .map(|i| {
                let t = i as f64 / n;
                let phase = TAU * self.cycles * t;
                match self.waveform {
                    Waveform::Sine => self.amplitude * phase.sin(),
                    Waveform::Ramp => self.amplitude * 2.0_f64.mul_add(t, -1.0),
                    Waveform::Square if phase.sin() >= 0.0 => self.amplitude,
                    Waveform::Square => -self.amplitude,
                }
            })
            .collect()
    }
}

/// Summary statistics of synthetic waveforms.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalStats;

impl SignalStats {
    fn error(operation: &'static str, detail: impl Into<String>) -> HdatError {
        HdatError::SuiteOperation {
            suite_id: SUITE_ID.to_owned(),
            operation,
            detail: detail.into(),
        }
    }
}

impl Suite for SignalStats {
    fn id(&self) -> &str {
        SUITE_ID
    }

    fn collect(&self) -> Result<Vec<Case>> {
        let cases = [
            ("sine", Waveform::Sine, 1.0),
            ("ramp", Waveform::Ramp, 2.0),
            ("square", Waveform::Square, 0.5),
        ];
        cases
            .into_iter()
            .map(|(id, waveform, amplitude)| {
                let spec = SignalSpec {
                    waveform,
                    samples: 256,
                    amplitude,
                    cycles: 3.0,
                };
                Ok(Case::new(id, serde_json::to_value(spec)?))
            })
            .collect()
    }

    fn run(&self, input: &CaseInput) -> Result<RunOutput> {
        let spec: SignalSpec = serde_json::from_value(input.clone())
            .map_err(|err| Self::error("run", format!("bad case input {input}: {err}")))?;
        if spec.samples == 0 {
            return Err(Self::error("run", "a signal needs at least one sample"));
        }
        let signal = spec.synthesize();
        let metrics = summarize(&signal);
        let context = Context::array(vec![signal.len() as u64], ArrayData::F64(signal))
            .ok_or_else(|| Self::error("run", "signal shape does not match its length"))?;
        Ok(RunOutput::new(metrics, context))
    }

    fn check(&self, golden: &Metrics, metrics: &Metrics) -> Result<Verdict> {
        let mut checker = MetricsChecker::new(golden, metrics);
        checker
            .exact("size")
            .close("mean")
            .can_decrease("std", 0.0)
            .close("min")
            .close("max");
        Ok(checker.verdict())
    }

    fn show(&self, result: &ResultRecord, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "-----------------")?;
        writeln!(out, "{} ({}, {})", result.resultspec(), result.status, result.commit)?;
        writeln!(out, "samples: {}", metric_text(&result.metrics, "size"))?;
        let rows = [("mean", "mean"), ("std dev", "std"), ("min", "min"), ("max", "max")];
        for (label, name) in rows {
            match metric(&result.metrics, name) {
                Some(value) => writeln!(out, "{label}: {value:.3}")?,
                None => writeln!(out, "{label}: -")?,
            }
        }
        if let Some(samples) = samples(&result.context) {
            writeln!(out, "profile: [{}]", sparkline(samples))?;
        }
        Ok(())
    }

    fn diff(
        &self,
        golden: &ResultRecord,
        result: &ResultRecord,
        out: &mut dyn Write,
    ) -> Result<()> {
        writeln!(out, "--- {}", golden.resultspec())?;
        writeln!(out, "+++ {}", result.resultspec())?;
        let names: std::collections::BTreeSet<&String> =
            golden.metrics.keys().chain(result.metrics.keys()).collect();
        for name in names {
            let old = metric_text(&golden.metrics, name);
            let new = metric_text(&result.metrics, name);
            let marker = if old == new { ' ' } else { '!' };
            writeln!(out, "{marker} {name}: {old} -> {new}")?;
        }
        match (samples(&golden.context), samples(&result.context)) {
            (Some(a), Some(b)) if a.len() == b.len() => {
                let worst = a
                    .iter()
                    .zip(b)
                    .map(|(x, y)| (x - y).abs())
                    .fold(0.0_f64, f64::max);
                writeln!(out, "max sample difference: {worst:.6}")?;
            }
            (Some(a), Some(b)) => {
                writeln!(out, "sample counts differ: {} vs {}", a.len(), b.len())?;
            }
            _ => writeln!(out, "no sampled signal to compare")?,
        }
        Ok(())
    }
}

/// Registry holding the built-in suites.
pub fn registry() -> Result<SuiteRegistry> {
    SuiteRegistry::new().with_suite(SignalStats)
}

fn summarize(signal: &[f64]) -> Metrics {
    let n = signal.len() as f64;
    let mean = signal.iter().sum::<f64>() / n;
    let variance = signal.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let min = signal.iter().copied().fold(f64::INFINITY, f64::min);
    let max = signal.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Metrics::from([
        ("size".to_owned(), MetricValue::Int(signal.len() as i64)),
        ("mean".to_owned(), MetricValue::Float(mean)),
        ("std".to_owned(), MetricValue::Float(variance.sqrt())),
        ("min".to_owned(), MetricValue::Float(min)),
        ("max".to_owned(), MetricValue::Float(max)),
    ])
}

fn metric(metrics: &Metrics, name: &str) -> Option<f64> {
    metrics.get(name).and_then(MetricValue::as_f64)
}

fn metric_text(metrics: &Metrics, name: &str) -> String {
    metrics
        .get(name)
        .map_or_else(|| "-".to_owned(), ToString::to_string)
}

fn samples(context: &Context) -> Option<&[f64]> {
    match context {
        Context::Array {
            data: ArrayData::F64(values),
            ..
        } => Some(values),
        _ => None,
    }
}

/// Coarse text rendering: bucket averages mapped onto density glyphs.
fn sparkline(samples: &[f64]) -> String {
    if samples.is_empty() {
        return String::new();
    }
    let width = SPARK_WIDTH.min(samples.len());
    let buckets: Vec<f64> = (0..width)
        .map(|column| {
            let start = column * samples.len() / width;
            let end = ((column + 1) * samples.len() / width).max(start + 1);
            let bucket = &samples[start..end];
            bucket.iter().sum::<f64>() / bucket.len() as f64
        })
        .collect();
    let low = buckets.iter().copied().fold(f64::INFINITY, f64::min);
    let high = buckets.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = high - low;
    let top = SPARK_LEVELS.len() - 1;
    buckets
        .iter()
        .map(|value| {
            let level = if span > 0.0 {
                (((value - low) / span) * top as f64).round() as usize
            } else {
                top / 2
            };
            char::from(SPARK_LEVELS[level.min(top)])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn run_case(case_id: &str) -> RunOutput {
        let case = SignalStats
            .collect()
            .expect("collect")
            .into_iter()
            .find(|case| case.id == case_id)
            .expect("case exists");
        SignalStats.run(&case.input).expect("run")
    }

    #[test]
    fn ramp_statistics_are_exact_enough() {
        let output = run_case("ramp");
        assert_eq!(output.metrics["size"], MetricValue::Int(256));
        assert_eq!(metric(&output.metrics, "min"), Some(-2.0));
        let max = metric(&output.metrics, "max").expect("max");
        assert!((max - (2.0 - 4.0 / 256.0)).abs() < 1e-12, "max={max}");
        let mean = metric(&output.metrics, "mean").expect("mean");
        assert!((mean + 2.0 / 256.0).abs() < 1e-12, "mean={mean}");
    }

    #[test]
    fn square_wave_spans_its_amplitude() {
        let output = run_case("square");
        assert_eq!(metric(&output.metrics, "min"), Some(-0.5));
        assert_eq!(metric(&output.metrics, "max"), Some(0.5));
    }

    #[test]
    fn rerun_passes_its_own_check() {
        let first = run_case("sine");
        let second = run_case("sine");
        let verdict = SignalStats
            .check(&first.metrics, &second.metrics)
            .expect("check");
        assert!(verdict.passed, "comment={}", verdict.comment);
    }

    #[test]
    fn louder_signal_fails_the_std_check() {
        let golden = run_case("sine").metrics;
        let mut louder = golden.clone();
        louder.insert("std".to_owned(), MetricValue::Float(10.0));
        let verdict = SignalStats.check(&golden, &louder).expect("check");
        assert!(!verdict.passed);
        assert!(verdict.comment.contains("std"), "comment={}", verdict.comment);
    }

    #[test]
    fn malformed_input_is_a_suite_error() {
        let err = SignalStats
            .run(&json!({"waveform": "noise"}))
            .expect_err("bad input");
        assert!(matches!(err, HdatError::SuiteOperation { .. }), "err={err}");
        let err = SignalStats
            .run(&json!({"waveform": "sine", "samples": 0, "amplitude": 1.0, "cycles": 1.0}))
            .expect_err("no samples");
        assert!(err.to_string().contains("at least one sample"), "err={err}");
    }

    #[test]
    fn sparkline_spans_the_glyph_range() {
        let line = sparkline(&[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(line.chars().count(), 4);
        assert!(line.starts_with(' '));
        assert!(line.ends_with('@'));
        assert_eq!(sparkline(&[1.0; 3]), "===", "case=flat_signal");
    }
}
