//! Recency-key extraction for archived results.
//!
//! Two result-id eras coexist in one archive: ids with a leading
//! `<seconds>.<micros>_` timestamp, and opaque ids whose `ran_on` lives only
//! inside the artifact. Strategies are tried in order per entry.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use hdat_error::{HdatError, Result};
use tracing::debug;

use crate::codec::read_header;

/// One way of deriving the `ran_on` sort key of an archived result.
pub trait RecencyKey: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` means this strategy does not apply to the entry.
    fn ran_on(&self, result_id: &str, path: &Path) -> Result<Option<f64>>;
}

/// Parses the numeric prefix before the first `_` of the result id.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampPrefix;

impl RecencyKey for TimestampPrefix {
    fn name(&self) -> &'static str {
        "timestamp-prefix"
    }

    fn ran_on(&self, result_id: &str, _path: &Path) -> Result<Option<f64>> {
        let prefix = result_id
            .split_once('_')
            .map_or(result_id, |(prefix, _)| prefix);
        Ok(prefix
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite()))
    }
}

/// Opens the artifact and reads `ran_on` from its header.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoredRanOn;

impl RecencyKey for StoredRanOn {
    fn name(&self) -> &'static str {
        "stored-ran-on"
    }

    fn ran_on(&self, _result_id: &str, path: &Path) -> Result<Option<f64>> {
        let file = File::open(path).map_err(|err| HdatError::from(err).unreadable_at(path))?;
        let header = read_header(&mut BufReader::new(file)).map_err(|err| err.unreadable_at(path))?;
        Ok(Some(header.ran_on))
    }
}

/// Ordered list of strategies; the first one that applies wins.
pub struct RecencyChain {
    strategies: Vec<Box<dyn RecencyKey>>,
}

impl RecencyChain {
    pub fn new(strategies: Vec<Box<dyn RecencyKey>>) -> Self {
        Self { strategies }
    }

    pub fn resolve(&self, result_id: &str, path: &Path) -> Result<f64> {
        for strategy in &self.strategies {
            if let Some(ran_on) = strategy.ran_on(result_id, path)? {
                return Ok(ran_on);
            }
            debug!(
                strategy = strategy.name(),
                result_id,
                "recency strategy does not apply, falling back"
            );
        }
        Err(HdatError::corrupt(format!(
            "no recency strategy could order result \"{result_id}\""
        ))
        .unreadable_at(path))
    }
}

impl Default for RecencyChain {
    fn default() -> Self {
        Self::new(vec![Box::new(TimestampPrefix), Box::new(StoredRanOn)])
    }
}

impl std::fmt::Debug for RecencyChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.strategies.iter().map(|s| s.name()).collect();
        f.debug_struct("RecencyChain").field("strategies", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_parses_leading_timestamp() {
        let path = Path::new("unused");
        assert_eq!(
            TimestampPrefix.ran_on("1589912345.123456_abc", path).expect("infallible"),
            Some(1_589_912_345.123_456)
        );
        assert_eq!(TimestampPrefix.ran_on("42", path).expect("infallible"), Some(42.0));
    }

    #[test]
    fn prefix_declines_opaque_ids() {
        let path = Path::new("unused");
        for id in ["f3a9c1", "inf_abc", "NaN_x", "_abc", ""] {
            assert_eq!(
                TimestampPrefix.ran_on(id, path).expect("infallible"),
                None,
                "case=opaque id={id:?}"
            );
        }
    }

    #[test]
    fn chain_reports_unorderable_entry() {
        let chain = RecencyChain::new(vec![Box::new(TimestampPrefix)]);
        let err = chain
            .resolve("opaque", Path::new("/archive/a/1/opaque.hdat"))
            .expect_err("no strategy applies");
        assert!(matches!(err, HdatError::UnreadableResult { .. }), "err={err}");
    }
}
