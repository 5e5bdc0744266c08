//! Golden store: the single accepted baseline per case.
//!
//! Layout: `<root>/<suite_id>/<case_id>.json`, pretty-printed with four
//! space indentation and alphabetical keys so baselines diff cleanly under
//! source control.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use hdat_error::{HdatError, Result};
use hdat_types::{GoldenRecord, ResultRecord, validate_case_id, validate_suite_id};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use tracing::{info, warn};

const GOLDEN_FILE_EXTENSION: &str = "json";

/// Directory-backed golden baselines.
#[derive(Debug, Clone)]
pub struct GoldenStore {
    root: PathBuf,
}

impl GoldenStore {
    /// Open a golden store rooted at `root`. Directories are created lazily
    /// on first write.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn golden_path(&self, suite_id: &str, case_id: &str) -> PathBuf {
        self.root
            .join(suite_id)
            .join(format!("{case_id}.{GOLDEN_FILE_EXTENSION}"))
    }

    /// Baseline for one case, or `Ok(None)` if none was ever verified.
    pub fn select_golden(&self, suite_id: &str, case_id: &str) -> Result<Option<GoldenRecord>> {
        validate_suite_id(suite_id)?;
        validate_case_id(case_id)?;
        let path = self.golden_path(suite_id, case_id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(HdatError::from(err).unreadable_at(&path)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|err| HdatError::from(err).unreadable_at(&path))
    }

    /// Replace the baseline of `result`'s case with its golden projection.
    pub fn insert(&self, result: &ResultRecord) -> Result<PathBuf> {
        validate_suite_id(&result.suite_id)?;
        validate_case_id(&result.case_id)?;
        if let Some((name, value)) = result
            .metrics
            .iter()
            .find(|(_, value)| !value.is_persistable())
        {
            return Err(HdatError::InvalidMetric {
                metric: name.clone(),
                detail: format!("{value} has no JSON representation"),
            });
        }

        let golden = result.to_golden();
        let mut rendered = Vec::new();
        let mut serializer = serde_json::Serializer::with_formatter(
            &mut rendered,
            PrettyFormatter::with_indent(b"    "),
        );
        golden.serialize(&mut serializer)?;
        rendered.push(b'\n');

        let suite_dir = self.root.join(&result.suite_id);
        fs::create_dir_all(&suite_dir)?;
        let path = self.golden_path(&result.suite_id, &result.case_id);
        // Leading dot: never collides with a valid case id.
        let staging = suite_dir.join(format!(".{}.{GOLDEN_FILE_EXTENSION}.tmp", result.case_id));
        let staged = File::create(&staging).and_then(|mut file| {
            file.write_all(&rendered)?;
            file.sync_all()
        });
        if let Err(err) = staged.and_then(|()| fs::rename(&staging, &path)) {
            if let Err(cleanup) = fs::remove_file(&staging) {
                if cleanup.kind() != ErrorKind::NotFound {
                    warn!(
                        path = %staging.display(),
                        error = %cleanup,
                        "failed to remove golden staging file"
                    );
                }
            }
            return Err(err.into());
        }

        info!(
            suite_id = %result.suite_id,
            case_id = %result.case_id,
            result_id = %result.result_id,
            path = %path.display(),
            "golden result replaced"
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use hdat_types::{Context, MetricValue, Metrics, Status};

    use super::*;

    fn result(x: MetricValue) -> ResultRecord {
        let mut metrics = Metrics::new();
        metrics.insert("x".to_owned(), x);
        ResultRecord {
            suite_id: "a".to_owned(),
            case_id: "1".to_owned(),
            result_id: "10.000000_abc".to_owned(),
            case_input: serde_json::json!({"path": "in.png"}),
            metrics,
            context: Context::Bytes(vec![9; 16]),
            commit: "abc".to_owned(),
            repo_dirty: false,
            ran_on: 10.0,
            status: Status::Pass,
        }
    }

    #[test]
    fn absent_golden_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = GoldenStore::open(dir.path());
        assert!(store.select_golden("a", "1").expect("lookup").is_none());
    }

    #[test]
    fn file_is_indented_and_newline_terminated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = GoldenStore::open(dir.path());
        let path = store.insert(&result(MetricValue::Int(10))).expect("insert");
        let text = fs::read_to_string(&path).expect("read");
        assert!(text.starts_with("{\n    \"case_id\": \"1\""), "text={text}");
        assert!(text.contains("\n        \"x\": 10\n"), "text={text}");
        assert!(text.ends_with("}\n"));
        assert!(!text.contains("context"));
        assert!(!text.contains("case_input"));
    }

    #[test]
    fn non_finite_metric_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = GoldenStore::open(dir.path());
        let err = store
            .insert(&result(MetricValue::Float(f64::NAN)))
            .expect_err("NaN cannot be stored");
        assert!(matches!(err, HdatError::InvalidMetric { .. }), "err={err}");
        assert!(!store.golden_path("a", "1").exists());
    }

    #[test]
    fn unparsable_golden_names_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = GoldenStore::open(dir.path());
        let path = store.golden_path("a", "1");
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, b"{not json").expect("write");
        let err = store.select_golden("a", "1").expect_err("garbage");
        assert!(matches!(err, HdatError::UnreadableResult { .. }), "err={err}");
    }

    #[test]
    fn failed_replace_leaves_no_staging_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = GoldenStore::open(dir.path());
        let path = store.golden_path("a", "1");
        // A non-empty directory where the golden file belongs blocks the rename.
        fs::create_dir_all(path.join("occupied")).expect("mkdir blocker");

        store
            .insert(&result(MetricValue::Int(10)))
            .expect_err("rename onto a directory fails");
        let leftovers: Vec<_> = fs::read_dir(dir.path().join("a"))
            .expect("list suite dir")
            .map(|item| item.expect("entry").file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("1.json")]);
    }
}
