//! Append-only result archive.
//!
//! Layout: `<root>/<suite_id>/<case_id>/<result_id>.hdat`, one artifact per
//! run. Artifacts are never rewritten or deleted.
//!
//! History order for a case is oldest to newest by `ran_on`. Entries are
//! first listed in lexicographic result-id order and then stably sorted by
//! `ran_on`, so results with equal timestamps keep result-id order.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use hdat_error::{HdatError, Result};
use hdat_types::{ResultRecord, validate_case_id, validate_result_id, validate_suite_id};
use tracing::{debug, info, warn};

use crate::CaseCatalog;
use crate::codec::{RESULT_FILE_EXTENSION, decode_result, encode_result};
use crate::recency::RecencyChain;

/// One archived artifact with its resolved recency key.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveEntry {
    pub result_id: String,
    pub path: PathBuf,
    pub ran_on: f64,
}

/// Directory-backed store of every run's result.
#[derive(Debug)]
pub struct Archive {
    root: PathBuf,
    recency: RecencyChain,
}

impl Archive {
    /// Open (creating if needed) an archive rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        Self::with_recency(root, RecencyChain::default())
    }

    pub fn with_recency(root: impl Into<PathBuf>, recency: RecencyChain) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root, recency })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn case_dir(&self, suite_id: &str, case_id: &str) -> PathBuf {
        self.root.join(suite_id).join(case_id)
    }

    pub fn result_path(&self, suite_id: &str, case_id: &str, result_id: &str) -> PathBuf {
        self.case_dir(suite_id, case_id)
            .join(format!("{result_id}.{RESULT_FILE_EXTENSION}"))
    }

    /// Whether `path` looks like a result artifact that exists on disk.
    pub fn is_artifact_path(path: &Path) -> bool {
        path.is_file()
            && path
                .extension()
                .is_some_and(|ext| ext == RESULT_FILE_EXTENSION)
    }

    /// Read and verify one artifact by path.
    pub fn read_result(path: &Path) -> Result<ResultRecord> {
        let bytes = fs::read(path).map_err(|err| HdatError::from(err).unreadable_at(path))?;
        decode_result(&bytes).map_err(|err| err.unreadable_at(path))
    }

    /// Persist a new result. Fails with [`HdatError::DuplicateResult`] if
    /// the key already exists; the existing artifact is left untouched.
    pub fn insert(&self, result: &ResultRecord) -> Result<PathBuf> {
        result.validate_key()?;
        let bytes = encode_result(result)?;
        let dir = self.case_dir(&result.suite_id, &result.case_id);
        fs::create_dir_all(&dir)?;
        let path = self.result_path(&result.suite_id, &result.case_id, &result.result_id);

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(HdatError::DuplicateResult {
                    suite_id: result.suite_id.clone(),
                    case_id: result.case_id.clone(),
                    result_id: result.result_id.clone(),
                    path,
                });
            }
            Err(err) => return Err(err.into()),
        };
        if let Err(err) = file.write_all(&bytes).and_then(|()| file.sync_all()) {
            drop(file);
            if let Err(cleanup) = fs::remove_file(&path) {
                warn!(
                    path = %path.display(),
                    error = %cleanup,
                    "failed to remove partial artifact"
                );
            }
            return Err(err.into());
        }

        info!(
            suite_id = %result.suite_id,
            case_id = %result.case_id,
            result_id = %result.result_id,
            status = %result.status,
            bytes = bytes.len(),
            "archived result"
        );
        Ok(path)
    }

    /// Exact lookup. A missing key is `Ok(None)`.
    pub fn select(
        &self,
        suite_id: &str,
        case_id: &str,
        result_id: &str,
    ) -> Result<Option<ResultRecord>> {
        validate_suite_id(suite_id)?;
        validate_case_id(case_id)?;
        validate_result_id(result_id)?;
        let path = self.result_path(suite_id, case_id, result_id);
        if !path.is_file() {
            return Ok(None);
        }
        Self::read_result(&path).map(Some)
    }

    /// Every artifact of one case, oldest first. A case without a directory
    /// has an empty history.
    pub fn history(&self, suite_id: &str, case_id: &str) -> Result<Vec<ArchiveEntry>> {
        validate_suite_id(suite_id)?;
        validate_case_id(case_id)?;
        let dir = self.case_dir(suite_id, case_id);
        let listing = match fs::read_dir(&dir) {
            Ok(listing) => listing,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut entries = Vec::new();
        for item in listing {
            let path = item?.path();
            if !Self::is_artifact_path(&path) {
                continue;
            }
            let Some(result_id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                warn!(path = %path.display(), "skipping artifact with non UTF-8 name");
                continue;
            };
            let result_id = result_id.to_owned();
            let ran_on = self.recency.resolve(&result_id, &path)?;
            entries.push(ArchiveEntry {
                result_id,
                path,
                ran_on,
            });
        }
        entries.sort_by(|a, b| a.result_id.cmp(&b.result_id));
        entries.sort_by(|a, b| a.ran_on.total_cmp(&b.ran_on));
        Ok(entries)
    }

    /// The result at recency `offset`: `0` is the newest and `n` the
    /// (n+1)-th newest; negative offsets index from the newest end, so `-1`
    /// is the newest and `-1-n` the (n+1)-th newest.
    pub fn select_recent(
        &self,
        offset: i64,
        suite_id: &str,
        case_id: &str,
        catalog: &dyn CaseCatalog,
    ) -> Result<ResultRecord> {
        let history = self.history(suite_id, case_id)?;
        if history.is_empty() {
            return Err(classify_empty_case(suite_id, case_id, catalog)?);
        }
        let back = if offset >= 0 {
            offset.unsigned_abs()
        } else {
            offset.unsigned_abs() - 1
        };
        let position = usize::try_from(back)
            .ok()
            .and_then(|back| history.len().checked_sub(back + 1))
            .ok_or_else(|| HdatError::OutOfRange {
                location: format!("{suite_id}/{case_id}"),
                index: back,
                available: history.len(),
            })?;
        let entry = &history[position];
        debug!(suite_id, case_id, result_id = %entry.result_id, back, "selected recent result");
        Self::read_result(&entry.path)
    }

    /// Newest result of every case in the suite, in the suite's case order.
    ///
    /// Cases without results are collected and reported together as one
    /// [`HdatError::UnusedCase`].
    pub fn select_recents_suite(
        &self,
        suite_id: &str,
        catalog: &dyn CaseCatalog,
    ) -> Result<Vec<ResultRecord>> {
        let case_ids = catalog
            .case_ids(suite_id)?
            .ok_or_else(|| HdatError::UnknownSuite {
                suite_id: suite_id.to_owned(),
                known: catalog.suite_ids(),
            })?;
        let mut results = Vec::with_capacity(case_ids.len());
        let mut gaps = Vec::new();
        self.collect_newest(suite_id, &case_ids, &mut results, &mut gaps)?;
        if gaps.is_empty() {
            Ok(results)
        } else {
            Err(HdatError::UnusedCase { cases: gaps })
        }
    }

    /// Newest result of every case of every registered suite present in
    /// the archive. Suite directories are visited in sorted order; those
    /// without a registered suite are skipped.
    ///
    /// Failures stay local: a suite whose cases can not be listed, or a case
    /// whose newest artifact can not be read, is skipped with a warning and
    /// the walk continues. Cases without results are still reported
    /// together as one [`HdatError::UnusedCase`].
    pub fn select_recents_all(&self, catalog: &dyn CaseCatalog) -> Result<Vec<ResultRecord>> {
        let mut results = Vec::new();
        let mut gaps = Vec::new();
        for suite_id in self.archived_suites()? {
            let case_ids = match catalog.case_ids(&suite_id) {
                Ok(Some(case_ids)) => case_ids,
                Ok(None) => {
                    warn!(
                        suite_id = %suite_id,
                        root = %self.root.display(),
                        "skipping archived suite that is not registered"
                    );
                    continue;
                }
                Err(err) => {
                    warn!(
                        suite_id = %suite_id,
                        error = %err,
                        "skipping suite whose cases can not be listed"
                    );
                    continue;
                }
            };
            for case_id in &case_ids {
                match self.newest(&suite_id, case_id) {
                    Ok(Some(result)) => results.push(result),
                    Ok(None) => gaps.push(format!("{suite_id}/{case_id}")),
                    Err(err) => {
                        warn!(
                            suite_id = %suite_id,
                            case_id = %case_id,
                            error = %err,
                            "skipping case whose newest result can not be read"
                        );
                    }
                }
            }
        }
        if gaps.is_empty() {
            Ok(results)
        } else {
            Err(HdatError::UnusedCase { cases: gaps })
        }
    }

    /// Suite directory names present under the root, sorted.
    pub fn archived_suites(&self) -> Result<Vec<String>> {
        let mut suites = Vec::new();
        for item in fs::read_dir(&self.root)? {
            let item = item?;
            if !item.file_type()?.is_dir() {
                continue;
            }
            let name = item.file_name();
            if let Some(name) = name.to_str().filter(|name| validate_suite_id(name).is_ok()) {
                suites.push(name.to_owned());
            }
        }
        suites.sort();
        Ok(suites)
    }

    fn collect_newest(
        &self,
        suite_id: &str,
        case_ids: &[String],
        results: &mut Vec<ResultRecord>,
        gaps: &mut Vec<String>,
    ) -> Result<()> {
        for case_id in case_ids {
            match self.newest(suite_id, case_id)? {
                Some(result) => results.push(result),
                None => gaps.push(format!("{suite_id}/{case_id}")),
            }
        }
        Ok(())
    }

    fn newest(&self, suite_id: &str, case_id: &str) -> Result<Option<ResultRecord>> {
        self.history(suite_id, case_id)?
            .last()
            .map(|entry| Self::read_result(&entry.path))
            .transpose()
    }
}

fn classify_empty_case(
    suite_id: &str,
    case_id: &str,
    catalog: &dyn CaseCatalog,
) -> Result<HdatError> {
    Ok(match catalog.case_ids(suite_id)? {
        None => HdatError::UnknownSuite {
            suite_id: suite_id.to_owned(),
            known: catalog.suite_ids(),
        },
        Some(case_ids) if case_ids.iter().any(|known| known == case_id) => HdatError::UnusedCase {
            cases: vec![format!("{suite_id}/{case_id}")],
        },
        Some(case_ids) => HdatError::MissingCase {
            suite_id: suite_id.to_owned(),
            case_id: case_id.to_owned(),
            known: case_ids,
        },
    })
}
