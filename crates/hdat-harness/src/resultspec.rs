//! Resultspec resolution: mapping an address string to archived results.
//!
//! Accepted shapes, tried in this order:
//!
//! | spec                   | resolves to                                   |
//! |------------------------|-----------------------------------------------|
//! | path to an artifact    | that artifact                                 |
//! | `""`                   | newest result per case, every archived suite  |
//! | `SUITE`                | newest result per case of one suite           |
//! | `SUITE/CASE`           | newest result of one case                     |
//! | `SUITE/CASE/~N`        | (N+1)-th newest result of one case            |
//! | `SUITE/CASE/RESULT_ID` | exact lookup                                  |
//!
//! "Newest" means maximal `ran_on`; equal timestamps fall back to the
//! lexicographically greatest result id.

use std::path::{Path, PathBuf};

use hdat_error::{HdatError, Result};
use hdat_store::{Archive, CaseCatalog};
use hdat_types::{ADDRESS_SEPARATOR, ResultRecord};
use tracing::debug;

/// A parsed resultspec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultSpec {
    Path(PathBuf),
    All,
    Suite(String),
    Newest { suite_id: String, case_id: String },
    Back { suite_id: String, case_id: String, index: u64 },
    Exact { suite_id: String, case_id: String, result_id: String },
}

impl ResultSpec {
    /// Parse a spec. An existing file path takes priority over the grammar.
    pub fn parse(spec: &str) -> Result<Self> {
        let path = Path::new(spec);
        if !spec.is_empty() && path.is_file() {
            return Ok(Self::Path(path.to_path_buf()));
        }
        Self::parse_address(spec)
    }

    /// Parse the slash-delimited grammar only, ignoring the filesystem.
    pub fn parse_address(spec: &str) -> Result<Self> {
        if spec.is_empty() {
            return Ok(Self::All);
        }
        let parts: Vec<&str> = spec.split(ADDRESS_SEPARATOR).collect();
        if parts.iter().any(|part| part.is_empty()) {
            return Err(HdatError::invalid_resultspec(spec, "empty component"));
        }
        match parts.as_slice() {
            [suite_id] => Ok(Self::Suite((*suite_id).to_owned())),
            [suite_id, case_id] => Ok(Self::Newest {
                suite_id: (*suite_id).to_owned(),
                case_id: (*case_id).to_owned(),
            }),
            [suite_id, case_id, third] => match third.strip_prefix('~') {
                Some(digits) => {
                    let not_an_index = || {
                        HdatError::invalid_resultspec(
                            spec,
                            format!("\"~{digits}\" is not a tilde followed by decimal digits"),
                        )
                    };
                    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                        return Err(not_an_index());
                    }
                    let index = digits.parse::<u64>().map_err(|_| not_an_index())?;
                    Ok(Self::Back {
                        suite_id: (*suite_id).to_owned(),
                        case_id: (*case_id).to_owned(),
                        index,
                    })
                }
                None => Ok(Self::Exact {
                    suite_id: (*suite_id).to_owned(),
                    case_id: (*case_id).to_owned(),
                    result_id: (*third).to_owned(),
                }),
            },
            _ => Err(HdatError::invalid_resultspec(
                spec,
                format!("{} parts", parts.len()),
            )),
        }
    }
}

/// Resolves resultspecs against one archive and one case catalog.
#[derive(Clone, Copy)]
pub struct ResultResolver<'a> {
    archive: &'a Archive,
    catalog: &'a dyn CaseCatalog,
}

impl<'a> ResultResolver<'a> {
    pub fn new(archive: &'a Archive, catalog: &'a dyn CaseCatalog) -> Self {
        Self { archive, catalog }
    }

    /// Resolve one spec. Only `""` may yield an empty sequence (an empty
    /// archive); every other shape yields at least one result or fails.
    pub fn resolve(&self, spec: &str) -> Result<Vec<ResultRecord>> {
        let parsed = ResultSpec::parse(spec)?;
        debug!(spec, parsed = ?parsed, "resolving resultspec");
        match parsed {
            ResultSpec::Path(path) => Ok(vec![Archive::read_result(&path)?]),
            ResultSpec::All => self.archive.select_recents_all(self.catalog),
            ResultSpec::Suite(suite_id) => {
                self.archive.select_recents_suite(&suite_id, self.catalog)
            }
            ResultSpec::Newest { suite_id, case_id } => Ok(vec![self.archive.select_recent(
                0,
                &suite_id,
                &case_id,
                self.catalog,
            )?]),
            ResultSpec::Back {
                suite_id,
                case_id,
                index,
            } => {
                let Ok(offset) = i64::try_from(index) else {
                    return Err(HdatError::OutOfRange {
                        location: format!("{suite_id}/{case_id}"),
                        index,
                        available: self.archive.history(&suite_id, &case_id)?.len(),
                    });
                };
                Ok(vec![self.archive.select_recent(
                    offset,
                    &suite_id,
                    &case_id,
                    self.catalog,
                )?])
            }
            ResultSpec::Exact {
                suite_id,
                case_id,
                result_id,
            } => match self.archive.select(&suite_id, &case_id, &result_id)? {
                Some(result) => Ok(vec![result]),
                None => Err(HdatError::ResultNotFound {
                    spec: spec.to_owned(),
                    archive_root: self.archive.root().to_path_buf(),
                }),
            },
        }
    }

    /// Resolve several specs and concatenate the results in spec order.
    pub fn resolve_all<S: AsRef<str>>(&self, specs: &[S]) -> Result<Vec<ResultRecord>> {
        let mut results = Vec::new();
        for spec in specs {
            results.extend(self.resolve(spec.as_ref())?);
        }
        Ok(results)
    }
}

impl std::fmt::Debug for ResultResolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultResolver")
            .field("archive", &self.archive.root())
            .finish_non_exhaustive()
    }
}
