//! Startup configuration and the context object built from it.
//!
//! Locations resolve once at startup:
//!
//! - repository root: `HDAT_REPO_ROOT`, else the nearest ancestor of the
//!   working directory containing `.git`
//! - archive: `HDAT_ARCHIVE`, else `<repo_root>/.hdatarchive`
//! - golden store: `HDAT_GOLDEN_STORE`, else `<repo_root>/golden_results`

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use hdat_error::{HdatError, Result};
use hdat_store::{Archive, GoldenStore};
use hdat_types::ResultRecord;
use tracing::info;

use crate::clock::Clock;
use crate::resultspec::ResultResolver;
use crate::runner::RunController;
use crate::source_control::{RevisionInfo, RevisionSource};
use crate::suite::SuiteRegistry;

pub const REPO_ROOT_ENV: &str = "HDAT_REPO_ROOT";
pub const ARCHIVE_ENV: &str = "HDAT_ARCHIVE";
pub const GOLDEN_STORE_ENV: &str = "HDAT_GOLDEN_STORE";

pub const DEFAULT_ARCHIVE_DIR: &str = ".hdatarchive";
pub const DEFAULT_GOLDEN_DIR: &str = "golden_results";

/// Resolved storage locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HdatConfig {
    pub repo_root: PathBuf,
    pub archive_dir: PathBuf,
    pub golden_dir: PathBuf,
}

impl HdatConfig {
    /// Default locations inside `repo_root`.
    pub fn for_repo(repo_root: impl Into<PathBuf>) -> Self {
        let repo_root = repo_root.into();
        Self {
            archive_dir: repo_root.join(DEFAULT_ARCHIVE_DIR),
            golden_dir: repo_root.join(DEFAULT_GOLDEN_DIR),
            repo_root,
        }
    }

    /// Resolve from the process environment.
    pub fn discover(cwd: &Path) -> Result<Self> {
        Self::discover_with(cwd, |key| std::env::var_os(key))
    }

    /// Resolve with an explicit environment lookup. Empty values count as
    /// unset.
    pub fn discover_with(cwd: &Path, env: impl Fn(&str) -> Option<OsString>) -> Result<Self> {
        let lookup = |key: &str| env(key).filter(|value| !value.is_empty()).map(PathBuf::from);

        let repo_root = match lookup(REPO_ROOT_ENV) {
            Some(root) => root,
            None => find_repo_root(cwd).ok_or_else(|| HdatError::Config {
                detail: format!(
                    "no git repository found in, or above, {}; set {REPO_ROOT_ENV} to override",
                    cwd.display()
                ),
            })?,
        };
        let mut config = Self::for_repo(repo_root);
        if let Some(archive_dir) = lookup(ARCHIVE_ENV) {
            config.archive_dir = archive_dir;
        }
        if let Some(golden_dir) = lookup(GOLDEN_STORE_ENV) {
            config.golden_dir = golden_dir;
        }
        Ok(config)
    }
}

/// Nearest ancestor of `start` (inclusive) that contains `.git`.
pub fn find_repo_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

/// Everything a command needs, constructed once and passed by reference.
pub struct HdatContext {
    config: HdatConfig,
    registry: SuiteRegistry,
    archive: Archive,
    golden: GoldenStore,
    revision: RevisionInfo,
    clock: Box<dyn Clock>,
    /// Last timestamp handed out; shared by every controller of the session.
    last_micros: AtomicU64,
}

impl HdatContext {
    pub fn new(
        config: HdatConfig,
        registry: SuiteRegistry,
        revision: RevisionInfo,
        clock: Box<dyn Clock>,
    ) -> Result<Self> {
        let archive = Archive::open(&config.archive_dir)?;
        let golden = GoldenStore::open(&config.golden_dir);
        info!(
            repo_root = %config.repo_root.display(),
            archive = %config.archive_dir.display(),
            golden = %config.golden_dir.display(),
            suites = registry.len(),
            commit = %revision.commit,
            dirty = revision.dirty,
            "hdat context ready"
        );
        Ok(Self {
            config,
            registry,
            archive,
            golden,
            revision,
            clock,
            last_micros: AtomicU64::new(0),
        })
    }

    /// Like [`HdatContext::new`], reading the revision from `source`.
    pub fn from_source(
        config: HdatConfig,
        registry: SuiteRegistry,
        source: &dyn RevisionSource,
        clock: Box<dyn Clock>,
    ) -> Result<Self> {
        let revision = source.revision()?;
        Self::new(config, registry, revision, clock)
    }

    pub const fn config(&self) -> &HdatConfig {
        &self.config
    }

    pub const fn registry(&self) -> &SuiteRegistry {
        &self.registry
    }

    pub const fn archive(&self) -> &Archive {
        &self.archive
    }

    pub const fn golden(&self) -> &GoldenStore {
        &self.golden
    }

    pub const fn revision(&self) -> &RevisionInfo {
        &self.revision
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Clock reading bumped so it strictly increases across the whole
    /// session, whichever controller asks.
    pub fn next_micros(&self) -> u64 {
        let now = self.clock.now_micros();
        let bump = |last: u64| Some(now.max(last.saturating_add(1)));
        let (Ok(previous) | Err(previous)) =
            self.last_micros.fetch_update(Ordering::SeqCst, Ordering::SeqCst, bump);
        now.max(previous.saturating_add(1))
    }

    pub fn resolver(&self) -> ResultResolver<'_> {
        ResultResolver::new(&self.archive, &self.registry)
    }

    pub fn controller(&self) -> RunController<'_> {
        RunController::new(self)
    }

    /// Promote results to golden baselines, replacing prior ones.
    pub fn verify(&self, results: &[ResultRecord]) -> Result<Vec<PathBuf>> {
        results
            .iter()
            .map(|result| self.golden.insert(result))
            .collect()
    }
}

impl std::fmt::Debug for HdatContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HdatContext")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("revision", &self.revision)
            .finish_non_exhaustive()
    }
}
