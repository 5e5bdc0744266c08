//! Source-control metadata stamped on every result.

use std::path::{Path, PathBuf};
use std::process::Command;

use hdat_error::{HdatError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Revision the harness ran against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionInfo {
    pub commit: String,
    pub dirty: bool,
}

pub trait RevisionSource {
    fn revision(&self) -> Result<RevisionInfo>;
}

/// Reads the revision with the `git` command line.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo_root: PathBuf,
}

impl GitCli {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_root)
            .output()
            .map_err(|err| HdatError::SourceControl {
                detail: format!("failed to spawn git {}: {err}", args.join(" ")),
            })?;
        if !output.status.success() {
            return Err(HdatError::SourceControl {
                detail: format!(
                    "git {} failed in {}: {}",
                    args.join(" "),
                    self.repo_root.display(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }
}

impl RevisionSource for GitCli {
    fn revision(&self) -> Result<RevisionInfo> {
        let commit = self.git(&["rev-parse", "HEAD"])?.trim().to_owned();
        let dirty = !self.git(&["status", "--porcelain"])?.trim().is_empty();
        debug!(commit = %commit, dirty, "read git revision");
        Ok(RevisionInfo { commit, dirty })
    }
}

/// A fixed revision, for tests and trees without git.
#[derive(Debug, Clone)]
pub struct StaticRevision(pub RevisionInfo);

impl StaticRevision {
    pub fn new(commit: impl Into<String>, dirty: bool) -> Self {
        Self(RevisionInfo {
            commit: commit.into(),
            dirty,
        })
    }
}

impl RevisionSource for StaticRevision {
    fn revision(&self) -> Result<RevisionInfo> {
        Ok(self.0.clone())
    }
}
