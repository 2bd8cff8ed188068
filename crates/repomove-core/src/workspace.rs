//! On-disk layout of one migration's working area.
//!
//! ```text
//! <workspace>/<moved name>/                 work dir, removed by `clean`
//!     <source org>/<source name>/           one copy per repository of the set
//!     <destination org>/<destination name>/ the moved repository's new home
//!     <integration dir>/                    second copy of the integration project
//! ```
//!
//! Configuration resolution rejects sets where two of these paths coincide.

use std::path::{Path, PathBuf};

use crate::config::IntegrationConfig;
use crate::error::MigrationResult;
use crate::repo_set::RepoKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceLayout {
    work_dir: PathBuf,
}

impl WorkspaceLayout {
    pub fn new(workspace: &Path, moved: &RepoKey) -> Self {
        Self {
            work_dir: workspace.join(&moved.name),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Working copy of a repository of the set.
    pub fn repo_dir(&self, source: &RepoKey) -> PathBuf {
        self.work_dir.join(&source.org).join(&source.name)
    }

    /// Working copy of the moved repository's destination.
    pub fn destination_dir(&self, destination: &RepoKey) -> PathBuf {
        self.work_dir.join(&destination.org).join(&destination.name)
    }

    pub fn integration_dir(&self, integration: &IntegrationConfig) -> PathBuf {
        self.work_dir.join(&integration.dir)
    }

    /// Remove the working area. Returns whether anything was there.
    pub async fn clean(&self) -> MigrationResult<bool> {
        if !tokio::fs::try_exists(&self.work_dir).await? {
            return Ok(false);
        }
        tokio::fs::remove_dir_all(&self.work_dir).await?;
        Ok(true)
    }
}
