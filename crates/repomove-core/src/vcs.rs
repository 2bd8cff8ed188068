//! Version-control seam.
//!
//! The workflow talks to working copies only through [`Vcs`]; the production
//! implementation is [`crate::git::GitCli`].

use std::path::Path;

use async_trait::async_trait;

use crate::change::{ChangeId, CommitMessage, MigrationMarker};
use crate::error::{MigrationError, MigrationResult};

/// A commit as seen by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub sha: String,
    pub message: CommitMessage,
}

impl CommitInfo {
    /// The commit's change id, or an error naming `repo`.
    pub fn change_id(&self, repo: &str) -> MigrationResult<ChangeId> {
        self.message
            .change_id
            .clone()
            .ok_or_else(|| MigrationError::MissingChangeId {
                repo: repo.to_string(),
                commit: self.sha.clone(),
            })
    }
}

/// Local working-copy operations. Every method fails fast on a non-zero exit.
#[async_trait]
pub trait Vcs: Send + Sync {
    /// Whether `dir` holds a usable working copy.
    async fn is_healthy(&self, dir: &Path) -> bool;

    /// Clone `url` into `dir`, discarding anything already there.
    async fn clone_repo(&self, url: &str, dir: &Path) -> MigrationResult<()>;

    /// Update remote refs of an existing working copy and clean it.
    async fn refresh(&self, dir: &Path) -> MigrationResult<()>;

    /// Drop local modifications and untracked files.
    async fn reset_clean(&self, dir: &Path) -> MigrationResult<()>;

    /// Check out `branch`; a branch with no local commits is fast-forwarded.
    async fn checkout(&self, dir: &Path, branch: &str) -> MigrationResult<()>;

    /// Whether the working tree differs from HEAD (untracked files included).
    async fn has_changes(&self, dir: &Path) -> MigrationResult<bool>;

    /// Stage everything and commit with `message`.
    async fn commit_all(&self, dir: &Path, message: &CommitMessage) -> MigrationResult<CommitInfo>;

    /// Stage everything and amend HEAD with `message`.
    async fn amend_all(&self, dir: &Path, message: &CommitMessage) -> MigrationResult<CommitInfo>;

    async fn head(&self, dir: &Path) -> MigrationResult<CommitInfo>;

    /// Most recent commit reachable from `rev` carrying `marker`.
    ///
    /// Reads history only; the work tree is left as it is.
    async fn find_marked(
        &self,
        dir: &Path,
        rev: &str,
        marker: &MigrationMarker,
    ) -> MigrationResult<Option<CommitInfo>>;
}
