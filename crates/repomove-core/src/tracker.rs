//! Change dependency tracker.
//!
//! Maps `(repository, branch)` to the change produced there and answers
//! "which change should this one depend on". Resolution tries the exact
//! branch, then the default branch, then the lexicographically-last branch
//! recorded for the repository. The last step is a deterministic tie-break,
//! not a semantic rule: callers treat it as best effort.

use std::collections::{BTreeMap, BTreeSet};

use crate::change::ChangeId;
use crate::error::{MigrationError, MigrationResult};
use crate::repo_set::RepoKey;

#[derive(Debug, Clone)]
pub struct ChangeTracker {
    default_branch: String,
    changes: BTreeMap<RepoKey, BTreeMap<String, ChangeId>>,
}

impl ChangeTracker {
    pub fn new(default_branch: impl Into<String>) -> Self {
        Self {
            default_branch: default_branch.into(),
            changes: BTreeMap::new(),
        }
    }

    /// Record (or replace) the change for `repo` on `branch`.
    pub fn record(&mut self, repo: &RepoKey, branch: &str, change: ChangeId) {
        self.changes
            .entry(repo.clone())
            .or_default()
            .insert(branch.to_string(), change);
    }

    /// Resolve the change `repo` contributes to `branch`, with fallback.
    pub fn resolve(&self, repo: &RepoKey, branch: &str) -> MigrationResult<&ChangeId> {
        let branches = self
            .changes
            .get(repo)
            .filter(|b| !b.is_empty())
            .ok_or_else(|| MigrationError::NothingRecorded {
                repo: repo.to_string(),
            })?;

        if let Some(id) = branches.get(branch) {
            return Ok(id);
        }
        if let Some(id) = branches.get(&self.default_branch) {
            tracing::debug!(repo = %repo, branch, fallback = %self.default_branch, "resolved via default branch");
            return Ok(id);
        }
        let (last, id) = branches
            .iter()
            .next_back()
            .ok_or_else(|| MigrationError::NothingRecorded {
                repo: repo.to_string(),
            })?;
        tracing::warn!(repo = %repo, branch, fallback = %last, "resolved via last known branch");
        Ok(id)
    }

    /// Resolve every recorded repository for `branch`, except `skip`.
    ///
    /// The result is sorted and de-duplicated.
    pub fn depends_for(&self, branch: &str, skip: Option<&RepoKey>) -> Vec<ChangeId> {
        let ids: BTreeSet<ChangeId> = self
            .changes
            .keys()
            .filter(|repo| Some(*repo) != skip)
            .filter_map(|repo| self.resolve(repo, branch).ok().cloned())
            .collect();
        ids.into_iter().collect()
    }

    /// Number of recorded `(repository, branch)` changes.
    pub fn change_count(&self) -> usize {
        self.changes.values().map(BTreeMap::len).sum()
    }
}
