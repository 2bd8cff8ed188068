//! In-memory review service (testing only)
//!
//! `MemoryReviewService` keeps changes in a map, records every mutation and
//! lets tests set label votes directly.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::change::ChangeId;
use crate::error::{MigrationError, MigrationResult};
use crate::repo_set::RepoKey;
use crate::review::{
    Approval, ChangeRecord, PatchSet, PushRequest, ReviewService, APPROVED_LABEL,
    CODE_REVIEW_LABEL, STATUS_ABANDONED, STATUS_MERGED, STATUS_NEW, VERIFIED_LABEL,
};

/// A push as recorded by the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPush {
    pub project: RepoKey,
    pub branch: String,
    pub change_id: ChangeId,
    pub revision: String,
}

#[derive(Debug, Default)]
struct State {
    changes: BTreeMap<ChangeId, ChangeRecord>,
    pushes: Vec<RecordedPush>,
    comments: Vec<(ChangeId, String)>,
    approved: Vec<ChangeId>,
    abandoned: Vec<ChangeId>,
    prepared: usize,
}

#[derive(Debug, Default)]
pub struct MemoryReviewService {
    state: Mutex<State>,
}

impl MemoryReviewService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an open change as if someone had pushed it.
    pub fn insert_change(&self, project: &RepoKey, branch: &str, id: &ChangeId, revision: &str) {
        let mut state = self.state.lock().unwrap();
        state.changes.insert(
            id.clone(),
            ChangeRecord {
                id: id.clone(),
                project: project.to_string(),
                branch: branch.to_string(),
                status: STATUS_NEW.to_string(),
                current_patch_set: Some(PatchSet {
                    revision: revision.to_string(),
                    approvals: Vec::new(),
                }),
            },
        );
    }

    /// Mark a change as merged upstream.
    pub fn set_merged(&self, id: &ChangeId) {
        if let Some(record) = self.state.lock().unwrap().changes.get_mut(id) {
            record.status = STATUS_MERGED.to_string();
        }
    }

    /// Replace the votes on a change's current patch set.
    pub fn set_votes(&self, id: &ChangeId, reviewed: bool, verified: bool) {
        let mut state = self.state.lock().unwrap();
        if let Some(patch) = state
            .changes
            .get_mut(id)
            .and_then(|c| c.current_patch_set.as_mut())
        {
            patch
                .approvals
                .retain(|a| a.label != CODE_REVIEW_LABEL && a.label != VERIFIED_LABEL);
            if reviewed {
                patch.approvals.push(Approval::new(CODE_REVIEW_LABEL, 2));
            }
            if verified {
                patch.approvals.push(Approval::new(VERIFIED_LABEL, 1));
            }
        }
    }

    pub fn change(&self, id: &ChangeId) -> Option<ChangeRecord> {
        self.state.lock().unwrap().changes.get(id).cloned()
    }

    pub fn pushes(&self) -> Vec<RecordedPush> {
        self.state.lock().unwrap().pushes.clone()
    }

    pub fn comments(&self) -> Vec<(ChangeId, String)> {
        self.state.lock().unwrap().comments.clone()
    }

    pub fn approved(&self) -> Vec<ChangeId> {
        self.state.lock().unwrap().approved.clone()
    }

    pub fn abandoned(&self) -> Vec<ChangeId> {
        self.state.lock().unwrap().abandoned.clone()
    }

    pub fn prepared_copies(&self) -> usize {
        self.state.lock().unwrap().prepared
    }
}

fn not_found(id: &ChangeId) -> MigrationError {
    MigrationError::ChangeNotFound {
        change_id: id.to_string(),
    }
}

#[async_trait]
impl ReviewService for MemoryReviewService {
    async fn query_change(&self, change_id: &ChangeId) -> MigrationResult<Option<ChangeRecord>> {
        Ok(self.change(change_id))
    }

    async fn push(&self, request: PushRequest<'_>) -> MigrationResult<()> {
        let mut state = self.state.lock().unwrap();
        state.pushes.push(RecordedPush {
            project: request.project.clone(),
            branch: request.branch.to_string(),
            change_id: request.change_id.clone(),
            revision: request.revision.to_string(),
        });
        // A new patch set drops the votes of the previous one.
        let record = state
            .changes
            .entry(request.change_id.clone())
            .or_insert_with(|| ChangeRecord {
                id: request.change_id.clone(),
                project: request.project.to_string(),
                branch: request.branch.to_string(),
                status: STATUS_NEW.to_string(),
                current_patch_set: None,
            });
        record.current_patch_set = Some(PatchSet {
            revision: request.revision.to_string(),
            approvals: Vec::new(),
        });
        Ok(())
    }

    async fn comment(&self, change_id: &ChangeId, message: &str) -> MigrationResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.changes.contains_key(change_id) {
            return Err(not_found(change_id));
        }
        state
            .comments
            .push((change_id.clone(), message.to_string()));
        Ok(())
    }

    async fn approve(&self, change_id: &ChangeId) -> MigrationResult<()> {
        let mut state = self.state.lock().unwrap();
        let patch = state
            .changes
            .get_mut(change_id)
            .and_then(|c| c.current_patch_set.as_mut())
            .ok_or_else(|| not_found(change_id))?;
        patch.approvals.push(Approval::new(APPROVED_LABEL, 1));
        state.approved.push(change_id.clone());
        Ok(())
    }

    async fn abandon(&self, change_id: &ChangeId) -> MigrationResult<()> {
        let mut state = self.state.lock().unwrap();
        let record = state
            .changes
            .get_mut(change_id)
            .ok_or_else(|| not_found(change_id))?;
        record.status = STATUS_ABANDONED.to_string();
        state.abandoned.push(change_id.clone());
        Ok(())
    }

    async fn open_changes(&self, project: &RepoKey) -> MigrationResult<Vec<ChangeId>> {
        let project = project.to_string();
        let state = self.state.lock().unwrap();
        Ok(state
            .changes
            .values()
            .filter(|c| c.project == project && c.status == STATUS_NEW)
            .map(|c| c.id.clone())
            .collect())
    }

    async fn prepare_working_copy(&self, _dir: &Path) -> MigrationResult<()> {
        self.state.lock().unwrap().prepared += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn push_creates_then_replaces_patch_set() {
        let svc = MemoryReviewService::new();
        let project = RepoKey::new("Juniper", "contrail-foo");
        let id = ChangeId::new("I1");
        let req = |revision: &'static str| PushRequest {
            dir: Path::new("."),
            project: &project,
            branch: "master",
            change_id: &id,
            revision,
        };

        svc.push(req("aa")).await.unwrap();
        svc.set_votes(&id, true, true);
        assert_eq!(svc.change(&id).unwrap().approvals().len(), 2);

        svc.push(req("bb")).await.unwrap();
        let record = svc.change(&id).unwrap();
        assert_eq!(record.revision(), Some("bb"));
        assert!(record.approvals().is_empty());
        assert_eq!(svc.pushes().len(), 2);
    }

    #[tokio::test]
    async fn open_changes_excludes_abandoned() {
        let svc = MemoryReviewService::new();
        let project = RepoKey::new("Juniper", "contrail-foo");
        svc.insert_change(&project, "master", &ChangeId::new("I1"), "a");
        svc.insert_change(&project, "master", &ChangeId::new("I2"), "b");
        svc.abandon(&ChangeId::new("I2")).await.unwrap();
        assert_eq!(
            svc.open_changes(&project).await.unwrap(),
            vec![ChangeId::new("I1")]
        );
    }

    #[tokio::test]
    async fn approving_unknown_change_fails() {
        let svc = MemoryReviewService::new();
        let err = svc.approve(&ChangeId::new("Inope")).await.unwrap_err();
        assert!(matches!(err, MigrationError::ChangeNotFound { .. }));
    }
}
