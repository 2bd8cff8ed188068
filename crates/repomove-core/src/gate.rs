//! Merge gate over review votes.
//!
//! A change is ready when its current patch set carries `Code-Review +2` and
//! `Verified +1` (or `+2`). [`evaluate`] turns the statuses of a whole change
//! set into a [`GateDecision`]: unforced runs require every change to be
//! ready, forced runs approve the ready subset and leave the rest pending.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::change::ChangeId;
use crate::error::{MigrationError, MigrationResult};
use crate::obs;
use crate::review::{Approval, ReviewService, APPROVED_LABEL, CODE_REVIEW_LABEL, VERIFIED_LABEL};

/// Review signals of one change, derived from its current patch set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewStatus {
    pub reviewed: bool,
    pub verified: bool,
    pub approved: bool,
}

impl ReviewStatus {
    pub fn from_approvals(approvals: &[Approval]) -> Self {
        let mut status = Self::default();
        for approval in approvals {
            match (approval.label.as_str(), approval.value) {
                (CODE_REVIEW_LABEL, 2) => status.reviewed = true,
                (VERIFIED_LABEL, 1 | 2) => status.verified = true,
                (APPROVED_LABEL, 1) => status.approved = true,
                _ => {}
            }
        }
        status
    }

    /// Both reviewed and verified.
    pub fn is_ready(&self) -> bool {
        self.reviewed && self.verified
    }
}

/// What the merge step should do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateDecision {
    /// Ready changes that still need the `Approved` vote.
    pub approve: Vec<ChangeId>,
    /// Ready changes that already carry it.
    pub already_approved: Vec<ChangeId>,
    /// Changes missing a review or verification vote.
    pub pending: Vec<ChangeId>,
}

impl GateDecision {
    pub fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Decide which changes to approve.
///
/// Without `force`, any pending change blocks the whole set and nothing is
/// approved.
pub fn evaluate(
    statuses: &[(ChangeId, ReviewStatus)],
    force: bool,
) -> MigrationResult<GateDecision> {
    let mut decision = GateDecision::default();
    for (id, status) in statuses {
        match (status.is_ready(), status.approved) {
            (true, true) => decision.already_approved.push(id.clone()),
            (true, false) => decision.approve.push(id.clone()),
            (false, _) => decision.pending.push(id.clone()),
        }
    }

    let ready = decision.approve.len() + decision.already_approved.len();
    obs::emit_gate_evaluated(statuses.len(), ready, force);

    if !decision.is_complete() && !force {
        return Err(MigrationError::GateBlocked {
            pending: decision.pending.iter().map(ToString::to_string).collect(),
        });
    }
    Ok(decision)
}

/// Fetches review statuses; never caches them.
#[derive(Clone)]
pub struct ReviewGate {
    service: Arc<dyn ReviewService>,
}

impl ReviewGate {
    pub fn new(service: Arc<dyn ReviewService>) -> Self {
        Self { service }
    }

    /// Current status of one change; unknown changes are an error.
    pub async fn status(&self, change_id: &ChangeId) -> MigrationResult<ReviewStatus> {
        let record = self
            .service
            .query_change(change_id)
            .await?
            .ok_or_else(|| MigrationError::ChangeNotFound {
                change_id: change_id.to_string(),
            })?;
        Ok(ReviewStatus::from_approvals(record.approvals()))
    }

    /// Statuses of every change, in input order.
    pub async fn collect(
        &self,
        changes: &[ChangeId],
    ) -> MigrationResult<Vec<(ChangeId, ReviewStatus)>> {
        let mut statuses = Vec::with_capacity(changes.len());
        for id in changes {
            let status = self.status(id).await?;
            tracing::info!(change_id = %id, reviewed = status.reviewed, verified = status.verified, approved = status.approved, "review status");
            statuses.push((id.clone(), status));
        }
        Ok(statuses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::MemoryReviewService;
    use crate::repo_set::RepoKey;

    fn ready() -> ReviewStatus {
        ReviewStatus {
            reviewed: true,
            verified: true,
            approved: false,
        }
    }

    fn three_changes() -> Vec<(ChangeId, ReviewStatus)> {
        vec![
            (ChangeId::new("I1"), ready()),
            (ChangeId::new("I2"), ready()),
            (
                ChangeId::new("I3"),
                ReviewStatus {
                    reviewed: true,
                    verified: false,
                    approved: false,
                },
            ),
        ]
    }

    #[test]
    fn test_status_from_votes() {
        let s = ReviewStatus::from_approvals(&[
            Approval::new(CODE_REVIEW_LABEL, 2),
            Approval::new(VERIFIED_LABEL, 2),
            Approval::new(APPROVED_LABEL, 1),
        ]);
        assert!(s.reviewed && s.verified && s.approved);

        let weak = ReviewStatus::from_approvals(&[
            Approval::new(CODE_REVIEW_LABEL, 1),
            Approval::new(VERIFIED_LABEL, -1),
        ]);
        assert_eq!(weak, ReviewStatus::default());
    }

    #[test]
    fn test_unforced_gate_blocks_on_one_unverified_change() {
        let err = evaluate(&three_changes(), false).unwrap_err();
        match err {
            MigrationError::GateBlocked { pending } => assert_eq!(pending, vec!["I3"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_forced_gate_approves_ready_subset() {
        let decision = evaluate(&three_changes(), true).unwrap();
        assert_eq!(decision.approve, vec![ChangeId::new("I1"), ChangeId::new("I2")]);
        assert_eq!(decision.pending, vec![ChangeId::new("I3")]);
        assert!(!decision.is_complete());
    }

    #[test]
    fn test_already_approved_changes_are_not_reapproved() {
        let mut done = ready();
        done.approved = true;
        let decision = evaluate(&[(ChangeId::new("I1"), done)], false).unwrap();
        assert!(decision.approve.is_empty());
        assert_eq!(decision.already_approved, vec![ChangeId::new("I1")]);
        assert!(decision.is_complete());
    }

    #[tokio::test]
    async fn test_status_of_unknown_change_is_error() {
        let gate = ReviewGate::new(Arc::new(MemoryReviewService::new()));
        let err = gate.status(&ChangeId::new("I404")).await.unwrap_err();
        assert!(matches!(err, MigrationError::ChangeNotFound { .. }));
    }

    #[tokio::test]
    async fn test_collect_reads_current_votes() {
        let svc = Arc::new(MemoryReviewService::new());
        let project = RepoKey::new("Juniper", "contrail-foo");
        let id = ChangeId::new("I1");
        svc.insert_change(&project, "master", &id, "abc");
        svc.set_votes(&id, true, false);

        let gate = ReviewGate::new(svc.clone());
        let statuses = gate.collect(&[id.clone()]).await.unwrap();
        assert!(statuses[0].1.reviewed);
        assert!(!statuses[0].1.verified);

        svc.set_votes(&id, true, true);
        assert!(gate.status(&id).await.unwrap().is_ready());
    }
}
