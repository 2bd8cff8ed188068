//! Code-review system seam.
//!
//! [`ReviewService`] is what the workflow needs from Gerrit: look a change up,
//! push a working copy for review, comment, approve and abandon. The record
//! types mirror the JSON emitted by `gerrit query --current-patch-set`.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use crate::change::ChangeId;
use crate::error::MigrationResult;
use crate::repo_set::RepoKey;

pub const CODE_REVIEW_LABEL: &str = "Code-Review";
pub const VERIFIED_LABEL: &str = "Verified";
pub const APPROVED_LABEL: &str = "Approved";

pub const STATUS_NEW: &str = "NEW";
pub const STATUS_MERGED: &str = "MERGED";
pub const STATUS_ABANDONED: &str = "ABANDONED";

/// One label vote on a patch set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    #[serde(rename = "type")]
    pub label: String,
    #[serde(deserialize_with = "vote_value")]
    pub value: i32,
}

impl Approval {
    pub fn new(label: &str, value: i32) -> Self {
        Self {
            label: label.to_string(),
            value,
        }
    }
}

// Gerrit renders votes as strings ("2", "-1"); accept plain numbers too.
fn vote_value<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i32),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(v) => Ok(v),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchSet {
    pub revision: String,
    #[serde(default)]
    pub approvals: Vec<Approval>,
}

/// A change as known to the review system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub id: ChangeId,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub status: String,
    pub current_patch_set: Option<PatchSet>,
}

impl ChangeRecord {
    pub fn revision(&self) -> Option<&str> {
        self.current_patch_set.as_ref().map(|p| p.revision.as_str())
    }

    pub fn is_merged(&self) -> bool {
        self.status == STATUS_MERGED
    }

    /// Neither merged nor abandoned.
    pub fn is_open(&self) -> bool {
        self.status != STATUS_MERGED && self.status != STATUS_ABANDONED
    }

    pub fn approvals(&self) -> &[Approval] {
        self.current_patch_set
            .as_ref()
            .map(|p| p.approvals.as_slice())
            .unwrap_or_default()
    }
}

/// A local commit ready to be sent for review.
#[derive(Debug, Clone, Copy)]
pub struct PushRequest<'a> {
    pub dir: &'a Path,
    pub project: &'a RepoKey,
    pub branch: &'a str,
    pub change_id: &'a ChangeId,
    pub revision: &'a str,
}

#[async_trait]
pub trait ReviewService: Send + Sync {
    /// Look a change up; `None` when the review system does not know it.
    async fn query_change(&self, change_id: &ChangeId) -> MigrationResult<Option<ChangeRecord>>;

    /// Push `request.revision` as a new patch set of its change.
    async fn push(&self, request: PushRequest<'_>) -> MigrationResult<()>;

    /// Post a comment on the change's current patch set.
    async fn comment(&self, change_id: &ChangeId, message: &str) -> MigrationResult<()>;

    /// Vote `Approved +1` on the change's current patch set.
    async fn approve(&self, change_id: &ChangeId) -> MigrationResult<()>;

    async fn abandon(&self, change_id: &ChangeId) -> MigrationResult<()>;

    /// Ids of every open change of `project`.
    async fn open_changes(&self, project: &RepoKey) -> MigrationResult<Vec<ChangeId>>;

    /// Hook run on a freshly cloned working copy.
    async fn prepare_working_copy(&self, _dir: &Path) -> MigrationResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_record_from_gerrit_json() {
        let raw = r#"{"project":"Juniper/contrail-foo","branch":"master","id":"I0123","status":"NEW",
            "currentPatchSet":{"number":3,"revision":"abc123","approvals":[
                {"type":"Code-Review","value":"2","by":{"name":"x"}},
                {"type":"Verified","value":1}]}}"#;
        let record: ChangeRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(record.id, ChangeId::new("I0123"));
        assert_eq!(record.revision(), Some("abc123"));
        assert_eq!(
            record.approvals(),
            &[
                Approval::new(CODE_REVIEW_LABEL, 2),
                Approval::new(VERIFIED_LABEL, 1)
            ]
        );
    }

    #[test]
    fn test_missing_patch_set_has_no_approvals() {
        let raw = r#"{"id":"I1"}"#;
        let record: ChangeRecord = serde_json::from_str(raw).unwrap();
        assert!(record.revision().is_none());
        assert!(record.approvals().is_empty());
    }

    #[test]
    fn test_negative_vote_string() {
        let a: Approval = serde_json::from_str(r#"{"type":"Verified","value":"-1"}"#).unwrap();
        assert_eq!(a.value, -1);
    }
}
