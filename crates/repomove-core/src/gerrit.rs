//! Gerrit over its SSH command interface.

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::change::ChangeId;
use crate::config::ReviewConfig;
use crate::error::{MigrationError, MigrationResult};
use crate::process::CommandSpec;
use crate::repo_set::RepoKey;
use crate::review::{ChangeRecord, PushRequest, ReviewService};

/// Talks to Gerrit with `ssh -p <port> <user>@<host> gerrit ...`.
#[derive(Debug, Clone)]
pub struct GerritSsh {
    config: ReviewConfig,
    user: Option<String>,
    timeout_secs: u64,
}

impl GerritSsh {
    pub fn new(config: ReviewConfig, user: Option<String>) -> Self {
        Self {
            config,
            user,
            timeout_secs: 0,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    fn user(&self) -> MigrationResult<&str> {
        self.user
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| MigrationError::MissingUser {
                operation: "gerrit".to_string(),
            })
    }

    fn login(&self) -> MigrationResult<String> {
        Ok(format!("{}@{}", self.user()?, self.config.host))
    }

    /// SSH URL of a project, as used for pushes.
    pub fn project_url(&self, project: &RepoKey) -> MigrationResult<String> {
        Ok(format!(
            "ssh://{}:{}/{}",
            self.login()?,
            self.config.port,
            project
        ))
    }

    async fn gerrit(&self, args: &[&str]) -> MigrationResult<String> {
        let mut full = vec![
            "-p".to_string(),
            self.config.port.to_string(),
            self.login()?,
            "gerrit".to_string(),
        ];
        full.extend(args.iter().map(|a| a.to_string()));
        CommandSpec::new("ssh", full)
            .timeout(self.timeout_secs)
            .run()
            .await
    }

    async fn query(&self, query: &[&str]) -> MigrationResult<Vec<ChangeRecord>> {
        let mut args = vec!["query", "--current-patch-set", "--format", "JSON"];
        args.extend_from_slice(query);
        let raw = self.gerrit(&args).await?;
        parse_query_output(&raw)
    }

    async fn current_revision(&self, change_id: &ChangeId) -> MigrationResult<String> {
        self.query_change(change_id)
            .await?
            .and_then(|c| c.revision().map(str::to_string))
            .ok_or_else(|| MigrationError::ChangeNotFound {
                change_id: change_id.to_string(),
            })
    }

    async fn review(&self, change_id: &ChangeId, flags: &[&str]) -> MigrationResult<()> {
        let revision = self.current_revision(change_id).await?;
        let mut args = vec!["review"];
        args.extend_from_slice(flags);
        args.push(&revision);
        self.gerrit(&args).await?;
        Ok(())
    }
}

/// Parse `gerrit query --format JSON` output, dropping the trailing stats row.
pub fn parse_query_output(raw: &str) -> MigrationResult<Vec<ChangeRecord>> {
    let mut records = Vec::new();
    for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let value: Value = serde_json::from_str(line)?;
        if value.get("type").and_then(Value::as_str) == Some("stats") {
            continue;
        }
        if value.get("id").is_none() {
            return Err(MigrationError::ReviewProtocol(format!(
                "query row without id: {line}"
            )));
        }
        records.push(serde_json::from_value(value)?);
    }
    Ok(records)
}

// Gerrit's ssh command line is re-split by a remote shell.
fn quote_message(message: &str) -> String {
    format!("\"{}\"", message.replace('\\', "\\\\").replace('"', "\\\""))
}

#[async_trait]
impl ReviewService for GerritSsh {
    async fn query_change(&self, change_id: &ChangeId) -> MigrationResult<Option<ChangeRecord>> {
        let mut records = self.query(&[change_id.as_str()]).await?;
        Ok(if records.is_empty() {
            None
        } else {
            Some(records.swap_remove(0))
        })
    }

    async fn push(&self, request: PushRequest<'_>) -> MigrationResult<()> {
        let url = self.project_url(request.project)?;
        let refspec = format!("{}:refs/for/{}", request.revision, request.branch);
        info!(
            project = %request.project,
            branch = request.branch,
            change_id = %request.change_id,
            revision = request.revision,
            "pushing for review"
        );
        CommandSpec::new("git", ["push", "-q", url.as_str(), refspec.as_str()])
            .current_dir(request.dir)
            .timeout(self.timeout_secs)
            .run()
            .await?;
        Ok(())
    }

    async fn comment(&self, change_id: &ChangeId, message: &str) -> MigrationResult<()> {
        let quoted = quote_message(message);
        self.review(change_id, &["--message", &quoted]).await
    }

    async fn approve(&self, change_id: &ChangeId) -> MigrationResult<()> {
        self.review(change_id, &["--approved", "1"]).await
    }

    async fn abandon(&self, change_id: &ChangeId) -> MigrationResult<()> {
        self.review(change_id, &["--abandon"]).await
    }

    async fn open_changes(&self, project: &RepoKey) -> MigrationResult<Vec<ChangeId>> {
        let project = format!("project:{project}");
        let records = self.query(&[&project, "status:open"]).await?;
        Ok(records.into_iter().map(|r| r.id).collect())
    }

    async fn prepare_working_copy(&self, dir: &Path) -> MigrationResult<()> {
        if !self.config.install_commit_hook {
            return Ok(());
        }
        let hooks = dir.join(".git").join("hooks");
        tokio::fs::create_dir_all(&hooks).await?;
        let remote = format!("{}:hooks/commit-msg", self.login()?);
        debug!(dir = %dir.display(), "installing commit-msg hook");
        CommandSpec::new(
            "scp",
            [
                "-p".to_string(),
                "-P".to_string(),
                self.config.port.to_string(),
                remote,
                hooks.to_string_lossy().to_string(),
            ],
        )
        .timeout(self.timeout_secs)
        .run()
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gerrit(user: Option<&str>) -> GerritSsh {
        GerritSsh::new(ReviewConfig::default(), user.map(str::to_string))
    }

    #[test]
    fn test_parse_query_drops_stats_row() {
        let raw = concat!(
            r#"{"project":"Juniper/contrail-foo","id":"I1","status":"NEW","currentPatchSet":{"revision":"aa","approvals":[]}}"#,
            "\n",
            r#"{"project":"Juniper/contrail-foo","id":"I2","status":"NEW"}"#,
            "\n",
            r#"{"type":"stats","rowCount":2,"runTimeMilliseconds":5}"#,
            "\n"
        );
        let records = parse_query_output(raw).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].revision(), Some("aa"));
        assert!(records[1].current_patch_set.is_none());
    }

    #[test]
    fn test_parse_query_unknown_change_is_empty() {
        let raw = r#"{"type":"stats","rowCount":0}"#;
        assert!(parse_query_output(raw).unwrap().is_empty());
    }

    #[test]
    fn test_parse_query_rejects_garbage() {
        assert!(matches!(
            parse_query_output("not json"),
            Err(MigrationError::Json(_))
        ));
        assert!(matches!(
            parse_query_output(r#"{"status":"NEW"}"#),
            Err(MigrationError::ReviewProtocol(_))
        ));
    }

    #[test]
    fn test_project_url_needs_user() {
        let url = gerrit(Some("alice"))
            .project_url(&RepoKey::new("tungstenfabric", "tf-foo"))
            .unwrap();
        assert_eq!(
            url,
            "ssh://alice@review.opencontrail.org:29418/tungstenfabric/tf-foo"
        );
        assert!(matches!(
            gerrit(None).project_url(&RepoKey::new("a", "b")),
            Err(MigrationError::MissingUser { .. })
        ));
    }

    #[test]
    fn test_quote_message_escapes_quotes() {
        assert_eq!(quote_message("check experimental"), "\"check experimental\"");
        assert_eq!(quote_message(r#"say "hi""#), r#""say \"hi\"""#);
    }
}
