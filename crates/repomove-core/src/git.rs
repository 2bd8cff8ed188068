//! Git command-line implementation of [`Vcs`].

use std::path::Path;

use async_trait::async_trait;

use crate::change::{CommitMessage, MigrationMarker};
use crate::config::GitIdentity;
use crate::error::{MigrationError, MigrationResult};
use crate::process::CommandSpec;
use crate::vcs::{CommitInfo, Vcs};

const FIELD_SEP: char = '\u{1f}';
const RECORD_SEP: char = '\u{1e}';

/// Drives the `git` binary.
#[derive(Debug, Clone, Default)]
pub struct GitCli {
    identity: Option<GitIdentity>,
    timeout_secs: u64,
}

impl GitCli {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force the committer/author identity of orchestrator commits.
    pub fn with_identity(mut self, identity: Option<GitIdentity>) -> Self {
        self.identity = identity;
        self
    }

    /// Per-command timeout in seconds (zero disables).
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    fn spec<'a>(&self, dir: &'a Path, args: Vec<String>) -> CommandSpec<'a> {
        let mut full = Vec::with_capacity(args.len() + 4);
        if let Some(id) = &self.identity {
            full.push("-c".to_string());
            full.push(format!("user.name={}", id.name));
            full.push("-c".to_string());
            full.push(format!("user.email={}", id.email));
        }
        full.extend(args);
        CommandSpec::new("git", full)
            .current_dir(dir)
            .timeout(self.timeout_secs)
    }

    async fn git(&self, dir: &Path, args: &[&str]) -> MigrationResult<String> {
        self.spec(dir, args.iter().map(|s| s.to_string()).collect())
            .run()
            .await
    }

    fn parse_log(raw: &str) -> Vec<CommitInfo> {
        raw.split(RECORD_SEP)
            .filter_map(|record| {
                let record = record.trim_start_matches('\n');
                let (sha, body) = record.split_once(FIELD_SEP)?;
                let sha = sha.trim();
                if sha.is_empty() {
                    return None;
                }
                Some(CommitInfo {
                    sha: sha.to_string(),
                    message: CommitMessage::parse(body),
                })
            })
            .collect()
    }

    async fn log(&self, dir: &Path, extra: &[&str]) -> MigrationResult<Vec<CommitInfo>> {
        let mut args = vec!["log", "--format=%H%x1f%B%x1e"];
        args.extend_from_slice(extra);
        let raw = self.git(dir, &args).await?;
        Ok(Self::parse_log(&raw))
    }
}

/// Check whether a directory is a healthy git work tree.
pub async fn is_git_repo(dir: &Path) -> bool {
    // A plain directory nested in some other checkout must not count.
    if !dir.join(".git").exists() {
        return false;
    }
    CommandSpec::new("git", ["status", "--porcelain"])
        .current_dir(dir)
        .output()
        .await
        .map(|o| o.success)
        .unwrap_or(false)
}

#[async_trait]
impl Vcs for GitCli {
    async fn is_healthy(&self, dir: &Path) -> bool {
        is_git_repo(dir).await
    }

    async fn clone_repo(&self, url: &str, dir: &Path) -> MigrationResult<()> {
        if tokio::fs::try_exists(dir).await? {
            tokio::fs::remove_dir_all(dir).await?;
        }
        let parent = match dir.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        tokio::fs::create_dir_all(parent).await?;
        let target = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| MigrationError::Config(format!("invalid clone target {}", dir.display())))?;
        self.spec(
            parent,
            vec!["clone".into(), "-q".into(), url.to_string(), target],
        )
        .run()
        .await?;
        Ok(())
    }

    async fn refresh(&self, dir: &Path) -> MigrationResult<()> {
        self.git(dir, &["fetch", "-q", "--prune", "origin"]).await?;
        self.reset_clean(dir).await
    }

    async fn reset_clean(&self, dir: &Path) -> MigrationResult<()> {
        self.git(dir, &["reset", "-q", "--hard"]).await?;
        self.git(dir, &["clean", "-q", "-fd"]).await?;
        Ok(())
    }

    async fn checkout(&self, dir: &Path, branch: &str) -> MigrationResult<()> {
        self.git(dir, &["checkout", "-q", branch]).await?;

        // Branches without an upstream are left as they are.
        let counts = self
            .spec(
                dir,
                vec![
                    "rev-list".into(),
                    "--left-right".into(),
                    "--count".into(),
                    "HEAD...@{u}".into(),
                ],
            )
            .output()
            .await?;
        if !counts.success {
            return Ok(());
        }
        let mut parts = counts.stdout.split_whitespace().map(str::parse::<u64>);
        if let (Some(Ok(ahead)), Some(Ok(behind))) = (parts.next(), parts.next()) {
            if ahead == 0 && behind > 0 {
                tracing::debug!(dir = %dir.display(), branch, behind, "fast-forwarding");
                self.git(dir, &["merge", "-q", "--ff-only", "@{u}"]).await?;
            }
        }
        Ok(())
    }

    async fn has_changes(&self, dir: &Path) -> MigrationResult<bool> {
        let status = self.git(dir, &["status", "--porcelain"]).await?;
        Ok(!status.trim().is_empty())
    }

    async fn commit_all(&self, dir: &Path, message: &CommitMessage) -> MigrationResult<CommitInfo> {
        self.git(dir, &["add", "-A"]).await?;
        let text = message.to_string();
        self.git(dir, &["commit", "-q", "--allow-empty", "-m", &text])
            .await?;
        self.head(dir).await
    }

    async fn amend_all(&self, dir: &Path, message: &CommitMessage) -> MigrationResult<CommitInfo> {
        self.git(dir, &["add", "-A"]).await?;
        let text = message.to_string();
        self.git(
            dir,
            &["commit", "-q", "--amend", "--allow-empty", "-m", &text],
        )
        .await?;
        self.head(dir).await
    }

    async fn head(&self, dir: &Path) -> MigrationResult<CommitInfo> {
        self.log(dir, &["-1"])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| MigrationError::Command {
                program: "git".to_string(),
                args: "log -1".to_string(),
                status: "success".to_string(),
                stderr: format!("no commits in {}", dir.display()),
            })
    }

    async fn find_marked(
        &self,
        dir: &Path,
        rev: &str,
        marker: &MigrationMarker,
    ) -> MigrationResult<Option<CommitInfo>> {
        let grep = format!("--grep={}", marker.trailer_line());
        let commits = self.log(dir, &["--fixed-strings", &grep, rev, "--"]).await?;
        Ok(commits.into_iter().find(|c| c.message.has_marker(marker)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::{ChangeId, CommitRole};
    use crate::repo_set::RepoKey;
    use std::process::Command as StdCommand;

    fn run_git(repo_dir: &Path, args: &[&str]) {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    fn make_git_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init", "-q"]);
        run_git(dir.path(), &["symbolic-ref", "HEAD", "refs/heads/master"]);
        run_git(dir.path(), &["config", "user.name", "test-user"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["commit", "-q", "--allow-empty", "-m", "initial"]);
        dir
    }

    fn commit_count(repo_dir: &Path) -> u64 {
        let output = StdCommand::new("git")
            .args(["rev-list", "--count", "HEAD"])
            .current_dir(repo_dir)
            .output()
            .unwrap();
        String::from_utf8_lossy(&output.stdout).trim().parse().unwrap()
    }

    fn marker() -> MigrationMarker {
        MigrationMarker::new(CommitRole::References, &RepoKey::new("Org", "Foo"))
    }

    fn message(id: &ChangeId) -> CommitMessage {
        CommitMessage::compose(marker(), "Change links", &[], vec![], id.clone())
    }

    #[tokio::test]
    async fn is_git_repo_true_for_repo_false_otherwise() {
        let repo = make_git_repo();
        assert!(is_git_repo(repo.path()).await);
        let plain = tempfile::tempdir().unwrap();
        assert!(!is_git_repo(plain.path()).await);
        assert!(!is_git_repo(&plain.path().join("missing")).await);
    }

    #[tokio::test]
    async fn commit_and_find_marked_round_trip() {
        let repo = make_git_repo();
        let git = GitCli::new();
        assert!(git.find_marked(repo.path(), "HEAD", &marker()).await.unwrap().is_none());

        std::fs::write(repo.path().join("a.txt"), "NewOrg/Foo2\n").unwrap();
        assert!(git.has_changes(repo.path()).await.unwrap());
        let id = ChangeId::generate("t");
        let made = git.commit_all(repo.path(), &message(&id)).await.unwrap();
        assert!(!git.has_changes(repo.path()).await.unwrap());

        let found = git
            .find_marked(repo.path(), "HEAD", &marker())
            .await
            .unwrap()
            .expect("marked commit");
        assert_eq!(found.sha, made.sha);
        assert_eq!(found.change_id("Org/bar").unwrap(), id);
        assert_eq!(commit_count(repo.path()), 2);
    }

    #[tokio::test]
    async fn amend_replaces_head_without_new_commit() {
        let repo = make_git_repo();
        let git = GitCli::new();
        let id = ChangeId::generate("t");
        git.commit_all(repo.path(), &message(&id)).await.unwrap();
        let before = commit_count(repo.path());

        let mut amended = message(&id);
        amended.depends_on.push(ChangeId::new("Iabc"));
        let head = git.amend_all(repo.path(), &amended).await.unwrap();

        assert_eq!(commit_count(repo.path()), before);
        assert_eq!(head.message.depends_on, vec![ChangeId::new("Iabc")]);
        assert_eq!(head.message.change_id, Some(id));
    }

    #[tokio::test]
    async fn find_marked_reads_a_branch_without_switching() {
        let repo = make_git_repo();
        let git = GitCli::new();
        run_git(repo.path(), &["checkout", "-q", "-b", "topic"]);
        let id = ChangeId::generate("t");
        let made = git.commit_all(repo.path(), &message(&id)).await.unwrap();
        run_git(repo.path(), &["checkout", "-q", "master"]);
        std::fs::write(repo.path().join("scratch.txt"), "keep me").unwrap();

        let found = git
            .find_marked(repo.path(), "topic", &marker())
            .await
            .unwrap()
            .expect("marked commit on topic");
        assert_eq!(found.sha, made.sha);
        assert!(git
            .find_marked(repo.path(), "master", &marker())
            .await
            .unwrap()
            .is_none());
        assert!(git
            .find_marked(repo.path(), "no-such-branch", &marker())
            .await
            .is_err());
        assert!(repo.path().join("scratch.txt").exists());
    }

    #[tokio::test]
    async fn reset_clean_drops_untracked_files() {
        let repo = make_git_repo();
        let git = GitCli::new();
        std::fs::write(repo.path().join("junk.txt"), "x").unwrap();
        git.reset_clean(repo.path()).await.unwrap();
        assert!(!repo.path().join("junk.txt").exists());
    }

    #[tokio::test]
    async fn checkout_unknown_branch_fails() {
        let repo = make_git_repo();
        let err = GitCli::new()
            .checkout(repo.path(), "no-such-branch")
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::Command { .. }));
    }

    #[test]
    fn parse_log_splits_records() {
        let raw = "abc\u{1f}First\n\nChange-Id: I1\n\u{1e}\ndef\u{1f}Second\n\u{1e}\n";
        let commits = GitCli::parse_log(raw);
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].sha, "abc");
        assert_eq!(commits[0].message.change_id, Some(ChangeId::new("I1")));
        assert_eq!(commits[1].message.subject, "Second");
    }
}
