//! Migration state machine.
//!
//! Every `(repository, branch)` of a migration moves through
//! [`BranchState`]: `Absent → Cloned → ContentMoved → UnderReview → Merged`.
//! Operations are re-runnable; progress is read back from the working copies
//! (via the `Migration:` commit trailer) and from the review system, never
//! from a local state file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn, Instrument};

use crate::change::{ChangeId, CommitMessage, CommitRole, MigrationMarker};
use crate::config::{IntegrationConfig, MigrationSettings};
use crate::error::{MigrationError, MigrationResult};
use crate::gate::{self, ReviewGate, ReviewStatus};
use crate::metrics::METRICS;
use crate::obs;
use crate::repo_set::{RepoKey, RepositoryEntry, RepositorySet};
use crate::review::{PushRequest, ReviewService};
use crate::rewrite::tree::{self, TreeReport};
use crate::rewrite::ReferenceRewriter;
use crate::tracker::ChangeTracker;
use crate::vcs::{CommitInfo, Vcs};
use crate::workspace::WorkspaceLayout;

pub const DEFAULT_JOBS: usize = 4;

/// Comment that asks CI to run the experimental pipeline on the integration change.
pub const INTEGRATION_COMMENT: &str = "check experimental";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Clean,
    Clone,
    Commit,
    Review,
    Merge,
    Notify,
    Status,
}

impl Operation {
    pub const ALL: [Operation; 7] = [
        Self::Clean,
        Self::Clone,
        Self::Commit,
        Self::Review,
        Self::Merge,
        Self::Notify,
        Self::Status,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Clone => "clone",
            Self::Commit => "commit",
            Self::Review => "review",
            Self::Merge => "merge",
            Self::Notify => "notify",
            Self::Status => "status",
        }
    }

    /// Whether the operation talks to remote services as the acting user.
    pub fn requires_user(&self) -> bool {
        !matches!(self, Self::Clean | Self::Commit)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| MigrationError::Config(format!("unknown operation '{s}'")))
    }
}

/// Progress of one repository branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchState {
    /// No working copy.
    Absent,
    /// Working copy present, no migration commit on the branch.
    Cloned,
    /// Migration commit present locally, unknown to the review system.
    ContentMoved,
    /// Migration commit pushed and open for review.
    UnderReview,
    Merged,
}

/// State of one `(repository, branch)` as reported by `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchReport {
    pub repository: RepoKey,
    pub branch: String,
    pub role: CommitRole,
    pub state: BranchState,
    pub change_id: Option<ChangeId>,
    pub review: Option<ReviewStatus>,
}

/// Summary of one operation run.
#[derive(Debug, Clone, Serialize)]
pub struct OperationReport {
    pub operation: Operation,
    pub source: RepoKey,
    pub destination: RepoKey,
    pub working_copies: usize,
    pub commits: usize,
    pub files_rewritten: usize,
    pub warnings: usize,
    pub pushed: Vec<ChangeId>,
    pub approved: Vec<ChangeId>,
    pub pending: Vec<ChangeId>,
    pub abandoned: Vec<ChangeId>,
    pub notified: Vec<ChangeId>,
    pub branches: Vec<BranchReport>,
}

impl OperationReport {
    fn new(operation: Operation, moved: &RepositoryEntry) -> Self {
        Self {
            operation,
            source: moved.source.clone(),
            destination: moved.destination.clone(),
            working_copies: 0,
            commits: 0,
            files_rewritten: 0,
            warnings: 0,
            pushed: Vec::new(),
            approved: Vec::new(),
            pending: Vec::new(),
            abandoned: Vec::new(),
            notified: Vec::new(),
            branches: Vec::new(),
        }
    }

    fn absorb(&mut self, tree: &TreeReport) {
        self.files_rewritten += tree.modified_files();
        self.warnings += tree.warning_count();
    }
}

#[derive(Debug, Clone)]
pub struct MigrationOptions {
    /// Acting user for remote operations.
    pub user: Option<String>,
    /// Approve the ready subset even if some changes lack votes.
    pub force: bool,
    /// Upper bound on concurrent clones.
    pub jobs: usize,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            user: None,
            force: false,
            jobs: DEFAULT_JOBS,
        }
    }
}

/// A working copy that takes part in the migration, and the branches of it
/// that may carry a migration commit.
#[derive(Debug, Clone)]
struct Slot {
    role: CommitRole,
    /// Project the slot's changes are reviewed in.
    project: RepoKey,
    dir: PathBuf,
    branches: Vec<String>,
}

/// A migration commit found in a working copy.
#[derive(Debug, Clone)]
struct LocalChange {
    role: CommitRole,
    project: RepoKey,
    branch: String,
    dir: PathBuf,
    commit: CommitInfo,
    change_id: ChangeId,
}

#[derive(Debug, Clone)]
struct CloneTarget {
    project: RepoKey,
    dir: PathBuf,
}

/// Resolve the `<src>` command-line argument to a repository key.
///
/// A bare name is qualified with the configured source organization.
pub fn resolve_source(settings: &MigrationSettings, source: &str) -> MigrationResult<RepoKey> {
    if source.contains('/') {
        RepoKey::parse(source)
    } else {
        Ok(RepoKey::new(settings.source_org.clone(), source))
    }
}

fn change_seed(repo: &RepoKey, branch: &str, role: CommitRole) -> String {
    format!("{repo}:{branch}:{}", role.as_str())
}

async fn run_blocking<T, F>(f: F) -> MigrationResult<T>
where
    F: FnOnce() -> MigrationResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| MigrationError::Join(e.to_string()))?
}

async fn acquire_working_copy(
    vcs: &dyn Vcs,
    review: &dyn ReviewService,
    url: &str,
    target: &CloneTarget,
) -> MigrationResult<()> {
    if vcs.is_healthy(&target.dir).await {
        info!(project = %target.project, dir = %target.dir.display(), "update project");
        return vcs.refresh(&target.dir).await;
    }
    info!(project = %target.project, dir = %target.dir.display(), "clone project");
    vcs.clone_repo(url, &target.dir).await?;
    review.prepare_working_copy(&target.dir).await
}

/// One migration: a moved repository plus everything that references it.
pub struct Migration {
    set: RepositorySet,
    settings: MigrationSettings,
    moved: RepositoryEntry,
    layout: WorkspaceLayout,
    vcs: Arc<dyn Vcs>,
    review: Arc<dyn ReviewService>,
    options: MigrationOptions,
}

impl Migration {
    pub fn new(
        set: RepositorySet,
        settings: MigrationSettings,
        source: &str,
        workspace: &Path,
        vcs: Arc<dyn Vcs>,
        review: Arc<dyn ReviewService>,
        options: MigrationOptions,
    ) -> MigrationResult<Self> {
        let key = resolve_source(&settings, source)?;
        let moved = set.require(&key)?.clone();
        let layout = WorkspaceLayout::new(workspace, &moved.source);
        Ok(Self {
            set,
            settings,
            moved,
            layout,
            vcs,
            review,
            options,
        })
    }

    pub fn moved(&self) -> &RepositoryEntry {
        &self.moved
    }

    pub fn layout(&self) -> &WorkspaceLayout {
        &self.layout
    }

    /// Run one operation.
    pub async fn run(&self, operation: Operation) -> MigrationResult<OperationReport> {
        let source = self.moved.source.to_string();
        let span = obs::operation_span(operation.as_str(), &source);
        async {
            let started = Instant::now();
            obs::emit_operation_started(
                operation.as_str(),
                &source,
                &self.moved.destination.to_string(),
            );
            let result = self.dispatch(operation).await;
            if let Err(e) = &result {
                error!(error = %e, "operation failed");
            }
            obs::emit_operation_finished(
                operation.as_str(),
                started.elapsed().as_millis() as u64,
                result.is_ok(),
            );
            METRICS.flush();
            result
        }
        .instrument(span)
        .await
    }

    async fn dispatch(&self, operation: Operation) -> MigrationResult<OperationReport> {
        if operation.requires_user() {
            self.user(operation)?;
        }
        match operation {
            Operation::Clean => self.clean().await,
            Operation::Clone => self.clone_all(self.user(operation)?).await,
            Operation::Commit => self.commit().await,
            Operation::Review => self.review().await,
            Operation::Merge => self.merge().await,
            Operation::Notify => self.notify().await,
            Operation::Status => self.status().await,
        }
    }

    fn user(&self, operation: Operation) -> MigrationResult<&str> {
        self.options
            .user
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| MigrationError::MissingUser {
                operation: operation.to_string(),
            })
    }

    fn report(&self, operation: Operation) -> OperationReport {
        OperationReport::new(operation, &self.moved)
    }

    fn integration(&self) -> Option<(&IntegrationConfig, &RepositoryEntry)> {
        // Configuration resolution guarantees a single entry by that name.
        let integration = self.settings.integration.as_ref()?;
        let entry = self.set.by_name(&integration.project).next()?;
        Some((integration, entry))
    }

    fn dependents(&self) -> impl Iterator<Item = &RepositoryEntry> {
        self.set
            .entries()
            .iter()
            .filter(|e| e.source != self.moved.source)
    }

    fn marker(&self, role: CommitRole) -> MigrationMarker {
        MigrationMarker::new(role, &self.moved.source)
    }

    /// Working copies that can carry migration commits, in processing order.
    fn slots(&self, include_integration: bool) -> Vec<Slot> {
        let mut slots = vec![Slot {
            role: CommitRole::Content,
            project: self.moved.destination.clone(),
            dir: self.layout.destination_dir(&self.moved.destination),
            branches: self.moved.branches.clone(),
        }];
        slots.extend(self.dependents().map(|entry| Slot {
            role: CommitRole::References,
            project: entry.source.clone(),
            dir: self.layout.repo_dir(&entry.source),
            branches: entry.branches.clone(),
        }));
        if include_integration {
            if let Some((integration, entry)) = self.integration() {
                slots.push(Slot {
                    role: CommitRole::Integration,
                    project: entry.source.clone(),
                    dir: self.layout.integration_dir(integration),
                    branches: entry.branches.clone(),
                });
            }
        }
        slots
    }

    /// Reset a working copy and switch it to `branch`.
    async fn switch(&self, dir: &Path, branch: &str) -> MigrationResult<()> {
        self.vcs.reset_clean(dir).await?;
        self.vcs.checkout(dir, branch).await
    }

    async fn local_changes(&self, include_integration: bool) -> MigrationResult<Vec<LocalChange>> {
        let mut changes = Vec::new();
        for slot in self.slots(include_integration) {
            let marker = self.marker(slot.role);
            for branch in &slot.branches {
                self.switch(&slot.dir, branch).await?;
                let Some(commit) = self.vcs.find_marked(&slot.dir, branch, &marker).await? else {
                    debug!(project = %slot.project, branch, "no migration commit");
                    continue;
                };
                let change_id = commit.change_id(&format!("{}@{branch}", slot.project))?;
                changes.push(LocalChange {
                    role: slot.role,
                    project: slot.project.clone(),
                    branch: branch.clone(),
                    dir: slot.dir.clone(),
                    commit,
                    change_id,
                });
            }
        }
        Ok(changes)
    }

    async fn clean(&self) -> MigrationResult<OperationReport> {
        info!(dir = %self.layout.work_dir().display(), "clean everything in work dir");
        if !self.layout.clean().await? {
            debug!("work dir was already absent");
        }
        Ok(self.report(Operation::Clean))
    }

    fn clone_targets(&self) -> Vec<CloneTarget> {
        let mut targets: Vec<CloneTarget> = self
            .set
            .entries()
            .iter()
            .map(|e| CloneTarget {
                project: e.source.clone(),
                dir: self.layout.repo_dir(&e.source),
            })
            .collect();
        targets.push(CloneTarget {
            project: self.moved.destination.clone(),
            dir: self.layout.destination_dir(&self.moved.destination),
        });
        if let Some((integration, entry)) = self.integration() {
            targets.push(CloneTarget {
                project: entry.source.clone(),
                dir: self.layout.integration_dir(integration),
            });
        }
        targets
    }

    async fn clone_all(&self, user: &str) -> MigrationResult<OperationReport> {
        tokio::fs::create_dir_all(self.layout.work_dir()).await?;

        let sem = Arc::new(Semaphore::new(self.options.jobs.max(1)));
        let mut join_set = JoinSet::new();
        for target in self.clone_targets() {
            let url = self.settings.clone_url_for(user, &target.project);
            let vcs = Arc::clone(&self.vcs);
            let review = Arc::clone(&self.review);
            let sem = Arc::clone(&sem);
            join_set.spawn(
                async move {
                    let _permit = sem
                        .acquire_owned()
                        .await
                        .map_err(|e| MigrationError::Join(e.to_string()))?;
                    acquire_working_copy(vcs.as_ref(), review.as_ref(), &url, &target).await?;
                    Ok::<RepoKey, MigrationError>(target.project)
                }
                .in_current_span(),
            );
        }

        // Siblings keep running after a failure; the first error is reported.
        let mut ready = 0;
        let mut first_error = None;
        while let Some(joined) = join_set.join_next().await {
            let outcome = joined
                .map_err(|e| MigrationError::Join(format!("clone task: {e}")))
                .and_then(|r| r);
            match outcome {
                Ok(project) => {
                    debug!(project = %project, "working copy ready");
                    ready += 1;
                }
                Err(e) => {
                    error!(error = %e, "working copy failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let mut report = self.report(Operation::Clone);
        report.working_copies = ready;
        Ok(report)
    }

    async fn commit(&self) -> MigrationResult<OperationReport> {
        let mut report = self.report(Operation::Commit);
        let mut tracker = ChangeTracker::new(self.settings.default_branch.clone());
        let rewriter = ReferenceRewriter::new(
            &self.moved.source,
            &self.moved.destination,
            &self.settings.manifest_files,
        );

        self.commit_moved(&rewriter, &mut tracker, &mut report)
            .await?;
        self.commit_dependents(&rewriter, &mut tracker, &mut report)
            .await?;
        self.commit_integration(&tracker, &mut report).await?;
        info!(changes = tracker.change_count(), commits = report.commits, "migration commits in place");
        Ok(report)
    }

    async fn commit_moved(
        &self,
        rewriter: &ReferenceRewriter,
        tracker: &mut ChangeTracker,
        report: &mut OperationReport,
    ) -> MigrationResult<()> {
        let src_dir = self.layout.repo_dir(&self.moved.source);
        let dst_dir = self.layout.destination_dir(&self.moved.destination);
        let label = self.moved.destination.to_string();
        let marker = self.marker(CommitRole::Content);

        for branch in &self.moved.branches {
            info!(branch, "copying source to destination");
            // The branch must already exist in the destination.
            self.switch(&src_dir, branch).await?;
            self.switch(&dst_dir, branch).await?;

            if let Some(existing) = self.vcs.find_marked(&dst_dir, branch, &marker).await? {
                info!(branch, commit = %existing.sha, "branch has already been patched");
                tracker.record(&self.moved.source, branch, existing.change_id(&label)?);
                continue;
            }

            let tree = {
                let (src, dst) = (src_dir.clone(), dst_dir.clone());
                let rewriter = rewriter.clone();
                let entry = self.moved.clone();
                run_blocking(move || {
                    tree::clear_worktree(&dst)?;
                    let copied = tree::copy_worktree(&src, &dst)?;
                    debug!(copied, "source tree copied");
                    tree::rewrite_tree(&dst, &rewriter, Some(&entry))
                })
                .await?
            };
            report.absorb(&tree);

            let message = CommitMessage::compose(
                marker.clone(),
                &format!("Add content from {}", self.moved.source),
                &[],
                Vec::new(),
                ChangeId::generate(&change_seed(&self.moved.destination, branch, marker.role)),
            );
            let commit = self.vcs.commit_all(&dst_dir, &message).await?;
            METRICS.inc_commits();
            report.commits += 1;
            info!(branch, commit = %commit.sha, "content committed");
            tracker.record(&self.moved.source, branch, commit.change_id(&label)?);
        }
        Ok(())
    }

    async fn commit_dependents(
        &self,
        rewriter: &ReferenceRewriter,
        tracker: &mut ChangeTracker,
        report: &mut OperationReport,
    ) -> MigrationResult<()> {
        let marker = self.marker(CommitRole::References);
        let summary = format!("Change links to {}", self.moved.destination);

        for entry in self.dependents() {
            let dir = self.layout.repo_dir(&entry.source);
            let label = entry.source.to_string();
            let rules: Vec<(String, String)> = entry
                .literal_rewrites
                .iter()
                .map(|rule| rule.render(&self.moved))
                .collect();

            for branch in &entry.branches {
                info!(project = %entry.source, branch, "patching project");
                self.switch(&dir, branch).await?;
                let existing = self.vcs.find_marked(&dir, branch, &marker).await?;

                // Literal rules go first so the common pass does not report them.
                let tree = {
                    let dir = dir.clone();
                    let rules = rules.clone();
                    let rewriter = rewriter.clone();
                    let entry = entry.clone();
                    run_blocking(move || {
                        for (from, to) in &rules {
                            tree::replace_literal(&dir, from, to)?;
                        }
                        tree::rewrite_tree(&dir, &rewriter, Some(&entry))
                    })
                    .await?
                };
                report.absorb(&tree);

                let change_id = if self.vcs.has_changes(&dir).await? {
                    let depends = vec![tracker.resolve(&self.moved.source, branch)?.clone()];
                    let head = self.vcs.head(&dir).await?;
                    let commit = match existing {
                        Some(previous) if previous.sha == head.sha => {
                            info!(project = %entry.source, branch, "amending migration commit");
                            let message = CommitMessage::compose(
                                marker.clone(),
                                &summary,
                                &[],
                                depends,
                                previous.change_id(&label)?,
                            );
                            self.vcs.amend_all(&dir, &message).await?
                        }
                        _ => {
                            let message = CommitMessage::compose(
                                marker.clone(),
                                &summary,
                                &[],
                                depends,
                                ChangeId::generate(&change_seed(&entry.source, branch, marker.role)),
                            );
                            let commit = self.vcs.commit_all(&dir, &message).await?;
                            METRICS.inc_commits();
                            report.commits += 1;
                            commit
                        }
                    };
                    commit.change_id(&label)?
                } else if let Some(previous) = existing {
                    info!(project = %entry.source, branch, "patch is in place, skipping");
                    previous.change_id(&label)?
                } else {
                    debug!(project = %entry.source, branch, "patch is empty, skipping");
                    continue;
                };
                tracker.record(&entry.source, branch, change_id);
            }
        }
        Ok(())
    }

    async fn commit_integration(
        &self,
        tracker: &ChangeTracker,
        report: &mut OperationReport,
    ) -> MigrationResult<()> {
        let Some((integration, entry)) = self.integration() else {
            debug!("no integration project configured");
            return Ok(());
        };
        let dir = self.layout.integration_dir(integration);
        let label = format!("{} ({})", entry.source, integration.dir);
        let marker = self.marker(CommitRole::Integration);
        let summary = format!("Test review {}", self.moved.destination);

        for branch in &entry.branches {
            let depends = tracker.depends_for(branch, None);
            if depends.is_empty() {
                info!(branch, "no changes to aggregate, skipping integration commit");
                continue;
            }
            info!(project = %entry.source, branch, depends = depends.len(), "creating integration commit");
            self.switch(&dir, branch).await?;
            tokio::fs::write(dir.join(&integration.file), &integration.content).await?;

            let existing = self.vcs.find_marked(&dir, branch, &marker).await?;
            let head = self.vcs.head(&dir).await?;
            match existing {
                Some(previous) if previous.sha == head.sha => {
                    if previous.message.depends_on == depends && !self.vcs.has_changes(&dir).await? {
                        info!(branch, "integration commit is up to date");
                        continue;
                    }
                    let message = CommitMessage::compose(
                        marker.clone(),
                        &summary,
                        &[],
                        depends,
                        previous.change_id(&label)?,
                    );
                    self.vcs.amend_all(&dir, &message).await?;
                    info!(branch, "integration commit amended");
                }
                _ => {
                    let message = CommitMessage::compose(
                        marker.clone(),
                        &summary,
                        &[],
                        depends,
                        ChangeId::generate(&change_seed(&entry.source, branch, marker.role)),
                    );
                    self.vcs.commit_all(&dir, &message).await?;
                    METRICS.inc_commits();
                    report.commits += 1;
                }
            }
        }
        Ok(())
    }

    async fn review(&self) -> MigrationResult<OperationReport> {
        let mut report = self.report(Operation::Review);
        for change in self.local_changes(true).await? {
            let known = self.review.query_change(&change.change_id).await?;
            if known.as_ref().and_then(|c| c.revision()) == Some(change.commit.sha.as_str()) {
                info!(project = %change.project, branch = %change.branch, change_id = %change.change_id, "review already raised");
            } else {
                info!(project = %change.project, branch = %change.branch, change_id = %change.change_id, "push to review");
                self.review
                    .push(PushRequest {
                        dir: &change.dir,
                        project: &change.project,
                        branch: &change.branch,
                        change_id: &change.change_id,
                        revision: &change.commit.sha,
                    })
                    .await?;
                METRICS.inc_pushes();
                report.pushed.push(change.change_id.clone());
            }
            if change.role == CommitRole::Integration {
                self.review
                    .comment(&change.change_id, INTEGRATION_COMMENT)
                    .await?;
            }
        }
        Ok(report)
    }

    async fn merge(&self) -> MigrationResult<OperationReport> {
        let mut report = self.report(Operation::Merge);
        let (integration, tracked): (Vec<LocalChange>, Vec<LocalChange>) = self
            .local_changes(true)
            .await?
            .into_iter()
            .partition(|c| c.role == CommitRole::Integration);

        // Nothing can be merged before every branch of the move has content.
        for branch in &self.moved.branches {
            let moved = tracked
                .iter()
                .any(|c| c.role == CommitRole::Content && &c.branch == branch);
            if !moved {
                warn!(branch, "no content change on the destination, run commit and review first");
                return Err(MigrationError::NothingRecorded {
                    repo: format!("{}@{branch}", self.moved.destination),
                });
            }
        }

        let ids: Vec<ChangeId> = tracked.iter().map(|c| c.change_id.clone()).collect();
        let gate = ReviewGate::new(Arc::clone(&self.review));
        let statuses = gate.collect(&ids).await?;
        let decision = gate::evaluate(&statuses, self.options.force)?;

        for id in &decision.approve {
            info!(change_id = %id, "approving change");
            self.review.approve(id).await?;
            METRICS.inc_approvals();
        }
        for id in &decision.already_approved {
            debug!(change_id = %id, "already approved");
        }
        for id in &decision.pending {
            warn!(change_id = %id, "change lacks 'Code-Review +2' or 'Verified +1', left pending");
        }

        if decision.is_complete() {
            for change in &integration {
                match self.review.query_change(&change.change_id).await? {
                    Some(record) if record.is_open() => {
                        info!(change_id = %change.change_id, branch = %change.branch, "abandoning integration change");
                        self.review.abandon(&change.change_id).await?;
                        report.abandoned.push(change.change_id.clone());
                    }
                    _ => debug!(change_id = %change.change_id, "integration change not open"),
                }
            }
        }

        report.approved = decision.approve;
        report.pending = decision.pending;
        Ok(report)
    }

    async fn notify(&self) -> MigrationResult<OperationReport> {
        let mut report = self.report(Operation::Notify);
        let open = self.review.open_changes(&self.moved.source).await?;
        info!(project = %self.moved.source, open = open.len(), "notifying open reviews");
        for id in &open {
            self.review
                .comment(id, &self.settings.notification_message)
                .await?;
        }
        report.notified = open;
        Ok(report)
    }

    async fn status(&self) -> MigrationResult<OperationReport> {
        let mut report = self.report(Operation::Status);
        for slot in self.slots(true) {
            let healthy = self.vcs.is_healthy(&slot.dir).await;
            let marker = self.marker(slot.role);
            for branch in &slot.branches {
                let mut line = BranchReport {
                    repository: slot.project.clone(),
                    branch: branch.clone(),
                    role: slot.role,
                    state: BranchState::Absent,
                    change_id: None,
                    review: None,
                };
                if healthy {
                    self.branch_state(&slot, branch, &marker, &mut line).await?;
                }
                info!(
                    repository = %line.repository,
                    branch = %line.branch,
                    role = line.role.as_str(),
                    state = ?line.state,
                    "branch state"
                );
                report.branches.push(line);
            }
        }
        Ok(report)
    }

    async fn branch_state(
        &self,
        slot: &Slot,
        branch: &str,
        marker: &MigrationMarker,
        line: &mut BranchReport,
    ) -> MigrationResult<()> {
        line.state = BranchState::Cloned;
        // History is read in place; the work tree may hold the operator's edits.
        let commit = match self.vcs.find_marked(&slot.dir, branch, marker).await {
            Ok(Some(commit)) => commit,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!(project = %slot.project, branch, error = %e, "branch not available locally");
                return Ok(());
            }
        };
        let change_id = commit.change_id(&slot.project.to_string())?;
        line.state = match self.review.query_change(&change_id).await? {
            None => BranchState::ContentMoved,
            Some(record) => {
                line.review = Some(ReviewStatus::from_approvals(record.approvals()));
                if record.is_merged() {
                    BranchState::Merged
                } else {
                    BranchState::UnderReview
                }
            }
        };
        line.change_id = Some(change_id);
        Ok(())
    }
}
