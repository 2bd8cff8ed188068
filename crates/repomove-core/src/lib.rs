//! repomove core library
//!
//! Moves a repository to a new organization and keeps every repository that
//! references it consistent, routing each change through code review.

pub mod change;
pub mod config;
pub mod error;
pub mod fakes;
pub mod gate;
pub mod gerrit;
pub mod git;
pub mod metrics;
pub mod obs;
pub mod process;
pub mod repo_set;
pub mod review;
pub mod rewrite;
pub mod telemetry;
pub mod tracker;
pub mod vcs;
pub mod workflow;
pub mod workspace;

pub use change::{ChangeId, CommitMessage, CommitRole, MigrationMarker};
pub use config::{GitIdentity, IntegrationConfig, MigrationSettings, ReposConfig, ReviewConfig};
pub use error::{MigrationError, MigrationResult};
pub use gate::{evaluate, GateDecision, ReviewGate, ReviewStatus};
pub use gerrit::GerritSsh;
pub use git::{is_git_repo, GitCli};
pub use repo_set::{LiteralRewrite, RepoKey, RepositoryEntry, RepositorySet};
pub use review::{ChangeRecord, ReviewService};
pub use rewrite::tree::{rewrite_tree, TreeReport};
pub use rewrite::{ReferenceRewriter, RewriteWarning, WarningKind};
pub use tracker::ChangeTracker;
pub use vcs::Vcs;
pub use workflow::{
    BranchReport, BranchState, Migration, MigrationOptions, Operation, OperationReport,
};
pub use workspace::WorkspaceLayout;
