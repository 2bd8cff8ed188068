//! Error taxonomy for migration operations.

use thiserror::Error;

/// Errors produced while planning or executing a migration.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The configuration file could not be interpreted.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The requested source project is not part of the repository set.
    #[error("project {name} could not be found in repos config")]
    UnknownProject { name: String },

    /// Two entries of the repository set point at the same destination.
    #[error("destination {destination} is claimed by both {first} and {second}")]
    DuplicateDestination {
        destination: String,
        first: String,
        second: String,
    },

    /// An operation that needs remote access was started without a user.
    #[error("user must be set for operation '{operation}'")]
    MissingUser { operation: String },

    /// An external command exited unsuccessfully.
    #[error("`{program} {args}` failed with {status}: {stderr}")]
    Command {
        program: String,
        args: String,
        status: String,
        stderr: String,
    },

    /// The external command could not be spawned at all.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A commit that should carry a change id does not.
    #[error("commit {commit} in {repo} has no Change-Id trailer")]
    MissingChangeId { repo: String, commit: String },

    /// The tracker holds no change for a repository it was asked about.
    #[error("no change recorded for repository {repo}")]
    NothingRecorded { repo: String },

    /// A tracked change is unknown to the review system.
    #[error("review {change_id} is not present in the review system")]
    ChangeNotFound { change_id: String },

    /// The review gate refused to approve the change set.
    #[error("{} change(s) lack 'Code-Review +2' and 'Verified +1': {}", pending.len(), pending.join(", "))]
    GateBlocked { pending: Vec<String> },

    /// The review system answered with something unparseable.
    #[error("unexpected review system response: {0}")]
    ReviewProtocol(String),

    /// A background task panicked or was cancelled.
    #[error("worker task failed: {0}")]
    Join(String),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MigrationError {
    /// Whether the error was raised before any external mutation could happen.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::UnknownProject { .. }
                | Self::DuplicateDestination { .. }
                | Self::MissingUser { .. }
                | Self::Yaml(_)
        )
    }
}

/// Convenience result alias.
pub type MigrationResult<T> = std::result::Result<T, MigrationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_blocked_lists_pending_changes() {
        let err = MigrationError::GateBlocked {
            pending: vec!["I01".to_string(), "I02".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("2 change(s)"));
        assert!(msg.contains("I01, I02"));
    }

    #[test]
    fn test_command_error_displays_invocation() {
        let err = MigrationError::Command {
            program: "git".to_string(),
            args: "checkout R5.0".to_string(),
            status: "exit status: 1".to_string(),
            stderr: "pathspec did not match".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("git checkout R5.0"));
        assert!(msg.contains("pathspec"));
    }

    #[test]
    fn test_precondition_classification() {
        assert!(MigrationError::MissingUser {
            operation: "clone".to_string()
        }
        .is_precondition());
        assert!(!MigrationError::ChangeNotFound {
            change_id: "I1".to_string()
        }
        .is_precondition());
    }
}
