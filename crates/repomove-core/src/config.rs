//! YAML configuration for a migration run.
//!
//! The file lists every project taking part in migrations plus the knobs of
//! the external collaborators (clone URL, review service, integration
//! repository). [`ReposConfig::resolve`] turns it into the immutable
//! [`RepositorySet`] and [`MigrationSettings`] consumed by the workflow.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MigrationError, MigrationResult};
use crate::repo_set::{LiteralRewrite, RepoKey, RepositoryEntry, RepositorySet};

pub const DEFAULT_SOURCE_ORG: &str = "Juniper";
pub const DEFAULT_BRANCH: &str = "master";
pub const DEFAULT_CLONE_URL: &str = "ssh://{user}@review.opencontrail.org:29418/{project}.git";
pub const DEFAULT_NOTIFICATION: &str = "Please note that this project will be moved to TF soon.\n\
Please create new review after moving is completed";

/// One `projects:` entry as written in the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub src: String,
    #[serde(default)]
    pub src_org: Option<String>,
    pub dst_org: String,
    pub dst: String,
    #[serde(default)]
    pub branches: Option<Vec<String>>,
    #[serde(default)]
    pub excludes: Option<Vec<String>>,
    #[serde(default)]
    pub literal_rewrites: Vec<LiteralRewrite>,
}

/// Connection settings for the review service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub host: String,
    pub port: u16,
    /// Fetch the service's `commit-msg` hook into every fresh clone.
    pub install_commit_hook: bool,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            host: "review.opencontrail.org".to_string(),
            port: 29418,
            install_commit_hook: true,
        }
    }
}

/// The repository that receives the synthetic do-not-merge change
/// aggregating every other change of a migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationConfig {
    /// Source name of the integration project (must be in `projects`).
    pub project: String,
    /// Directory of the second working copy, relative to the migration dir.
    #[serde(default = "default_integration_dir")]
    pub dir: String,
    /// File written by the synthetic commit.
    #[serde(default = "default_integration_file")]
    pub file: String,
    #[serde(default = "default_integration_content")]
    pub content: String,
}

fn default_integration_dir() -> String {
    "test".to_string()
}

fn default_integration_file() -> String {
    "test".to_string()
}

fn default_integration_content() -> String {
    "do not merge".to_string()
}

/// Committer identity forced onto orchestrator commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitIdentity {
    pub name: String,
    pub email: String,
}

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReposConfig {
    #[serde(default = "default_source_org")]
    pub source_org: String,
    #[serde(default = "default_branch")]
    pub default_branch: String,
    /// Branches tracked by projects that do not list their own.
    #[serde(default)]
    pub default_branches: Vec<String>,
    #[serde(default = "default_clone_url")]
    pub clone_url: String,
    #[serde(default)]
    pub review: ReviewConfig,
    #[serde(default)]
    pub integration: Option<IntegrationConfig>,
    #[serde(default = "default_notification")]
    pub notification_message: String,
    #[serde(default = "default_manifest_files")]
    pub manifest_files: Vec<String>,
    #[serde(default)]
    pub git_identity: Option<GitIdentity>,
    pub projects: Vec<ProjectConfig>,
}

fn default_source_org() -> String {
    DEFAULT_SOURCE_ORG.to_string()
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

fn default_clone_url() -> String {
    DEFAULT_CLONE_URL.to_string()
}

fn default_notification() -> String {
    DEFAULT_NOTIFICATION.to_string()
}

fn default_manifest_files() -> Vec<String> {
    vec!["ci_unittests.json".to_string()]
}

/// Everything except the repository list, resolved and ready to use.
#[derive(Debug, Clone)]
pub struct MigrationSettings {
    pub source_org: String,
    pub default_branch: String,
    pub clone_url: String,
    pub review: ReviewConfig,
    pub integration: Option<IntegrationConfig>,
    pub notification_message: String,
    pub manifest_files: Vec<String>,
    pub git_identity: Option<GitIdentity>,
}

impl MigrationSettings {
    /// Render the clone URL of `project` for `user`.
    pub fn clone_url_for(&self, user: &str, project: &RepoKey) -> String {
        self.clone_url
            .replace("{user}", user)
            .replace("{project}", &project.to_string())
    }
}

impl ReposConfig {
    /// Read and parse a configuration file.
    pub fn load(path: &Path) -> MigrationResult<Self> {
        tracing::info!(path = %path.display(), "reading project's config");
        let raw = std::fs::read_to_string(path).map_err(|e| {
            MigrationError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> MigrationResult<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Validate the file and split it into the repository set and settings.
    pub fn resolve(self) -> MigrationResult<(RepositorySet, MigrationSettings)> {
        let default_branches = if self.default_branches.is_empty() {
            vec![self.default_branch.clone()]
        } else {
            self.default_branches.clone()
        };
        let mut entries = Vec::with_capacity(self.projects.len());
        for project in &self.projects {
            let src_org = project.src_org.as_deref().unwrap_or(&self.source_org);
            let source = RepoKey::parse(&format!("{src_org}/{}", project.src))?;
            let destination = RepoKey::parse(&format!("{}/{}", project.dst_org, project.dst))?;
            let branches = project
                .branches
                .clone()
                .unwrap_or_else(|| default_branches.clone());
            let excludes = project
                .excludes
                .iter()
                .flatten()
                .map(|p| normalize_relative(p))
                .collect();
            entries.push(RepositoryEntry {
                source,
                destination,
                branches,
                excludes,
                literal_rewrites: project.literal_rewrites.clone(),
            });
        }
        let set = RepositorySet::new(entries)?;

        if let Some(integration) = &self.integration {
            validate_integration(&set, integration)?;
        }
        if !self.clone_url.contains("{project}") {
            return Err(MigrationError::Config(
                "clone_url must contain a {project} placeholder".to_string(),
            ));
        }

        let settings = MigrationSettings {
            source_org: self.source_org,
            default_branch: self.default_branch,
            clone_url: self.clone_url,
            review: self.review,
            integration: self.integration,
            notification_message: self.notification_message,
            manifest_files: self.manifest_files,
            git_identity: self.git_identity,
        };
        Ok((set, settings))
    }
}

/// The integration project must name exactly one entry, and its second
/// working copy must not land on an organization directory.
fn validate_integration(set: &RepositorySet, integration: &IntegrationConfig) -> MigrationResult<()> {
    let listed = set.by_name(&integration.project).count();
    if listed == 0 {
        return Err(MigrationError::Config(format!(
            "integration project {} is not listed in projects",
            integration.project
        )));
    }
    if listed > 1 {
        return Err(MigrationError::Config(format!(
            "integration project {} is ambiguous: listed under {listed} organizations",
            integration.project
        )));
    }

    let mut components = Path::new(&integration.dir).components();
    if !matches!(
        (components.next(), components.next()),
        (Some(std::path::Component::Normal(_)), None)
    ) {
        return Err(MigrationError::Config(format!(
            "integration dir '{}' must be a single directory name",
            integration.dir
        )));
    }
    let clashes = set
        .entries()
        .iter()
        .any(|e| e.source.org == integration.dir || e.destination.org == integration.dir);
    if clashes {
        return Err(MigrationError::Config(format!(
            "integration dir '{}' collides with an organization directory",
            integration.dir
        )));
    }
    Ok(())
}

/// Strip `./` prefixes so exclusions compare equal to walked paths.
fn normalize_relative(path: &str) -> PathBuf {
    Path::new(path)
        .components()
        .filter(|c| !matches!(c, std::path::Component::CurDir))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
default_branches: [master, R5.0]
integration:
  project: contrail-controller
projects:
  - src: contrail-foo
    dst_org: tungstenfabric
    dst: tf-foo
  - src: contrail-controller
    dst_org: tungstenfabric
    dst: tf-controller
    branches: [master]
    excludes: [./docs/history.md]
  - src: contrail-vnc
    src_org: Other
    dst_org: tungstenfabric
    dst: tf-vnc
    literal_rewrites:
      - from: 'name="{src}" remote="github"'
        to: 'name="{dst}" remote="githubtf"'
"#;

    #[test]
    fn test_resolve_applies_defaults() {
        let cfg = ReposConfig::from_yaml_str(SAMPLE).unwrap();
        let (set, settings) = cfg.resolve().unwrap();
        assert_eq!(set.len(), 3);

        let foo = set.require(&RepoKey::new("Juniper", "contrail-foo")).unwrap();
        assert_eq!(foo.branches, vec!["master", "R5.0"]);
        assert_eq!(foo.destination.to_string(), "tungstenfabric/tf-foo");

        let ctl = set
            .require(&RepoKey::new("Juniper", "contrail-controller"))
            .unwrap();
        assert_eq!(ctl.branches, vec!["master"]);
        assert!(ctl.is_excluded(Path::new("docs/history.md")));

        let vnc = set.require(&RepoKey::new("Other", "contrail-vnc")).unwrap();
        assert_eq!(vnc.literal_rewrites.len(), 1);

        assert_eq!(settings.default_branch, "master");
        assert_eq!(settings.manifest_files, vec!["ci_unittests.json"]);
        let integration = settings.integration.unwrap();
        assert_eq!(integration.dir, "test");
        assert_eq!(integration.content, "do not merge");
        assert!(settings.review.install_commit_hook);
    }

    #[test]
    fn test_clone_url_rendering() {
        let cfg = ReposConfig::from_yaml_str(SAMPLE).unwrap();
        let (_, settings) = cfg.resolve().unwrap();
        let url = settings.clone_url_for("alice", &RepoKey::new("Juniper", "contrail-foo"));
        assert_eq!(
            url,
            "ssh://alice@review.opencontrail.org:29418/Juniper/contrail-foo.git"
        );
    }

    #[test]
    fn test_unknown_integration_project_rejected() {
        let raw = r#"
default_branches: [master]
integration: { project: missing }
projects:
  - { src: a, dst_org: tf, dst: a }
"#;
        let err = ReposConfig::from_yaml_str(raw)
            .unwrap()
            .resolve()
            .unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_same_name_under_two_orgs_gets_two_working_copies() {
        let raw = r#"
default_branches: [master]
projects:
  - { src: Foo, src_org: Org, dst_org: NewOrg, dst: Foo2 }
  - { src: bar, src_org: Org, dst_org: NewOrg, dst: bar }
  - { src: bar, src_org: Other, dst_org: NewOrg, dst: bar2 }
"#;
        let (set, _) = ReposConfig::from_yaml_str(raw).unwrap().resolve().unwrap();
        let layout = crate::workspace::WorkspaceLayout::new(
            Path::new("/ws"),
            &RepoKey::new("Org", "Foo"),
        );
        let dirs: std::collections::BTreeSet<PathBuf> = set
            .entries()
            .iter()
            .map(|e| layout.repo_dir(&e.source))
            .chain([layout.destination_dir(&RepoKey::new("NewOrg", "Foo2"))])
            .collect();
        assert_eq!(dirs.len(), 4);
    }

    #[test]
    fn test_ambiguous_integration_project_rejected() {
        let raw = r#"
default_branches: [master]
integration: { project: bar }
projects:
  - { src: bar, src_org: Org, dst_org: NewOrg, dst: bar }
  - { src: bar, src_org: Other, dst_org: NewOrg, dst: bar2 }
"#;
        let err = ReposConfig::from_yaml_str(raw)
            .unwrap()
            .resolve()
            .unwrap_err();
        assert!(err.to_string().contains("ambiguous"), "{err}");
    }

    #[test]
    fn test_integration_dir_clashing_with_org_rejected() {
        for dir in ["NewOrg", "Org", "a/b", ".."] {
            let raw = format!(
                r#"
default_branches: [master]
integration: {{ project: bar, dir: "{dir}" }}
projects:
  - {{ src: bar, src_org: Org, dst_org: NewOrg, dst: bar }}
"#
            );
            let err = ReposConfig::from_yaml_str(&raw)
                .unwrap()
                .resolve()
                .unwrap_err();
            assert!(matches!(err, MigrationError::Config(_)), "{dir}: {err}");
        }
    }

    #[test]
    fn test_malformed_yaml_is_error() {
        assert!(ReposConfig::from_yaml_str("projects: [").is_err());
    }

    #[test]
    fn test_clone_url_requires_project_placeholder() {
        let raw = r#"
default_branches: [master]
clone_url: "ssh://host/fixed.git"
projects:
  - { src: a, dst_org: tf, dst: a }
"#;
        assert!(ReposConfig::from_yaml_str(raw).unwrap().resolve().is_err());
    }

    #[test]
    fn test_missing_branch_lists_fall_back_to_default_branch() {
        let raw = r#"
default_branch: main
projects:
  - { src: a, dst_org: tf, dst: a }
"#;
        let (set, _) = ReposConfig::from_yaml_str(raw).unwrap().resolve().unwrap();
        assert_eq!(set.entries()[0].branches, vec!["main"]);
    }
}
