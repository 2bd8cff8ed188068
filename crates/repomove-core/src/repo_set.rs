//! Repository set: the immutable list of repositories taking part in a
//! migration.
//!
//! Every entry pairs a source identity with its destination identity. The set
//! is built once from configuration and passed by reference to every
//! component; nothing mutates it afterwards.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MigrationError, MigrationResult};

/// Identifies a hosted repository as an `(organization, name)` pair.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct RepoKey {
    pub org: String,
    pub name: String,
}

impl RepoKey {
    pub fn new(org: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            org: org.into(),
            name: name.into(),
        }
    }

    /// Parse an `org/name` identifier. Both halves must be non-empty.
    pub fn parse(value: &str) -> MigrationResult<Self> {
        match value.split_once('/') {
            Some((org, name)) if !org.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self::new(org, name))
            }
            _ => Err(MigrationError::Config(format!(
                "'{value}' is not an org/name identifier"
            ))),
        }
    }
}

impl fmt::Display for RepoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.org, self.name)
    }
}

/// A verbatim substitution applied to a dependent repository before the
/// common reference rewrite.
///
/// `{src}` and `{dst}` in either side are replaced by the moved project's
/// source and destination names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiteralRewrite {
    pub from: String,
    pub to: String,
}

impl LiteralRewrite {
    /// Render both sides for the project being moved.
    pub fn render(&self, moved: &RepositoryEntry) -> (String, String) {
        let fill = |s: &str| {
            s.replace("{src}", &moved.source.name)
                .replace("{dst}", &moved.destination.name)
        };
        (fill(&self.from), fill(&self.to))
    }
}

/// One repository taking part in a migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryEntry {
    pub source: RepoKey,
    pub destination: RepoKey,
    /// Tracked branches, in configuration order.
    pub branches: Vec<String>,
    /// Paths (relative to the repository root) the rewriter must not touch.
    pub excludes: Vec<PathBuf>,
    pub literal_rewrites: Vec<LiteralRewrite>,
}

impl RepositoryEntry {
    /// Whether `relative` is one of this entry's rewrite-exempt paths.
    pub fn is_excluded(&self, relative: &Path) -> bool {
        self.excludes.iter().any(|e| e == relative)
    }
}

/// The resolved, immutable set of repositories for one configuration.
#[derive(Debug, Clone, Default)]
pub struct RepositorySet {
    entries: Vec<RepositoryEntry>,
}

impl RepositorySet {
    /// Build a set, rejecting duplicate sources and colliding destinations.
    pub fn new(entries: Vec<RepositoryEntry>) -> MigrationResult<Self> {
        let mut sources: HashSet<&RepoKey> = HashSet::new();
        let mut destinations: HashMap<&RepoKey, &RepoKey> = HashMap::new();
        for entry in &entries {
            if !sources.insert(&entry.source) {
                return Err(MigrationError::Config(format!(
                    "project {} is configured more than once",
                    entry.source
                )));
            }
            if entry.branches.is_empty() {
                return Err(MigrationError::Config(format!(
                    "project {} has no branches",
                    entry.source
                )));
            }
            if let Some(first) = destinations.insert(&entry.destination, &entry.source) {
                return Err(MigrationError::DuplicateDestination {
                    destination: entry.destination.to_string(),
                    first: first.to_string(),
                    second: entry.source.to_string(),
                });
            }
        }
        // A destination working copy must not share a path with a source copy.
        if let Some(entry) = entries.iter().find(|e| sources.contains(&e.destination)) {
            return Err(MigrationError::Config(format!(
                "destination {} of {} is also configured as a source",
                entry.destination, entry.source
            )));
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[RepositoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, source: &RepoKey) -> Option<&RepositoryEntry> {
        self.entries.iter().find(|e| &e.source == source)
    }

    /// Find the entry for `source`, failing with a configuration error.
    pub fn require(&self, source: &RepoKey) -> MigrationResult<&RepositoryEntry> {
        self.get(source).ok_or_else(|| MigrationError::UnknownProject {
            name: source.to_string(),
        })
    }

    /// Entries whose source name equals `name`, regardless of organization.
    pub fn by_name<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a RepositoryEntry> {
        self.entries.iter().filter(move |e| e.source.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(src: &str, dst: &str) -> RepositoryEntry {
        RepositoryEntry {
            source: RepoKey::parse(src).unwrap(),
            destination: RepoKey::parse(dst).unwrap(),
            branches: vec!["master".to_string()],
            excludes: vec![],
            literal_rewrites: vec![],
        }
    }

    #[test]
    fn test_repo_key_parse_and_display() {
        let key = RepoKey::parse("Juniper/contrail-foo").unwrap();
        assert_eq!(key.org, "Juniper");
        assert_eq!(key.name, "contrail-foo");
        assert_eq!(key.to_string(), "Juniper/contrail-foo");
    }

    #[test]
    fn test_repo_key_parse_rejects_malformed() {
        assert!(RepoKey::parse("no-slash").is_err());
        assert!(RepoKey::parse("/name").is_err());
        assert!(RepoKey::parse("org/").is_err());
        assert!(RepoKey::parse("a/b/c").is_err());
    }

    #[test]
    fn test_duplicate_destination_rejected() {
        let err = RepositorySet::new(vec![
            entry("Juniper/a", "tungstenfabric/x"),
            entry("Juniper/b", "tungstenfabric/x"),
        ])
        .unwrap_err();
        match err {
            MigrationError::DuplicateDestination {
                destination,
                first,
                second,
            } => {
                assert_eq!(destination, "tungstenfabric/x");
                assert_eq!(first, "Juniper/a");
                assert_eq!(second, "Juniper/b");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicate_source_rejected() {
        let res = RepositorySet::new(vec![
            entry("Juniper/a", "tungstenfabric/x"),
            entry("Juniper/a", "tungstenfabric/y"),
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn test_same_name_in_two_orgs_is_allowed() {
        let set = RepositorySet::new(vec![
            entry("Org/bar", "NewOrg/bar"),
            entry("Other/bar", "NewOrg/bar2"),
        ])
        .unwrap();
        assert_eq!(set.by_name("bar").count(), 2);
    }

    #[test]
    fn test_destination_that_is_also_a_source_rejected() {
        let err = RepositorySet::new(vec![
            entry("Org/a", "Org/b"),
            entry("Org/b", "NewOrg/b"),
        ])
        .unwrap_err();
        assert!(matches!(err, MigrationError::Config(_)));
        assert!(err.to_string().contains("Org/b"));

        assert!(RepositorySet::new(vec![entry("Org/a", "Org/a")]).is_err());
    }

    #[test]
    fn test_require_unknown_project() {
        let set = RepositorySet::new(vec![entry("Juniper/a", "tf/a")]).unwrap();
        assert!(set.require(&RepoKey::new("Juniper", "a")).is_ok());
        let err = set.require(&RepoKey::new("Juniper", "zzz")).unwrap_err();
        assert!(err.to_string().contains("Juniper/zzz"));
    }

    #[test]
    fn test_literal_rewrite_render() {
        let moved = entry("Juniper/contrail-foo", "tungstenfabric/tf-foo");
        let rule = LiteralRewrite {
            from: r#"name="{src}" remote="github""#.to_string(),
            to: r#"name="{dst}" remote="githubtf""#.to_string(),
        };
        let (from, to) = rule.render(&moved);
        assert_eq!(from, r#"name="contrail-foo" remote="github""#);
        assert_eq!(to, r#"name="tf-foo" remote="githubtf""#);
    }

    #[test]
    fn test_is_excluded_matches_relative_path() {
        let mut e = entry("Juniper/a", "tf/a");
        e.excludes.push(PathBuf::from("docs/history.md"));
        assert!(e.is_excluded(Path::new("docs/history.md")));
        assert!(!e.is_excluded(Path::new("docs/other.md")));
    }
}
