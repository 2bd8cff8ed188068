//! Orchestrator-authored commits: change ids, migration markers and the
//! commit message contract.
//!
//! Every message starts with a bracketed tag (`[Migration]` or
//! `[Migration/<org>/<name>]`) and ends with a trailer block:
//!
//! ```text
//! [Migration/Juniper/contrail-foo] Change links to tungstenfabric/tf-foo
//!
//! Automated change
//!
//! Migration: references Juniper/contrail-foo
//! Depends-On: I5c0d...
//! Change-Id: I93ab...
//! ```
//!
//! Idempotence checks parse the `Migration:` trailer instead of grepping the
//! subject.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::MigrationError;
use crate::repo_set::RepoKey;

pub const MIGRATION_TAG: &str = "Migration";
pub const MARKER_TRAILER: &str = "Migration";
pub const DEPENDS_ON_TRAILER: &str = "Depends-On";
pub const CHANGE_ID_TRAILER: &str = "Change-Id";

fn trailer_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z][A-Za-z0-9-]*):\s*(.*?)\s*$").expect("static regex"))
}

/// Review-system change identifier; stable across amendments.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeId(String);

impl ChangeId {
    /// Wrap an identifier as found in a trailer or review query.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh Gerrit-style id (`I` + 40 hex chars) seeded by `seed`.
    pub fn generate(seed: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(seed.as_bytes());
        hasher.update(uuid::Uuid::new_v4().as_bytes());
        let digest = hex::encode(hasher.finalize());
        Self(format!("I{}", &digest[..40]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What an orchestrator commit does within a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitRole {
    /// Source tree copied into the destination repository.
    Content,
    /// References rewritten in a dependent repository.
    References,
    /// Synthetic do-not-merge change aggregating every other change.
    Integration,
}

impl CommitRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::References => "references",
            Self::Integration => "integration",
        }
    }
}

impl FromStr for CommitRole {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "content" => Ok(Self::Content),
            "references" => Ok(Self::References),
            "integration" => Ok(Self::Integration),
            other => Err(MigrationError::ReviewProtocol(format!(
                "unknown migration role '{other}'"
            ))),
        }
    }
}

/// Structured marker identifying a commit as produced by one migration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MigrationMarker {
    pub role: CommitRole,
    pub source: RepoKey,
}

impl MigrationMarker {
    pub fn new(role: CommitRole, source: &RepoKey) -> Self {
        Self {
            role,
            source: source.clone(),
        }
    }

    /// Value of the `Migration:` trailer.
    pub fn trailer_value(&self) -> String {
        format!("{} {}", self.role.as_str(), self.source)
    }

    /// Full trailer line, usable as a fixed-string log filter.
    pub fn trailer_line(&self) -> String {
        format!("{MARKER_TRAILER}: {}", self.trailer_value())
    }

    fn parse_value(value: &str) -> Option<Self> {
        let (role, source) = value.split_once(' ')?;
        Some(Self {
            role: role.parse().ok()?,
            source: RepoKey::parse(source.trim()).ok()?,
        })
    }

    /// Bracketed subject tag for this marker.
    pub fn subject_tag(&self) -> String {
        match self.role {
            CommitRole::Content => format!("[{MIGRATION_TAG}]"),
            _ => format!("[{MIGRATION_TAG}/{}]", self.source),
        }
    }
}

/// A commit message with its trailers split out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMessage {
    pub subject: String,
    pub body: Vec<String>,
    pub marker: Option<MigrationMarker>,
    pub depends_on: Vec<ChangeId>,
    pub change_id: Option<ChangeId>,
}

impl CommitMessage {
    /// Compose an orchestrator message for `marker` with the given summary.
    pub fn compose(
        marker: MigrationMarker,
        summary: &str,
        body: &[&str],
        depends_on: Vec<ChangeId>,
        change_id: ChangeId,
    ) -> Self {
        let mut lines = vec!["Automated change".to_string()];
        lines.extend(body.iter().map(|s| s.to_string()));
        Self {
            subject: format!("{} {summary}", marker.subject_tag()),
            body: lines,
            marker: Some(marker),
            depends_on,
            change_id: Some(change_id),
        }
    }

    /// Parse a raw message. Trailers are read from the last paragraph only.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim_end();
        let mut paragraphs: Vec<Vec<&str>> = vec![Vec::new()];
        for line in raw.lines() {
            if line.trim().is_empty() {
                if paragraphs.last().is_some_and(|p| !p.is_empty()) {
                    paragraphs.push(Vec::new());
                }
            } else if let Some(p) = paragraphs.last_mut() {
                p.push(line);
            }
        }
        paragraphs.retain(|p| !p.is_empty());

        let subject = paragraphs
            .first()
            .and_then(|p| p.first())
            .map(|s| s.to_string())
            .unwrap_or_default();

        let trailer_block = paragraphs.len() > 1
            && paragraphs
                .last()
                .is_some_and(|p| p.iter().all(|l| trailer_pattern().is_match(l)));

        let mut message = Self {
            subject,
            body: Vec::new(),
            marker: None,
            depends_on: Vec::new(),
            change_id: None,
        };

        let body_end = if trailer_block {
            paragraphs.len() - 1
        } else {
            paragraphs.len()
        };
        for (i, p) in paragraphs[..body_end].iter().enumerate() {
            let lines = if i == 0 { &p[1..] } else { &p[..] };
            message.body.extend(lines.iter().map(|s| s.to_string()));
        }

        if trailer_block {
            for line in paragraphs.last().into_iter().flatten() {
                let Some(caps) = trailer_pattern().captures(line) else {
                    continue;
                };
                let value = caps[2].to_string();
                match &caps[1] {
                    MARKER_TRAILER => message.marker = MigrationMarker::parse_value(&value),
                    DEPENDS_ON_TRAILER => message.depends_on.push(ChangeId::new(value)),
                    CHANGE_ID_TRAILER => message.change_id = Some(ChangeId::new(value)),
                    _ => {}
                }
            }
        }
        message
    }

    /// Whether the message carries exactly this marker.
    pub fn has_marker(&self, marker: &MigrationMarker) -> bool {
        self.marker.as_ref() == Some(marker)
    }
}

impl fmt::Display for CommitMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.subject)?;
        if !self.body.is_empty() {
            writeln!(f)?;
            for line in &self.body {
                writeln!(f, "{line}")?;
            }
        }
        let has_trailers =
            self.marker.is_some() || !self.depends_on.is_empty() || self.change_id.is_some();
        if has_trailers {
            writeln!(f)?;
        }
        if let Some(marker) = &self.marker {
            writeln!(f, "{}", marker.trailer_line())?;
        }
        for dep in &self.depends_on {
            writeln!(f, "{DEPENDS_ON_TRAILER}: {dep}")?;
        }
        if let Some(id) = &self.change_id {
            writeln!(f, "{CHANGE_ID_TRAILER}: {id}")?;
        }
        Ok(())
    }
}
