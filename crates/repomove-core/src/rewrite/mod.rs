//! Reference rewriting.
//!
//! [`ReferenceRewriter`] replaces the fully-qualified source identifier
//! (`Org/Repo`) with the destination identifier in text files. Occurrences
//! inside links to the project wiki or to a pinned revision are preserved,
//! since the path element after `blob/` may be a commit SHA rather than a
//! branch. Bare project names are never rewritten, only reported.
//!
//! The engine is pure: [`ReferenceRewriter::rewrite_text`] maps text to text
//! plus warnings. [`tree`] drives it over a working tree.

pub mod tree;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::repo_set::RepoKey;

/// Prefix that precedes the identifier in hosted links.
pub const LINK_PREFIX: &str = "https://github.com/";

/// Link suffixes pointing at a specific revision.
const PINNED_SEGMENTS: &[&str] = &["/blob", "/tree", "/commit"];

/// Why an occurrence was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// `https://github.com/Org/Repo/wiki...`
    WikiLink,
    /// `https://github.com/Org/Repo/blob/<ref>...` and friends.
    PinnedLink,
    /// The project name without organization.
    BareName,
    /// The project name listed in a requirements/manifest file.
    ManifestEntry,
}

/// An occurrence deliberately left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewriteWarning {
    /// 1-based line number.
    pub line: usize,
    pub kind: WarningKind,
    /// The offending line, trimmed.
    pub text: String,
}

impl fmt::Display for RewriteWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            WarningKind::WikiLink => write!(
                f,
                "link to wiki found in line {} and it won't be changed",
                self.line
            ),
            WarningKind::PinnedLink => write!(
                f,
                "link to commit found in line {} and it won't be changed",
                self.line
            ),
            WarningKind::BareName => write!(
                f,
                "project name found in line {} and it won't be changed: {}",
                self.line, self.text
            ),
            WarningKind::ManifestEntry => write!(
                f,
                "package entry found in line {} of a manifest and it won't be changed: {}",
                self.line, self.text
            ),
        }
    }
}

/// Result of rewriting one text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRewrite {
    pub content: String,
    pub modified: bool,
    pub warnings: Vec<RewriteWarning>,
}

/// Outcome of the rewriter for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewriteFinding {
    /// Path relative to the working tree root.
    pub path: PathBuf,
    pub modified: bool,
    pub warnings: Vec<RewriteWarning>,
}

/// Why a file was not scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Binary,
    NotUtf8,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binary => f.write_str("binary content"),
            Self::NotUtf8 => f.write_str("content is not valid utf-8"),
        }
    }
}

/// Rewrites `source` references into `destination` references.
#[derive(Debug, Clone)]
pub struct ReferenceRewriter {
    source: RepoKey,
    source_key: String,
    destination_key: String,
    manifest_files: Vec<String>,
}

impl ReferenceRewriter {
    pub fn new(source: &RepoKey, destination: &RepoKey, manifest_files: &[String]) -> Self {
        Self {
            source: source.clone(),
            source_key: source.to_string(),
            destination_key: destination.to_string(),
            manifest_files: manifest_files.to_vec(),
        }
    }

    /// Bare project name the rewriter looks for.
    pub fn needle(&self) -> &str {
        &self.source.name
    }

    /// Whether `path` names a requirements/manifest file.
    pub fn is_manifest(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        name.ends_with("requirements.txt") || self.manifest_files.iter().any(|m| m == name)
    }

    /// Decode `bytes` and rewrite them. Binary or non-UTF-8 input is refused.
    pub fn rewrite_bytes(&self, path: &Path, bytes: &[u8]) -> Result<TextRewrite, SkipReason> {
        if bytes.contains(&0) {
            return Err(SkipReason::Binary);
        }
        let text = std::str::from_utf8(bytes).map_err(|_| SkipReason::NotUtf8)?;
        Ok(self.rewrite_text(text, self.is_manifest(path)))
    }

    /// Rewrite `text`; `manifest` marks requirements/manifest content.
    pub fn rewrite_text(&self, text: &str, manifest: bool) -> TextRewrite {
        let mut content = String::with_capacity(text.len());
        let mut modified = false;
        let mut warnings = Vec::new();

        for (n, raw) in text.split_inclusive('\n').enumerate() {
            let line_no = n + 1;
            let mut line = raw.to_string();
            modified |= self.rewrite_qualified(&mut line, line_no, &mut warnings);
            self.scan_bare(&line, line_no, manifest, &mut warnings);
            content.push_str(&line);
        }

        TextRewrite {
            content,
            modified,
            warnings,
        }
    }

    /// Replace every qualified occurrence not protected by a link context.
    fn rewrite_qualified(
        &self,
        line: &mut String,
        line_no: usize,
        warnings: &mut Vec<RewriteWarning>,
    ) -> bool {
        let mut replaced = false;
        let mut from = 0;
        while let Some(rel) = line[from..].find(&self.source_key) {
            let at = from + rel;
            let end = at + self.source_key.len();
            let rewritten_already =
                spans(line, &self.destination_key).any(|(s, e)| s <= at && end <= e);
            if rewritten_already || !is_standalone(line.as_bytes(), at, end) {
                from = end;
                continue;
            }
            if let Some(kind) = self.protected_link(line.as_bytes(), at) {
                warnings.push(RewriteWarning {
                    line: line_no,
                    kind,
                    text: line.trim().to_string(),
                });
                from = end;
                continue;
            }
            line.replace_range(at..end, &self.destination_key);
            replaced = true;
            from = at + self.destination_key.len();
        }
        replaced
    }

    /// Inspect the window preceding an occurrence at `at` for a link prefix.
    fn protected_link(&self, line: &[u8], at: usize) -> Option<WarningKind> {
        let start = at.checked_sub(LINK_PREFIX.len())?;
        let window = &line[start..];
        if !window.starts_with(LINK_PREFIX.as_bytes()) {
            return None;
        }
        let rest = &window[LINK_PREFIX.len() + self.source_key.len()..];
        if rest.starts_with(b"/wiki") {
            return Some(WarningKind::WikiLink);
        }
        PINNED_SEGMENTS
            .iter()
            .any(|seg| rest.starts_with(seg.as_bytes()))
            .then_some(WarningKind::PinnedLink)
    }

    /// Report bare-name occurrences that are not part of a qualified name.
    fn scan_bare(
        &self,
        line: &str,
        line_no: usize,
        manifest: bool,
        warnings: &mut Vec<RewriteWarning>,
    ) {
        let name = self.needle();
        let covered: Vec<(usize, usize)> = spans(line, &self.source_key)
            .chain(spans(line, &self.destination_key))
            .collect();
        let bytes = line.as_bytes();

        for (start, end) in spans(line, name) {
            if !is_standalone(bytes, start, end)
                || covered.iter().any(|&(s, e)| s <= start && end <= e)
            {
                continue;
            }
            // Legacy on-disk layout, still valid after the move.
            if start >= 4 && &bytes[start - 4..start] == b"src/" {
                continue;
            }
            let kind = if manifest {
                WarningKind::ManifestEntry
            } else {
                WarningKind::BareName
            };
            warnings.push(RewriteWarning {
                line: line_no,
                kind,
                text: line.trim().to_string(),
            });
        }
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

/// Whether `line[start..end]` is not glued to a longer identifier.
fn is_standalone(line: &[u8], start: usize, end: usize) -> bool {
    let before = start.checked_sub(1).map(|i| line[i]);
    let after = line.get(end).copied();
    !before.is_some_and(is_word_byte) && !after.is_some_and(is_word_byte)
}

/// Byte spans of non-overlapping occurrences of `needle` in `haystack`.
fn spans<'a>(haystack: &'a str, needle: &'a str) -> impl Iterator<Item = (usize, usize)> + 'a {
    haystack
        .match_indices(needle)
        .map(move |(at, m)| (at, at + m.len()))
}
