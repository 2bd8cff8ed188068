//! Working-tree passes: rewriting, literal substitution and tree copying.
//!
//! Everything here is blocking filesystem work; async callers wrap it in
//! `tokio::task::spawn_blocking`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{error, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::MigrationResult;
use crate::metrics::METRICS;
use crate::repo_set::RepositoryEntry;
use crate::rewrite::{ReferenceRewriter, RewriteFinding, SkipReason};

/// Version-control metadata directory, never touched.
pub const VCS_DIR: &str = ".git";

const ARCHIVE_SUFFIXES: &[&str] = &[".zip", ".tgz", ".tar.gz"];

/// Aggregated result of one rewrite pass over a tree.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TreeReport {
    /// Files that were modified or produced warnings.
    pub findings: Vec<RewriteFinding>,
    /// Candidate files that could not be decoded.
    pub skipped: Vec<(PathBuf, SkipReason)>,
}

impl TreeReport {
    pub fn modified_files(&self) -> usize {
        self.findings.iter().filter(|f| f.modified).count()
    }

    pub fn warning_count(&self) -> usize {
        self.findings.iter().map(|f| f.warnings.len()).sum()
    }
}

fn is_vcs_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir() && entry.file_name() == VCS_DIR
}

/// Vendored upstream sources and archives are not ours to rewrite.
fn is_foreign(relative: &Path) -> bool {
    let text = relative.to_string_lossy();
    if ARCHIVE_SUFFIXES.iter().any(|s| text.ends_with(s)) {
        return true;
    }
    let parts: Vec<_> = relative.components().map(|c| c.as_os_str()).collect();
    parts
        .windows(2)
        .any(|w| w[0] == "vendor" && w[1] == "github.com")
}

/// Regular files under `root`, as `(absolute, relative)` pairs, sorted.
fn text_candidates(root: &Path) -> MigrationResult<Vec<(PathBuf, PathBuf)>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_vcs_dir(e))
    {
        let entry = entry.map_err(|e| std::io::Error::other(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| entry.path().to_path_buf());
        files.push((entry.path().to_path_buf(), relative));
    }
    Ok(files)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

/// Run `rewriter` over every eligible file of `root`.
///
/// Only files containing the bare project name are inspected. A file is
/// written back only when a replacement happened. Undecodable files are
/// logged at error level and left untouched.
pub fn rewrite_tree(
    root: &Path,
    rewriter: &ReferenceRewriter,
    entry: Option<&RepositoryEntry>,
) -> MigrationResult<TreeReport> {
    let mut report = TreeReport::default();
    let needle = rewriter.needle().as_bytes();

    for (path, relative) in text_candidates(root)? {
        if is_foreign(&relative) || entry.is_some_and(|e| e.is_excluded(&relative)) {
            continue;
        }
        let bytes = fs::read(&path)?;
        if !contains(&bytes, needle) {
            continue;
        }
        let rewrite = match rewriter.rewrite_bytes(&relative, &bytes) {
            Ok(rewrite) => rewrite,
            Err(reason) => {
                error!(file = %relative.display(), %reason, "file skipped by rewriter");
                report.skipped.push((relative, reason));
                continue;
            }
        };
        if !rewrite.modified && rewrite.warnings.is_empty() {
            continue;
        }

        info!(file = %relative.display(), modified = rewrite.modified, "patching file");
        for w in &rewrite.warnings {
            warn!(file = %relative.display(), "{w}");
        }
        if rewrite.modified {
            fs::write(&path, rewrite.content.as_bytes())?;
            METRICS.inc_files_rewritten();
        }
        report.findings.push(RewriteFinding {
            path: relative,
            modified: rewrite.modified,
            warnings: rewrite.warnings,
        });
    }
    Ok(report)
}

/// Replace every occurrence of `from` with `to` in the text files of `root`.
///
/// Returns the number of files changed.
pub fn replace_literal(root: &Path, from: &str, to: &str) -> MigrationResult<usize> {
    let mut changed = 0;
    for (path, relative) in text_candidates(root)? {
        let bytes = fs::read(&path)?;
        if !contains(&bytes, from.as_bytes()) {
            continue;
        }
        let Ok(text) = std::str::from_utf8(&bytes) else {
            error!(file = %relative.display(), "literal rewrite skipped: not valid utf-8");
            continue;
        };
        fs::write(&path, text.replace(from, to))?;
        info!(file = %relative.display(), "literal rewrite applied");
        changed += 1;
    }
    Ok(changed)
}

/// Remove everything in `dir` except the version-control directory.
pub fn clear_worktree(dir: &Path) -> MigrationResult<()> {
    for item in fs::read_dir(dir)? {
        let item = item?;
        if item.file_name() == VCS_DIR {
            continue;
        }
        let path = item.path();
        if item.file_type()?.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Copy the tree of `src` into `dst`, leaving out the version-control dir.
pub fn copy_worktree(src: &Path, dst: &Path) -> MigrationResult<usize> {
    let mut copied = 0;
    for entry in WalkDir::new(src)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| !is_vcs_dir(e))
    {
        let entry = entry.map_err(|e| std::io::Error::other(e.to_string()))?;
        let relative = match entry.path().strip_prefix(src) {
            Ok(r) => r,
            Err(_) => continue,
        };
        let target = dst.join(relative);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
            copied += 1;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> MigrationResult<()> {
    let points_to = fs::read_link(link)?;
    std::os::unix::fs::symlink(points_to, target)?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, target: &Path) -> MigrationResult<()> {
    fs::copy(link, target)?;
    Ok(())
}
