//! Global atomic counters for migration runs.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single `info!` event at the
//! end of an operation.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters.
pub struct Metrics {
    files_rewritten: AtomicU64,
    commits_created: AtomicU64,
    changes_pushed: AtomicU64,
    changes_approved: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            files_rewritten: AtomicU64::new(0),
            commits_created: AtomicU64::new(0),
            changes_pushed: AtomicU64::new(0),
            changes_approved: AtomicU64::new(0),
        }
    }

    pub fn inc_files_rewritten(&self) {
        self.files_rewritten.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "files_rewritten", "counter incremented");
    }

    pub fn inc_commits(&self) {
        self.commits_created.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "commits_created", "counter incremented");
    }

    pub fn inc_pushes(&self) {
        self.changes_pushed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "changes_pushed", "counter incremented");
    }

    pub fn inc_approvals(&self) {
        self.changes_approved.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "changes_approved", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            files_rewritten = self.files_rewritten(),
            commits_created = self.commits_created(),
            changes_pushed = self.changes_pushed(),
            changes_approved = self.changes_approved(),
        );
    }

    pub fn files_rewritten(&self) -> u64 {
        self.files_rewritten.load(Ordering::Relaxed)
    }

    pub fn commits_created(&self) -> u64 {
        self.commits_created.load(Ordering::Relaxed)
    }

    pub fn changes_pushed(&self) -> u64 {
        self.changes_pushed.load(Ordering::Relaxed)
    }

    pub fn changes_approved(&self) -> u64 {
        self.changes_approved.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_files_rewritten();
        m.inc_files_rewritten();
        assert_eq!(m.files_rewritten(), 2);

        m.inc_commits();
        assert_eq!(m.commits_created(), 1);

        m.inc_pushes();
        m.inc_approvals();
        m.inc_approvals();
        assert_eq!(m.changes_pushed(), 1);
        assert_eq!(m.changes_approved(), 2);
    }
}
