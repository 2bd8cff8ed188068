//! Structured lifecycle events for migration operations.
//!
//! Events are emitted at `info!` level; filter them with `RUST_LOG`.

use tracing::info;

/// Span for one operation, for use with `Instrument` across await points.
pub fn operation_span(operation: &str, source: &str) -> tracing::Span {
    tracing::info_span!("repomove.op", operation = %operation, source = %source)
}

/// Emit event: operation started.
pub fn emit_operation_started(operation: &str, source: &str, destination: &str) {
    info!(
        event = "operation.started",
        operation = %operation,
        source = %source,
        destination = %destination,
    );
}

/// Emit event: operation finished.
pub fn emit_operation_finished(operation: &str, duration_ms: u64, success: bool) {
    info!(
        event = "operation.finished",
        operation = %operation,
        duration_ms = duration_ms,
        success = success,
    );
}

/// Emit event: review gate evaluated over a change set.
pub fn emit_gate_evaluated(total: usize, ready: usize, forced: bool) {
    info!(
        event = "gate.evaluated",
        total = total,
        ready = ready,
        forced = forced,
    );
}
