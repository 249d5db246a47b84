// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for scan scheduling events.
//!
//! This module contains message types for logging events related to:
//! * Scan lifecycle (start, completion, cancellation)
//! * Request clustering
//! * Host-error circuit breaking
//! * Failures isolated to a single (template, input) pair

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// Scan started.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use the_prober::observability::messages::engine::ScanStarted;
///
/// let msg = ScanStarted {
///     executer_count: 12,
///     concurrency: 25,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct ScanStarted {
    pub executer_count: usize,
    pub concurrency: usize,
}

impl Display for ScanStarted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Starting scan with {} executers, concurrency={}",
            self.executer_count, self.concurrency
        )
    }
}

impl StructuredLog for ScanStarted {
    fn log(&self) {
        tracing::info!(
            executer_count = self.executer_count,
            concurrency = self.concurrency,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "scan",
            span_name = name,
            executer_count = self.executer_count,
            concurrency = self.concurrency,
        )
    }
}

/// Scan finished, either naturally or after cancellation drained.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ScanCompleted {
    pub pairs_executed: usize,
    pub pairs_matched: usize,
    pub pairs_skipped: usize,
    pub pairs_failed: usize,
    pub cancelled: bool,
    pub duration: Duration,
}

impl Display for ScanCompleted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Scan {} in {:?}: executed={}, matched={}, skipped={}, failed={}",
            if self.cancelled { "cancelled" } else { "completed" },
            self.duration,
            self.pairs_executed,
            self.pairs_matched,
            self.pairs_skipped,
            self.pairs_failed
        )
    }
}

impl StructuredLog for ScanCompleted {
    fn log(&self) {
        tracing::info!(
            pairs_executed = self.pairs_executed,
            pairs_matched = self.pairs_matched,
            pairs_skipped = self.pairs_skipped,
            pairs_failed = self.pairs_failed,
            cancelled = self.cancelled,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "scan_completed",
            span_name = name,
            pairs_executed = self.pairs_executed,
            cancelled = self.cancelled,
            duration = ?self.duration,
        )
    }
}

/// Cancellation observed; no further pairs will be scheduled.
///
/// # Log Level
/// `warn!` - Scan is ending early
pub struct ScanCancelled {
    pub pending_inputs: bool,
}

impl Display for ScanCancelled {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Scan cancelled, draining in-flight pairs (inputs remaining: {})",
            self.pending_inputs
        )
    }
}

impl StructuredLog for ScanCancelled {
    fn log(&self) {
        tracing::warn!(pending_inputs = self.pending_inputs, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "scan_cancelled",
            span_name = name,
            pending_inputs = self.pending_inputs,
        )
    }
}

/// Templates grouped into shared-exchange clusters.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use the_prober::observability::messages::engine::ClustersFormed;
///
/// let msg = ClustersFormed {
///     template_count: 40,
///     cluster_count: 3,
///     executer_count: 31,
/// };
///
/// assert!(msg.to_string().contains("40 templates"));
/// ```
pub struct ClustersFormed {
    pub template_count: usize,
    pub cluster_count: usize,
    pub executer_count: usize,
}

impl Display for ClustersFormed {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Clustered {} templates into {} executers ({} clusters)",
            self.template_count, self.executer_count, self.cluster_count
        )
    }
}

impl StructuredLog for ClustersFormed {
    fn log(&self) {
        tracing::info!(
            template_count = self.template_count,
            cluster_count = self.cluster_count,
            executer_count = self.executer_count,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "clustering",
            span_name = name,
            template_count = self.template_count,
            cluster_count = self.cluster_count,
        )
    }
}

/// A (template, input) pair skipped because its host crossed the error threshold.
///
/// # Log Level
/// `warn!` - Work intentionally not performed
pub struct PairSkipped<'a> {
    pub template_id: &'a str,
    pub input: &'a str,
    pub host: &'a str,
    pub error_count: usize,
}

impl Display for PairSkipped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Skipping template '{}' for '{}': host '{}' reached {} errors",
            self.template_id, self.input, self.host, self.error_count
        )
    }
}

impl StructuredLog for PairSkipped<'_> {
    fn log(&self) {
        tracing::warn!(
            template_id = self.template_id,
            input = self.input,
            host = self.host,
            error_count = self.error_count,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "pair_skipped",
            span_name = name,
            template_id = self.template_id,
            host = self.host,
        )
    }
}

/// Execution of one (template, input) pair failed.
///
/// # Log Level
/// `error!` - Failure isolated to the pair
pub struct PairFailed<'a> {
    pub template_id: &'a str,
    pub input: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for PairFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Template '{}' failed for '{}': {}",
            self.template_id, self.input, self.error
        )
    }
}

impl StructuredLog for PairFailed<'_> {
    fn log(&self) {
        tracing::error!(
            template_id = self.template_id,
            input = self.input,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "pair_failed",
            span_name = name,
            template_id = self.template_id,
            input = self.input,
        )
    }
}

/// A transport failure was counted against a host.
///
/// # Log Level
/// `debug!` - Diagnostic detail
pub struct HostErrorRecorded<'a> {
    pub host: &'a str,
    pub error_count: usize,
}

impl Display for HostErrorRecorded<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Host '{}' error count is now {}",
            self.host, self.error_count
        )
    }
}

impl StructuredLog for HostErrorRecorded<'_> {
    fn log(&self) {
        tracing::debug!(host = self.host, error_count = self.error_count, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("host_error", span_name = name, host = self.host)
    }
}

/// The output sink refused a result.
///
/// # Log Level
/// `error!` - Finding lost
pub struct ResultWriteFailed<'a> {
    pub template_id: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for ResultWriteFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Failed to write result for template '{}': {}",
            self.template_id, self.error
        )
    }
}

impl StructuredLog for ResultWriteFailed<'_> {
    fn log(&self) {
        tracing::error!(template_id = self.template_id, error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "result_write_failed",
            span_name = name,
            template_id = self.template_id,
        )
    }
}
