// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Dispatch of (executer, input) pairs onto a bounded worker pool.
//!
//! Inputs are pulled from an [`InputProvider`] one at a time, so streaming
//! sources are never buffered whole. For every input, every executer is
//! dispatched as its own task once a permit of the pool's semaphore is free.
//!
//! Before dispatch the host-errors cache is consulted: a pair whose host has
//! reached the threshold is counted as skipped and never run. Skips are not
//! errors and do not touch the host's counter.
//!
//! Cancelling the token stops new dispatches. Pairs already running finish
//! and their results stay written.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::ExecuterOptions;
use crate::engine::input::{InputProvider, ScanTarget};
use crate::errors::{EngineError, ExecutionError};
use crate::observability::messages::engine::{
    PairFailed, PairSkipped, ResultWriteFailed, ScanCancelled, ScanCompleted, ScanStarted,
};
use crate::observability::messages::StructuredLog;
use crate::output::FailureEvent;
use crate::traits::{ExecutionOutcome, ScanContext, TemplateExecuter};

/// Tallies of one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Pairs that ran to completion.
    pub pairs_executed: usize,
    /// Pairs that reported at least one result.
    pub pairs_matched: usize,
    /// Pairs skipped because their host reached the error threshold.
    pub pairs_skipped: usize,
    /// Pairs that ended with an execution error.
    pub pairs_failed: usize,
    /// Results written by completed pairs.
    pub results: usize,
    pub cancelled: bool,
}

type PairOutcome = (String, ScanTarget, Result<ExecutionOutcome, ExecutionError>);

pub struct Engine {
    options: ExecuterOptions,
}

impl Engine {
    pub fn new(options: ExecuterOptions) -> Self {
        Self { options }
    }

    /// Runs every executer against every input until the inputs run out or
    /// `cancel` fires.
    ///
    /// Only failures of the scan machinery itself are returned as errors;
    /// per-pair failures are counted, logged and written to the sink.
    pub async fn execute(
        &self,
        executers: Vec<Arc<dyn TemplateExecuter>>,
        mut inputs: Box<dyn InputProvider>,
        cancel: CancellationToken,
    ) -> Result<ScanSummary, EngineError> {
        let started = Instant::now();
        let concurrency = self.options.options.effective_concurrency();
        ScanStarted {
            executer_count: executers.len(),
            concurrency,
        }
        .log();

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut tasks: JoinSet<PairOutcome> = JoinSet::new();
        let mut summary = ScanSummary::default();

        'inputs: loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    summary.cancelled = true;
                    break 'inputs;
                }
                next = inputs.next_target() => next?,
            };
            let Some(target) = next else {
                break;
            };

            for executer in &executers {
                if cancel.is_cancelled() {
                    summary.cancelled = true;
                    break 'inputs;
                }
                if self.should_skip(executer.as_ref(), &target) {
                    summary.pairs_skipped += 1;
                    continue;
                }

                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        summary.cancelled = true;
                        break 'inputs;
                    }
                    permit = Arc::clone(&semaphore).acquire_owned() => {
                        permit.map_err(|e| EngineError::WorkerPool(e.to_string()))?
                    }
                };

                let executer = Arc::clone(executer);
                let target = target.clone();
                tasks.spawn(async move {
                    let _permit = permit;
                    let context = ScanContext::new(target.clone());
                    let outcome = executer.execute_with_context(&context).await;
                    (executer.id().to_string(), target, outcome)
                });

                while let Some(joined) = tasks.try_join_next() {
                    let (template_id, target, outcome) =
                        joined.map_err(|e| EngineError::TaskPanicked(e.to_string()))?;
                    self.record(&mut summary, &template_id, &target, outcome);
                }
            }
        }

        if summary.cancelled {
            ScanCancelled {
                pending_inputs: true,
            }
            .log();
        }

        while let Some(joined) = tasks.join_next().await {
            let (template_id, target, outcome) =
                joined.map_err(|e| EngineError::TaskPanicked(e.to_string()))?;
            self.record(&mut summary, &template_id, &target, outcome);
        }

        ScanCompleted {
            pairs_executed: summary.pairs_executed,
            pairs_matched: summary.pairs_matched,
            pairs_skipped: summary.pairs_skipped,
            pairs_failed: summary.pairs_failed,
            cancelled: summary.cancelled,
            duration: started.elapsed(),
        }
        .log();
        Ok(summary)
    }

    fn should_skip(&self, executer: &dyn TemplateExecuter, target: &ScanTarget) -> bool {
        let Some(cache) = &self.options.host_errors else {
            return false;
        };
        if !cache.check(target) {
            return false;
        }
        PairSkipped {
            template_id: executer.id(),
            input: target.as_str(),
            host: &target.host_key(),
            error_count: cache.error_count(target),
        }
        .log();
        true
    }

    fn record(
        &self,
        summary: &mut ScanSummary,
        template_id: &str,
        target: &ScanTarget,
        outcome: Result<ExecutionOutcome, ExecutionError>,
    ) {
        match outcome {
            Ok(outcome) => {
                summary.pairs_executed += 1;
                summary.results += outcome.results;
                if outcome.matched {
                    summary.pairs_matched += 1;
                }
            }
            Err(error) => {
                summary.pairs_failed += 1;
                PairFailed {
                    template_id,
                    input: target.as_str(),
                    error: &error,
                }
                .log();
                let failure = FailureEvent::new(template_id, target.as_str(), None, error.to_string());
                if let Err(error) = self.options.sink.write_failure(&failure) {
                    ResultWriteFailed {
                        template_id,
                        error: &error,
                    }
                    .log();
                }
            }
        }
    }
}
