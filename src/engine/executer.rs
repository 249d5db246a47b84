// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Sequential execution of a template's steps against one input.
//!
//! Steps run strictly in declaration order. Before each step runs, the
//! executer freezes what earlier steps produced:
//!
//! * dynamic values from internal extractors, passed as `dynamic_values`
//! * the response fields of every earlier step with an id, prefixed as
//!   `<id>_<field>`, passed as `previous`
//!
//! A step therefore never observes its own later variations through these
//! snapshots, and results are written to the sink as soon as each variation
//! completes.
//!
//! ```text
//! step "login"  ──► login_status_code, login_body, token (internal)
//!                        │
//! step "admin"  ◄────────┘  GET {{BaseURL}}/admin?t={{token}}
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ExecuterOptions;
use crate::errors::ExecutionError;
use crate::observability::messages::engine::ResultWriteFailed;
use crate::observability::messages::StructuredLog;
use crate::output::{InternalEvent, InternalWrappedEvent};
use crate::protocols::common::is_reportable;
use crate::template::{Template, TemplateMeta};
use crate::traits::{ExecutionOutcome, ProtocolRequest, ScanContext, TemplateExecuter};

pub struct Executer {
    meta: TemplateMeta,
    requests: Vec<Arc<dyn ProtocolRequest>>,
    options: ExecuterOptions,
}

impl Executer {
    pub fn new(template: &Template, options: ExecuterOptions) -> Self {
        Self {
            meta: template.meta.clone(),
            requests: template.requests.clone(),
            options,
        }
    }

    /// Handles one completed variation: writes its results, parks pending
    /// interactions and folds its outcome into the step's tallies.
    fn on_event(
        &self,
        request: &Arc<dyn ProtocolRequest>,
        wrapped: InternalWrappedEvent,
        step: &mut StepState,
    ) {
        for result in request.make_result_events(&wrapped) {
            match self.options.sink.write(&result) {
                Ok(()) => step.results += 1,
                Err(error) => ResultWriteFailed {
                    template_id: &self.meta.id,
                    error: &error,
                }
                .log(),
            }
        }

        if let Some(correlator) = &self.options.interactions {
            for correlation_id in &wrapped.interaction_ids {
                correlator.register(
                    correlation_id,
                    Arc::clone(request),
                    wrapped.internal_event.clone(),
                );
            }
        }

        if let Some(result) = &wrapped.operators_result {
            for (name, value) in result.dynamic_event() {
                step.dynamic_values.insert(name, value);
            }
            if is_reportable(request.operators(), &wrapped) {
                step.matched = true;
                for name in result.matches.keys() {
                    if !step.matcher_names.contains(name) {
                        step.matcher_names.push(name.clone());
                    }
                }
            }
        }
        step.last_event = wrapped.internal_event;
    }
}

#[derive(Default)]
struct StepState {
    matched: bool,
    results: usize,
    matcher_names: Vec<String>,
    dynamic_values: InternalEvent,
    last_event: InternalEvent,
}

#[async_trait]
impl TemplateExecuter for Executer {
    fn id(&self) -> &str {
        &self.meta.id
    }

    fn requests(&self) -> usize {
        self.requests.iter().map(|r| r.requests()).sum()
    }

    async fn execute_with_context(
        &self,
        context: &ScanContext,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let mut outcome = ExecutionOutcome {
            event: context.event.clone(),
            ..ExecutionOutcome::default()
        };
        let mut dynamic_values = InternalEvent::new();
        let mut previous = context.event.clone();

        for request in &self.requests {
            let mut step = StepState::default();
            {
                let mut callback = |wrapped: InternalWrappedEvent| -> Result<(), ExecutionError> {
                    self.on_event(request, wrapped, &mut step);
                    Ok(())
                };
                request
                    .execute_with_results(&context.input, &dynamic_values, &previous, &mut callback)
                    .await?;
            }

            outcome.matched |= step.matched;
            outcome.results += step.results;
            for name in step.matcher_names {
                if !outcome.matcher_names.contains(&name) {
                    outcome.matcher_names.push(name);
                }
            }

            if !request.id().is_empty() {
                for (key, value) in &step.last_event {
                    if previous.get(key) != Some(value) {
                        let prefixed = format!("{}_{}", request.id(), key);
                        previous.insert(prefixed.clone(), value.clone());
                        outcome.event.insert(prefixed, value.clone());
                    }
                }
            }
            for (name, value) in step.dynamic_values {
                dynamic_values.insert(name.clone(), value.clone());
                outcome.event.insert(name, value);
            }
            if !step.last_event.is_empty() {
                outcome.last_event = step.last_event;
            }
        }

        Ok(outcome)
    }
}
