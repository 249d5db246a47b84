// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;

use crate::engine::input::ScanTarget;
use crate::errors::ExecutionError;
use crate::output::InternalEvent;

/// Input plus the event accumulated so far by an enclosing workflow.
#[derive(Debug, Clone)]
pub struct ScanContext {
    pub input: ScanTarget,
    pub event: InternalEvent,
}

impl ScanContext {
    pub fn new(input: ScanTarget) -> Self {
        Self {
            input,
            event: InternalEvent::new(),
        }
    }

    pub fn with_event(input: ScanTarget, event: InternalEvent) -> Self {
        Self { input, event }
    }
}

/// What one execution against one input produced.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOutcome {
    /// At least one result was reported.
    pub matched: bool,
    /// Final accumulated event: the context event plus dynamic values and
    /// id-prefixed fields of every step.
    pub event: InternalEvent,
    /// Unprefixed fields of the last response.
    pub last_event: InternalEvent,
    /// Names of every matcher that matched, across steps and variations.
    pub matcher_names: Vec<String>,
    /// Number of result events written to the sink.
    pub results: usize,
}

/// Something the scheduler can run against an input: a template, a cluster
/// of templates sharing one exchange, or a workflow.
#[async_trait]
pub trait TemplateExecuter: Send + Sync {
    fn id(&self) -> &str;

    /// Physical exchanges per input.
    fn requests(&self) -> usize;

    /// Template ids whose results this executer can produce.
    fn template_ids(&self) -> Vec<String> {
        vec![self.id().to_string()]
    }

    async fn execute(&self, context: &ScanContext) -> Result<bool, ExecutionError> {
        Ok(self.execute_with_context(context).await?.matched)
    }

    async fn execute_with_context(
        &self,
        context: &ScanContext,
    ) -> Result<ExecutionOutcome, ExecutionError>;
}
