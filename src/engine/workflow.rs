// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Depth-first execution of workflow trees.
//!
//! For one input, nodes run left to right. Each node runs to completion with
//! the event accumulated by its ancestors, then its optional condition is
//! checked against the node's outcome, then every triggered branch runs with
//! the node's accumulated event. Siblings never see each other's events.
//!
//! A node that fails is reported as a [`FailureEvent`] and its subtree is
//! skipped; its siblings and the rest of the workflow still run.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};

use crate::config::ExecuterOptions;
use crate::errors::ExecutionError;
use crate::observability::messages::engine::ResultWriteFailed;
use crate::observability::messages::workflow::{NodeEvaluated, NodeFailed};
use crate::observability::messages::StructuredLog;
use crate::operators::{MatcherType, Operators};
use crate::output::{merge_events, FailureEvent, InternalEvent};
use crate::protocols::common::{binary_corpus, part_corpus};
use crate::template::workflow::{NodeTarget, Workflow, WorkflowNode};
use crate::traits::{ExecutionOutcome, ScanContext, TemplateExecuter};

pub struct WorkflowExecuter {
    workflow: Arc<Workflow>,
    options: ExecuterOptions,
}

impl WorkflowExecuter {
    pub fn new(workflow: Arc<Workflow>, options: ExecuterOptions) -> Self {
        Self { workflow, options }
    }

    fn run_nodes<'a>(
        &'a self,
        nodes: &'a [WorkflowNode],
        context: &'a ScanContext,
    ) -> BoxFuture<'a, ExecutionOutcome> {
        async move {
            let mut total = ExecutionOutcome {
                event: context.event.clone(),
                ..ExecutionOutcome::default()
            };
            for node in nodes {
                let subtree = self.run_node(node, context).await;
                total.matched |= subtree.matched;
                total.results += subtree.results;
                for name in subtree.matcher_names {
                    if !total.matcher_names.contains(&name) {
                        total.matcher_names.push(name);
                    }
                }
            }
            total
        }
        .boxed()
    }

    async fn run_node(&self, node: &WorkflowNode, context: &ScanContext) -> ExecutionOutcome {
        let outcome = match &node.target {
            NodeTarget::Template(executer) => executer.execute_with_context(context).await,
            NodeTarget::Workflow(nested) => Ok(self.run_nodes(&nested.nodes, context).await),
        };

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(error) => {
                self.report_failure(node, context, &error);
                return ExecutionOutcome::default();
            }
        };

        NodeEvaluated {
            workflow_id: &self.workflow.id,
            node: &node.label,
            matched: outcome.matched,
            matcher_names: &outcome.matcher_names,
        }
        .log();

        if let Some(condition) = &node.condition {
            if !self.condition_holds(condition, &outcome) {
                return outcome;
            }
        }

        let child_context = ScanContext::with_event(context.input.clone(), outcome.event.clone());
        let mut total = outcome;
        for branch in &node.branches {
            if !branch.trigger.is_triggered(total.matched, &total.matcher_names) {
                continue;
            }
            let children = self.run_nodes(&branch.nodes, &child_context).await;
            total.results += children.results;
            for name in children.matcher_names {
                if !total.matcher_names.contains(&name) {
                    total.matcher_names.push(name);
                }
            }
            total.matched |= children.matched;
        }
        total
    }

    fn condition_holds(&self, condition: &Operators, outcome: &ExecutionOutcome) -> bool {
        let mut data = outcome.event.clone();
        merge_events(&mut data, &outcome.last_event);
        let (_, matched) = condition.execute(
            &data,
            |data, matcher| {
                let part = if matcher.part.is_empty() { "body" } else { matcher.part.as_str() };
                if matcher.matcher_type == MatcherType::Binary {
                    return matcher.evaluate(&binary_corpus(data, part), data);
                }
                matcher.evaluate(&part_corpus(data, part), data)
            },
            |_, _| Vec::new(),
            self.options.options.debug,
        );
        matched
    }

    fn report_failure(&self, node: &WorkflowNode, context: &ScanContext, error: &ExecutionError) {
        NodeFailed {
            workflow_id: &self.workflow.id,
            node: &node.label,
            input: context.input.as_str(),
            error,
        }
        .log();

        let failure = FailureEvent::new(
            &self.workflow.id,
            context.input.as_str(),
            Some(node.label.as_str()),
            error.to_string(),
        );
        if let Err(error) = self.options.sink.write_failure(&failure) {
            ResultWriteFailed {
                template_id: &self.workflow.id,
                error: &error,
            }
            .log();
        }
    }
}

#[async_trait]
impl TemplateExecuter for WorkflowExecuter {
    fn id(&self) -> &str {
        &self.workflow.id
    }

    fn requests(&self) -> usize {
        self.workflow.requests()
    }

    async fn execute_with_context(
        &self,
        context: &ScanContext,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let mut outcome = self.run_nodes(&self.workflow.nodes, context).await;
        outcome.event = context.event.clone();
        outcome.last_event = InternalEvent::new();
        Ok(outcome)
    }
}
