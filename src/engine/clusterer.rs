// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Sharing one physical exchange between templates that would send the same
//! request.
//!
//! Only single-step templates take part. Their step's
//! [`cluster_key`](crate::traits::ProtocolRequest::cluster_key) fingerprints
//! the exchange; templates with equal keys form a cluster. The first member
//! performs the exchange and every member evaluates its own operators against
//! the same frozen response, labelling results with its own template id.
//! Results are the same as running each member on its own.

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::config::ExecuterOptions;
use crate::errors::ExecutionError;
use crate::observability::messages::engine::{ClustersFormed, ResultWriteFailed};
use crate::observability::messages::StructuredLog;
use crate::output::{InternalEvent, InternalWrappedEvent};
use crate::protocols::common::is_reportable;
use crate::template::Template;
use crate::traits::{ExecutionOutcome, ProtocolRequest, ScanContext, TemplateExecuter};

use super::executer::Executer;

pub struct ClusteredExecuter {
    members: Vec<Arc<dyn ProtocolRequest>>,
    options: ExecuterOptions,
}

impl ClusteredExecuter {
    fn new(templates: &[Arc<Template>], options: ExecuterOptions) -> Self {
        let members = templates
            .iter()
            .filter_map(|template| template.requests.first().cloned())
            .collect();
        Self { members, options }
    }

    fn leader(&self) -> Result<&Arc<dyn ProtocolRequest>, ExecutionError> {
        self.members.first().ok_or_else(|| ExecutionError::InternalError {
            message: "cluster without members".to_string(),
        })
    }
}

#[async_trait]
impl TemplateExecuter for ClusteredExecuter {
    fn id(&self) -> &str {
        self.members.first().map(|m| m.meta().id.as_str()).unwrap_or_default()
    }

    fn requests(&self) -> usize {
        self.members.first().map(|m| m.requests()).unwrap_or(0)
    }

    fn template_ids(&self) -> Vec<String> {
        self.members.iter().map(|m| m.meta().id.clone()).collect()
    }

    async fn execute_with_context(
        &self,
        context: &ScanContext,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let leader = self.leader()?;
        let mut snapshots: Vec<Arc<InternalEvent>> = Vec::new();
        {
            let mut callback = |wrapped: InternalWrappedEvent| -> Result<(), ExecutionError> {
                snapshots.push(Arc::new(wrapped.internal_event));
                Ok(())
            };
            leader
                .execute_with_results(&context.input, &InternalEvent::new(), &context.event, &mut callback)
                .await?;
        }

        let debug = self.options.options.debug;
        let mut outcome = ExecutionOutcome {
            event: context.event.clone(),
            ..ExecutionOutcome::default()
        };
        for snapshot in &snapshots {
            for member in &self.members {
                let wrapped =
                    InternalWrappedEvent::new((**snapshot).clone(), member.evaluate(snapshot, debug));
                for result in member.make_result_events(&wrapped) {
                    match self.options.sink.write(&result) {
                        Ok(()) => outcome.results += 1,
                        Err(error) => ResultWriteFailed {
                            template_id: &member.meta().id,
                            error: &error,
                        }
                        .log(),
                    }
                }
                if is_reportable(member.operators(), &wrapped) {
                    outcome.matched = true;
                    if let Some(result) = &wrapped.operators_result {
                        for name in result.matches.keys() {
                            if !outcome.matcher_names.contains(name) {
                                outcome.matcher_names.push(name.clone());
                            }
                        }
                    }
                }
            }
        }
        if let Some(last) = snapshots.last() {
            outcome.last_event = (**last).clone();
        }
        Ok(outcome)
    }
}

/// Turns compiled templates into executers, merging clusterable ones.
///
/// Workflow templates are left out; they run through their own executer.
/// Order follows the first appearance of each template or cluster. Nothing is
/// merged when clustering is disabled or every request stops at its first
/// match.
pub fn cluster_templates(
    templates: &[Arc<Template>],
    options: &ExecuterOptions,
) -> Vec<Arc<dyn TemplateExecuter>> {
    let runnable: Vec<&Arc<Template>> = templates.iter().filter(|t| !t.is_workflow()).collect();

    if options.options.disable_clustering || options.options.stop_at_first_match {
        return runnable
            .into_iter()
            .map(|t| Arc::new(Executer::new(t, options.clone())) as Arc<dyn TemplateExecuter>)
            .collect();
    }

    enum Slot {
        Single(Arc<Template>),
        Cluster(String),
    }

    let mut slots = Vec::new();
    let mut clusters: IndexMap<String, Vec<Arc<Template>>> = IndexMap::new();
    for template in &runnable {
        let key = match template.requests.as_slice() {
            [only] => only.cluster_key(),
            _ => None,
        };
        match key {
            Some(key) => {
                let members = clusters.entry(key.clone()).or_default();
                if members.is_empty() {
                    slots.push(Slot::Cluster(key));
                }
                members.push(Arc::clone(template));
            }
            None => slots.push(Slot::Single(Arc::clone(template))),
        }
    }

    let mut executers: Vec<Arc<dyn TemplateExecuter>> = Vec::with_capacity(slots.len());
    let mut cluster_count = 0;
    for slot in slots {
        match slot {
            Slot::Single(template) => {
                executers.push(Arc::new(Executer::new(&template, options.clone())));
            }
            Slot::Cluster(key) => {
                let members = clusters.get(&key).map(Vec::as_slice).unwrap_or_default();
                match members {
                    [single] => executers.push(Arc::new(Executer::new(single, options.clone()))),
                    _ => {
                        cluster_count += 1;
                        executers.push(Arc::new(ClusteredExecuter::new(members, options.clone())));
                    }
                }
            }
        }
    }

    ClustersFormed {
        template_count: runnable.len(),
        cluster_count,
        executer_count: executers.len(),
    }
    .log();
    executers
}
