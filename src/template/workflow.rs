// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Resolved workflow trees.
//!
//! The loader turns [`WorkflowNodeDefinition`](super::definition::WorkflowNodeDefinition)s
//! into these structures once every reference has been loaded and validated.

use std::sync::Arc;

use crate::operators::Operators;
use crate::traits::TemplateExecuter;

/// What a node runs.
#[derive(Clone)]
pub enum NodeTarget {
    Template(Arc<dyn TemplateExecuter>),
    /// A nested workflow; its nodes run with the enclosing node's context.
    Workflow(Arc<Workflow>),
}

/// Which outcome of the parent a branch waits for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchTrigger {
    Always,
    Matched,
    Matcher(String),
}

impl BranchTrigger {
    pub fn is_triggered(&self, matched: bool, matcher_names: &[String]) -> bool {
        match self {
            BranchTrigger::Always => true,
            BranchTrigger::Matched => matched,
            BranchTrigger::Matcher(name) => matcher_names.iter().any(|n| n == name),
        }
    }
}

#[derive(Clone)]
pub struct Branch {
    pub trigger: BranchTrigger,
    pub nodes: Vec<WorkflowNode>,
}

#[derive(Clone)]
pub struct WorkflowNode {
    /// Reference as written in the workflow file.
    pub label: String,
    pub target: NodeTarget,
    /// Compiled condition over the node's event; children run only when it holds.
    pub condition: Option<Operators>,
    pub branches: Vec<Branch>,
}

#[derive(Clone)]
pub struct Workflow {
    pub id: String,
    pub nodes: Vec<WorkflowNode>,
}

impl Workflow {
    /// Physical exchanges if every node ran once.
    pub fn requests(&self) -> usize {
        fn count(nodes: &[WorkflowNode]) -> usize {
            nodes
                .iter()
                .map(|node| {
                    let own = match &node.target {
                        NodeTarget::Template(executer) => executer.requests(),
                        NodeTarget::Workflow(workflow) => workflow.requests(),
                    };
                    own + node.branches.iter().map(|b| count(&b.nodes)).sum::<usize>()
                })
                .sum()
        }
        count(&self.nodes)
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("id", &self.id)
            .field("nodes", &self.nodes.len())
            .finish()
    }
}
