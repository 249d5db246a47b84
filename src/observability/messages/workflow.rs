// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for workflow node evaluation.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A workflow node's condition was evaluated.
///
/// # Log Level
/// `debug!` - Branching detail
pub struct NodeEvaluated<'a> {
    pub workflow_id: &'a str,
    pub node: &'a str,
    pub matched: bool,
    pub matcher_names: &'a [String],
}

impl Display for NodeEvaluated<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Workflow '{}' node '{}' matched={} matchers=[{}]",
            self.workflow_id,
            self.node,
            self.matched,
            self.matcher_names.join(", ")
        )
    }
}

impl StructuredLog for NodeEvaluated<'_> {
    fn log(&self) {
        tracing::debug!(
            workflow_id = self.workflow_id,
            node = self.node,
            matched = self.matched,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "workflow_node",
            span_name = name,
            workflow_id = self.workflow_id,
            node = self.node,
        )
    }
}

/// A workflow node failed; its subtree is abandoned, siblings continue.
///
/// # Log Level
/// `error!` - Partial workflow failure
pub struct NodeFailed<'a> {
    pub workflow_id: &'a str,
    pub node: &'a str,
    pub input: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for NodeFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Workflow '{}' node '{}' failed for '{}': {}",
            self.workflow_id, self.node, self.input, self.error
        )
    }
}

impl StructuredLog for NodeFailed<'_> {
    fn log(&self) {
        tracing::error!(
            workflow_id = self.workflow_id,
            node = self.node,
            input = self.input,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "workflow_node_failed",
            span_name = name,
            workflow_id = self.workflow_id,
            node = self.node,
        )
    }
}
