// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;

/// Errors that can occur while validating a workflow definition
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A workflow references itself through a chain of nested workflows
    CyclicReference {
        /// The chain of workflow paths forming the cycle
        chain: Vec<String>,
    },
    /// A workflow node names a template that could not be resolved
    MissingTemplate {
        /// The workflow containing the node
        workflow_id: String,
        /// The unresolved template reference
        reference: String,
    },
    /// A workflow node has neither a template nor a nested workflow
    EmptyNode {
        /// The workflow containing the node
        workflow_id: String,
        /// Position of the node among its siblings
        index: usize,
    },
    /// A workflow node declares both a template and a nested workflow
    AmbiguousNode {
        workflow_id: String,
        index: usize,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::CyclicReference { chain } => {
                write!(f, "Cyclic workflow reference detected: {}", chain.join(" -> "))
            }
            ValidationError::MissingTemplate {
                workflow_id,
                reference,
            } => {
                write!(
                    f,
                    "Workflow '{}' references '{}' which does not exist",
                    workflow_id, reference
                )
            }
            ValidationError::EmptyNode { workflow_id, index } => {
                write!(
                    f,
                    "Workflow '{}' node #{} has neither a template nor a workflow",
                    workflow_id, index
                )
            }
            ValidationError::AmbiguousNode { workflow_id, index } => {
                write!(
                    f,
                    "Workflow '{}' node #{} declares both a template and a workflow",
                    workflow_id, index
                )
            }
        }
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cyclic_reference_display() {
        let error = ValidationError::CyclicReference {
            chain: vec!["a.yaml".to_string(), "b.yaml".to_string(), "a.yaml".to_string()],
        };
        assert_eq!(
            error.to_string(),
            "Cyclic workflow reference detected: a.yaml -> b.yaml -> a.yaml"
        );
    }

    #[test]
    fn test_missing_template_display() {
        let error = ValidationError::MissingTemplate {
            workflow_id: "wp-workflow".to_string(),
            reference: "missing.yaml".to_string(),
        };
        assert!(error.to_string().contains("'missing.yaml' which does not exist"));
    }
}
