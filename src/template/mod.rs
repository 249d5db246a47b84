// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Compiled templates.
//!
//! A [`Template`] is immutable once compiled: its requests are shared
//! read-only by every execution. Compilation is all or nothing, so a template
//! with one bad step is rejected whole.

pub mod cache;
pub mod definition;
pub mod loader;
pub mod workflow;

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::ExecuterOptions;
use crate::errors::CompileError;
use crate::protocols::http::HttpRequest;
use crate::protocols::network::NetworkRequest;
use crate::traits::ProtocolRequest;

use definition::{TemplateDefinition, WorkflowNodeDefinition};

pub use cache::TemplateCache;
pub use loader::TemplateLoader;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Unknown,
    Info,
    Low,
    Medium,
    High,
    Critical,
}

/// Descriptive metadata copied into every result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub author: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Identity a request carries so it can label its own results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateMeta {
    pub id: String,
    pub info: TemplateInfo,
    pub path: Option<String>,
}

impl TemplateMeta {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }
}

pub struct Template {
    pub meta: TemplateMeta,
    pub requests: Vec<Arc<dyn ProtocolRequest>>,
    /// Unresolved workflow nodes; the loader turns them into an executer.
    pub workflow: Vec<WorkflowNodeDefinition>,
}

impl std::fmt::Debug for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Template")
            .field("id", &self.meta.id)
            .field("requests", &self.requests.len())
            .field("workflow_nodes", &self.workflow.len())
            .finish()
    }
}

impl Template {
    /// Builds and compiles every step of `definition`.
    pub fn compile(
        definition: TemplateDefinition,
        path: Option<&Path>,
        options: &ExecuterOptions,
    ) -> Result<Self, CompileError> {
        let meta = TemplateMeta {
            id: definition.id.clone(),
            info: definition.info.clone(),
            path: path.map(|p| p.display().to_string()),
        };
        let base_dir = path.and_then(Path::parent).map(Path::to_path_buf);

        let mut steps: Vec<Box<dyn ProtocolRequest>> = Vec::new();
        for request in definition.http {
            steps.push(Box::new(HttpRequest::new(
                request,
                meta.clone(),
                base_dir.clone(),
            )));
        }
        for request in definition.network {
            steps.push(Box::new(NetworkRequest::new(
                request,
                meta.clone(),
                base_dir.clone(),
            )));
        }

        if steps.is_empty() && definition.workflows.is_empty() {
            return Err(CompileError::EmptyTemplate {
                template_id: meta.id,
            });
        }

        let mut requests = Vec::with_capacity(steps.len());
        for (step, mut request) in steps.into_iter().enumerate() {
            request
                .compile(options)
                .map_err(|source| CompileError::TemplateRejected {
                    template_id: meta.id.clone(),
                    step,
                    source: Box::new(source),
                })?;
            requests.push(Arc::from(request));
        }

        Ok(Self {
            meta,
            requests,
            workflow: definition.workflows,
        })
    }

    pub fn id(&self) -> &str {
        &self.meta.id
    }

    pub fn is_workflow(&self) -> bool {
        !self.workflow.is_empty()
    }
}
