// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Loading template and workflow files from disk.
//!
//! Templates are compiled once per canonical path through the loader's
//! [`TemplateCache`]. Workflow files are resolved recursively: every node
//! reference is relative to the file that contains it, and may point at a
//! template or at another workflow.
//!
//! Structural problems in a workflow are collected rather than reported one
//! at a time, so a single load lists everything wrong with it:
//!
//! * a node with neither `template` nor `workflow`
//! * a node with both
//! * a reference to a file that does not exist
//! * a chain of workflows that leads back to itself

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::ExecuterOptions;
use crate::engine::clusterer::cluster_templates;
use crate::engine::executer::Executer;
use crate::engine::workflow::WorkflowExecuter;
use crate::errors::{LoadError, ValidationError};
use crate::observability::messages::protocol::TemplateRejected;
use crate::observability::messages::StructuredLog;
use crate::traits::TemplateExecuter;

use super::cache::TemplateCache;
use super::definition::{TemplateDefinition, WorkflowNodeDefinition};
use super::workflow::{Branch, BranchTrigger, NodeTarget, Workflow, WorkflowNode};
use super::Template;

/// A loaded file: a runnable template or a resolved workflow.
#[derive(Debug, Clone)]
pub enum Loaded {
    Template(Arc<Template>),
    Workflow(Arc<Workflow>),
}

/// Everything a batch load produced, including what was rejected.
#[derive(Debug, Default)]
pub struct LoadedSet {
    pub templates: Vec<Arc<Template>>,
    pub workflows: Vec<Arc<Workflow>>,
    pub rejected: Vec<LoadError>,
}

impl LoadedSet {
    /// Executers for the scheduler: clustered templates followed by workflows.
    pub fn into_executers(self, options: &ExecuterOptions) -> Vec<Arc<dyn TemplateExecuter>> {
        let mut executers = cluster_templates(&self.templates, options);
        executers.extend(self.workflows.into_iter().map(|workflow| {
            Arc::new(WorkflowExecuter::new(workflow, options.clone())) as Arc<dyn TemplateExecuter>
        }));
        executers
    }
}

pub struct TemplateLoader {
    cache: Arc<TemplateCache>,
    options: ExecuterOptions,
}

impl TemplateLoader {
    pub fn new(cache: Arc<TemplateCache>, options: ExecuterOptions) -> Self {
        Self { cache, options }
    }

    /// Loads a template or workflow file.
    pub fn load(&self, path: &Path) -> Result<Loaded, LoadError> {
        let path = canonical(path)?;
        let template = self.load_template(&path)?;
        if !template.is_workflow() {
            return Ok(Loaded::Template(template));
        }

        let mut errors = Vec::new();
        let mut stack = vec![path.clone()];
        let nodes = self.resolve_nodes(
            &template.workflow,
            parent_dir(&path),
            template.id(),
            &mut stack,
            &mut errors,
        )?;
        if !errors.is_empty() {
            return Err(LoadError::Validation { errors });
        }
        Ok(Loaded::Workflow(Arc::new(Workflow {
            id: template.id().to_string(),
            nodes,
        })))
    }

    /// Loads every path, logging and collecting the ones that fail.
    pub fn load_all<P: AsRef<Path>>(&self, paths: &[P]) -> LoadedSet {
        let mut set = LoadedSet::default();
        for path in paths {
            match self.load(path.as_ref()) {
                Ok(Loaded::Template(template)) => set.templates.push(template),
                Ok(Loaded::Workflow(workflow)) => set.workflows.push(workflow),
                Err(error) => {
                    TemplateRejected {
                        template_id: &path.as_ref().display().to_string(),
                        error: &error,
                    }
                    .log();
                    set.rejected.push(error);
                }
            }
        }
        set
    }

    /// Parses and compiles one template file, reusing the cached copy.
    pub fn load_template(&self, path: &Path) -> Result<Arc<Template>, LoadError> {
        let path = canonical(path)?;
        if let Some(template) = self.cache.get(&path) {
            return Ok(template);
        }

        let content = fs::read_to_string(&path).map_err(|source| LoadError::Io {
            path: path.clone(),
            source,
        })?;
        let definition: TemplateDefinition =
            serde_yaml::from_str(&content).map_err(|source| LoadError::Yaml {
                path: path.clone(),
                source,
            })?;
        let template = Template::compile(definition, Some(&path), &self.options).map_err(
            |source| LoadError::Compile {
                path: path.clone(),
                source,
            },
        )?;
        Ok(self.cache.insert(path, Arc::new(template)))
    }

    fn resolve_nodes(
        &self,
        definitions: &[WorkflowNodeDefinition],
        base_dir: &Path,
        workflow_id: &str,
        stack: &mut Vec<PathBuf>,
        errors: &mut Vec<ValidationError>,
    ) -> Result<Vec<WorkflowNode>, LoadError> {
        let mut nodes = Vec::with_capacity(definitions.len());
        for (index, definition) in definitions.iter().enumerate() {
            let reference = match (&definition.template, &definition.workflow) {
                (Some(reference), None) | (None, Some(reference)) => reference,
                (None, None) => {
                    errors.push(ValidationError::EmptyNode {
                        workflow_id: workflow_id.to_string(),
                        index,
                    });
                    continue;
                }
                (Some(_), Some(_)) => {
                    errors.push(ValidationError::AmbiguousNode {
                        workflow_id: workflow_id.to_string(),
                        index,
                    });
                    continue;
                }
            };

            let Ok(path) = base_dir.join(reference).canonicalize() else {
                errors.push(ValidationError::MissingTemplate {
                    workflow_id: workflow_id.to_string(),
                    reference: reference.clone(),
                });
                continue;
            };

            if let Some(start) = stack.iter().position(|entry| entry == &path) {
                let chain = stack[start..]
                    .iter()
                    .chain(std::iter::once(&path))
                    .map(|entry| file_label(entry))
                    .collect();
                errors.push(ValidationError::CyclicReference { chain });
                continue;
            }

            let template = self.load_template(&path)?;
            let target = if template.is_workflow() {
                stack.push(path.clone());
                let nested = self.resolve_nodes(
                    &template.workflow,
                    parent_dir(&path),
                    template.id(),
                    stack,
                    errors,
                );
                stack.pop();
                NodeTarget::Workflow(Arc::new(Workflow {
                    id: template.id().to_string(),
                    nodes: nested?,
                }))
            } else {
                NodeTarget::Template(Arc::new(Executer::new(&template, self.options.clone())))
            };

            let condition = match &definition.condition {
                Some(condition) => {
                    let mut operators = condition.clone().into_operators();
                    operators.compile().map_err(|source| LoadError::Compile {
                        path: path.clone(),
                        source,
                    })?;
                    Some(operators)
                }
                None => None,
            };

            let mut branches = Vec::new();
            if !definition.always.is_empty() {
                branches.push(Branch {
                    trigger: BranchTrigger::Always,
                    nodes: self.resolve_nodes(&definition.always, base_dir, workflow_id, stack, errors)?,
                });
            }
            if !definition.subtemplates.is_empty() {
                branches.push(Branch {
                    trigger: BranchTrigger::Matched,
                    nodes: self.resolve_nodes(
                        &definition.subtemplates,
                        base_dir,
                        workflow_id,
                        stack,
                        errors,
                    )?,
                });
            }
            for matcher in &definition.matchers {
                branches.push(Branch {
                    trigger: BranchTrigger::Matcher(matcher.name.clone()),
                    nodes: self.resolve_nodes(
                        &matcher.subtemplates,
                        base_dir,
                        workflow_id,
                        stack,
                        errors,
                    )?,
                });
            }

            nodes.push(WorkflowNode {
                label: reference.clone(),
                target,
                condition,
                branches,
            });
        }
        Ok(nodes)
    }
}

fn canonical(path: &Path) -> Result<PathBuf, LoadError> {
    path.canonicalize().map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn parent_dir(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new("."))
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::{options_with, CannedTransport};
    use crate::errors::CompileError;
    use crate::output::MemorySink;
    use std::io::Write;
    use tempfile::TempDir;

    const PROBE: &str = r#"
id: probe
http:
  - path: ["{{BaseURL}}/"]
    matchers:
      - type: word
        words: ["ok"]
"#;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    fn loader() -> (TemplateLoader, Arc<TemplateCache>) {
        let cache = Arc::new(TemplateCache::new());
        let options = options_with(
            Arc::new(CannedTransport::with_body(200, "ok")),
            Arc::new(MemorySink::new()),
        );
        (TemplateLoader::new(Arc::clone(&cache), options), cache)
    }

    #[test]
    fn test_load_template_is_cached_by_canonical_path() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "probe.yaml", PROBE);
        let (loader, cache) = loader();

        let first = loader.load_template(&path).unwrap();
        let second = loader
            .load_template(&dir.path().join(".").join("probe.yaml"))
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
        assert_eq!(first.requests.len(), 1);
    }

    #[test]
    fn test_invalid_template_is_rejected_whole() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "broken.yaml",
            r#"
id: broken
http:
  - path: ["{{BaseURL}}/a"]
    matchers:
      - type: word
        words: ["fine"]
  - path: ["{{BaseURL}}/b"]
    matchers:
      - type: regex
        regex: ["(unclosed"]
"#,
        );
        let (loader, cache) = loader();

        let error = loader.load_template(&path).unwrap_err();
        assert!(matches!(
            error,
            LoadError::Compile {
                source: CompileError::TemplateRejected { step: 1, .. },
                ..
            }
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_load_all_separates_templates_workflows_and_rejections() {
        let dir = TempDir::new().unwrap();
        let probe = write(&dir, "probe.yaml", PROBE);
        let flow = write(
            &dir,
            "flow.yaml",
            "id: flow\nworkflows:\n  - template: probe.yaml\n",
        );
        let missing = dir.path().join("missing.yaml");
        let (loader, _) = loader();

        let set = loader.load_all(&[probe, flow, missing]);
        assert_eq!(set.templates.len(), 1);
        assert_eq!(set.workflows.len(), 1);
        assert_eq!(set.rejected.len(), 1);
        assert_eq!(set.workflows[0].nodes[0].label, "probe.yaml");
    }

    #[test]
    fn test_workflow_branches_are_resolved() {
        let dir = TempDir::new().unwrap();
        write(&dir, "probe.yaml", PROBE);
        fs::create_dir(dir.path().join("nested")).unwrap();
        write(&dir, "nested/login.yaml", &PROBE.replace("id: probe", "id: login"));
        let flow = write(
            &dir,
            "flow.yaml",
            r#"
id: flow
workflows:
  - template: probe.yaml
    condition:
      matchers:
        - type: word
          words: ["ok"]
    subtemplates:
      - template: nested/login.yaml
    matchers:
      - name: word-1
        subtemplates:
          - template: probe.yaml
    always:
      - template: probe.yaml
"#,
        );
        let (loader, _) = loader();

        let Loaded::Workflow(workflow) = loader.load(&flow).unwrap() else {
            panic!("expected a workflow");
        };
        let node = &workflow.nodes[0];
        assert!(node.condition.is_some());
        let triggers: Vec<_> = node.branches.iter().map(|b| b.trigger.clone()).collect();
        assert_eq!(
            triggers,
            vec![
                BranchTrigger::Always,
                BranchTrigger::Matched,
                BranchTrigger::Matcher("word-1".to_string()),
            ]
        );
        assert_eq!(workflow.requests(), 4);
    }

    #[test]
    fn test_workflow_validation_collects_every_problem() {
        let dir = TempDir::new().unwrap();
        write(&dir, "probe.yaml", PROBE);
        let flow = write(
            &dir,
            "flow.yaml",
            r#"
id: flow
workflows:
  - template: probe.yaml
    workflow: other.yaml
  - condition:
      matchers: []
  - template: absent.yaml
"#,
        );
        let (loader, _) = loader();

        let Err(LoadError::Validation { errors }) = loader.load(&flow) else {
            panic!("expected validation errors");
        };
        assert_eq!(errors.len(), 3);
        assert!(matches!(errors[0], ValidationError::AmbiguousNode { index: 0, .. }));
        assert!(matches!(errors[1], ValidationError::EmptyNode { index: 1, .. }));
        assert!(matches!(
            &errors[2],
            ValidationError::MissingTemplate { reference, .. } if reference == "absent.yaml"
        ));
    }

    #[test]
    fn test_cyclic_workflows_are_detected() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a.yaml", "id: a\nworkflows:\n  - workflow: b.yaml\n");
        write(&dir, "b.yaml", "id: b\nworkflows:\n  - workflow: a.yaml\n");
        let (loader, _) = loader();

        let Err(LoadError::Validation { errors }) = loader.load(&a) else {
            panic!("expected a cycle");
        };
        assert_eq!(
            errors,
            vec![ValidationError::CyclicReference {
                chain: vec!["a.yaml".to_string(), "b.yaml".to_string(), "a.yaml".to_string()],
            }]
        );
    }
}
