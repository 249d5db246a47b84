// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Serde shapes of template and workflow files.
//!
//! # Example
//! ```yaml
//! id: admin-panel
//! info:
//!   name: Admin panel exposed
//!   severity: medium
//! http:
//!   - method: GET
//!     path: ["{{BaseURL}}/admin"]
//!     matchers-condition: and
//!     matchers:
//!       - type: status
//!         status: [200]
//!       - type: word
//!         words: ["Dashboard"]
//! ```

use indexmap::IndexMap;
use serde::Deserialize;

use super::TemplateInfo;
use crate::operators::{Matcher, Operators};
use crate::protocols::common::generators::{AttackType, PayloadSource};

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateDefinition {
    pub id: String,
    #[serde(default)]
    pub info: TemplateInfo,
    #[serde(default, alias = "requests")]
    pub http: Vec<HttpRequestDefinition>,
    #[serde(default, alias = "tcp")]
    pub network: Vec<NetworkRequestDefinition>,
    #[serde(default)]
    pub workflows: Vec<WorkflowNodeDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpRequestDefinition {
    /// Step id; later steps see this step's fields as `<id>_<field>`.
    #[serde(default)]
    pub id: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub path: Vec<String>,
    #[serde(default)]
    pub raw: Vec<String>,
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub payloads: IndexMap<String, PayloadSource>,
    #[serde(default)]
    pub attack: AttackType,
    #[serde(default, alias = "host-redirects")]
    pub redirects: bool,
    #[serde(default, alias = "stop-at-first-match")]
    pub stop_at_first_match: bool,
    #[serde(flatten)]
    pub operators: Operators,
}

impl Default for HttpRequestDefinition {
    fn default() -> Self {
        Self {
            id: String::new(),
            method: default_method(),
            path: Vec::new(),
            raw: Vec::new(),
            headers: IndexMap::new(),
            body: String::new(),
            payloads: IndexMap::new(),
            attack: AttackType::default(),
            redirects: false,
            stop_at_first_match: false,
            operators: Operators::default(),
        }
    }
}

/// One chunk written to a socket.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NetworkInputDefinition {
    pub data: String,
    /// `text` (default) or `hex`.
    #[serde(default, rename = "type")]
    pub encoding: InputEncoding,
    /// Bytes to read after writing this chunk; 0 reads nothing.
    #[serde(default)]
    pub read: usize,
    /// Name under which the read bytes are exposed to operators.
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputEncoding {
    #[default]
    Text,
    Hex,
}

fn default_host() -> Vec<String> {
    vec!["{{Hostname}}".to_string()]
}

fn default_read_size() -> usize {
    1024
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkRequestDefinition {
    #[serde(default)]
    pub id: String,
    /// `host:port` templates; `{{Hostname}}` by default.
    #[serde(default = "default_host")]
    pub host: Vec<String>,
    #[serde(default)]
    pub inputs: Vec<NetworkInputDefinition>,
    /// Bytes read after all inputs were written.
    #[serde(default = "default_read_size", alias = "read-size")]
    pub read_size: usize,
    #[serde(default)]
    pub payloads: IndexMap<String, PayloadSource>,
    #[serde(default)]
    pub attack: AttackType,
    #[serde(default, alias = "stop-at-first-match")]
    pub stop_at_first_match: bool,
    #[serde(flatten)]
    pub operators: Operators,
}

impl Default for NetworkRequestDefinition {
    fn default() -> Self {
        Self {
            id: String::new(),
            host: default_host(),
            inputs: Vec::new(),
            read_size: default_read_size(),
            payloads: IndexMap::new(),
            attack: AttackType::default(),
            stop_at_first_match: false,
            operators: Operators::default(),
        }
    }
}

/// A workflow node as written in a workflow file.
///
/// Exactly one of `template` or `workflow` must be set. Children are grouped
/// by the branch that triggers them:
/// * `always` - run regardless of the node's outcome
/// * `subtemplates` - run when the node matched
/// * `matchers` - run when the named matcher matched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkflowNodeDefinition {
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub workflow: Option<String>,
    /// Extra matchers over the node's event; children run only when it holds.
    #[serde(default)]
    pub condition: Option<WorkflowConditionDefinition>,
    #[serde(default)]
    pub always: Vec<WorkflowNodeDefinition>,
    #[serde(default)]
    pub subtemplates: Vec<WorkflowNodeDefinition>,
    #[serde(default)]
    pub matchers: Vec<MatcherBranchDefinition>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkflowConditionDefinition {
    #[serde(default)]
    pub matchers: Vec<Matcher>,
    #[serde(default, alias = "matchers-condition")]
    pub matchers_condition: crate::operators::ConditionType,
}

impl WorkflowConditionDefinition {
    pub fn into_operators(self) -> Operators {
        Operators::new(self.matchers, Vec::new()).with_condition(self.matchers_condition)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatcherBranchDefinition {
    pub name: String,
    #[serde(default)]
    pub subtemplates: Vec<WorkflowNodeDefinition>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Severity;

    #[test]
    fn test_parse_http_template() {
        let yaml = r#"
id: admin-panel
info:
  name: Admin panel exposed
  severity: medium
  tags: [panel]
http:
  - id: probe
    path: ["{{BaseURL}}/admin"]
    headers:
      X-Test: "1"
    payloads:
      user: [admin, root]
    attack: clusterbomb
    matchers-condition: and
    matchers:
      - type: status
        status: [200]
      - type: word
        words: ["Dashboard"]
"#;
        let definition: TemplateDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(definition.id, "admin-panel");
        assert_eq!(definition.info.severity, Severity::Medium);

        let request = &definition.http[0];
        assert_eq!(request.id, "probe");
        assert_eq!(request.method, "GET");
        assert_eq!(request.attack, AttackType::Clusterbomb);
        assert_eq!(request.operators.matchers.len(), 2);
        assert_eq!(
            request.operators.matchers_condition,
            crate::operators::ConditionType::And
        );
    }

    #[test]
    fn test_parse_network_template() {
        let yaml = r#"
id: redis-info
network:
  - host: ["{{Hostname}}"]
    inputs:
      - data: "INFO\r\n"
      - data: "50494e470d0a"
        type: hex
        read: 16
        name: pong
    matchers:
      - type: word
        words: ["redis_version"]
"#;
        let definition: TemplateDefinition = serde_yaml::from_str(yaml).unwrap();
        let request = &definition.network[0];
        assert_eq!(request.inputs.len(), 2);
        assert_eq!(request.inputs[1].encoding, InputEncoding::Hex);
        assert_eq!(request.read_size, 1024);
    }

    #[test]
    fn test_parse_workflow_definition() {
        let yaml = r#"
id: wordpress-flow
workflows:
  - template: tech-detect.yaml
    matchers:
      - name: wordpress
        subtemplates:
          - template: wp-login.yaml
    always:
      - template: robots.yaml
"#;
        let definition: TemplateDefinition = serde_yaml::from_str(yaml).unwrap();
        let node = &definition.workflows[0];
        assert_eq!(node.template.as_deref(), Some("tech-detect.yaml"));
        assert_eq!(node.matchers[0].name, "wordpress");
        assert_eq!(node.always.len(), 1);
    }
}
