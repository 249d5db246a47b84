// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Events produced while executing templates.
//!
//! * [`InternalEvent`] is the accumulated key/value state of one execution
//!   chain: response fields, payload values and extracted dynamic values.
//! * [`InternalWrappedEvent`] pairs one response's internal event with the
//!   operators outcome computed from it.
//! * [`ResultEvent`] is the user-facing finding handed to an [`OutputSink`].

mod observer;
mod sink;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::operators::OperatorResult;
use crate::template::TemplateInfo;

pub use observer::{RequestAttempt, RequestObserver, TracingObserver};
pub use sink::{ChannelSink, JsonLinesSink, MemorySink, OutputSink, SinkMessage};

/// Insertion-ordered state threaded through one (template, input) execution.
pub type InternalEvent = IndexMap<String, Value>;

/// One response's internal event together with its operators outcome.
///
/// `operators_result` is `Some` only when the response matched or produced
/// at least one extraction.
#[derive(Debug, Clone, Default)]
pub struct InternalWrappedEvent {
    pub internal_event: InternalEvent,
    pub operators_result: Option<OperatorResult>,
    /// Correlation ids registered for out-of-band interactions by this variation.
    pub interaction_ids: Vec<String>,
}

impl InternalWrappedEvent {
    pub fn new(internal_event: InternalEvent, operators_result: Option<OperatorResult>) -> Self {
        Self {
            internal_event,
            operators_result,
            interaction_ids: Vec::new(),
        }
    }

    /// Reads a string field from the internal event, empty when absent.
    pub fn field(&self, key: &str) -> String {
        self.internal_event
            .get(key)
            .map(value_as_string)
            .unwrap_or_default()
    }
}

/// A finding delivered to the output sink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultEvent {
    pub template_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_path: Option<String>,
    pub info: TemplateInfo,
    #[serde(rename = "type")]
    pub protocol: String,
    pub host: String,
    pub matched_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matcher_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extractor_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extracted_results: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Payload values of the variation that produced this finding.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub payload_values: IndexMap<String, Value>,
    /// Raw interaction data merged in by the out-of-band correlator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

/// An error surfaced through the same channel as findings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureEvent {
    pub template_id: String,
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl FailureEvent {
    pub fn new(template_id: &str, host: &str, node: Option<&str>, error: String) -> Self {
        Self {
            template_id: template_id.to_string(),
            host: host.to_string(),
            node: node.map(str::to_string),
            error,
            timestamp: Utc::now(),
        }
    }
}

/// Renders a dynamic value the way it is substituted into requests.
pub fn value_as_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.iter().map(value_as_string).collect::<Vec<_>>().join(","),
        Value::Object(_) => value.to_string(),
    }
}

/// Single extraction stays a string, several become an array.
pub fn extracted_value(values: &[String]) -> Value {
    match values {
        [single] => Value::String(single.clone()),
        many => Value::Array(many.iter().cloned().map(Value::String).collect()),
    }
}

/// Copies every entry of `source` into `target`, overwriting existing keys.
pub fn merge_events(target: &mut InternalEvent, source: &InternalEvent) {
    for (key, value) in source {
        target.insert(key.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_as_string_variants() {
        assert_eq!(value_as_string(&json!("abc")), "abc");
        assert_eq!(value_as_string(&json!(200)), "200");
        assert_eq!(value_as_string(&json!(true)), "true");
        assert_eq!(value_as_string(&Value::Null), "");
        assert_eq!(value_as_string(&json!(["a", "b"])), "a,b");
    }

    #[test]
    fn test_extracted_value_single_and_many() {
        assert_eq!(extracted_value(&["x".to_string()]), json!("x"));
        assert_eq!(
            extracted_value(&["x".to_string(), "y".to_string()]),
            json!(["x", "y"])
        );
    }

    #[test]
    fn test_merge_events_overwrites_and_keeps_order() {
        let mut target = InternalEvent::new();
        target.insert("a".to_string(), json!(1));
        target.insert("b".to_string(), json!(2));

        let mut source = InternalEvent::new();
        source.insert("a".to_string(), json!(10));
        source.insert("c".to_string(), json!(3));

        merge_events(&mut target, &source);

        let keys: Vec<_> = target.keys().cloned().collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(target["a"], json!(10));
    }
}
