// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! HTTP protocol request.
//!
//! Each path or raw request, combined with each payload combination, is one
//! variation. Variations are substituted, sent through the configured
//! [`HttpTransport`] and evaluated independently; their callbacks fire in
//! declaration order even when several are in flight.
//!
//! Fields exposed to operators for every response:
//!
//! | key | value |
//! |---|---|
//! | `status_code` | numeric status |
//! | `content_length` | `Content-Length` header, else body length |
//! | `body` | response body |
//! | `body_hex` | body bytes, hex encoded; what `binary` matchers read |
//! | `header`, `all_headers` | status line and headers |
//! | `response` | full response dump |
//! | `request` | request dump |
//! | `host`, `matched` | input and requested URL |
//! | `duration` | exchange time in seconds |
//! | `<header_name>` | each header, lowercased with `-` as `_` |
//!
//! Payload values of the variation are exposed under their own names.

pub mod raw;
pub mod transport;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use serde_json::{json, Value};

use crate::config::ExecuterOptions;
use crate::engine::input::ScanTarget;
use crate::errors::{CompileError, ExecutionError, TransportError};
use crate::observability::messages::protocol::{RequestCompleted, RequestFailed, VariationSkipped};
use crate::observability::messages::StructuredLog;
use crate::operators::{Extractor, Matcher, MatcherType, Operators};
use crate::output::{
    merge_events, InternalEvent, InternalWrappedEvent, RequestAttempt, ResultEvent,
};
use crate::protocols::common::generators::{Combinations, PayloadGenerator};
use crate::protocols::common::{self, replacer};
use crate::protocols::ProtocolType;
use crate::template::definition::HttpRequestDefinition;
use crate::template::TemplateMeta;
use crate::traits::{EventCallback, ProtocolRequest};

pub use transport::{HttpResponse, HttpTransport, RenderedRequest, ReqwestTransport};

const INTERACTSH_URL: &str = "interactsh-url";

#[derive(Debug, Clone)]
enum RequestTemplate {
    Path(String),
    Raw(String),
}

impl RequestTemplate {
    fn uses_marker(&self, definition: &HttpRequestDefinition, name: &str) -> bool {
        let text = match self {
            RequestTemplate::Path(path) => path,
            RequestTemplate::Raw(raw) => raw,
        };
        replacer::contains_marker(text, name)
            || replacer::contains_marker(&definition.body, name)
            || definition
                .headers
                .values()
                .any(|value| replacer::contains_marker(value, name))
    }
}

pub struct HttpRequest {
    definition: HttpRequestDefinition,
    meta: TemplateMeta,
    base_dir: Option<PathBuf>,
    templates: Vec<RequestTemplate>,
    generator: Option<PayloadGenerator>,
    runtime: Option<ExecuterOptions>,
}

impl HttpRequest {
    pub fn new(
        definition: HttpRequestDefinition,
        meta: TemplateMeta,
        base_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            definition,
            meta,
            base_dir,
            templates: Vec::new(),
            generator: None,
            runtime: None,
        }
    }

    fn runtime(&self) -> Result<&ExecuterOptions, ExecutionError> {
        self.runtime.as_ref().ok_or_else(|| ExecutionError::InternalError {
            message: format!("http request of '{}' executed before compile", self.meta.id),
        })
    }

    fn request_label(&self) -> &str {
        if self.definition.id.is_empty() {
            &self.meta.id
        } else {
            &self.definition.id
        }
    }

    /// Every (request template, payload values) pair, in declaration order.
    fn variations(&self) -> impl Iterator<Item = (usize, IndexMap<String, Value>)> + Send + '_ {
        (0..self.templates.len()).flat_map(move |index| {
            Combinations::new(self.generator.as_ref()).map(move |payload| (index, payload))
        })
    }

    fn render(
        &self,
        template: &RequestTemplate,
        values: &InternalEvent,
        user_agent: &str,
    ) -> Result<RenderedRequest, Vec<String>> {
        let (method, url, mut headers, body) = match template {
            RequestTemplate::Path(path) => {
                let headers = self
                    .definition
                    .headers
                    .iter()
                    .map(|(name, value)| (name.clone(), replacer::replace(value, values)))
                    .collect::<Vec<_>>();
                (
                    self.definition.method.to_uppercase(),
                    replacer::replace(path, values),
                    headers,
                    replacer::replace(&self.definition.body, values),
                )
            }
            RequestTemplate::Raw(text) => {
                let substituted = replacer::replace(text, values);
                let parsed = raw::parse(&substituted).map_err(|e| vec![e])?;
                let url = if parsed.path.contains("://") {
                    parsed.path
                } else {
                    let base = values
                        .get("BaseURL")
                        .map(crate::output::value_as_string)
                        .unwrap_or_default();
                    format!("{}{}", base.trim_end_matches('/'), parsed.path)
                };
                (parsed.method, url, parsed.headers, parsed.body)
            }
        };

        let mut missing = replacer::unresolved(&url);
        for text in headers.iter().map(|(_, v)| v).chain(std::iter::once(&body)) {
            for name in replacer::unresolved(text) {
                if !missing.contains(&name) {
                    missing.push(name);
                }
            }
        }
        if !missing.is_empty() {
            return Err(missing);
        }

        if !headers.iter().any(|(name, _)| name.eq_ignore_ascii_case("user-agent")) {
            headers.push(("User-Agent".to_string(), user_agent.to_string()));
        }

        Ok(RenderedRequest {
            method,
            url,
            headers,
            body: (!body.is_empty()).then_some(body),
            follow_redirects: self.definition.redirects,
        })
    }

    fn response_event(
        &self,
        input: &ScanTarget,
        request: &RenderedRequest,
        response: &HttpResponse,
    ) -> InternalEvent {
        let mut event = InternalEvent::new();
        let content_length = response
            .header("content-length")
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(response.body.len());
        let body = response.text();
        let header_dump = response.header_dump();

        for (name, value) in &response.headers {
            let key = name.to_lowercase().replace('-', "_");
            let merged = match event.get(&key) {
                Some(Value::String(existing)) => format!("{}, {}", existing, value),
                _ => value.clone(),
            };
            event.insert(key, Value::String(merged));
        }

        event.insert("host".to_string(), json!(input.as_str()));
        event.insert("matched".to_string(), json!(request.url));
        event.insert("request".to_string(), json!(request.dump()));
        event.insert("response".to_string(), json!(response.dump()));
        event.insert("status_code".to_string(), json!(response.status));
        event.insert("content_length".to_string(), json!(content_length));
        event.insert("body".to_string(), json!(body));
        event.insert("body_hex".to_string(), json!(hex::encode(&response.body)));
        event.insert("header".to_string(), json!(header_dump));
        event.insert("all_headers".to_string(), json!(header_dump));
        event.insert("duration".to_string(), json!(response.duration.as_secs_f64()));
        event
    }

    async fn execute_variation(
        &self,
        input: &ScanTarget,
        base_values: &InternalEvent,
        previous: &InternalEvent,
        template_index: usize,
        payload: IndexMap<String, Value>,
    ) -> Result<Option<InternalWrappedEvent>, ExecutionError> {
        let runtime = self.runtime()?;
        if let Some(cache) = &runtime.host_errors {
            if cache.check(input) {
                return Ok(None);
            }
        }

        let template = &self.templates[template_index];
        let mut values = base_values.clone();
        for (name, value) in &payload {
            values.insert(name.clone(), value.clone());
        }

        let mut interaction_ids = Vec::new();
        if let Some(correlator) = &runtime.interactions {
            if template.uses_marker(&self.definition, INTERACTSH_URL) {
                let (url, correlation_id) = correlator.new_url()?;
                values.insert(INTERACTSH_URL.to_string(), Value::String(url));
                interaction_ids.push(correlation_id);
            }
        }

        let rendered = match self.render(template, &values, &runtime.options.user_agent) {
            Ok(rendered) => rendered,
            Err(variables) => {
                VariationSkipped {
                    template_id: &self.meta.id,
                    request_id: self.request_label(),
                    variables: &variables,
                }
                .log();
                return Ok(None);
            }
        };

        let started = Instant::now();
        let outcome = runtime.transport.send(&rendered).await;
        runtime.observer.on_request(&RequestAttempt {
            template_id: self.meta.id.clone(),
            target: rendered.url.clone(),
            protocol: ProtocolType::Http,
            error: outcome.as_ref().err().map(TransportError::to_string),
        });

        let response = match outcome {
            Ok(response) => response,
            Err(error) => {
                RequestFailed {
                    template_id: &self.meta.id,
                    target: &rendered.url,
                    error: &error,
                }
                .log();
                if let Some(cache) = &runtime.host_errors {
                    cache.mark_failed(input, &error);
                }
                return Ok(None);
            }
        };

        RequestCompleted {
            template_id: &self.meta.id,
            protocol: "http",
            target: &rendered.url,
            duration: started.elapsed(),
        }
        .log();

        let mut data = previous.clone();
        merge_events(&mut data, &self.response_event(input, &rendered, &response));
        for (name, value) in &payload {
            data.insert(name.clone(), value.clone());
        }
        if let Some(url) = values.get(INTERACTSH_URL) {
            data.insert(INTERACTSH_URL.to_string(), url.clone());
        }

        let operators_result = self.evaluate(&data, runtime.options.debug).map(|mut result| {
            result.payload_values = payload;
            result
        });

        let mut wrapped = InternalWrappedEvent::new(data, operators_result);
        wrapped.interaction_ids = interaction_ids;
        Ok(Some(wrapped))
    }
}

#[async_trait]
impl ProtocolRequest for HttpRequest {
    fn compile(&mut self, options: &ExecuterOptions) -> Result<(), CompileError> {
        if self.runtime.is_some() {
            return Ok(());
        }

        let label = self.request_label().to_string();
        if self.definition.path.is_empty() && self.definition.raw.is_empty() {
            return Err(CompileError::invalid_request(label, "no path or raw request"));
        }
        if reqwest::Method::from_bytes(self.definition.method.to_uppercase().as_bytes()).is_err() {
            return Err(CompileError::invalid_request(
                label,
                format!("invalid method '{}'", self.definition.method),
            ));
        }
        for text in &self.definition.raw {
            raw::parse(text).map_err(|reason| CompileError::invalid_request(label.clone(), reason))?;
        }

        self.definition.operators.compile()?;
        if !self.definition.payloads.is_empty() {
            self.generator = Some(PayloadGenerator::new(
                &self.definition.payloads,
                self.definition.attack,
                self.base_dir.as_deref(),
            )?);
        }

        self.templates = self
            .definition
            .path
            .iter()
            .cloned()
            .map(RequestTemplate::Path)
            .chain(self.definition.raw.iter().cloned().map(RequestTemplate::Raw))
            .collect();
        self.runtime = Some(options.clone());
        Ok(())
    }

    fn requests(&self) -> usize {
        let templates = self.definition.path.len() + self.definition.raw.len();
        let payloads = self.generator.as_ref().map(|g| g.total()).unwrap_or(1);
        templates * payloads.max(1)
    }

    fn id(&self) -> &str {
        &self.definition.id
    }

    fn protocol(&self) -> ProtocolType {
        ProtocolType::Http
    }

    fn operators(&self) -> &Operators {
        &self.definition.operators
    }

    fn meta(&self) -> &TemplateMeta {
        &self.meta
    }

    fn matches(&self, data: &InternalEvent, matcher: &Matcher) -> (bool, Vec<String>) {
        if matcher.matcher_type == MatcherType::Binary {
            return matcher.evaluate(&binary_corpus(data, &matcher.part), data);
        }
        matcher.evaluate(&corpus(data, &matcher.part), data)
    }

    fn extract(&self, data: &InternalEvent, extractor: &Extractor) -> Vec<String> {
        extractor.evaluate(&corpus(data, &extractor.part), data)
    }

    async fn execute_with_results(
        &self,
        input: &ScanTarget,
        dynamic_values: &InternalEvent,
        previous: &InternalEvent,
        callback: &mut EventCallback<'_>,
    ) -> Result<(), ExecutionError> {
        let runtime = self.runtime()?;
        let stop_at_first_match =
            self.definition.stop_at_first_match || runtime.options.stop_at_first_match;

        let mut base_values = replacer::url_variables(input);
        merge_events(&mut base_values, previous);
        merge_events(&mut base_values, dynamic_values);

        let base_values = &base_values;
        let mut outcomes = stream::iter(self.variations())
            .map(|(index, payload)| {
                self.execute_variation(input, base_values, previous, index, payload)
            })
            .buffered(runtime.options.effective_payload_concurrency());

        while let Some(outcome) = outcomes.next().await {
            let Some(wrapped) = outcome? else {
                continue;
            };
            let matched = wrapped
                .operators_result
                .as_ref()
                .map(|r| r.matched)
                .unwrap_or(false);
            callback(wrapped)?;
            if stop_at_first_match && matched {
                break;
            }
        }
        Ok(())
    }

    fn make_result_events(&self, wrapped: &InternalWrappedEvent) -> Vec<ResultEvent> {
        common::make_result_events(&self.meta, ProtocolType::Http, &self.definition.operators, wrapped)
    }

    fn cluster_key(&self) -> Option<String> {
        let definition = &self.definition;
        // Stopping early depends on the request's own matchers, which a shared
        // exchange cannot honour per member.
        let clusterable = definition.raw.is_empty()
            && definition.payloads.is_empty()
            && !definition.stop_at_first_match
            && self
                .templates
                .iter()
                .all(|t| !t.uses_marker(definition, INTERACTSH_URL));
        if !clusterable || self.templates.is_empty() {
            return None;
        }

        let mut headers: Vec<_> = definition.headers.iter().collect();
        headers.sort();
        serde_json::to_string(&(
            "http",
            definition.method.to_uppercase(),
            &definition.path,
            headers,
            &definition.body,
            definition.redirects,
        ))
        .ok()
    }
}

/// Hex of a response part for binary matchers; the body keeps its raw bytes.
fn binary_corpus(data: &InternalEvent, part: &str) -> String {
    match part {
        "" | "body" => common::binary_corpus(data, "body"),
        other => hex::encode(corpus(data, other)),
    }
}

/// Text of a response part. `body` is the default part; `all` is headers
/// followed by body.
fn corpus(data: &InternalEvent, part: &str) -> String {
    match part {
        "" | "body" => common::part_corpus(data, "body"),
        "header" | "all_headers" => common::part_corpus(data, "all_headers"),
        "all" => format!(
            "{}{}",
            common::part_corpus(data, "all_headers"),
            common::part_corpus(data, "body")
        ),
        "raw" => common::part_corpus(data, "response"),
        other => common::part_corpus(data, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanOptions;
    use crate::engine::test_support::{options_with, CannedTransport, SlowTransport};
    use crate::operators::ConditionType;
    use std::time::Duration;
    use crate::output::MemorySink;

    fn definition(paths: &[&str]) -> HttpRequestDefinition {
        HttpRequestDefinition {
            path: paths.iter().map(|p| p.to_string()).collect(),
            operators: Operators::new(vec![Matcher::words(["welcome"]).case_insensitive()], vec![]),
            ..HttpRequestDefinition::default()
        }
    }

    fn compiled(definition: HttpRequestDefinition, transport: Arc<CannedTransport>) -> HttpRequest {
        let mut request = HttpRequest::new(definition, TemplateMeta::new("t1"), None);
        request
            .compile(&options_with(transport, Arc::new(MemorySink::new())))
            .unwrap();
        request
    }

    async fn collect(request: &HttpRequest, input: &str) -> Vec<InternalWrappedEvent> {
        let mut events = Vec::new();
        let mut callback = |event: InternalWrappedEvent| -> Result<(), ExecutionError> {
            events.push(event);
            Ok(())
        };
        request
            .execute_with_results(
                &ScanTarget::new(input),
                &InternalEvent::new(),
                &InternalEvent::new(),
                &mut callback,
            )
            .await
            .unwrap();
        events
    }

    #[tokio::test]
    async fn test_matching_variation_yields_operator_result() {
        let transport = Arc::new(CannedTransport::with_body(200, "Welcome home"));
        let request = compiled(definition(&["{{BaseURL}}/"]), transport.clone());

        let events = collect(&request, "http://example.com").await;
        assert_eq!(events.len(), 1);

        let result = events[0].operators_result.as_ref().unwrap();
        assert!(result.matched);
        assert_eq!(result.matches["word-1"], vec!["welcome"]);
        assert_eq!(transport.requests()[0].url, "http://example.com/");

        let results = request.make_result_events(&events[0]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].matcher_name.as_deref(), Some("word-1"));
        assert_eq!(results[0].matched_at, "http://example.com/");
    }

    #[tokio::test]
    async fn test_non_matching_variation_still_calls_back_without_result() {
        let transport = Arc::new(CannedTransport::with_body(200, "goodbye"));
        let request = compiled(definition(&["{{BaseURL}}/"]), transport);

        let events = collect(&request, "http://example.com").await;
        assert_eq!(events.len(), 1);
        assert!(events[0].operators_result.is_none());
        assert_eq!(events[0].field("status_code"), "200");
    }

    #[tokio::test]
    async fn test_payload_variations_run_in_order() {
        let transport = Arc::new(CannedTransport::with_body(200, "nothing"));
        let mut definition = definition(&["{{BaseURL}}/?u={{user}}"]);
        definition.payloads.insert(
            "user".to_string(),
            crate::protocols::common::generators::PayloadSource::Values(vec![
                "a".to_string(),
                "b".to_string(),
                "c".to_string(),
            ]),
        );
        let request = compiled(definition, transport.clone());
        assert_eq!(request.requests(), 3);

        let events = collect(&request, "http://x.test").await;
        let users: Vec<_> = events.iter().map(|e| e.field("user")).collect();
        assert_eq!(users, vec!["a", "b", "c"]);
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn test_unresolved_variables_skip_variation() {
        let transport = Arc::new(CannedTransport::with_body(200, "welcome"));
        let request = compiled(definition(&["{{BaseURL}}/{{missing}}"]), transport.clone());

        let events = collect(&request, "http://x.test").await;
        assert!(events.is_empty());
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_transport_error_skips_variation_and_counts_host_error() {
        let transport = Arc::new(CannedTransport::failing());
        let sink = Arc::new(MemorySink::new());
        let options = options_with(transport.clone(), sink);
        let mut request = HttpRequest::new(definition(&["{{BaseURL}}/a", "{{BaseURL}}/b"]), TemplateMeta::new("t"), None);
        request.compile(&options).unwrap();

        let events = collect(&request, "http://down.test").await;
        assert!(events.is_empty());
        let cache = options.host_errors.as_ref().unwrap();
        assert_eq!(cache.error_count(&ScanTarget::new("http://down.test")), 2);
    }

    #[tokio::test]
    async fn test_stop_at_first_match() {
        let transport = Arc::new(CannedTransport::with_body(200, "welcome"));
        let mut definition = definition(&["{{BaseURL}}/1", "{{BaseURL}}/2"]);
        definition.stop_at_first_match = true;
        let request = compiled(definition, transport.clone());

        let events = collect(&request, "http://x.test").await;
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_callback_error_aborts_remaining_variations() {
        let transport = Arc::new(CannedTransport::with_body(200, "welcome"));
        let request = compiled(definition(&["{{BaseURL}}/1", "{{BaseURL}}/2"]), transport);

        let mut calls = 0;
        let mut callback = |_: InternalWrappedEvent| -> Result<(), ExecutionError> {
            calls += 1;
            Err(ExecutionError::CallbackAborted("stop".to_string()))
        };
        let result = request
            .execute_with_results(
                &ScanTarget::new("http://x.test"),
                &InternalEvent::new(),
                &InternalEvent::new(),
                &mut callback,
            )
            .await;
        assert!(matches!(result, Err(ExecutionError::CallbackAborted(_))));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_raw_request_is_rendered_against_base_url() {
        let transport = Arc::new(CannedTransport::with_body(200, "welcome"));
        let definition = HttpRequestDefinition {
            raw: vec!["POST /login HTTP/1.1\nHost: {{Hostname}}\n\nuser=admin".to_string()],
            operators: Operators::new(vec![Matcher::statuses([200])], vec![]),
            ..HttpRequestDefinition::default()
        };
        let request = compiled(definition, transport.clone());
        collect(&request, "http://x.test:8080").await;

        let sent = &transport.requests()[0];
        assert_eq!(sent.method, "POST");
        assert_eq!(sent.url, "http://x.test:8080/login");
        assert_eq!(sent.body.as_deref(), Some("user=admin"));
        assert!(sent.headers.contains(&("Host".to_string(), "x.test:8080".to_string())));
    }

    #[tokio::test]
    async fn test_header_part_and_normalized_header_keys() {
        let transport = Arc::new(
            CannedTransport::with_body(200, "ok").header("X-Powered-By", "PHP/8.1"),
        );
        let definition = HttpRequestDefinition {
            path: vec!["{{BaseURL}}".to_string()],
            operators: Operators::new(
                vec![
                    Matcher::words(["php"]).case_insensitive().on_part("header"),
                    Matcher::expressions(["x_powered_by == 'PHP/8.1'"]),
                ],
                vec![],
            )
            .with_condition(ConditionType::And),
            ..HttpRequestDefinition::default()
        };
        let request = compiled(definition, transport);

        let events = collect(&request, "http://x.test").await;
        assert!(events[0].operators_result.as_ref().unwrap().matched);
    }

    #[test]
    fn test_compile_rejects_missing_paths_and_bad_methods() {
        let transport = Arc::new(CannedTransport::with_body(200, ""));
        let options = options_with(transport, Arc::new(MemorySink::new()));

        let mut empty = HttpRequest::new(HttpRequestDefinition::default(), TemplateMeta::new("t"), None);
        assert!(matches!(empty.compile(&options), Err(CompileError::InvalidRequest { .. })));

        let mut bad_method = HttpRequest::new(
            HttpRequestDefinition {
                method: "GE T".to_string(),
                ..definition(&["{{BaseURL}}"])
            },
            TemplateMeta::new("t"),
            None,
        );
        assert!(bad_method.compile(&options).is_err());
    }

    #[test]
    fn test_cluster_key_ignores_header_order_and_excludes_payloads() {
        let transport = Arc::new(CannedTransport::with_body(200, ""));
        let mut first = definition(&["{{BaseURL}}/"]);
        first.headers.insert("A".to_string(), "1".to_string());
        first.headers.insert("B".to_string(), "2".to_string());
        let mut second = definition(&["{{BaseURL}}/"]);
        second.headers.insert("B".to_string(), "2".to_string());
        second.headers.insert("A".to_string(), "1".to_string());
        second.operators = Operators::new(vec![Matcher::statuses([500])], vec![]);

        let first = compiled(first, transport.clone());
        let second = compiled(second, transport.clone());
        assert!(first.cluster_key().is_some());
        assert_eq!(first.cluster_key(), second.cluster_key());

        let mut with_payloads = definition(&["{{BaseURL}}/{{p}}"]);
        with_payloads.payloads.insert(
            "p".to_string(),
            crate::protocols::common::generators::PayloadSource::Values(vec!["x".to_string()]),
        );
        assert!(compiled(with_payloads, transport.clone()).cluster_key().is_none());

        let interactsh = definition(&["{{BaseURL}}/?cb={{interactsh-url}}"]);
        assert!(compiled(interactsh, transport.clone()).cluster_key().is_none());

        let mut stops_early = definition(&["{{BaseURL}}/a", "{{BaseURL}}/b"]);
        stops_early.stop_at_first_match = true;
        assert!(compiled(stops_early, transport).cluster_key().is_none());
    }

    #[tokio::test]
    async fn test_binary_matcher_reads_undecoded_body() {
        let transport = Arc::new(CannedTransport::with_bytes(
            200,
            &[0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10, b'J', b'F', b'I', b'F'],
        ));
        let mut jpeg = Matcher::new(MatcherType::Binary);
        jpeg.binary = vec!["ffd8ffe0".to_string()];
        let request = compiled(
            HttpRequestDefinition {
                path: vec!["{{BaseURL}}/logo".to_string()],
                operators: Operators::new(vec![jpeg], vec![]),
                ..HttpRequestDefinition::default()
            },
            transport,
        );

        let events = collect(&request, "http://example.com").await;
        assert_eq!(events.len(), 1);
        assert!(events[0].field("body_hex").starts_with("ffd8ffe00010"));
        assert!(events[0].operators_result.as_ref().unwrap().matched);
    }

    #[tokio::test]
    async fn test_concurrent_variations_call_back_in_declaration_order() {
        let transport = Arc::new(SlowTransport::new(
            Duration::from_millis(80),
            Duration::from_millis(10),
        ));
        let mut options = options_with(transport.clone(), Arc::new(MemorySink::new()));
        options.options = Arc::new(ScanOptions {
            payload_concurrency: 4,
            ..ScanOptions::default()
        });
        let paths: Vec<String> = (0..8).map(|i| format!("{{{{BaseURL}}}}/{}", i)).collect();
        let mut request = HttpRequest::new(
            HttpRequestDefinition {
                path: paths,
                operators: Operators::new(vec![Matcher::words(["example.com"])], vec![]),
                ..HttpRequestDefinition::default()
            },
            TemplateMeta::new("ordered"),
            None,
        );
        request.compile(&options).unwrap();

        let events = collect(&request, "http://example.com").await;
        let order: Vec<String> = events.iter().map(|e| e.field("matched")).collect();
        let expected: Vec<String> = (0..8).map(|i| format!("http://example.com/{}", i)).collect();
        assert_eq!(order, expected);
        assert_eq!(transport.call_count(), 8);
        assert!(transport.peak() > 1);
        assert!(transport.peak() <= 4);
    }
}
