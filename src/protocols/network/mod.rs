// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Raw TCP protocol request.
//!
//! Each host address, combined with each payload combination, is one
//! variation: connect, write every input in order (reading after an input
//! when it asks to), then read the final response.
//!
//! Operators see `host`, `matched` (the address), `request` (everything
//! written), `data` (final read) and `raw` (every read concatenated). Named
//! inputs expose their own read under their name. `data` is the default part.
//! Every read also keeps its exact bytes hex encoded under `<field>_hex`,
//! which is what `binary` matchers search.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;

use crate::config::ExecuterOptions;
use crate::engine::input::ScanTarget;
use crate::errors::{CompileError, ExecutionError, TransportError};
use crate::observability::messages::protocol::{
    InputDecodeFailed, RequestCompleted, RequestFailed, VariationSkipped,
};
use crate::observability::messages::StructuredLog;
use crate::operators::{Extractor, Matcher, MatcherType, Operators};
use crate::output::{merge_events, InternalEvent, InternalWrappedEvent, RequestAttempt, ResultEvent};
use crate::protocols::common::generators::{Combinations, PayloadGenerator};
use crate::protocols::common::{self, replacer};
use crate::protocols::ProtocolType;
use crate::template::definition::{InputEncoding, NetworkRequestDefinition};
use crate::template::TemplateMeta;
use crate::traits::{EventCallback, ProtocolRequest};

#[derive(Default)]
struct Exchange {
    request: Vec<u8>,
    data: Vec<u8>,
    raw: Vec<u8>,
    named: Vec<(String, Vec<u8>)>,
}

/// Why a variation's inputs could not be rendered.
enum RenderError {
    Unresolved(Vec<String>),
    InvalidHex { input: String, reason: String },
}

pub struct NetworkRequest {
    definition: NetworkRequestDefinition,
    meta: TemplateMeta,
    base_dir: Option<PathBuf>,
    generator: Option<PayloadGenerator>,
    runtime: Option<ExecuterOptions>,
}

impl NetworkRequest {
    pub fn new(
        definition: NetworkRequestDefinition,
        meta: TemplateMeta,
        base_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            definition,
            meta,
            base_dir,
            generator: None,
            runtime: None,
        }
    }

    fn runtime(&self) -> Result<&ExecuterOptions, ExecutionError> {
        self.runtime.as_ref().ok_or_else(|| ExecutionError::InternalError {
            message: format!("network request of '{}' executed before compile", self.meta.id),
        })
    }

    fn request_label(&self) -> &str {
        if self.definition.id.is_empty() {
            &self.meta.id
        } else {
            &self.definition.id
        }
    }

    fn render_inputs(&self, values: &InternalEvent) -> Result<Vec<Vec<u8>>, RenderError> {
        let mut rendered = Vec::with_capacity(self.definition.inputs.len());
        let mut missing = Vec::new();
        for input in &self.definition.inputs {
            let text = replacer::replace(&input.data, values);
            let unresolved = replacer::unresolved(&text);
            if !unresolved.is_empty() {
                missing.extend(unresolved);
                continue;
            }
            rendered.push(match input.encoding {
                InputEncoding::Text => text.into_bytes(),
                InputEncoding::Hex => {
                    hex::decode(text.trim()).map_err(|e| RenderError::InvalidHex {
                        input: text.clone(),
                        reason: e.to_string(),
                    })?
                }
            });
        }
        if missing.is_empty() {
            Ok(rendered)
        } else {
            Err(RenderError::Unresolved(missing))
        }
    }

    fn report_render_error(&self, error: RenderError) {
        match error {
            RenderError::Unresolved(variables) => VariationSkipped {
                template_id: &self.meta.id,
                request_id: self.request_label(),
                variables: &variables,
            }
            .log(),
            RenderError::InvalidHex { input, reason } => InputDecodeFailed {
                template_id: &self.meta.id,
                request_id: self.request_label(),
                input: &input,
                reason: &reason,
            }
            .log(),
        }
    }

    async fn exchange(
        &self,
        address: &str,
        inputs: &[Vec<u8>],
        timeout: Duration,
    ) -> Result<Exchange, TransportError> {
        let mut stream = time::timeout(timeout, TcpStream::connect(address))
            .await
            .map_err(|_| TransportError::Timeout {
                target: address.to_string(),
                timeout,
            })??;

        let mut exchange = Exchange::default();
        for (input, bytes) in self.definition.inputs.iter().zip(inputs) {
            stream.write_all(bytes).await?;
            exchange.request.extend_from_slice(bytes);
            if input.read == 0 {
                continue;
            }
            let chunk = read_chunk(&mut stream, input.read, timeout).await?;
            exchange.raw.extend_from_slice(&chunk);
            if !input.name.is_empty() {
                exchange.named.push((input.name.clone(), chunk));
            }
        }

        if self.definition.read_size > 0 {
            exchange.data = read_chunk(&mut stream, self.definition.read_size, timeout).await?;
            exchange.raw.extend_from_slice(&exchange.data);
        }
        Ok(exchange)
    }

    async fn execute_variation(
        &self,
        input: &ScanTarget,
        base_values: &InternalEvent,
        previous: &InternalEvent,
        host: &str,
        payload: IndexMap<String, Value>,
    ) -> Result<Option<InternalWrappedEvent>, ExecutionError> {
        let runtime = self.runtime()?;
        if let Some(cache) = &runtime.host_errors {
            if cache.check(input) {
                return Ok(None);
            }
        }

        let mut values = base_values.clone();
        for (name, value) in &payload {
            values.insert(name.clone(), value.clone());
        }

        let address = replacer::replace(host, &values);
        let unresolved_host = replacer::unresolved(&address);
        if !unresolved_host.is_empty() {
            self.report_render_error(RenderError::Unresolved(unresolved_host));
            return Ok(None);
        }
        let inputs = match self.render_inputs(&values) {
            Ok(inputs) => inputs,
            Err(error) => {
                self.report_render_error(error);
                return Ok(None);
            }
        };

        let started = Instant::now();
        let outcome = self.exchange(&address, &inputs, runtime.options.timeout()).await;
        runtime.observer.on_request(&RequestAttempt {
            template_id: self.meta.id.clone(),
            target: address.clone(),
            protocol: ProtocolType::Network,
            error: outcome.as_ref().err().map(TransportError::to_string),
        });

        let exchange = match outcome {
            Ok(exchange) => exchange,
            Err(error) => {
                RequestFailed {
                    template_id: &self.meta.id,
                    target: &address,
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
            protocol: "network",
            target: &address,
            duration: started.elapsed(),
        }
        .log();

        let mut data = previous.clone();
        let mut fields = InternalEvent::new();
        for (name, chunk) in &exchange.named {
            insert_read(&mut fields, name, chunk);
        }
        fields.insert("host".to_string(), json!(input.as_str()));
        fields.insert("matched".to_string(), json!(address));
        fields.insert(
            "request".to_string(),
            json!(String::from_utf8_lossy(&exchange.request)),
        );
        insert_read(&mut fields, "data", &exchange.data);
        insert_read(&mut fields, "raw", &exchange.raw);
        merge_events(&mut data, &fields);
        for (name, value) in &payload {
            data.insert(name.clone(), value.clone());
        }

        let operators_result = self.evaluate(&data, runtime.options.debug).map(|mut result| {
            result.payload_values = payload;
            result
        });
        Ok(Some(InternalWrappedEvent::new(data, operators_result)))
    }
}

/// Stores a read as text and, byte exact, as `<name>_hex`.
fn insert_read(fields: &mut InternalEvent, name: &str, bytes: &[u8]) {
    fields.insert(name.to_string(), json!(String::from_utf8_lossy(bytes)));
    fields.insert(format!("{}_hex", name), json!(hex::encode(bytes)));
}

async fn read_chunk(
    stream: &mut TcpStream,
    size: usize,
    timeout: Duration,
) -> Result<Vec<u8>, TransportError> {
    let mut buffer = vec![0u8; size];
    let read = match time::timeout(timeout, stream.read(&mut buffer)).await {
        Ok(read) => read?,
        Err(_) => 0,
    };
    buffer.truncate(read);
    Ok(buffer)
}

#[async_trait]
impl ProtocolRequest for NetworkRequest {
    fn compile(&mut self, options: &ExecuterOptions) -> Result<(), CompileError> {
        if self.runtime.is_some() {
            return Ok(());
        }

        let label = self.request_label().to_string();
        if self.definition.host.is_empty() {
            return Err(CompileError::invalid_request(label, "no host address"));
        }
        for input in &self.definition.inputs {
            if input.encoding == InputEncoding::Hex
                && replacer::unresolved(&input.data).is_empty()
                && hex::decode(input.data.trim()).is_err()
            {
                return Err(CompileError::invalid_request(
                    label,
                    format!("input '{}' is not valid hex", input.data),
                ));
            }
        }

        self.definition.operators.compile()?;
        if !self.definition.payloads.is_empty() {
            self.generator = Some(PayloadGenerator::new(
                &self.definition.payloads,
                self.definition.attack,
                self.base_dir.as_deref(),
            )?);
        }
        self.runtime = Some(options.clone());
        Ok(())
    }

    fn requests(&self) -> usize {
        let payloads = self.generator.as_ref().map(|g| g.total()).unwrap_or(1);
        self.definition.host.len() * payloads.max(1)
    }

    fn id(&self) -> &str {
        &self.definition.id
    }

    fn protocol(&self) -> ProtocolType {
        ProtocolType::Network
    }

    fn operators(&self) -> &Operators {
        &self.definition.operators
    }

    fn meta(&self) -> &TemplateMeta {
        &self.meta
    }

    fn matches(&self, data: &InternalEvent, matcher: &Matcher) -> (bool, Vec<String>) {
        if matcher.matcher_type == MatcherType::Binary {
            return matcher.evaluate(&common::binary_corpus(data, part_field(&matcher.part)), data);
        }
        matcher.evaluate(&common::part_corpus(data, part_field(&matcher.part)), data)
    }

    fn extract(&self, data: &InternalEvent, extractor: &Extractor) -> Vec<String> {
        extractor.evaluate(&common::part_corpus(data, part_field(&extractor.part)), data)
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

        for host in &self.definition.host {
            for payload in Combinations::new(self.generator.as_ref()) {
                let outcome = self
                    .execute_variation(input, &base_values, previous, host, payload)
                    .await?;
                let Some(wrapped) = outcome else {
                    continue;
                };
                let matched = wrapped
                    .operators_result
                    .as_ref()
                    .map(|r| r.matched)
                    .unwrap_or(false);
                callback(wrapped)?;
                if stop_at_first_match && matched {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    fn make_result_events(&self, wrapped: &InternalWrappedEvent) -> Vec<ResultEvent> {
        common::make_result_events(
            &self.meta,
            ProtocolType::Network,
            &self.definition.operators,
            wrapped,
        )
    }
}

/// Event field behind a part name.
fn part_field(part: &str) -> &str {
    match part {
        "" | "body" => "data",
        "all" => "raw",
        other => other,
    }
}
