// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Correlation of out-of-band interactions with the requests that caused them.
//!
//! A request containing `{{interactsh-url}}` receives a fresh correlation id
//! under the interaction server's domain. After the exchange, the request's
//! event is parked here under that id. When the server reports an interaction
//! for the id, the interaction fields are merged into the parked event, the
//! request's operators are evaluated again and any findings go to the sink.
//!
//! Pending entries live in a bounded LRU; an entry evicted before its
//! interaction arrives is simply forgotten.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::{OutputError, TransportError};
use crate::observability::messages::protocol::{InteractionCorrelated, InteractionUnknown};
use crate::observability::messages::StructuredLog;
use crate::output::{InternalEvent, InternalWrappedEvent, OutputSink};
use crate::traits::ProtocolRequest;

/// Connection to an interaction server.
pub trait InteractionClient: Send + Sync {
    /// Domain under which correlation ids become resolvable hostnames.
    fn server_domain(&self) -> String;

    /// Announces a correlation id the server should watch for.
    fn register(&self, correlation_id: &str) -> Result<(), TransportError>;
}

/// One interaction observed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub protocol: String,
    pub unique_id: String,
    #[serde(default)]
    pub raw_request: String,
    #[serde(default)]
    pub raw_response: String,
    #[serde(default)]
    pub remote_address: String,
    pub timestamp: DateTime<Utc>,
}

impl Interaction {
    fn fields(&self) -> InternalEvent {
        let mut fields = InternalEvent::new();
        fields.insert("interactsh_protocol".to_string(), Value::String(self.protocol.clone()));
        fields.insert("interactsh_request".to_string(), Value::String(self.raw_request.clone()));
        fields.insert(
            "interactsh_response".to_string(),
            Value::String(self.raw_response.clone()),
        );
        fields.insert("interactsh_ip".to_string(), Value::String(self.remote_address.clone()));
        fields
    }
}

struct PendingInteraction {
    request: Arc<dyn ProtocolRequest>,
    event: InternalEvent,
}

pub struct InteractionCorrelator {
    client: Arc<dyn InteractionClient>,
    sink: Arc<dyn OutputSink>,
    pending: Mutex<LruCache<String, PendingInteraction>>,
    debug: bool,
}

impl InteractionCorrelator {
    pub fn new(
        client: Arc<dyn InteractionClient>,
        sink: Arc<dyn OutputSink>,
        capacity: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            client,
            sink,
            pending: Mutex::new(LruCache::new(capacity)),
            debug: false,
        }
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// A new correlation id and the hostname carrying it.
    pub fn new_url(&self) -> Result<(String, String), TransportError> {
        let correlation_id = Uuid::new_v4().simple().to_string();
        self.client.register(&correlation_id)?;
        let url = format!("{}.{}", correlation_id, self.client.server_domain());
        Ok((url, correlation_id))
    }

    /// Parks a request's event until its interaction arrives.
    pub fn register(
        &self,
        correlation_id: &str,
        request: Arc<dyn ProtocolRequest>,
        event: InternalEvent,
    ) {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .put(correlation_id.to_string(), PendingInteraction { request, event });
    }

    pub fn pending(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Merges an interaction into its parked event, re-evaluates and writes
    /// any findings. Returns how many results were written.
    pub fn on_interaction(&self, interaction: &Interaction) -> Result<usize, OutputError> {
        let (request, mut event) = {
            let mut pending = self
                .pending
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match pending.get(&interaction.unique_id) {
                Some(entry) => (Arc::clone(&entry.request), entry.event.clone()),
                None => {
                    InteractionUnknown {
                        correlation_id: &interaction.unique_id,
                    }
                    .log();
                    return Ok(0);
                }
            }
        };

        for (key, value) in interaction.fields() {
            event.insert(key, value);
        }
        if let Ok(raw) = serde_json::to_value(interaction) {
            event.insert("interaction".to_string(), raw);
        }

        let operators_result = request.evaluate(&event, self.debug);
        let matched = operators_result.as_ref().map(|r| r.matched).unwrap_or(false);
        let wrapped = InternalWrappedEvent::new(event, operators_result);
        let results = request.make_result_events(&wrapped);

        InteractionCorrelated {
            correlation_id: &interaction.unique_id,
            template_id: &request.meta().id,
            matched,
        }
        .log();

        for result in &results {
            self.sink.write(result)?;
        }
        Ok(results.len())
    }
}
