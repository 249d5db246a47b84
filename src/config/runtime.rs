// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use crate::config::ScanOptions;
use crate::engine::host_errors::HostErrorsCache;
use crate::errors::TransportError;
use crate::interactions::{InteractionClient, InteractionCorrelator};
use crate::output::{OutputSink, RequestObserver, TracingObserver};
use crate::protocols::http::{HttpTransport, ReqwestTransport};

/// Runtime collaborators shared by every compiled request.
///
/// Built once per scan from [`ScanOptions`]; cloning is cheap since every
/// collaborator is reference counted.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use the_prober::config::{ExecuterOptions, ScanOptions};
/// use the_prober::output::MemorySink;
///
/// let sink = Arc::new(MemorySink::new());
/// let options = ExecuterOptions::new(ScanOptions::default(), sink).unwrap();
/// assert!(options.host_errors.is_some());
/// ```
#[derive(Clone)]
pub struct ExecuterOptions {
    pub options: Arc<ScanOptions>,
    pub transport: Arc<dyn HttpTransport>,
    pub sink: Arc<dyn OutputSink>,
    pub observer: Arc<dyn RequestObserver>,
    pub host_errors: Option<Arc<HostErrorsCache>>,
    pub interactions: Option<Arc<InteractionCorrelator>>,
}

impl ExecuterOptions {
    /// Creates the default runtime: a reqwest transport, a tracing observer and,
    /// unless `max_host_error` is zero, a host-errors cache.
    pub fn new(options: ScanOptions, sink: Arc<dyn OutputSink>) -> Result<Self, TransportError> {
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(&options)?);
        Ok(Self::with_transport(options, sink, transport))
    }

    pub fn with_transport(
        options: ScanOptions,
        sink: Arc<dyn OutputSink>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let host_errors = (options.max_host_error > 0).then(|| {
            Arc::new(HostErrorsCache::new(
                options.host_errors_cache_size,
                options.max_host_error,
            ))
        });

        Self {
            options: Arc::new(options),
            transport,
            sink,
            observer: Arc::new(TracingObserver),
            host_errors,
            interactions: None,
        }
    }

    pub fn observer(mut self, observer: Arc<dyn RequestObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn interactions(mut self, correlator: Arc<InteractionCorrelator>) -> Self {
        self.interactions = Some(correlator);
        self
    }

    /// Correlates interactions reported by `client`, keeping at most
    /// `interactions_cache_size` requests parked and writing to this sink.
    pub fn interaction_client(self, client: Arc<dyn InteractionClient>) -> Self {
        let correlator = InteractionCorrelator::new(
            client,
            Arc::clone(&self.sink),
            self.options.interactions_cache_size,
        )
        .debug(self.options.debug);
        self.interactions(Arc::new(correlator))
    }

    pub fn host_errors(mut self, cache: Option<Arc<HostErrorsCache>>) -> Self {
        self.host_errors = cache;
        self
    }
}
