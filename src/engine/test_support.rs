// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Canned collaborators for tests that must not touch the network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::{ExecuterOptions, ScanOptions};
use crate::errors::TransportError;
use crate::interactions::InteractionClient;
use crate::output::{OutputSink, RequestAttempt, RequestObserver};
use crate::protocols::http::{HttpResponse, HttpTransport, RenderedRequest};

pub fn options_with(
    transport: Arc<dyn HttpTransport>,
    sink: Arc<dyn OutputSink>,
) -> ExecuterOptions {
    ExecuterOptions::with_transport(ScanOptions::default(), sink, transport)
}

pub fn response(status: u16, body: &str) -> HttpResponse {
    HttpResponse {
        status,
        headers: vec![("Content-Type".to_string(), "text/html".to_string())],
        body: body.as_bytes().to_vec(),
        duration: Duration::from_millis(5),
    }
}

/// Answers every request from a fixed table and records what it was sent.
///
/// Routes match when the request URL ends with the route's suffix; the
/// fallback answers everything else, or fails with a refused connection when
/// absent.
#[derive(Default)]
pub struct CannedTransport {
    routes: Vec<(String, HttpResponse)>,
    fallback: Option<HttpResponse>,
    cancel_on_send: Option<CancellationToken>,
    sent: Mutex<Vec<RenderedRequest>>,
}

impl CannedTransport {
    pub fn with_body(status: u16, body: &str) -> Self {
        Self {
            fallback: Some(response(status, body)),
            ..Self::default()
        }
    }

    pub fn with_bytes(status: u16, body: &[u8]) -> Self {
        let mut fallback = response(status, "");
        fallback.body = body.to_vec();
        Self {
            fallback: Some(fallback),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self::default()
    }

    pub fn route(mut self, suffix: &str, status: u16, body: &str) -> Self {
        self.routes.push((suffix.to_string(), response(status, body)));
        self
    }

    /// Adds a header to the fallback response.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let Some(fallback) = &mut self.fallback {
            fallback.headers.push((name.to_string(), value.to_string()));
        }
        self
    }

    /// Cancels `token` as soon as the first request is sent.
    pub fn cancel_on_send(mut self, token: CancellationToken) -> Self {
        self.cancel_on_send = Some(token);
        self
    }

    pub fn requests(&self) -> Vec<RenderedRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpTransport for CannedTransport {
    async fn send(&self, request: &RenderedRequest) -> Result<HttpResponse, TransportError> {
        self.sent.lock().unwrap().push(request.clone());
        if let Some(token) = &self.cancel_on_send {
            token.cancel();
        }

        self.routes
            .iter()
            .find(|(suffix, _)| request.url.ends_with(suffix.as_str()))
            .map(|(_, response)| response.clone())
            .or_else(|| self.fallback.clone())
            .ok_or_else(|| TransportError::ConnectionRefused(request.url.clone()))
    }
}

/// Echoes each request URL as the body after a delay, tracking how many
/// sends overlap. Each send waits `step` less than the one before it, so later
/// requests finish first when several are in flight.
pub struct SlowTransport {
    delay: Duration,
    step: Duration,
    started: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl SlowTransport {
    pub fn new(delay: Duration, step: Duration) -> Self {
        Self {
            delay,
            step,
            started: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Most sends ever in flight at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn call_count(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for SlowTransport {
    async fn send(&self, request: &RenderedRequest) -> Result<HttpResponse, TransportError> {
        let order = self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let delay = self.delay.saturating_sub(self.step * order as u32);
        tokio::time::sleep(delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(response(200, &request.url))
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    attempts: Mutex<Vec<RequestAttempt>>,
}

impl RecordingObserver {
    pub fn attempts(&self) -> Vec<RequestAttempt> {
        self.attempts.lock().unwrap().clone()
    }
}

impl RequestObserver for RecordingObserver {
    fn on_request(&self, attempt: &RequestAttempt) {
        self.attempts.lock().unwrap().push(attempt.clone());
    }
}

/// Interaction server stand-in that remembers registered ids.
#[derive(Default)]
pub struct FakeInteractionServer {
    registered: Mutex<Vec<String>>,
}

impl FakeInteractionServer {
    pub fn registered(&self) -> Vec<String> {
        self.registered.lock().unwrap().clone()
    }
}

impl InteractionClient for FakeInteractionServer {
    fn server_domain(&self) -> String {
        "oast.test".to_string()
    }

    fn register(&self, correlation_id: &str) -> Result<(), TransportError> {
        self.registered.lock().unwrap().push(correlation_id.to_string());
        Ok(())
    }
}
