// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt::Write as _;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::redirect::Policy;
use reqwest::{Client, Method};

use crate::config::ScanOptions;
use crate::errors::TransportError;

/// A fully substituted request, ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub follow_redirects: bool,
}

impl RenderedRequest {
    /// HTTP/1.1 style dump used in results and the `request` data field.
    pub fn dump(&self) -> String {
        let path = url::Url::parse(&self.url)
            .map(|url| match url.query() {
                Some(query) => format!("{}?{}", url.path(), query),
                None => url.path().to_string(),
            })
            .unwrap_or_else(|_| self.url.clone());

        let mut dump = format!("{} {} HTTP/1.1\r\n", self.method, path);
        for (name, value) in &self.headers {
            let _ = write!(dump, "{}: {}\r\n", name, value);
        }
        dump.push_str("\r\n");
        if let Some(body) = &self.body {
            dump.push_str(body);
        }
        dump
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Body bytes as received; binary matchers read these undecoded.
    pub body: Vec<u8>,
    pub duration: Duration,
}

impl HttpResponse {
    /// Status line plus headers, CRLF separated.
    pub fn header_dump(&self) -> String {
        let mut dump = format!("HTTP/1.1 {}\r\n", self.status);
        for (name, value) in &self.headers {
            let _ = write!(dump, "{}: {}\r\n", name, value);
        }
        dump
    }

    /// Body decoded as UTF-8, invalid sequences replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn dump(&self) -> String {
        format!("{}\r\n{}", self.header_dump(), self.text())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Performs one HTTP exchange.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &RenderedRequest) -> Result<HttpResponse, TransportError>;
}

/// Transport backed by two reqwest clients, with and without redirects.
pub struct ReqwestTransport {
    client: Client,
    redirecting: Client,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(options: &ScanOptions) -> Result<Self, TransportError> {
        let build = |policy: Policy| {
            Client::builder()
                .timeout(options.timeout())
                .user_agent(options.user_agent.clone())
                .danger_accept_invalid_certs(options.insecure)
                .redirect(policy)
                .build()
                .map_err(|e| TransportError::Protocol(format!("failed to build client: {}", e)))
        };

        Ok(Self {
            client: build(Policy::none())?,
            redirecting: build(Policy::limited(options.max_redirects))?,
            timeout: options.timeout(),
        })
    }

    fn map_error(&self, url: &str, error: reqwest::Error) -> TransportError {
        if error.is_timeout() {
            TransportError::Timeout {
                target: url.to_string(),
                timeout: self.timeout,
            }
        } else if error.is_builder() {
            TransportError::InvalidUrl(url.to_string())
        } else if error.is_connect() {
            TransportError::ConnectionRefused(format!("{}: {}", url, error))
        } else if error.is_request() || error.is_body() || error.is_decode() {
            TransportError::Io(format!("{}: {}", url, error))
        } else {
            TransportError::Protocol(format!("{}: {}", url, error))
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &RenderedRequest) -> Result<HttpResponse, TransportError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| TransportError::Protocol(format!("invalid method '{}'", request.method)))?;
        let client = if request.follow_redirects {
            &self.redirecting
        } else {
            &self.client
        };

        let mut builder = client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let started = Instant::now();
        let response = builder
            .send()
            .await
            .map_err(|e| self.map_error(&request.url, e))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.map_error(&request.url, e))?;

        Ok(HttpResponse {
            status,
            headers,
            body: body.to_vec(),
            duration: started.elapsed(),
        })
    }
}
