// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors raised while compiling templates, requests and operators.
//!
//! A compile error is terminal for the template that produced it: the whole
//! template is rejected and never becomes partially runnable.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompileError {
    /// A matcher is missing the data its type needs, or carries bad values.
    #[error("invalid matcher '{name}': {reason}")]
    InvalidMatcher { name: String, reason: String },

    /// An extractor is missing the data its type needs, or carries bad values.
    #[error("invalid extractor '{name}': {reason}")]
    InvalidExtractor { name: String, reason: String },

    #[error("invalid regex '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid expression '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },

    /// Payload sets that cannot be combined under the requested attack type.
    #[error("invalid payload generator: {reason}")]
    InvalidGenerator { reason: String },

    #[error("invalid request '{request_id}': {reason}")]
    InvalidRequest { request_id: String, reason: String },

    #[error("template '{template_id}' has no requests and no workflow")]
    EmptyTemplate { template_id: String },

    /// Wraps a step failure with the template it belongs to.
    #[error("template '{template_id}' rejected at step {step}: {source}")]
    TemplateRejected {
        template_id: String,
        step: usize,
        #[source]
        source: Box<CompileError>,
    },
}

impl CompileError {
    pub fn invalid_matcher<S1: Into<String>, S2: Into<String>>(name: S1, reason: S2) -> Self {
        Self::InvalidMatcher {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_extractor<S1: Into<String>, S2: Into<String>>(name: S1, reason: S2) -> Self {
        Self::InvalidExtractor {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_request<S1: Into<String>, S2: Into<String>>(request_id: S1, reason: S2) -> Self {
        Self::InvalidRequest {
            request_id: request_id.into(),
            reason: reason.into(),
        }
    }
}
