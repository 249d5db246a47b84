// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for request compilation and protocol exchanges.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// A template failed to compile and was dropped from the scan.
///
/// # Log Level
/// `error!` - Template will not run
pub struct TemplateRejected<'a> {
    pub template_id: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for TemplateRejected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Template '{}' rejected: {}", self.template_id, self.error)
    }
}

impl StructuredLog for TemplateRejected<'_> {
    fn log(&self) {
        tracing::error!(template_id = self.template_id, error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "template_rejected",
            span_name = name,
            template_id = self.template_id,
        )
    }
}

/// One physical exchange finished.
///
/// # Log Level
/// `debug!` - Per-request detail
pub struct RequestCompleted<'a> {
    pub template_id: &'a str,
    pub protocol: &'a str,
    pub target: &'a str,
    pub duration: Duration,
}

impl Display for RequestCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "[{}] {} request to '{}' completed in {:?}",
            self.template_id, self.protocol, self.target, self.duration
        )
    }
}

impl StructuredLog for RequestCompleted<'_> {
    fn log(&self) {
        tracing::debug!(
            template_id = self.template_id,
            protocol = self.protocol,
            target = self.target,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "request",
            span_name = name,
            template_id = self.template_id,
            protocol = self.protocol,
            target = self.target,
        )
    }
}

/// One physical exchange failed at the transport level.
///
/// # Log Level
/// `warn!` - Variation skipped
pub struct RequestFailed<'a> {
    pub template_id: &'a str,
    pub target: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for RequestFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "[{}] request to '{}' failed: {}",
            self.template_id, self.target, self.error
        )
    }
}

impl StructuredLog for RequestFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            template_id = self.template_id,
            target = self.target,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "request_failed",
            span_name = name,
            template_id = self.template_id,
            target = self.target,
        )
    }
}

/// A variation still contained `{{...}}` markers after substitution.
///
/// # Log Level
/// `warn!` - Variation skipped
///
/// # Example
/// ```
/// use the_prober::observability::messages::protocol::VariationSkipped;
///
/// let variables = vec!["token".to_string()];
/// let msg = VariationSkipped {
///     template_id: "login-check",
///     request_id: "step-2",
///     variables: &variables,
/// };
///
/// assert!(msg.to_string().contains("token"));
/// ```
pub struct VariationSkipped<'a> {
    pub template_id: &'a str,
    pub request_id: &'a str,
    pub variables: &'a [String],
}

impl Display for VariationSkipped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "[{}] skipping variation of '{}': unresolved variables {}",
            self.template_id,
            self.request_id,
            self.variables.join(", ")
        )
    }
}

impl StructuredLog for VariationSkipped<'_> {
    fn log(&self) {
        tracing::warn!(
            template_id = self.template_id,
            request_id = self.request_id,
            variables = ?self.variables,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "variation_skipped",
            span_name = name,
            template_id = self.template_id,
            request_id = self.request_id,
        )
    }
}

/// A hex encoded network input did not decode once its markers were filled.
///
/// # Log Level
/// `warn!` - Variation skipped
pub struct InputDecodeFailed<'a> {
    pub template_id: &'a str,
    pub request_id: &'a str,
    pub input: &'a str,
    pub reason: &'a str,
}

impl Display for InputDecodeFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "[{}] skipping variation of '{}': input '{}' is not valid hex: {}",
            self.template_id, self.request_id, self.input, self.reason
        )
    }
}

impl StructuredLog for InputDecodeFailed<'_> {
    fn log(&self) {
        tracing::warn!(
            template_id = self.template_id,
            request_id = self.request_id,
            input = self.input,
            reason = self.reason,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "input_decode_failed",
            span_name = name,
            template_id = self.template_id,
            request_id = self.request_id,
        )
    }
}

/// Debug trace of a single matcher evaluation.
///
/// # Log Level
/// `debug!` - Only when debug output is enabled
pub struct MatcherEvaluated<'a> {
    pub matcher: &'a str,
    pub matcher_type: &'a str,
    pub matched: bool,
    pub snippets: usize,
}

impl Display for MatcherEvaluated<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Matcher '{}' ({}) matched={} snippets={}",
            self.matcher, self.matcher_type, self.matched, self.snippets
        )
    }
}

impl StructuredLog for MatcherEvaluated<'_> {
    fn log(&self) {
        tracing::debug!(
            matcher = self.matcher,
            matcher_type = self.matcher_type,
            matched = self.matched,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("matcher", span_name = name, matcher = self.matcher)
    }
}

/// An out-of-band interaction was correlated to a pending request.
///
/// # Log Level
/// `info!` - Late finding
pub struct InteractionCorrelated<'a> {
    pub correlation_id: &'a str,
    pub template_id: &'a str,
    pub matched: bool,
}

impl Display for InteractionCorrelated<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Interaction '{}' correlated to template '{}' (matched={})",
            self.correlation_id, self.template_id, self.matched
        )
    }
}

impl StructuredLog for InteractionCorrelated<'_> {
    fn log(&self) {
        tracing::info!(
            correlation_id = self.correlation_id,
            template_id = self.template_id,
            matched = self.matched,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "interaction",
            span_name = name,
            correlation_id = self.correlation_id,
        )
    }
}

/// An interaction arrived for an id that is unknown or already evicted.
///
/// # Log Level
/// `debug!` - Expected when the cache bound is hit
pub struct InteractionUnknown<'a> {
    pub correlation_id: &'a str,
}

impl Display for InteractionUnknown<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "No pending request for interaction '{}'", self.correlation_id)
    }
}

impl StructuredLog for InteractionUnknown<'_> {
    fn log(&self) {
        tracing::debug!(correlation_id = self.correlation_id, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "interaction_unknown",
            span_name = name,
            correlation_id = self.correlation_id,
        )
    }
}
