// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::protocols::ProtocolType;

/// One physical exchange, reported whether it succeeded or not.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestAttempt {
    pub template_id: String,
    pub target: String,
    pub protocol: ProtocolType,
    pub error: Option<String>,
}

impl RequestAttempt {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Observes every exchange a protocol request performs.
pub trait RequestObserver: Send + Sync {
    fn on_request(&self, attempt: &RequestAttempt);
}

/// Default observer: failed exchanges at `debug`, everything else at `trace`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl RequestObserver for TracingObserver {
    fn on_request(&self, attempt: &RequestAttempt) {
        match &attempt.error {
            Some(error) => tracing::debug!(
                template_id = %attempt.template_id,
                target = %attempt.target,
                protocol = %attempt.protocol,
                error = %error,
                "request attempt failed"
            ),
            None => tracing::trace!(
                template_id = %attempt.template_id,
                target = %attempt.target,
                protocol = %attempt.protocol,
                "request attempt"
            ),
        }
    }
}
