// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors raised while executing requests against one input.

use std::time::Duration;
use thiserror::Error;

/// Failure of a single protocol exchange.
///
/// Transport errors are local to the variation that produced them: they are
/// recorded against the host and reported to the request observer, and the
/// remaining variations carry on.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("request to '{target}' timed out after {timeout:?}")]
    Timeout { target: String, timeout: Duration },

    #[error("connection to '{0}' refused")]
    ConnectionRefused(String),

    #[error("could not resolve '{0}'")]
    Resolution(String),

    #[error("invalid target url '{0}'")]
    InvalidUrl(String),

    #[error("i/o error: {0}")]
    Io(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Failures that say something about the host rather than the request.
    pub fn is_host_error(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::ConnectionRefused(_) | Self::Resolution(_) | Self::Io(_)
        )
    }
}

impl From<std::io::Error> for TransportError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::ConnectionRefused => Self::ConnectionRefused(error.to_string()),
            _ => Self::Io(error.to_string()),
        }
    }
}

/// Failure while delivering results to an output sink.
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("output sink is closed")]
    Closed,

    #[error("output channel is full")]
    Full,

    #[error("failed to serialize result: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write result: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Output(#[from] OutputError),

    /// A result callback asked for the remaining variations to be abandoned.
    #[error("result callback aborted execution: {0}")]
    CallbackAborted(String),

    #[error("request '{request_id}' has unresolved variables: {}", .variables.join(", "))]
    UnresolvedVariables {
        request_id: String,
        variables: Vec<String>,
    },

    #[error("invalid input '{0}'")]
    InvalidInput(String),

    #[error("workflow node '{node}' failed: {error}")]
    WorkflowNodeFailed { node: String, error: String },

    #[error("internal error: {message}")]
    InternalError { message: String },
}
