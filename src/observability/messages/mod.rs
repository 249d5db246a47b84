// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! Each message type implements `Display` for human-readable output and
//! [`StructuredLog`] so it can emit itself at the right level with its fields
//! attached.
//!
//! # Organization
//!
//! * `engine` - scheduler, clusterer and host-error cache events
//! * `protocol` - request compilation and protocol exchange events
//! * `workflow` - workflow node evaluation events

use tracing::Span;

pub mod engine;
pub mod protocol;
pub mod workflow;

/// A message that knows its own log level and structured fields.
pub trait StructuredLog {
    /// Emits the message through `tracing` at its designated level.
    fn log(&self);

    /// Opens a span carrying the message's fields.
    fn span(&self, name: &str) -> Span;
}
