// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! Every diagnostic emitted by the engine goes through a message struct with a
//! `Display` implementation instead of an inline format string. Call sites stay
//! free of magic strings and every event carries the same structured fields.
//!
//! # Architecture
//!
//! Messages are organized by subsystem:
//! * `messages::engine` - scan scheduling, clustering and host-error events
//! * `messages::protocol` - request compilation and exchange events
//! * `messages::workflow` - workflow node lifecycle events
//!
//! # Usage
//!
//! ```rust
//! use the_prober::observability::messages::{engine::PairSkipped, StructuredLog};
//!
//! PairSkipped {
//!     template_id: "tech-detect",
//!     input: "https://example.com",
//!     host: "example.com:443",
//!     error_count: 30,
//! }
//! .log();
//! ```

pub mod messages;
