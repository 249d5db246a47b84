// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod config;        // scan options + runtime collaborators
pub mod engine;        // executers, clustering, workflows, scheduling
pub mod errors;        // error handling
pub mod interactions;  // out-of-band interaction correlation
pub mod observability;
pub mod operators;     // matchers, extractors, expression language
pub mod output;        // events, sinks, request observers
pub mod protocols;     // http + raw tcp requests
pub mod template;      // definitions, compiled templates, loader
pub mod traits;        // unified abstractions
