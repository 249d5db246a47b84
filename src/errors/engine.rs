// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Fatal scan-level errors. Everything else is local to a (template, input) pair.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to acquire worker pool permit: {0}")]
    WorkerPool(String),

    #[error("malformed input source: {0}")]
    InputSource(String),

    #[error("scan task panicked: {0}")]
    TaskPanicked(String),
}
