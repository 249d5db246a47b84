// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod compile;
mod config;
mod engine;
mod execution;
mod load;

pub use compile::CompileError;
pub use config::ValidationError;
pub use engine::EngineError;
pub use execution::{ExecutionError, OutputError, TransportError};
pub use load::LoadError;
