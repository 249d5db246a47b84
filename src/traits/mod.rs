// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod executer;
pub mod request;

pub use executer::{ExecutionOutcome, ScanContext, TemplateExecuter};
pub use request::{EventCallback, ProtocolRequest};
