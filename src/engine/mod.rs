// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Execution of compiled templates against scan targets.
//!
//! * [`executer`] runs one template's steps in order for one input
//! * [`clusterer`] merges templates that send identical requests
//! * [`workflow`] walks workflow trees node by node
//! * [`scheduler`] fans (executer, input) pairs out over a bounded pool
//! * [`host_errors`] is the per-host circuit breaker shared by all of them
//! * [`input`] holds the target type and its streaming sources

pub mod clusterer;
pub mod executer;
pub mod host_errors;
pub mod input;
pub mod scheduler;
pub mod workflow;

#[cfg(test)]
pub(crate) mod test_support;

#[cfg(test)]
mod integration_tests;

pub use clusterer::{cluster_templates, ClusteredExecuter};
pub use executer::Executer;
pub use host_errors::HostErrorsCache;
pub use input::{ChannelInput, FileInput, InputProvider, ListInput, ScanTarget};
pub use scheduler::{Engine, ScanSummary};
pub use workflow::WorkflowExecuter;
