// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod options;
mod runtime;

pub mod consts;

pub use options::{load_options, ScanOptions};
pub use runtime::ExecuterOptions;
