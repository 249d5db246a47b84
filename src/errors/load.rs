// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::path::PathBuf;
use thiserror::Error;

use super::{CompileError, ValidationError};

/// Errors raised while reading options, templates or workflows from disk.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML '{}': {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to parse TOML '{}': {source}", .path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("unsupported options format '{}'", .path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("failed to compile '{}': {source}", .path.display())]
    Compile {
        path: PathBuf,
        #[source]
        source: CompileError,
    },

    #[error("workflow validation failed:\n{}", .errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("\n"))]
    Validation { errors: Vec<ValidationError> },
}
