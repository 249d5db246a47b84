// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::Template;

/// Compiled templates keyed by canonical path.
///
/// Passed explicitly to the loader so one scan never sees another scan's
/// templates unless they share a cache on purpose.
#[derive(Debug, Default)]
pub struct TemplateCache {
    entries: Mutex<HashMap<PathBuf, Arc<Template>>>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path) -> Option<Arc<Template>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(path)
            .cloned()
    }

    /// Stores `template` unless another caller got there first; returns the
    /// entry that ends up cached.
    pub fn insert(&self, path: PathBuf, template: Arc<Template>) -> Arc<Template> {
        Arc::clone(
            self.entries
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .entry(path)
                .or_insert(template),
        )
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
