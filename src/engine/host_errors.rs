// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-host failure counter used as a circuit breaker.
//!
//! Counts only grow during a scan. A host that has failed `max_errors` times is
//! skipped for every remaining (template, input) pair; a later success does
//! not reset it. The map is a bounded LRU so very large target lists cannot
//! grow it without limit; an evicted host simply starts from zero again.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

use super::input::ScanTarget;
use crate::errors::TransportError;
use crate::observability::messages::{engine::HostErrorRecorded, StructuredLog};

pub struct HostErrorsCache {
    entries: Mutex<LruCache<String, usize>>,
    max_errors: usize,
}

impl HostErrorsCache {
    pub fn new(capacity: usize, max_errors: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            max_errors,
        }
    }

    /// True when the target's host has reached the error threshold.
    pub fn check(&self, target: &ScanTarget) -> bool {
        self.error_count(target) >= self.max_errors
    }

    pub fn error_count(&self, target: &ScanTarget) -> usize {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.get(&target.host_key()).copied().unwrap_or(0)
    }

    /// Records a failure against the target's host if the error is host-level.
    /// Returns the count after recording.
    pub fn mark_failed(&self, target: &ScanTarget, error: &TransportError) -> usize {
        let host = target.host_key();
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if !error.is_host_error() {
            return entries.get(&host).copied().unwrap_or(0);
        }

        let count = match entries.get_mut(&host) {
            Some(count) => {
                *count += 1;
                *count
            }
            None => {
                entries.put(host.clone(), 1);
                1
            }
        };
        drop(entries);

        HostErrorRecorded {
            host: &host,
            error_count: count,
        }
        .log();
        count
    }
}
