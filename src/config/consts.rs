// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

/// Maximum number of (template, input) pairs executing at once.
pub const DEFAULT_CONCURRENCY: usize = 25;
/// Maximum number of variations of one request in flight at once.
pub const DEFAULT_PAYLOAD_CONCURRENCY: usize = 1;
/// Per-exchange timeout.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;
/// Failures after which a host is skipped for the rest of the scan.
pub const DEFAULT_MAX_HOST_ERROR: usize = 30;
/// Bound on the number of hosts tracked by the host-errors cache.
pub const DEFAULT_HOST_ERRORS_CACHE_SIZE: usize = 10_000;
/// Bound on the number of pending out-of-band correlation ids.
pub const DEFAULT_INTERACTIONS_CACHE_SIZE: usize = 5_000;
pub const DEFAULT_MAX_REDIRECTS: usize = 10;
pub const DEFAULT_USER_AGENT: &str = concat!("the-prober/", env!("CARGO_PKG_VERSION"));
