// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 AtomicX Contributors

//! Tracing subscriber setup for embedders of the swap core.

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `ATOMICX_LOG`, then `RUST_LOG`, else `info`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = std::env::var("ATOMICX_LOG")
        .unwrap_or_else(|_| std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()));
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    if tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init()
        .is_ok()
    {
        tracing::debug!("tracing initialised");
    }
}
