// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 AtomicX Contributors

//! Configuration consumed by the swap core.
//!
//! Values come from defaults, `ATOMICX_*` environment variables, or a TOML
//! file with `[swap]` and `[network]` tables.

pub mod network;
pub mod swap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use network::{parse_bitcoin_network, NetworkConfig};
pub use swap::SwapConfig;

/// Full configuration bundle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AtomicxConfig {
    pub swap: SwapConfig,
    pub network: NetworkConfig,
}

impl AtomicxConfig {
    pub fn from_env() -> Result<Self> {
        let swap = SwapConfig::from_env().context("loading swap config from environment")?;
        Ok(Self {
            swap,
            network: NetworkConfig::from_env(),
        })
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: AtomicxConfig = toml::from_str(raw).context("parsing TOML config")?;
        config.swap.validate().context("validating [swap] table")?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_toml_str(&raw)
    }
}
