// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 AtomicX Contributors

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::errors::{Result, SwapError};
use crate::escrow::Timelocks;
use crate::swap::Chain;

/// Longest single confirmation wait accepted from configuration (7 days)
pub const MAX_CONFIRMATION_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

/// Protocol parameters applied to new orders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SwapConfig {
    /// Relative height added to the current tip for the bitcoin refund branch
    pub bitcoin_timelock_blocks: u32,

    /// Escrow withdrawal period (seconds after deployment); 0 = immediate
    pub withdrawal_period_secs: u32,

    /// Escrow cancellation period (seconds after deployment)
    pub cancellation_period_secs: u32,

    pub btc_confirmations: u32,
    pub evm_confirmations: u32,
    pub starknet_confirmations: u32,

    /// Poll interval while waiting for funding confirmations
    pub confirmation_poll_ms: u64,

    /// Upper bound on a single confirmation wait
    pub confirmation_timeout_secs: u64,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            bitcoin_timelock_blocks: 144, // ~1 day at 10 min blocks
            withdrawal_period_secs: 0,
            cancellation_period_secs: 3600,
            btc_confirmations: 3,
            evm_confirmations: 12,
            starknet_confirmations: 1,
            confirmation_poll_ms: 2_000,
            confirmation_timeout_secs: 3_600,
        }
    }
}

impl SwapConfig {
    /// Load from `ATOMICX_*` environment variables over the defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        read_env("ATOMICX_BTC_TIMELOCK_BLOCKS", &mut config.bitcoin_timelock_blocks)?;
        read_env("ATOMICX_WITHDRAWAL_PERIOD", &mut config.withdrawal_period_secs)?;
        read_env("ATOMICX_CANCELLATION_PERIOD", &mut config.cancellation_period_secs)?;
        read_env("ATOMICX_BTC_CONFIRMATIONS", &mut config.btc_confirmations)?;
        read_env("ATOMICX_EVM_CONFIRMATIONS", &mut config.evm_confirmations)?;
        read_env("ATOMICX_STARKNET_CONFIRMATIONS", &mut config.starknet_confirmations)?;
        read_env("ATOMICX_CONFIRMATION_POLL_MS", &mut config.confirmation_poll_ms)?;
        read_env("ATOMICX_CONFIRMATION_TIMEOUT", &mut config.confirmation_timeout_secs)?;

        config.validate()?;
        Ok(config)
    }

    /// Reject parameter sets that leave a party without a valid action.
    pub fn validate(&self) -> Result<()> {
        if self.cancellation_period_secs < self.withdrawal_period_secs {
            return Err(SwapError::Config(format!(
                "cancellation period {}s precedes withdrawal period {}s",
                self.cancellation_period_secs, self.withdrawal_period_secs
            )));
        }
        if self.bitcoin_timelock_blocks == 0 {
            return Err(SwapError::Config("bitcoin timelock must be > 0 blocks".into()));
        }
        if self.confirmation_poll_ms == 0 {
            return Err(SwapError::Config("confirmation poll interval must be > 0".into()));
        }
        if !(1..=MAX_CONFIRMATION_TIMEOUT_SECS).contains(&self.confirmation_timeout_secs) {
            return Err(SwapError::Config(format!(
                "confirmation timeout {}s outside 1..={}s",
                self.confirmation_timeout_secs, MAX_CONFIRMATION_TIMEOUT_SECS
            )));
        }
        Ok(())
    }

    /// Escrow timelocks for a new order (not yet deployed).
    pub fn escrow_timelocks(&self) -> Timelocks {
        Timelocks::new(self.withdrawal_period_secs, self.cancellation_period_secs)
    }

    pub fn required_confirmations(&self, chain: Chain) -> u32 {
        match chain {
            Chain::Bitcoin => self.btc_confirmations,
            Chain::Evm => self.evm_confirmations,
            Chain::Starknet => self.starknet_confirmations,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirmation_poll_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }
}

fn read_env<T: std::str::FromStr>(key: &str, slot: &mut T) -> Result<()> {
    if let Ok(val) = env::var(key) {
        *slot = val
            .trim()
            .parse::<T>()
            .map_err(|_| SwapError::Config(format!("invalid {}: {:?}", key, val)))?;
    }
    Ok(())
}
