// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 AtomicX Contributors

//! Escrow immutables: the fixed parameter bundle identifying one escrow
//!
//! Party and token identities are carried as 32-byte words so the same
//! record fits an EVM `uint256` slot (left-padded address) and a Starknet
//! felt.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::errors::{Result, SwapError};
use crate::swap::{strip_hex_prefix, Hashlock, Timelock};

// ============================================================================
// IDENTITY
// ============================================================================

/// Account-chain party or asset identity, left-padded to 32 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Identity(pub B256);

impl Identity {
    /// Native asset / unset identity
    pub const ZERO: Identity = Identity(B256::ZERO);

    pub fn from_evm_address(address: Address) -> Self {
        Self(address.into_word())
    }

    pub fn from_u256(value: U256) -> Self {
        Self(B256::from(value.to_be_bytes::<32>()))
    }

    pub fn to_u256(&self) -> U256 {
        U256::from_be_bytes(self.0 .0)
    }

    /// The EVM address, when the upper 12 bytes are zero.
    pub fn as_evm_address(&self) -> Option<Address> {
        if self.0[..12].iter().all(|b| *b == 0) {
            Some(Address::from_word(self.0))
        } else {
            None
        }
    }

    pub fn is_zero(&self) -> bool {
        self.0 == B256::ZERO
    }
}

impl FromStr for Identity {
    type Err = SwapError;

    /// Up to 64 hex digits, `0x` optional, left-padded.
    fn from_str(s: &str) -> Result<Self> {
        let body = strip_hex_prefix(s);
        if body.is_empty() || body.len() > 64 {
            return Err(SwapError::InvalidAddress(format!(
                "identity must be 1..=64 hex digits: {}",
                s
            )));
        }
        let padded = format!("{:0>64}", body);
        let bytes = hex::decode(&padded)
            .map_err(|e| SwapError::InvalidAddress(format!("{}: {}", s, e)))?;
        Ok(Self(B256::from_slice(&bytes)))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_evm_address() {
            Some(address) => write!(f, "{}", address),
            None => write!(f, "0x{}", hex::encode(self.0)),
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self)
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(self.0)))
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// TIMELOCKS
// ============================================================================

const WITHDRAWAL_SHIFT: usize = 0;
const CANCELLATION_SHIFT: usize = 32;
const DEPLOYED_AT_SHIFT: usize = 224;

/// Relative escrow periods (seconds) plus the deployment stamp.
///
/// Packed into the `uint256 timelocks` word:
/// bits 0..32 withdrawal, 32..64 cancellation, 224..256 deployedAt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Timelocks {
    pub withdrawal_period: u32,
    pub cancellation_period: u32,
    /// Unix seconds, stamped by the factory at creation (0 before)
    pub deployed_at: u32,
}

impl Timelocks {
    pub fn new(withdrawal_period: u32, cancellation_period: u32) -> Self {
        Self {
            withdrawal_period,
            cancellation_period,
            deployed_at: 0,
        }
    }

    /// Cancellation must not open before withdrawal.
    pub fn validate(&self) -> Result<()> {
        if self.cancellation_period < self.withdrawal_period {
            return Err(SwapError::InvalidTimelocks(format!(
                "cancellation period {}s precedes withdrawal period {}s",
                self.cancellation_period, self.withdrawal_period
            )));
        }
        Ok(())
    }

    pub fn with_deployed_at(mut self, deployed_at: u32) -> Self {
        self.deployed_at = deployed_at;
        self
    }

    pub fn pack(&self) -> U256 {
        (U256::from(self.withdrawal_period) << WITHDRAWAL_SHIFT)
            | (U256::from(self.cancellation_period) << CANCELLATION_SHIFT)
            | (U256::from(self.deployed_at) << DEPLOYED_AT_SHIFT)
    }

    pub fn unpack(word: U256) -> Self {
        let field = |shift: usize| -> u32 {
            let masked: U256 = (word >> shift) & U256::from(u32::MAX);
            masked.to::<u32>()
        };
        Self {
            withdrawal_period: field(WITHDRAWAL_SHIFT),
            cancellation_period: field(CANCELLATION_SHIFT),
            deployed_at: field(DEPLOYED_AT_SHIFT),
        }
    }

    /// First instant the taker may withdraw.
    pub fn withdrawal_start(&self) -> u64 {
        self.deployed_at as u64 + self.withdrawal_period as u64
    }

    /// First instant the maker may cancel.
    pub fn cancellation_start(&self) -> u64 {
        self.deployed_at as u64 + self.cancellation_period as u64
    }

    pub fn cancellation_timelock(&self) -> Timelock {
        Timelock::UnixTime(self.cancellation_start())
    }
}

// ============================================================================
// IMMUTABLES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowImmutables {
    /// Order hash binding the escrow to one swap order
    pub swap_id: B256,
    pub hashlock: Hashlock,
    pub maker: Identity,
    pub taker: Identity,
    /// Zero for the chain's native asset
    pub token: Identity,
    pub amount: U256,
    pub safety_deposit: U256,
    pub timelocks: Timelocks,
}

impl EscrowImmutables {
    pub fn hashlock_word(&self) -> B256 {
        B256::from(*self.hashlock.as_bytes())
    }

    /// Value attached to the creation call.
    pub fn creation_value(&self, role_is_source: bool) -> U256 {
        if role_is_source {
            self.amount.saturating_add(self.safety_deposit)
        } else {
            self.amount
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.timelocks.validate()?;
        if self.amount.is_zero() {
            return Err(SwapError::InvalidAmount("escrow amount must be nonzero".into()));
        }
        Ok(())
    }

    /// Cancellation threshold once the factory has stamped `deployed_at`.
    pub fn refund_timelock(&self) -> Timelock {
        self.timelocks.cancellation_timelock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swap::Secret;

    #[test]
    fn test_timelocks_pack_layout() {
        let t = Timelocks::new(10, 3600).with_deployed_at(1_700_000_000);
        let word = t.pack();
        assert_eq!(word & U256::from(u32::MAX), U256::from(10u32));
        assert_eq!((word >> 32) & U256::from(u32::MAX), U256::from(3600u32));
        assert_eq!(word >> 224, U256::from(1_700_000_000u32));
        assert_eq!(Timelocks::unpack(word), t);
    }

    #[test]
    fn test_timelocks_validate() {
        assert!(Timelocks::new(0, 3600).validate().is_ok());
        assert!(Timelocks::new(60, 60).validate().is_ok());
        assert!(matches!(
            Timelocks::new(3600, 60).validate(),
            Err(SwapError::InvalidTimelocks(_))
        ));
    }

    #[test]
    fn test_cancellation_start() {
        let t = Timelocks::new(0, 3600).with_deployed_at(1_000);
        assert_eq!(t.withdrawal_start(), 1_000);
        assert_eq!(t.cancellation_start(), 4_600);
        assert_eq!(t.cancellation_timelock(), Timelock::UnixTime(4_600));
    }

    #[test]
    fn test_identity_from_evm_address() {
        let address = Address::repeat_byte(0x11);
        let id = Identity::from_evm_address(address);
        assert_eq!(id.as_evm_address(), Some(address));
        assert_eq!(Identity::from_u256(id.to_u256()), id);

        let parsed: Identity = "0x1111111111111111111111111111111111111111".parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_identity_wide_value() {
        // Starknet-style 251-bit address does not fit an EVM address
        let id: Identity = "0x049d36570d4e46f48e99674bd3fcc84644ddd6b96f7c741b1562b82f9e004dc7"
            .parse()
            .unwrap();
        assert!(id.as_evm_address().is_none());
        assert!(id.to_string().starts_with("0x049d"));
        assert!("0x".parse::<Identity>().is_err());
        assert!("zz".parse::<Identity>().is_err());
    }

    #[test]
    fn test_creation_value() {
        let immutables = EscrowImmutables {
            swap_id: B256::repeat_byte(1),
            hashlock: Secret::from_bytes([1; 32]).hashlock(),
            maker: Identity::from_evm_address(Address::repeat_byte(2)),
            taker: Identity::from_evm_address(Address::repeat_byte(3)),
            token: Identity::ZERO,
            amount: U256::from(1_000_000u64),
            safety_deposit: U256::from(1_000u64),
            timelocks: Timelocks::new(0, 3600),
        };
        assert_eq!(immutables.creation_value(true), U256::from(1_001_000u64));
        assert_eq!(immutables.creation_value(false), U256::from(1_000_000u64));
        assert!(immutables.validate().is_ok());
        assert_eq!(&immutables.hashlock_word().0, immutables.hashlock.as_bytes());
    }

    #[test]
    fn test_zero_amount_rejected() {
        let immutables = EscrowImmutables {
            swap_id: B256::repeat_byte(1),
            hashlock: Secret::from_bytes([1; 32]).hashlock(),
            maker: Identity::from_evm_address(Address::repeat_byte(2)),
            taker: Identity::from_evm_address(Address::repeat_byte(3)),
            token: Identity::ZERO,
            amount: U256::ZERO,
            safety_deposit: U256::from(1_000u64),
            timelocks: Timelocks::new(0, 3600),
        };
        assert_eq!(
            immutables.validate(),
            Err(SwapError::InvalidAmount("escrow amount must be nonzero".into()))
        );
    }
}
