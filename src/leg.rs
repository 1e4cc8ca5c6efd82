// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 AtomicX Contributors

//! One capability interface over every lock leg
//!
//! A bitcoin script lock and an account-chain escrow both answer the same
//! questions (which hashlock, when does the refund path open) and support
//! the same two actions (claim with the secret, refund after the timelock).

use std::fmt;
use std::sync::Arc;

use crate::btc::{FundedLock, LockScript, LockingTransactionBuilder, RawTransaction};
use crate::errors::{Result, SwapError};
use crate::escrow::{EscrowClient, EscrowHandle};
use crate::swap::{Chain, ChainClock, Hashlock, Secret, Timelock};

/// What a leg action produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegReceipt {
    /// Signed spend, ready for broadcast
    Bitcoin(RawTransaction),
    /// Transaction hash of an executed escrow call
    Escrow { chain: Chain, tx_hash: String },
}

impl LegReceipt {
    pub fn reference(&self) -> String {
        match self {
            LegReceipt::Bitcoin(raw) => raw.txid.to_string(),
            LegReceipt::Escrow { tx_hash, .. } => tx_hash.clone(),
        }
    }
}

pub trait LockLeg: Send + Sync {
    fn chain(&self) -> Chain;

    fn hashlock(&self) -> Hashlock;

    /// Where the lock lives on its chain: lock address or escrow locator.
    fn locator(&self) -> &str;

    /// Threshold after which `refund` may succeed.
    fn refund_timelock(&self) -> Timelock;

    fn claim(&self, secret: &Secret) -> Result<LegReceipt>;

    fn refund(&self, clock: &ChainClock) -> Result<LegReceipt>;
}

/// Funded bitcoin HTLC output plus everything needed to spend it.
pub struct BitcoinLeg {
    pub lock: LockScript,
    pub funded: FundedLock,
    pub builder: LockingTransactionBuilder,
    pub destination: String,
    /// Absolute fee in satoshis
    pub fee: u64,
}

impl LockLeg for BitcoinLeg {
    fn chain(&self) -> Chain {
        Chain::Bitcoin
    }

    fn hashlock(&self) -> Hashlock {
        self.lock.hashlock
    }

    fn locator(&self) -> &str {
        &self.lock.locking_address
    }

    fn refund_timelock(&self) -> Timelock {
        self.lock.refund_timelock()
    }

    fn claim(&self, secret: &Secret) -> Result<LegReceipt> {
        self.builder
            .build_claim(&self.lock, &self.funded, secret, &self.destination, self.fee)
            .map(LegReceipt::Bitcoin)
    }

    /// Uses the observed tip height as `nLockTime`.
    fn refund(&self, clock: &ChainClock) -> Result<LegReceipt> {
        self.builder
            .build_refund(&self.lock, &self.funded, &self.destination, self.fee, clock.block_height)
            .map(LegReceipt::Bitcoin)
    }
}

impl fmt::Debug for BitcoinLeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitcoinLeg")
            .field("address", &self.lock.locking_address)
            .field("outpoint", &self.funded.outpoint)
            .field("fee", &self.fee)
            .finish()
    }
}

/// A created escrow reached through its chain's client.
#[derive(Clone)]
pub struct EscrowLeg {
    pub client: Arc<dyn EscrowClient>,
    pub handle: EscrowHandle,
}

impl EscrowLeg {
    pub fn new(client: Arc<dyn EscrowClient>, handle: EscrowHandle) -> Result<Self> {
        if client.chain() != handle.chain {
            return Err(SwapError::InvalidAddress(format!(
                "{} handle paired with a {} client",
                handle.chain,
                client.chain()
            )));
        }
        Ok(Self { client, handle })
    }
}

impl LockLeg for EscrowLeg {
    fn chain(&self) -> Chain {
        self.handle.chain
    }

    fn hashlock(&self) -> Hashlock {
        self.handle.immutables.hashlock
    }

    fn locator(&self) -> &str {
        &self.handle.locator
    }

    fn refund_timelock(&self) -> Timelock {
        self.handle.immutables.refund_timelock()
    }

    fn claim(&self, secret: &Secret) -> Result<LegReceipt> {
        let tx_hash = self.client.withdraw(&self.handle, secret)?;
        Ok(LegReceipt::Escrow {
            chain: self.handle.chain,
            tx_hash,
        })
    }

    /// The client checks the window against the chain's own timestamp.
    fn refund(&self, _clock: &ChainClock) -> Result<LegReceipt> {
        let tx_hash = self.client.cancel(&self.handle)?;
        Ok(LegReceipt::Escrow {
            chain: self.handle.chain,
            tx_hash,
        })
    }
}

impl fmt::Debug for EscrowLeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EscrowLeg")
            .field("chain", &self.handle.chain)
            .field("locator", &self.handle.locator)
            .finish()
    }
}
