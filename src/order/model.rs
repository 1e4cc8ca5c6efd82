// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 AtomicX Contributors

//! Swap order record and its guarded transitions
//!
//! Happy path:
//!
//! ```text
//! CREATED -> FILLED -> COUNTERPARTY_ESCROW_CREATED -> SOURCE_LOCK_FUNDED
//!         -> SOURCE_CLAIMED -> COUNTERPARTY_CLAIMED -> COMPLETED
//! ```
//!
//! `FILLED` is optional (the escrow may be observed straight from `CREATED`).
//! Any non-terminal order may move to `CANCELLED` once the timelock of the
//! leg being refunded has elapsed. A rejected event leaves the order as it was.

use alloy_primitives::{keccak256, B256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::status::OrderStatus;
use crate::btc::{FundedLock, LockScript};
use crate::errors::{Result, SwapError};
use crate::escrow::{EscrowHandle, Identity};
use crate::swap::{Chain, ChainClock, Hashlock, Secret, SecretCommitment, Timelock};

/// One side of the trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegTerms {
    pub chain: Chain,
    /// Asset symbol or token address
    pub asset: String,
    /// Smallest units (sats, wei, ...)
    pub amount: u128,
    /// Party address on that chain
    pub party: String,
}

impl LegTerms {
    pub fn new(chain: Chain, asset: impl Into<String>, amount: u128, party: impl Into<String>) -> Self {
        Self {
            chain,
            asset: asset.into(),
            amount,
            party: party.into(),
        }
    }
}

/// Which lock a refund targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegSide {
    /// The bitcoin script lock
    Source,
    /// The account-chain escrow
    Counterparty,
}

/// Escrow attached to an order, with its settlement flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowRecord {
    pub handle: EscrowHandle,
    pub withdrawn: bool,
    pub cancelled: bool,
}

impl EscrowRecord {
    pub fn is_settled(&self) -> bool {
        self.withdrawn || self.cancelled
    }
}

/// Audit entry, appended on every transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub event: String,
    pub at: DateTime<Utc>,
}

/// External confirmation events that advance an order.
#[derive(Debug, Clone)]
pub enum SwapEvent {
    /// A taker accepted the order
    Fill { taker: Identity },
    /// The counterparty escrow was observed funded on its chain
    CounterpartyEscrowFunded { handle: EscrowHandle },
    /// The funder confirmed the bitcoin lock output
    SourceLockFunded { address: String, funding: FundedLock },
    /// The maker spent the bitcoin lock, revealing the secret
    SourceClaimed { secret: Secret },
    /// The taker withdrew the escrow with the revealed secret
    CounterpartyClaimed { secret: Secret },
    /// Both legs settled
    Settle,
    /// The holder aborts after `leg`'s timelock, as observed at `clock`
    TimelockExpired { leg: LegSide, clock: ChainClock },
}

impl SwapEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SwapEvent::Fill { .. } => "Fill",
            SwapEvent::CounterpartyEscrowFunded { .. } => "CounterpartyEscrowFunded",
            SwapEvent::SourceLockFunded { .. } => "SourceLockFunded",
            SwapEvent::SourceClaimed { .. } => "SourceClaimed",
            SwapEvent::CounterpartyClaimed { .. } => "CounterpartyClaimed",
            SwapEvent::Settle => "Settle",
            SwapEvent::TimelockExpired { .. } => "TimelockExpired",
        }
    }

    /// States the event may be applied in; `None` means any non-terminal.
    fn allowed_from(&self) -> Option<&'static [OrderStatus]> {
        use OrderStatus::*;
        match self {
            SwapEvent::Fill { .. } => Some(&[Created]),
            SwapEvent::CounterpartyEscrowFunded { .. } => Some(&[Created, Filled]),
            SwapEvent::SourceLockFunded { .. } => Some(&[CounterpartyEscrowCreated]),
            SwapEvent::SourceClaimed { .. } => Some(&[SourceLockFunded]),
            SwapEvent::CounterpartyClaimed { .. } => Some(&[SourceClaimed]),
            SwapEvent::Settle => Some(&[CounterpartyClaimed]),
            SwapEvent::TimelockExpired { .. } => None,
        }
    }

    fn target(&self) -> OrderStatus {
        match self {
            SwapEvent::Fill { .. } => OrderStatus::Filled,
            SwapEvent::CounterpartyEscrowFunded { .. } => OrderStatus::CounterpartyEscrowCreated,
            SwapEvent::SourceLockFunded { .. } => OrderStatus::SourceLockFunded,
            SwapEvent::SourceClaimed { .. } => OrderStatus::SourceClaimed,
            SwapEvent::CounterpartyClaimed { .. } => OrderStatus::CounterpartyClaimed,
            SwapEvent::Settle => OrderStatus::Completed,
            SwapEvent::TimelockExpired { .. } => OrderStatus::Cancelled,
        }
    }
}

impl fmt::Display for SwapEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error for a refund attempted before `timelock` elapsed on `clock`.
pub fn timelock_not_elapsed(timelock: Timelock, clock: &ChainClock) -> SwapError {
    match timelock {
        Timelock::BlockHeight(height) => SwapError::TimelockNotReached {
            required: height as u64,
            requested: clock.block_height as u64,
        },
        Timelock::UnixTime(at) => SwapError::CancellationPeriodNotElapsed {
            now: clock.unix_time,
            cancellable_at: at,
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapOrder {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// What the maker gives
    pub maker_leg: LegTerms,
    /// What the taker gives
    pub taker_leg: LegTerms,
    pub hashlock: Hashlock,
    /// Held by the maker from creation; learned by the taker on reveal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<Secret>,
    pub status: OrderStatus,
    #[serde(default)]
    pub taker: Option<Identity>,
    #[serde(default)]
    pub lock_script: Option<LockScript>,
    #[serde(default)]
    pub source_funding: Option<FundedLock>,
    #[serde(default)]
    pub escrow: Option<EscrowRecord>,
    #[serde(default)]
    pub history: Vec<StatusChange>,
}

impl SwapOrder {
    pub fn new(maker_leg: LegTerms, taker_leg: LegTerms, hashlock: Hashlock, secret: Option<Secret>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            maker_leg,
            taker_leg,
            hashlock,
            secret,
            status: OrderStatus::Created,
            taker: None,
            lock_script: None,
            source_funding: None,
            escrow: None,
            history: Vec::new(),
        }
    }

    /// Maker-side order owning a freshly generated commitment.
    pub fn from_commitment(maker_leg: LegTerms, taker_leg: LegTerms, commitment: SecretCommitment) -> Self {
        let (secret, hashlock) = commitment.into_parts();
        Self::new(maker_leg, taker_leg, hashlock, Some(secret))
    }

    /// 32-byte order hash used as the escrow `orderHash`.
    pub fn swap_id(&self) -> B256 {
        keccak256(self.id.as_bytes())
    }

    /// Refund threshold of one leg, if that leg exists yet.
    pub fn refund_timelock(&self, leg: LegSide) -> Option<Timelock> {
        match leg {
            LegSide::Source => self.lock_script.as_ref().map(|l| l.refund_timelock()),
            LegSide::Counterparty => self.escrow.as_ref().map(|e| e.handle.immutables.refund_timelock()),
        }
    }

    fn reject(&self, event: &SwapEvent) -> SwapError {
        SwapError::InvalidStateTransition {
            from: self.status,
            event: event.name().to_string(),
        }
    }

    /// Validate `event` against the current status and its guard without
    /// mutating anything. Returns the status the event would lead to.
    pub fn check(&self, event: &SwapEvent) -> Result<OrderStatus> {
        match event.allowed_from() {
            Some(states) if !states.contains(&self.status) => return Err(self.reject(event)),
            None if self.status.is_terminal() => return Err(self.reject(event)),
            _ => {}
        }

        match event {
            SwapEvent::Fill { .. } | SwapEvent::Settle => {}
            SwapEvent::CounterpartyEscrowFunded { handle } => {
                let observed = handle.immutables.hashlock;
                if observed != self.hashlock {
                    return Err(SwapError::HashlockMismatch {
                        expected: self.hashlock.to_string(),
                        observed: observed.to_string(),
                    });
                }
                if let Some(taker) = self.taker {
                    if handle.immutables.taker != taker {
                        return Err(SwapError::Unauthorized {
                            expected: taker.to_string(),
                            actual: handle.immutables.taker.to_string(),
                        });
                    }
                }
            }
            SwapEvent::SourceLockFunded { address, funding } => {
                let lock = self.lock_script.as_ref().ok_or_else(|| SwapError::LockAddressMismatch {
                    expected: "<no lock script attached>".to_string(),
                    observed: address.clone(),
                })?;
                if lock.encoding_of(address) != Some(funding.encoding) {
                    return Err(SwapError::LockAddressMismatch {
                        expected: lock.address(funding.encoding).to_string(),
                        observed: address.clone(),
                    });
                }
            }
            SwapEvent::SourceClaimed { secret } => {
                if !secret.opens(&self.hashlock) {
                    return Err(SwapError::SecretMismatch);
                }
            }
            SwapEvent::CounterpartyClaimed { secret } => {
                if !secret.opens(&self.hashlock) {
                    return Err(SwapError::SecretMismatch);
                }
                if self.escrow.as_ref().map_or(false, EscrowRecord::is_settled) {
                    return Err(SwapError::EscrowAlreadySettled);
                }
            }
            SwapEvent::TimelockExpired { leg, clock } => {
                let settled = match leg {
                    LegSide::Source => self.status.rank() >= OrderStatus::SourceClaimed.rank(),
                    LegSide::Counterparty => self.escrow.as_ref().map_or(false, EscrowRecord::is_settled),
                };
                if settled {
                    return Err(SwapError::EscrowAlreadySettled);
                }
                match self.refund_timelock(*leg) {
                    Some(timelock) => {
                        if !timelock.has_elapsed(clock) {
                            return Err(timelock_not_elapsed(timelock, clock));
                        }
                    }
                    // Lock-free abort only while neither leg exists
                    None if self.lock_script.is_some() || self.escrow.is_some() => {
                        return Err(self.reject(event));
                    }
                    None => {}
                }
            }
        }

        Ok(event.target())
    }

    /// Check then apply `event`, appending to the audit history.
    pub fn apply(&mut self, event: SwapEvent) -> Result<OrderStatus> {
        let to = self.check(&event)?;
        let from = self.status;
        let name = event.name();

        match event {
            SwapEvent::Fill { taker } => self.taker = Some(taker),
            SwapEvent::CounterpartyEscrowFunded { handle } => {
                self.escrow = Some(EscrowRecord {
                    handle,
                    withdrawn: false,
                    cancelled: false,
                })
            }
            SwapEvent::SourceLockFunded { funding, .. } => self.source_funding = Some(funding),
            SwapEvent::SourceClaimed { secret } => self.secret = Some(secret),
            SwapEvent::CounterpartyClaimed { secret } => {
                self.secret = Some(secret);
                if let Some(escrow) = self.escrow.as_mut() {
                    escrow.withdrawn = true;
                }
            }
            SwapEvent::Settle => {}
            SwapEvent::TimelockExpired { leg, .. } => {
                if leg == LegSide::Counterparty {
                    if let Some(escrow) = self.escrow.as_mut() {
                        escrow.cancelled = true;
                    }
                }
            }
        }

        let at = Utc::now();
        self.status = to;
        self.updated_at = at;
        self.history.push(StatusChange {
            from,
            to,
            event: name.to_string(),
            at,
        });
        tracing::info!(order = %self.id, "🔁 {} -> {} ({})", from, to, name);
        Ok(to)
    }

    /// Attach the derived bitcoin lock. Allowed once, before the lock is funded;
    /// re-attaching the identical lock is a no-op.
    pub fn attach_lock_script(&mut self, lock: LockScript) -> Result<()> {
        if self.status.is_terminal() || self.status.rank() >= OrderStatus::SourceLockFunded.rank() {
            return Err(SwapError::InvalidStateTransition {
                from: self.status,
                event: "AttachLockScript".to_string(),
            });
        }
        if lock.hashlock != self.hashlock {
            return Err(SwapError::HashlockMismatch {
                expected: self.hashlock.to_string(),
                observed: lock.hashlock.to_string(),
            });
        }
        match &self.lock_script {
            Some(existing) if *existing == lock => return Ok(()),
            Some(existing) => {
                return Err(SwapError::LockAddressMismatch {
                    expected: existing.locking_address.clone(),
                    observed: lock.locking_address,
                })
            }
            None => {}
        }
        tracing::info!(order = %self.id, address = %lock.locking_address, "🔒 lock script attached");
        self.lock_script = Some(lock);
        self.updated_at = Utc::now();
        Ok(())
    }
}
