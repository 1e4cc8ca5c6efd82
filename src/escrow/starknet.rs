// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 AtomicX Contributors

//! Starknet HTLC client
//!
//! Entry points: `create_htlc`, `withdraw`, `refund`, `get_htlc`.
//! 256-bit values (hashlock, secret, amount) travel as Cairo `u256`
//! `(low, high)` felt pairs. The contract takes an absolute timelock, so
//! creation sends `now + cancellation_period`.
//!
//! The target contract must take a `u256` hashlock and secret. A SHA-256
//! digest does not fit a `felt252`, so an HTLC whose ABI declares
//! `hashlock: felt252` cannot lock these swaps and is not supported.
//!
//! The HTLC holds no safety deposit. A source-role escrow with a nonzero
//! deposit is rejected; for the destination role the deposit is never
//! attached and is only carried in the handle.

use alloy_primitives::U256;

use super::immutables::{EscrowImmutables, Identity, Timelocks};
use super::transport::{Felt, StarknetCall, StarknetTransport};
use super::{check_cancel, check_withdraw, EscrowClient, EscrowDetails, EscrowHandle, EscrowRole};
use crate::errors::{Result, SwapError};
use crate::swap::{Chain, Hashlock, Secret};

const CREATE_HTLC: &str = "create_htlc";
const WITHDRAW: &str = "withdraw";
const REFUND: &str = "refund";
const GET_HTLC: &str = "get_htlc";

/// Felts returned by `get_htlc`
const HTLC_VIEW_LEN: usize = 11;

fn u256_limbs(bytes: &[u8; 32]) -> (Felt, Felt) {
    Felt::split_u256(U256::from_be_bytes(*bytes))
}

fn identity_felt(identity: &Identity) -> Result<Felt> {
    Felt::new(identity.to_u256())
}

/// Decoded `get_htlc` response.
#[derive(Debug, Clone, PartialEq, Eq)]
struct HtlcView {
    sender: Felt,
    recipient: Felt,
    token: Felt,
    amount: U256,
    hashlock: Hashlock,
    timelock: u64,
    withdrawn: bool,
    refunded: bool,
    created_at: u64,
}

impl HtlcView {
    fn decode(raw: &[Felt]) -> Result<Self> {
        if raw.len() < HTLC_VIEW_LEN {
            return Err(SwapError::RemoteRejected(format!(
                "get_htlc returned {} values, expected {}",
                raw.len(),
                HTLC_VIEW_LEN
            )));
        }
        let small = |felt: &Felt, field: &str| {
            felt.to_u64()
                .ok_or_else(|| SwapError::RemoteRejected(format!("get_htlc {} out of range", field)))
        };
        let hashlock = Felt::join_u256(raw[5], raw[6])?;
        Ok(Self {
            sender: raw[0],
            recipient: raw[1],
            token: raw[2],
            amount: Felt::join_u256(raw[3], raw[4])?,
            hashlock: Hashlock::from_bytes(hashlock.to_be_bytes::<32>()),
            timelock: small(&raw[7], "timelock")?,
            withdrawn: raw[8].is_true(),
            refunded: raw[9].is_true(),
            created_at: small(&raw[10], "created_at")?,
        })
    }

    fn timelocks(&self, withdrawal_period: u32) -> Result<Timelocks> {
        let deployed_at = u32::try_from(self.created_at)
            .map_err(|_| SwapError::RemoteRejected("created_at exceeds u32".into()))?;
        let cancellation_period = u32::try_from(self.timelock.saturating_sub(self.created_at))
            .map_err(|_| SwapError::RemoteRejected("timelock span exceeds u32".into()))?;
        Ok(Timelocks {
            withdrawal_period,
            cancellation_period,
            deployed_at,
        })
    }
}

#[derive(Clone)]
pub struct StarknetEscrowClient<T: StarknetTransport> {
    htlc: Felt,
    transport: T,
}

impl<T: StarknetTransport> StarknetEscrowClient<T> {
    pub fn new(htlc: Felt, transport: T) -> Self {
        Self { htlc, transport }
    }

    pub fn contract(&self) -> Felt {
        self.htlc
    }

    fn htlc_id(handle: &EscrowHandle) -> Result<Felt> {
        if handle.chain != Chain::Starknet {
            return Err(SwapError::InvalidAddress(format!(
                "{} escrow handed to the Starknet client",
                handle.chain
            )));
        }
        handle.locator.parse()
    }

    fn call(&self, entry_point: &'static str, calldata: Vec<Felt>) -> StarknetCall {
        StarknetCall {
            contract: self.htlc,
            entry_point,
            calldata,
        }
    }

    fn read(&self, id: Felt) -> Result<HtlcView> {
        let raw = self.transport.call(self.call(GET_HTLC, vec![id]))?;
        HtlcView::decode(&raw)
    }
}

impl<T: StarknetTransport> EscrowClient for StarknetEscrowClient<T> {
    fn chain(&self) -> Chain {
        Chain::Starknet
    }

    fn caller(&self) -> Identity {
        Identity::from_u256(self.transport.caller().value())
    }

    fn create_escrow(&self, immutables: &EscrowImmutables, role_is_source: bool) -> Result<EscrowHandle> {
        immutables.validate()?;
        if role_is_source && !immutables.safety_deposit.is_zero() {
            return Err(SwapError::InvalidAmount(format!(
                "Starknet HTLC cannot hold a safety deposit of {}",
                immutables.safety_deposit
            )));
        }
        // The HTLC records the invoking account as the refundable sender
        let caller = self.caller();
        if caller != immutables.maker {
            return Err(SwapError::Unauthorized {
                expected: immutables.maker.to_string(),
                actual: caller.to_string(),
            });
        }

        let now = self.transport.block_timestamp()?;
        let timelock = now + immutables.timelocks.cancellation_period as u64;
        let (hash_low, hash_high) = u256_limbs(immutables.hashlock.as_bytes());
        let (amount_low, amount_high) = Felt::split_u256(immutables.amount);
        let calldata = vec![
            hash_low,
            hash_high,
            identity_felt(&immutables.taker)?,
            identity_felt(&immutables.token)?,
            amount_low,
            amount_high,
            Felt::from_u64(timelock),
        ];

        let receipt = self.transport.invoke(self.call(CREATE_HTLC, calldata))?;
        let id = receipt
            .result
            .first()
            .copied()
            .ok_or_else(|| SwapError::RemoteRejected("create_htlc returned no id".into()))?;

        let view = self.read(id)?;
        let mut deployed = immutables.clone();
        deployed.timelocks = view.timelocks(immutables.timelocks.withdrawal_period)?;

        tracing::info!(
            htlc_id = %id,
            tx = %receipt.tx_hash,
            timelock,
            "📦 Starknet HTLC created"
        );

        Ok(EscrowHandle {
            chain: Chain::Starknet,
            locator: id.to_string(),
            immutables: deployed,
            role: EscrowRole::from_is_source(role_is_source),
            creation_tx: receipt.tx_hash.to_string(),
        })
    }

    fn withdraw(&self, handle: &EscrowHandle, secret: &Secret) -> Result<String> {
        let id = Self::htlc_id(handle)?;
        check_withdraw(&handle.immutables, &self.caller(), secret)?;

        let (low, high) = u256_limbs(secret.as_bytes());
        let receipt = self.transport.invoke(self.call(WITHDRAW, vec![id, low, high]))?;
        tracing::info!(htlc_id = %id, tx = %receipt.tx_hash, "🔓 Starknet HTLC withdrawn");
        Ok(receipt.tx_hash.to_string())
    }

    fn cancel(&self, handle: &EscrowHandle) -> Result<String> {
        let id = Self::htlc_id(handle)?;
        let now = self.transport.block_timestamp()?;
        check_cancel(&handle.immutables, &self.caller(), now)?;

        let receipt = self.transport.invoke(self.call(REFUND, vec![id]))?;
        tracing::info!(htlc_id = %id, tx = %receipt.tx_hash, "↩️ Starknet HTLC refunded");
        Ok(receipt.tx_hash.to_string())
    }

    /// On-chain fields merged with the handle's swap id, safety deposit and
    /// withdrawal period, which the HTLC does not store.
    fn get_details(&self, handle: &EscrowHandle) -> Result<EscrowDetails> {
        let id = Self::htlc_id(handle)?;
        let view = self.read(id)?;
        let immutables = EscrowImmutables {
            swap_id: handle.immutables.swap_id,
            hashlock: view.hashlock,
            maker: Identity::from_u256(view.sender.value()),
            taker: Identity::from_u256(view.recipient.value()),
            token: Identity::from_u256(view.token.value()),
            amount: view.amount,
            safety_deposit: handle.immutables.safety_deposit,
            timelocks: view.timelocks(handle.immutables.timelocks.withdrawal_period)?,
        };
        Ok(EscrowDetails {
            immutables,
            withdrawn: view.withdrawn,
            cancelled: view.refunded,
        })
    }
}
