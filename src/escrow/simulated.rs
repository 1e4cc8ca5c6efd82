// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 AtomicX Contributors

//! In-memory escrow chains for tests
//!
//! Only compiled under `cfg(test)` or the `test-utils` feature. One
//! [`SimulatedLedger`] backs any number of EVM and Starknet transports, each
//! bound to one account, and enforces the same rules the real contracts do:
//! caller authorization, SHA-256 secret check, withdrawal and cancellation
//! windows, duplicate creation and attached value.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolValue};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::evm::{Escrow, EscrowFactory};
use super::immutables::EscrowImmutables;
use super::transport::{
    CallReceipt, EvmCall, EvmTransport, EvmViewTransport, Felt, InvokeReceipt, StarknetCall,
    StarknetTransport, TransportError, TransportResult, INVALID_SECRET_REASON,
};
use crate::swap::{htlc_hash_lock, Hashlock};

fn revert(reason: &str) -> TransportError {
    TransportError::Reverted(reason.to_string())
}

#[derive(Debug, Clone)]
struct SimEscrow {
    immutables: EscrowImmutables,
    balance: U256,
    withdrawn: bool,
    cancelled: bool,
}

#[derive(Debug, Clone)]
struct SimHtlc {
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

#[derive(Debug, Default)]
struct LedgerState {
    now: u64,
    nonce: u64,
    sent: usize,
    offline: bool,
    escrows: HashMap<Address, SimEscrow>,
    htlcs: HashMap<u64, SimHtlc>,
}

impl LedgerState {
    fn next_tx(&mut self, from: &[u8]) -> B256 {
        self.nonce += 1;
        self.sent += 1;
        let mut preimage = self.nonce.to_be_bytes().to_vec();
        preimage.extend_from_slice(from);
        keccak256(preimage)
    }

    fn deployed_at(&self) -> TransportResult<u32> {
        u32::try_from(self.now).map_err(|_| revert("TimestampOverflow"))
    }

    // ---- EVM ----------------------------------------------------------------

    fn create_escrow(
        &mut self,
        immutables: EscrowFactory::Immutables,
        is_source: bool,
        value: U256,
    ) -> TransportResult<Address> {
        let mut immutables = EscrowImmutables::from(immutables);
        let required = immutables.creation_value(is_source);
        if value != required {
            return Err(revert("InsufficientEscrowBalance"));
        }

        let mut salt = immutables.swap_id.to_vec();
        salt.extend_from_slice(immutables.hashlock.as_bytes());
        let address = Address::from_slice(&keccak256(salt)[12..]);
        if self.escrows.contains_key(&address) {
            return Err(revert("EscrowExists"));
        }

        immutables.timelocks = immutables.timelocks.with_deployed_at(self.deployed_at()?);
        self.escrows.insert(
            address,
            SimEscrow {
                immutables,
                balance: value,
                withdrawn: false,
                cancelled: false,
            },
        );
        Ok(address)
    }

    fn withdraw_escrow(&mut self, escrow: Address, caller: Address, secret: B256) -> TransportResult<()> {
        let now = self.now;
        let entry = self.escrows.get_mut(&escrow).ok_or_else(|| revert("NoContract"))?;
        if entry.immutables.taker.as_evm_address() != Some(caller) {
            return Err(revert("InvalidCaller"));
        }
        if entry.withdrawn || entry.cancelled {
            return Err(revert("AlreadySettled"));
        }
        let timelocks = entry.immutables.timelocks;
        if now < timelocks.withdrawal_start() || now >= timelocks.cancellation_start() {
            return Err(revert("InvalidTime"));
        }
        if htlc_hash_lock(secret.as_slice()) != *entry.immutables.hashlock.as_bytes() {
            return Err(revert(INVALID_SECRET_REASON));
        }
        entry.withdrawn = true;
        entry.balance = U256::ZERO;
        Ok(())
    }

    fn cancel_escrow(&mut self, escrow: Address, caller: Address) -> TransportResult<()> {
        let now = self.now;
        let entry = self.escrows.get_mut(&escrow).ok_or_else(|| revert("NoContract"))?;
        if entry.immutables.maker.as_evm_address() != Some(caller) {
            return Err(revert("InvalidCaller"));
        }
        if entry.withdrawn || entry.cancelled {
            return Err(revert("AlreadySettled"));
        }
        if now < entry.immutables.timelocks.cancellation_start() {
            return Err(revert("InvalidTime"));
        }
        entry.cancelled = true;
        entry.balance = U256::ZERO;
        Ok(())
    }

    // ---- Starknet -----------------------------------------------------------

    fn create_htlc(&mut self, sender: Felt, calldata: &[Felt]) -> TransportResult<Felt> {
        let [hash_low, hash_high, recipient, token, amount_low, amount_high, timelock] = calldata else {
            return Err(revert("create_htlc: bad calldata"));
        };
        let hashlock = Felt::join_u256(*hash_low, *hash_high).map_err(|_| revert("create_htlc: hashlock"))?;
        let hashlock = Hashlock::from_bytes(hashlock.to_be_bytes::<32>());
        let amount = Felt::join_u256(*amount_low, *amount_high).map_err(|_| revert("create_htlc: amount"))?;
        let timelock = timelock.to_u64().ok_or_else(|| revert("create_htlc: timelock"))?;
        if timelock <= self.now {
            return Err(revert("TimelockInPast"));
        }
        if self
            .htlcs
            .values()
            .any(|h| h.hashlock == hashlock && !h.withdrawn && !h.refunded)
        {
            return Err(revert("HashlockInUse"));
        }

        let id = self.htlcs.len() as u64 + 1;
        self.htlcs.insert(
            id,
            SimHtlc {
                sender,
                recipient: *recipient,
                token: *token,
                amount,
                hashlock,
                timelock,
                withdrawn: false,
                refunded: false,
                created_at: self.now,
            },
        );
        Ok(Felt::from_u64(id))
    }

    fn htlc_mut(&mut self, id: &Felt) -> TransportResult<&mut SimHtlc> {
        let key = id.to_u64().ok_or_else(|| revert("HtlcNotFound"))?;
        self.htlcs.get_mut(&key).ok_or_else(|| revert("HtlcNotFound"))
    }

    fn withdraw_htlc(&mut self, caller: Felt, calldata: &[Felt]) -> TransportResult<()> {
        let [id, secret_low, secret_high] = calldata else {
            return Err(revert("withdraw: bad calldata"));
        };
        let secret = Felt::join_u256(*secret_low, *secret_high).map_err(|_| revert("withdraw: secret"))?;
        let now = self.now;
        let htlc = self.htlc_mut(id)?;
        if htlc.recipient != caller {
            return Err(revert("Unauthorized"));
        }
        if htlc.withdrawn || htlc.refunded {
            return Err(revert("AlreadySettled"));
        }
        if now >= htlc.timelock {
            return Err(revert("Expired"));
        }
        if htlc_hash_lock(&secret.to_be_bytes::<32>()) != *htlc.hashlock.as_bytes() {
            return Err(revert(INVALID_SECRET_REASON));
        }
        htlc.withdrawn = true;
        Ok(())
    }

    fn refund_htlc(&mut self, caller: Felt, calldata: &[Felt]) -> TransportResult<()> {
        let [id] = calldata else {
            return Err(revert("refund: bad calldata"));
        };
        let now = self.now;
        let htlc = self.htlc_mut(id)?;
        if htlc.sender != caller {
            return Err(revert("Unauthorized"));
        }
        if htlc.withdrawn || htlc.refunded {
            return Err(revert("AlreadySettled"));
        }
        if now < htlc.timelock {
            return Err(revert("NotExpired"));
        }
        htlc.refunded = true;
        Ok(())
    }
}

/// Shared simulated chain state; clone freely.
#[derive(Debug, Clone, Default)]
pub struct SimulatedLedger {
    inner: Arc<Mutex<LedgerState>>,
}

impl SimulatedLedger {
    pub fn new(now: u64) -> Self {
        let ledger = Self::default();
        ledger.inner.lock().now = now;
        ledger
    }

    pub fn now(&self) -> u64 {
        self.inner.lock().now
    }

    pub fn set_time(&self, now: u64) {
        self.inner.lock().now = now;
    }

    pub fn advance(&self, secs: u64) {
        self.inner.lock().now += secs;
    }

    /// While offline every call fails with `TransportError::Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().offline = offline;
    }

    /// Transactions accepted so far (reverted ones included).
    pub fn sent_count(&self) -> usize {
        self.inner.lock().sent
    }

    /// Value held by an EVM escrow, `None` if it does not exist.
    pub fn escrow_balance(&self, locator: &str) -> Option<U256> {
        let address: Address = locator.parse().ok()?;
        self.inner.lock().escrows.get(&address).map(|e| e.balance)
    }

    pub fn evm(&self, sender: Address) -> SimulatedEvm {
        SimulatedEvm {
            ledger: self.clone(),
            sender,
        }
    }

    pub fn starknet(&self, caller: Felt) -> SimulatedStarknet {
        SimulatedStarknet {
            ledger: self.clone(),
            caller,
        }
    }

    fn online(&self) -> TransportResult<parking_lot::MutexGuard<'_, LedgerState>> {
        let state = self.inner.lock();
        if state.offline {
            return Err(TransportError::Unavailable("simulated outage".into()));
        }
        Ok(state)
    }
}

// ============================================================================
// EVM TRANSPORT
// ============================================================================

/// EVM transport signing as one account.
#[derive(Debug, Clone)]
pub struct SimulatedEvm {
    ledger: SimulatedLedger,
    sender: Address,
}

fn selector(data: &Bytes) -> TransportResult<[u8; 4]> {
    data.get(..4)
        .and_then(|s| <[u8; 4]>::try_from(s).ok())
        .ok_or_else(|| revert("missing selector"))
}

fn decode<C: SolCall>(data: &Bytes) -> TransportResult<C> {
    C::abi_decode(data, true).map_err(|e| TransportError::Decode(e.to_string()))
}

impl EvmTransport for SimulatedEvm {
    fn send(&self, call: EvmCall) -> TransportResult<CallReceipt> {
        let mut state = self.ledger.online()?;
        let tx_hash = state.next_tx(self.sender.as_slice());
        let sel = selector(&call.data)?;

        let output: Vec<u8> = if sel == EscrowFactory::createSrcEscrowCall::SELECTOR {
            let decoded = decode::<EscrowFactory::createSrcEscrowCall>(&call.data)?;
            state.create_escrow(decoded.immutables, true, call.value)?.abi_encode()
        } else if sel == EscrowFactory::createDstEscrowCall::SELECTOR {
            let decoded = decode::<EscrowFactory::createDstEscrowCall>(&call.data)?;
            state.create_escrow(decoded.immutables, false, call.value)?.abi_encode()
        } else if sel == Escrow::withdrawCall::SELECTOR {
            let decoded = decode::<Escrow::withdrawCall>(&call.data)?;
            state.withdraw_escrow(call.to, self.sender, decoded.secret)?;
            Vec::new()
        } else if sel == Escrow::cancelCall::SELECTOR {
            state.cancel_escrow(call.to, self.sender)?;
            Vec::new()
        } else {
            return Err(revert("unknown selector"));
        };

        Ok(CallReceipt {
            tx_hash,
            output: Bytes::from(output),
        })
    }

    fn sender(&self) -> Address {
        self.sender
    }
}

impl EvmViewTransport for SimulatedEvm {
    fn call_view(&self, call: EvmCall) -> TransportResult<Bytes> {
        let state = self.ledger.online()?;
        let escrow = state.escrows.get(&call.to).ok_or_else(|| revert("NoContract"))?;
        let imm = &escrow.immutables;
        let sel = selector(&call.data)?;

        let out = if sel == Escrow::hashlockCall::SELECTOR {
            imm.hashlock_word().abi_encode()
        } else if sel == Escrow::orderHashCall::SELECTOR {
            imm.swap_id.abi_encode()
        } else if sel == Escrow::makerCall::SELECTOR {
            imm.maker.to_u256().abi_encode()
        } else if sel == Escrow::takerCall::SELECTOR {
            imm.taker.to_u256().abi_encode()
        } else if sel == Escrow::tokenCall::SELECTOR {
            imm.token.to_u256().abi_encode()
        } else if sel == Escrow::amountCall::SELECTOR {
            imm.amount.abi_encode()
        } else if sel == Escrow::safetyDepositCall::SELECTOR {
            imm.safety_deposit.abi_encode()
        } else if sel == Escrow::timelocksCall::SELECTOR {
            imm.timelocks.pack().abi_encode()
        } else if sel == Escrow::withdrawnCall::SELECTOR {
            escrow.withdrawn.abi_encode()
        } else if sel == Escrow::cancelledCall::SELECTOR {
            escrow.cancelled.abi_encode()
        } else {
            return Err(revert("unknown selector"));
        };
        Ok(Bytes::from(out))
    }

    fn block_timestamp(&self) -> TransportResult<u64> {
        Ok(self.ledger.online()?.now)
    }
}

// ============================================================================
// STARKNET TRANSPORT
// ============================================================================

/// Starknet account transport for one caller.
#[derive(Debug, Clone)]
pub struct SimulatedStarknet {
    ledger: SimulatedLedger,
    caller: Felt,
}

impl StarknetTransport for SimulatedStarknet {
    fn invoke(&self, call: StarknetCall) -> TransportResult<InvokeReceipt> {
        let mut state = self.ledger.online()?;
        let hash = state.next_tx(&self.caller.value().to_be_bytes::<32>());
        // keep the hash inside the felt range
        let tx_hash = Felt::split_u256(U256::from_be_bytes(hash.0)).0;

        let result = match call.entry_point {
            "create_htlc" => vec![state.create_htlc(self.caller, &call.calldata)?],
            "withdraw" => {
                state.withdraw_htlc(self.caller, &call.calldata)?;
                Vec::new()
            }
            "refund" => {
                state.refund_htlc(self.caller, &call.calldata)?;
                Vec::new()
            }
            other => return Err(revert(&format!("ENTRYPOINT_NOT_FOUND: {}", other))),
        };
        Ok(InvokeReceipt { tx_hash, result })
    }

    fn call(&self, call: StarknetCall) -> TransportResult<Vec<Felt>> {
        let mut state = self.ledger.online()?;
        if call.entry_point != "get_htlc" {
            return Err(revert(&format!("ENTRYPOINT_NOT_FOUND: {}", call.entry_point)));
        }
        let [id] = call.calldata.as_slice() else {
            return Err(revert("get_htlc: bad calldata"));
        };
        let htlc = state.htlc_mut(id)?.clone();
        let (amount_low, amount_high) = Felt::split_u256(htlc.amount);
        let (hash_low, hash_high) = Felt::split_u256(U256::from_be_bytes(*htlc.hashlock.as_bytes()));
        Ok(vec![
            htlc.sender,
            htlc.recipient,
            htlc.token,
            amount_low,
            amount_high,
            hash_low,
            hash_high,
            Felt::from_u64(htlc.timelock),
            Felt::from_u64(htlc.withdrawn as u64),
            Felt::from_u64(htlc.refunded as u64),
            Felt::from_u64(htlc.created_at),
        ])
    }

    fn caller(&self) -> Felt {
        self.caller
    }

    fn block_timestamp(&self) -> TransportResult<u64> {
        Ok(self.ledger.online()?.now)
    }
}
