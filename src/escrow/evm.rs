// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 AtomicX Contributors

//! EVM escrow factory client
//!
//! Creation goes through the factory (`createSrcEscrow` / `createDstEscrow`),
//! which deploys one escrow per immutables bundle and stamps `deployedAt`
//! into the packed timelocks. Withdraw and cancel go to the escrow itself.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall};
use std::str::FromStr;

use super::immutables::{EscrowImmutables, Identity, Timelocks};
use super::transport::{EvmCall, EvmTransport, EvmViewTransport};
use super::{check_cancel, check_withdraw, EscrowClient, EscrowDetails, EscrowHandle, EscrowRole};
use crate::errors::{Result, SwapError};
use crate::swap::{Chain, Hashlock, Secret};

sol! {
    #[allow(non_camel_case_types)]
    contract EscrowFactory {
        struct Immutables {
            bytes32 orderHash;
            bytes32 hashlock;
            uint256 maker;
            uint256 taker;
            uint256 token;
            uint256 amount;
            uint256 safetyDeposit;
            uint256 timelocks;
        }

        function createSrcEscrow(Immutables immutables) payable returns (address);
        function createDstEscrow(Immutables immutables) payable returns (address);
    }

    #[allow(non_camel_case_types)]
    contract Escrow {
        function withdraw(bytes32 secret);
        function cancel();
        function hashlock() view returns (bytes32);
        function orderHash() view returns (bytes32);
        function maker() view returns (uint256);
        function taker() view returns (uint256);
        function token() view returns (uint256);
        function amount() view returns (uint256);
        function safetyDeposit() view returns (uint256);
        function timelocks() view returns (uint256);
        function withdrawn() view returns (bool);
        function cancelled() view returns (bool);
    }
}

const CREATE_GAS: u64 = 600_000;
const SETTLE_GAS: u64 = 200_000;

impl From<&EscrowImmutables> for EscrowFactory::Immutables {
    fn from(value: &EscrowImmutables) -> Self {
        Self {
            orderHash: value.swap_id,
            hashlock: value.hashlock_word(),
            maker: value.maker.to_u256(),
            taker: value.taker.to_u256(),
            token: value.token.to_u256(),
            amount: value.amount,
            safetyDeposit: value.safety_deposit,
            timelocks: value.timelocks.pack(),
        }
    }
}

impl From<EscrowFactory::Immutables> for EscrowImmutables {
    fn from(value: EscrowFactory::Immutables) -> Self {
        Self {
            swap_id: value.orderHash,
            hashlock: Hashlock::from_bytes(value.hashlock.0),
            maker: Identity::from_u256(value.maker),
            taker: Identity::from_u256(value.taker),
            token: Identity::from_u256(value.token),
            amount: value.amount,
            safety_deposit: value.safetyDeposit,
            timelocks: Timelocks::unpack(value.timelocks),
        }
    }
}

#[derive(Clone)]
pub struct EvmEscrowClient<T: EvmTransport + EvmViewTransport> {
    factory: Address,
    transport: T,
}

impl<T: EvmTransport + EvmViewTransport> EvmEscrowClient<T> {
    pub fn new(factory: Address, transport: T) -> Self {
        Self { factory, transport }
    }

    pub fn factory(&self) -> Address {
        self.factory
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn escrow_address(handle: &EscrowHandle) -> Result<Address> {
        if handle.chain != Chain::Evm {
            return Err(SwapError::InvalidAddress(format!(
                "{} escrow handed to the EVM client",
                handle.chain
            )));
        }
        Address::from_str(&handle.locator)
            .map_err(|e| SwapError::InvalidAddress(format!("escrow {}: {}", handle.locator, e)))
    }

    fn view<C: SolCall>(&self, escrow: Address, call: C) -> Result<C::Return> {
        let request = EvmCall::new(escrow, Bytes::from(call.abi_encode()), U256::ZERO);
        let raw = self.transport.call_view(request)?;
        C::abi_decode_returns(&raw, true)
            .map_err(|e| SwapError::RemoteRejected(format!("decode {}: {}", C::SIGNATURE, e)))
    }

    fn read_timelocks(&self, escrow: Address) -> Result<Timelocks> {
        Ok(Timelocks::unpack(self.view(escrow, Escrow::timelocksCall {})?._0))
    }
}

impl<T: EvmTransport + EvmViewTransport> EscrowClient for EvmEscrowClient<T> {
    fn chain(&self) -> Chain {
        Chain::Evm
    }

    fn caller(&self) -> Identity {
        Identity::from_evm_address(self.transport.sender())
    }

    fn create_escrow(&self, immutables: &EscrowImmutables, role_is_source: bool) -> Result<EscrowHandle> {
        immutables.validate()?;
        let encoded = EscrowFactory::Immutables::from(immutables);
        let calldata = if role_is_source {
            EscrowFactory::createSrcEscrowCall { immutables: encoded }.abi_encode()
        } else {
            EscrowFactory::createDstEscrowCall { immutables: encoded }.abi_encode()
        };
        let value = immutables.creation_value(role_is_source);
        let call = EvmCall::new(self.factory, Bytes::from(calldata), value).with_gas_limit(CREATE_GAS);

        let receipt = self.transport.send(call)?;
        // Both entry points share the `(address)` return shape
        let escrow = EscrowFactory::createSrcEscrowCall::abi_decode_returns(&receipt.output, true)
            .map_err(|e| SwapError::RemoteRejected(format!("factory returned no escrow address: {}", e)))?
            ._0;

        let mut deployed = immutables.clone();
        deployed.timelocks = self.read_timelocks(escrow)?;

        tracing::info!(
            escrow = %escrow,
            tx = %receipt.tx_hash,
            role = if role_is_source { "src" } else { "dst" },
            "📦 EVM escrow created (value {})",
            value
        );

        Ok(EscrowHandle {
            chain: Chain::Evm,
            locator: escrow.to_string(),
            immutables: deployed,
            role: EscrowRole::from_is_source(role_is_source),
            creation_tx: receipt.tx_hash.to_string(),
        })
    }

    fn withdraw(&self, handle: &EscrowHandle, secret: &Secret) -> Result<String> {
        let escrow = Self::escrow_address(handle)?;
        check_withdraw(&handle.immutables, &self.caller(), secret)?;

        let calldata = Escrow::withdrawCall {
            secret: (*secret.as_bytes()).into(),
        }
        .abi_encode();
        let call = EvmCall::new(escrow, Bytes::from(calldata), U256::ZERO).with_gas_limit(SETTLE_GAS);
        let receipt = self.transport.send(call)?;

        tracing::info!(escrow = %escrow, tx = %receipt.tx_hash, "🔓 EVM escrow withdrawn");
        Ok(receipt.tx_hash.to_string())
    }

    fn cancel(&self, handle: &EscrowHandle) -> Result<String> {
        let escrow = Self::escrow_address(handle)?;
        let now = self.transport.block_timestamp()?;
        check_cancel(&handle.immutables, &self.caller(), now)?;

        let calldata = Escrow::cancelCall {}.abi_encode();
        let call = EvmCall::new(escrow, Bytes::from(calldata), U256::ZERO).with_gas_limit(SETTLE_GAS);
        let receipt = self.transport.send(call)?;

        tracing::info!(escrow = %escrow, tx = %receipt.tx_hash, "↩️ EVM escrow cancelled");
        Ok(receipt.tx_hash.to_string())
    }

    fn get_details(&self, handle: &EscrowHandle) -> Result<EscrowDetails> {
        let escrow = Self::escrow_address(handle)?;
        let immutables = EscrowImmutables {
            swap_id: self.view(escrow, Escrow::orderHashCall {})?._0,
            hashlock: Hashlock::from_bytes(self.view(escrow, Escrow::hashlockCall {})?._0.into()),
            maker: Identity::from_u256(self.view(escrow, Escrow::makerCall {})?._0),
            taker: Identity::from_u256(self.view(escrow, Escrow::takerCall {})?._0),
            token: Identity::from_u256(self.view(escrow, Escrow::tokenCall {})?._0),
            amount: self.view(escrow, Escrow::amountCall {})?._0,
            safety_deposit: self.view(escrow, Escrow::safetyDepositCall {})?._0,
            timelocks: self.read_timelocks(escrow)?,
        };
        Ok(EscrowDetails {
            immutables,
            withdrawn: self.view(escrow, Escrow::withdrawnCall {})?._0,
            cancelled: self.view(escrow, Escrow::cancelledCall {})?._0,
        })
    }
}
