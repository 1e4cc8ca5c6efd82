// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 AtomicX Contributors

// End-to-end swaps against the simulated escrow chains.
// Run with `--features test-utils`.


use std::sync::Arc;

use alloy_primitives::{Address, U256};
use atomicx_core::btc::{LockEncoding, ScriptLockBuilder};
use atomicx_core::config::SwapConfig;
use atomicx_core::escrow::simulated::SimulatedLedger;
use atomicx_core::escrow::{EscrowClient, EvmEscrowClient, Felt, Identity, StarknetEscrowClient};
use atomicx_core::order::{LegTerms, MemoryOrderStore, OrderStatus, SwapEngine};
use atomicx_core::swap::Chain;
use atomicx_core::{EscrowLeg, LockLeg, SwapError};

use harness::*;

const NOW: u64 = 1_710_000_000;

struct Parties {
    maker: Arc<dyn EscrowClient>,
    taker: Arc<dyn EscrowClient>,
}

fn evm_parties(ledger: &SimulatedLedger) -> Parties {
    let factory = Address::repeat_byte(0xf0);
    Parties {
        maker: Arc::new(EvmEscrowClient::new(factory, ledger.evm(Address::repeat_byte(0xaa)))),
        taker: Arc::new(EvmEscrowClient::new(factory, ledger.evm(Address::repeat_byte(0xbb)))),
    }
}

fn starknet_parties(ledger: &SimulatedLedger) -> Parties {
    let htlc = Felt::from_u64(0x0123_4567);
    Parties {
        maker: Arc::new(StarknetEscrowClient::new(htlc, ledger.starknet(Felt::from_u64(0xaaaa)))),
        taker: Arc::new(StarknetEscrowClient::new(htlc, ledger.starknet(Felt::from_u64(0xbbbb)))),
    }
}

fn run_full_swap(chain: Chain, parties: Parties) {
    let engine = SwapEngine::new(Arc::new(MemoryOrderStore::new()), SwapConfig::default());
    let order = engine
        .create_order(
            LegTerms::new(chain, "NATIVE", 5_000_000, "maker"),
            LegTerms::new(Chain::Bitcoin, "BTC", 90_000, "taker"),
        )
        .unwrap();
    engine.fill(&order.id, parties.taker.caller()).unwrap();

    let immutables = engine
        .escrow_immutables(
            &order.id,
            parties.maker.caller(),
            parties.taker.caller(),
            Identity::ZERO,
            U256::from(5_000_000u64),
            U256::ZERO,
        )
        .unwrap();
    let handle = parties.maker.create_escrow(&immutables, false).unwrap();
    assert_eq!(handle.immutables.timelocks.deployed_at as u64, NOW);
    engine.record_counterparty_escrow(&order.id, handle.clone()).unwrap();

    let lock = engine
        .derive_lock_script(
            &order.id,
            &ScriptLockBuilder::new(NETWORK),
            &signing_key(MAKER_BTC_KEY).public_key(),
            &signing_key(TAKER_BTC_KEY).public_key(),
            500,
        )
        .unwrap();
    let funded = funding(90_000, LockEncoding::Legacy);
    engine
        .record_source_funding(&order.id, &lock.alternate_address, funded)
        .unwrap();

    // Maker reveals the secret on bitcoin
    let (claimed, _) = engine
        .claim_source(&order.id, &bitcoin_leg(&lock, funded, &signing_key(MAKER_BTC_KEY)))
        .unwrap();
    let revealed = claimed.secret.clone().unwrap();

    // Taker uses it on the escrow chain
    let escrow = EscrowLeg::new(parties.taker.clone(), handle.clone()).unwrap();
    engine.claim_counterparty(&order.id, &escrow, &revealed).unwrap();
    let done = engine.settle(&order.id).unwrap();
    assert_eq!(done.status, OrderStatus::Completed);
    assert_eq!(done.history.len(), 6);

    let details = parties.taker.get_details(&handle).unwrap();
    assert!(details.withdrawn);
    assert!(!details.cancelled);

    // A replayed withdrawal is refused by the chain itself
    assert!(matches!(escrow.claim(&revealed), Err(SwapError::RemoteRejected(_))));
}

#[test]
fn test_full_swap_evm() {
    let ledger = SimulatedLedger::new(NOW);
    run_full_swap(Chain::Evm, evm_parties(&ledger));
}

#[test]
fn test_full_swap_starknet() {
    let ledger = SimulatedLedger::new(NOW);
    run_full_swap(Chain::Starknet, starknet_parties(&ledger));
}

#[test]
fn test_unreachable_chain_leaves_order_untouched() {
    let ledger = SimulatedLedger::new(NOW);
    let parties = evm_parties(&ledger);
    let engine = SwapEngine::new(Arc::new(MemoryOrderStore::new()), SwapConfig::default());
    let order = engine
        .create_order(
            LegTerms::new(Chain::Evm, "ETH", 10, "maker"),
            LegTerms::new(Chain::Bitcoin, "BTC", 90_000, "taker"),
        )
        .unwrap();
    let immutables = engine
        .escrow_immutables(
            &order.id,
            parties.maker.caller(),
            parties.taker.caller(),
            Identity::ZERO,
            U256::from(10u64),
            U256::ZERO,
        )
        .unwrap();
    let handle = parties.maker.create_escrow(&immutables, false).unwrap();
    engine.record_counterparty_escrow(&order.id, handle.clone()).unwrap();

    let lock = engine
        .derive_lock_script(
            &order.id,
            &ScriptLockBuilder::new(NETWORK),
            &signing_key(MAKER_BTC_KEY).public_key(),
            &signing_key(TAKER_BTC_KEY).public_key(),
            500,
        )
        .unwrap();
    let funded = funding(90_000, LockEncoding::Segwit);
    engine.record_source_funding(&order.id, &lock.locking_address, funded).unwrap();
    let (claimed, _) = engine
        .claim_source(&order.id, &bitcoin_leg(&lock, funded, &signing_key(MAKER_BTC_KEY)))
        .unwrap();

    ledger.set_offline(true);
    let escrow = EscrowLeg::new(parties.taker.clone(), handle).unwrap();
    let err = engine
        .claim_counterparty(&order.id, &escrow, claimed.secret.as_ref().unwrap())
        .unwrap_err();
    assert!(matches!(err, SwapError::RemoteRejected(_)));
    assert!(err.is_retryable());
    assert_eq!(engine.get(&order.id).unwrap().status, OrderStatus::SourceClaimed);

    ledger.set_offline(false);
    let (order, _) = engine
        .claim_counterparty(&order.id, &escrow, claimed.secret.as_ref().unwrap())
        .unwrap();
    assert_eq!(order.status, OrderStatus::CounterpartyClaimed);
}
