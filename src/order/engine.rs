// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 AtomicX Contributors

//! Swap engine: drives orders through their legs
//!
//! Every mutating operation runs under a per-order lock:
//!
//! 1. load the order from the store
//! 2. run the transition guard (no side effects yet)
//! 3. perform the leg action, if any
//! 4. apply the transition and persist
//!
//! A failure at steps 1-3 leaves the stored order untouched. Operations on
//! different orders never block each other.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

use bitcoin::PublicKey;

use super::model::{timelock_not_elapsed, LegSide, LegTerms, SwapEvent, SwapOrder};
use super::status::OrderStatus;
use super::store::OrderStore;
use crate::btc::{FundedLock, LockScript, ScriptLockBuilder};
use crate::config::SwapConfig;
use crate::errors::{Result, SwapError};
use crate::escrow::{EscrowHandle, EscrowImmutables, Identity};
use crate::leg::{LegReceipt, LockLeg};
use crate::swap::{
    await_confirmation, calculate_refund_height, CancelSignal, ChainClock, ConfirmationSource,
    Chain, FundingTarget, Hashlock, Secret, SecretCommitment, WaitPolicy,
};

pub struct SwapEngine {
    store: Arc<dyn OrderStore>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    config: SwapConfig,
}

impl SwapEngine {
    pub fn new(store: Arc<dyn OrderStore>, config: SwapConfig) -> Self {
        Self {
            store,
            locks: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &SwapConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    fn order_lock(&self, id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Load, mutate and persist one order under its lock. Nothing is saved
    /// when `f` fails.
    fn with_order<T>(&self, id: &str, f: impl FnOnce(&mut SwapOrder) -> Result<T>) -> Result<(SwapOrder, T)> {
        let lock = self.order_lock(id);
        let result = {
            let _guard = lock.lock();
            self.store.load(id).and_then(|mut order| {
                let out = f(&mut order)?;
                self.store.save(&order)?;
                Ok((order, out))
            })
        };
        drop(lock);
        // Only the map holds it now: nobody is waiting on this order
        self.locks.remove_if(id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.len()
    }

    // ========================================================================
    // CREATION
    // ========================================================================

    /// New maker-side order with a freshly generated secret.
    pub fn create_order(&self, maker_leg: LegTerms, taker_leg: LegTerms) -> Result<SwapOrder> {
        let order = SwapOrder::from_commitment(maker_leg, taker_leg, SecretCommitment::generate());
        self.store.insert(&order)?;
        tracing::info!(
            order = %order.id,
            hashlock = %order.hashlock,
            "🆕 order created: {} {} {} for {} {} {}",
            order.maker_leg.amount,
            order.maker_leg.asset,
            order.maker_leg.chain,
            order.taker_leg.amount,
            order.taker_leg.asset,
            order.taker_leg.chain
        );
        Ok(order)
    }

    /// Taker-side mirror of a published order: same hashlock, no secret.
    pub fn track_order(&self, maker_leg: LegTerms, taker_leg: LegTerms, hashlock: Hashlock) -> Result<SwapOrder> {
        let order = SwapOrder::new(maker_leg, taker_leg, hashlock, None);
        self.store.insert(&order)?;
        tracing::info!(order = %order.id, %hashlock, "👀 tracking order");
        Ok(order)
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn get(&self, id: &str) -> Result<SwapOrder> {
        self.store.load(id)
    }

    pub fn list(&self) -> Result<Vec<SwapOrder>> {
        self.store.list()
    }

    pub fn list_by_status(&self, status: OrderStatus) -> Result<Vec<SwapOrder>> {
        self.store.list_by_status(status)
    }

    /// Escrow parameters for an order, using the configured periods.
    pub fn escrow_immutables(
        &self,
        id: &str,
        maker: Identity,
        taker: Identity,
        token: Identity,
        amount: alloy_primitives::U256,
        safety_deposit: alloy_primitives::U256,
    ) -> Result<EscrowImmutables> {
        let order = self.store.load(id)?;
        let immutables = EscrowImmutables {
            swap_id: order.swap_id(),
            hashlock: order.hashlock,
            maker,
            taker,
            token,
            amount,
            safety_deposit,
            timelocks: self.config.escrow_timelocks(),
        };
        immutables.validate()?;
        Ok(immutables)
    }

    // ========================================================================
    // EVENTS
    // ========================================================================

    /// Apply an externally confirmed event.
    pub fn apply(&self, id: &str, event: SwapEvent) -> Result<SwapOrder> {
        let name = event.name();
        let (order, _) = self
            .with_order(id, |order| order.apply(event))
            .map_err(|e| {
                tracing::warn!(order = %id, event = name, "❌ event rejected: {}", e);
                e
            })?;
        Ok(order)
    }

    pub fn fill(&self, id: &str, taker: Identity) -> Result<SwapOrder> {
        self.apply(id, SwapEvent::Fill { taker })
    }

    pub fn record_counterparty_escrow(&self, id: &str, handle: EscrowHandle) -> Result<SwapOrder> {
        self.apply(id, SwapEvent::CounterpartyEscrowFunded { handle })
    }

    pub fn attach_lock_script(&self, id: &str, lock: LockScript) -> Result<SwapOrder> {
        let (order, _) = self.with_order(id, |order| order.attach_lock_script(lock))?;
        Ok(order)
    }

    /// Derive the bitcoin lock for an order with the configured relative
    /// timeout on top of `current_height`, and attach it.
    pub fn derive_lock_script(
        &self,
        id: &str,
        builder: &ScriptLockBuilder,
        recipient_key: &PublicKey,
        refund_key: &PublicKey,
        current_height: u32,
    ) -> Result<LockScript> {
        let (_, lock) = self.with_order(id, |order| {
            let height = calculate_refund_height(current_height, self.config.bitcoin_timelock_blocks);
            let lock = builder.build(&order.hashlock, recipient_key, refund_key, height)?;
            order.attach_lock_script(lock.clone())?;
            Ok(lock)
        })?;
        Ok(lock)
    }

    pub fn record_source_funding(&self, id: &str, address: &str, funding: FundedLock) -> Result<SwapOrder> {
        self.apply(
            id,
            SwapEvent::SourceLockFunded {
                address: address.to_string(),
                funding,
            },
        )
    }

    pub fn settle(&self, id: &str) -> Result<SwapOrder> {
        self.apply(id, SwapEvent::Settle)
    }

    /// Wait until a funding transaction is deep enough. Order state is not
    /// touched; record the funding with the matching event afterwards.
    pub async fn await_funding<S>(&self, source: &S, target: &FundingTarget, cancel: &mut CancelSignal) -> Result<u32>
    where
        S: ConfirmationSource + ?Sized,
    {
        let policy = WaitPolicy::from_config(&self.config, target.chain);
        await_confirmation(source, target, &policy, cancel).await
    }

    // ========================================================================
    // LEG ACTIONS
    // ========================================================================

    /// The leg must be the one recorded on the order for `side`: same
    /// hashlock, same chain, same locator.
    fn check_leg(order: &SwapOrder, side: LegSide, leg: &dyn LockLeg) -> Result<()> {
        if leg.hashlock() != order.hashlock {
            return Err(SwapError::HashlockMismatch {
                expected: order.hashlock.to_string(),
                observed: leg.hashlock().to_string(),
            });
        }
        let recorded = match side {
            LegSide::Source => order
                .lock_script
                .as_ref()
                .map(|lock| (Chain::Bitcoin, lock.locking_address.as_str())),
            LegSide::Counterparty => order
                .escrow
                .as_ref()
                .map(|escrow| (escrow.handle.chain, escrow.handle.locator.as_str())),
        };
        let (chain, locator) = recorded.ok_or_else(|| {
            SwapError::InvalidAddress(format!("order {} has no {:?} leg recorded", order.id, side))
        })?;
        if leg.chain() != chain || !leg.locator().eq_ignore_ascii_case(locator) {
            return Err(SwapError::InvalidAddress(format!(
                "{} leg {} is not the recorded {:?} leg {} {}",
                leg.chain(),
                leg.locator(),
                side,
                chain,
                locator
            )));
        }
        Ok(())
    }

    /// Maker claims the bitcoin lock with the order's own secret.
    pub fn claim_source(&self, id: &str, leg: &dyn LockLeg) -> Result<(SwapOrder, LegReceipt)> {
        self.with_order(id, |order| {
            let secret = order.secret.clone().ok_or_else(|| {
                SwapError::InvalidKeyMaterial(format!("order {} holds no secret", order.id))
            })?;
            let event = SwapEvent::SourceClaimed { secret: secret.clone() };
            order.check(&event)?;
            Self::check_leg(order, LegSide::Source, leg)?;

            let receipt = leg.claim(&secret)?;
            tracing::info!(order = %order.id, chain = %leg.chain(), tx = %receipt.reference(), "🔓 source claimed");
            order.apply(event)?;
            Ok(receipt)
        })
    }

    /// Taker withdraws the escrow with the secret revealed by the source claim.
    pub fn claim_counterparty(&self, id: &str, leg: &dyn LockLeg, secret: &Secret) -> Result<(SwapOrder, LegReceipt)> {
        self.with_order(id, |order| {
            let event = SwapEvent::CounterpartyClaimed { secret: secret.clone() };
            order.check(&event)?;
            Self::check_leg(order, LegSide::Counterparty, leg)?;

            let receipt = leg.claim(secret)?;
            tracing::info!(order = %order.id, chain = %leg.chain(), tx = %receipt.reference(), "🔓 counterparty claimed");
            order.apply(event)?;
            Ok(receipt)
        })
    }

    /// Reclaim one leg after its timelock and cancel the order.
    pub fn refund(&self, id: &str, side: LegSide, leg: &dyn LockLeg, clock: &ChainClock) -> Result<(SwapOrder, LegReceipt)> {
        self.with_order(id, |order| {
            let event = SwapEvent::TimelockExpired { leg: side, clock: *clock };
            order.check(&event)?;
            Self::check_leg(order, side, leg)?;
            let timelock = leg.refund_timelock();
            if !timelock.has_elapsed(clock) {
                return Err(timelock_not_elapsed(timelock, clock));
            }

            let receipt = leg.refund(clock)?;
            tracing::info!(order = %order.id, chain = %leg.chain(), tx = %receipt.reference(), "↩️ leg refunded");
            order.apply(event)?;
            Ok(receipt)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btc::{LockEncoding, LockingTransactionBuilder, SigningKey};
    use crate::escrow::simulated::SimulatedLedger;
    use crate::escrow::{EscrowClient, EvmEscrowClient};
    use crate::leg::{BitcoinLeg, EscrowLeg};
    use crate::order::store::MemoryOrderStore;
    use crate::swap::Timelock;
    use alloy_primitives::{Address, U256};
    use bitcoin::hashes::Hash;
    use bitcoin::secp256k1::{Secp256k1, SecretKey};
    use bitcoin::{Network, Txid};

    const START: u64 = 1_700_000_000;
    const TIP: u32 = 800;

    struct Fixture {
        engine: SwapEngine,
        ledger: SimulatedLedger,
        maker_escrow: Arc<dyn EscrowClient>,
        taker_escrow: Arc<dyn EscrowClient>,
        maker_btc: SigningKey,
        taker_btc: SigningKey,
    }

    fn fixture() -> Fixture {
        let secp = Secp256k1::new();
        let ledger = SimulatedLedger::new(START);
        let factory = Address::repeat_byte(0xfa);
        Fixture {
            engine: SwapEngine::new(Arc::new(MemoryOrderStore::new()), SwapConfig::default()),
            maker_escrow: Arc::new(EvmEscrowClient::new(factory, ledger.evm(Address::repeat_byte(0x0a)))),
            taker_escrow: Arc::new(EvmEscrowClient::new(factory, ledger.evm(Address::repeat_byte(0x0b)))),
            ledger,
            maker_btc: SigningKey::from_secret_key(&secp, SecretKey::from_slice(&[0x41; 32]).unwrap()),
            taker_btc: SigningKey::from_secret_key(&secp, SecretKey::from_slice(&[0x42; 32]).unwrap()),
        }
    }

    fn p2wpkh(key: &SigningKey) -> String {
        bitcoin::Address::p2wpkh(&key.public_key(), Network::Regtest)
            .unwrap()
            .to_string()
    }

    /// Drive an order up to SOURCE_LOCK_FUNDED. Returns the order id, the
    /// escrow handle and the bitcoin lock.
    fn funded(fx: &Fixture) -> (String, EscrowHandle, LockScript, FundedLock) {
        let order = fx
            .engine
            .create_order(
                LegTerms::new(Chain::Evm, "ETH", 1_000_000, "maker"),
                LegTerms::new(Chain::Bitcoin, "BTC", 100_000, "taker"),
            )
            .unwrap();
        fx.engine.fill(&order.id, fx.taker_escrow.caller()).unwrap();

        let imm = fx
            .engine
            .escrow_immutables(
                &order.id,
                fx.maker_escrow.caller(),
                fx.taker_escrow.caller(),
                Identity::ZERO,
                U256::from(1_000_000u64),
                U256::from(1_000u64),
            )
            .unwrap();
        let handle = fx.maker_escrow.create_escrow(&imm, false).unwrap();
        fx.engine.record_counterparty_escrow(&order.id, handle.clone()).unwrap();

        let lock = fx
            .engine
            .derive_lock_script(
                &order.id,
                &ScriptLockBuilder::new(Network::Regtest),
                &fx.maker_btc.public_key(),
                &fx.taker_btc.public_key(),
                TIP,
            )
            .unwrap();
        assert_eq!(lock.refund_timelock(), Timelock::BlockHeight(TIP + 144));

        let funding = FundedLock::new(Txid::from_inner([0x77; 32]), 1, 100_000, LockEncoding::Segwit);
        let order = fx
            .engine
            .record_source_funding(&order.id, &lock.locking_address, funding)
            .unwrap();
        assert_eq!(order.status, OrderStatus::SourceLockFunded);
        (order.id, handle, lock, funding)
    }

    fn bitcoin_leg(lock: &LockScript, funding: FundedLock, signer: &SigningKey) -> BitcoinLeg {
        BitcoinLeg {
            lock: lock.clone(),
            funded: funding,
            builder: LockingTransactionBuilder::new(signer.clone(), Network::Regtest),
            destination: p2wpkh(signer),
            fee: 500,
        }
    }

    #[test]
    fn test_happy_path_completes() {
        let fx = fixture();
        let (id, handle, lock, funding) = funded(&fx);

        let (order, receipt) = fx
            .engine
            .claim_source(&id, &bitcoin_leg(&lock, funding, &fx.maker_btc))
            .unwrap();
        assert_eq!(order.status, OrderStatus::SourceClaimed);
        assert!(matches!(receipt, LegReceipt::Bitcoin(_)));

        let secret = order.secret.clone().unwrap();
        let escrow = EscrowLeg::new(fx.taker_escrow.clone(), handle.clone()).unwrap();
        let (order, _) = fx.engine.claim_counterparty(&id, &escrow, &secret).unwrap();
        assert_eq!(order.status, OrderStatus::CounterpartyClaimed);

        let order = fx.engine.settle(&id).unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(fx.ledger.escrow_balance(&handle.locator), Some(U256::ZERO));
        assert_eq!(fx.engine.list_by_status(OrderStatus::Completed).unwrap().len(), 1);

        // The chain refuses a second withdrawal
        assert!(matches!(escrow.claim(&secret), Err(SwapError::RemoteRejected(_))));
        assert!(matches!(
            fx.engine.claim_counterparty(&id, &escrow, &secret),
            Err(SwapError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn test_wrong_secret_never_reaches_chain() {
        let fx = fixture();
        let (id, handle, lock, funding) = funded(&fx);
        let (order, _) = fx
            .engine
            .claim_source(&id, &bitcoin_leg(&lock, funding, &fx.maker_btc))
            .unwrap();
        assert_eq!(order.status, OrderStatus::SourceClaimed);

        let escrow = EscrowLeg::new(fx.taker_escrow.clone(), handle).unwrap();
        let sent = fx.ledger.sent_count();
        let err = fx
            .engine
            .claim_counterparty(&id, &escrow, &Secret::from_bytes([0xde; 32]))
            .unwrap_err();
        assert_eq!(err, SwapError::SecretMismatch);
        assert_eq!(fx.ledger.sent_count(), sent);
        assert_eq!(fx.engine.get(&id).unwrap().status, OrderStatus::SourceClaimed);
    }

    #[test]
    fn test_refund_before_timelock_rejected() {
        let fx = fixture();
        let (id, _, lock, funding) = funded(&fx);
        let leg = bitcoin_leg(&lock, funding, &fx.taker_btc);
        let deadline = TIP + 144;

        let err = fx
            .engine
            .refund(&id, LegSide::Source, &leg, &ChainClock::new(deadline - 1, START))
            .unwrap_err();
        assert_eq!(
            err,
            SwapError::TimelockNotReached {
                required: deadline as u64,
                requested: (deadline - 1) as u64
            }
        );
        assert_eq!(fx.engine.get(&id).unwrap().status, OrderStatus::SourceLockFunded);

        let (order, receipt) = fx
            .engine
            .refund(&id, LegSide::Source, &leg, &ChainClock::new(deadline, START))
            .unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        match receipt {
            LegReceipt::Bitcoin(raw) => assert_eq!(raw.tx.lock_time.0, deadline),
            other => panic!("unexpected receipt {:?}", other),
        }
    }

    #[test]
    fn test_escrow_refund_after_cancellation_period() {
        let fx = fixture();
        let (id, handle, _, _) = funded(&fx);
        let escrow = EscrowLeg::new(fx.maker_escrow.clone(), handle).unwrap();

        let early = ChainClock::new(TIP, START + 10);
        assert!(matches!(
            fx.engine.refund(&id, LegSide::Counterparty, &escrow, &early),
            Err(SwapError::CancellationPeriodNotElapsed { .. })
        ));

        fx.ledger.advance(3_600);
        let (order, _) = fx
            .engine
            .refund(&id, LegSide::Counterparty, &escrow, &ChainClock::new(TIP, START + 3_600))
            .unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert!(order.escrow.unwrap().cancelled);
    }

    #[test]
    fn test_claim_rejected_outside_source_lock_funded() {
        let fx = fixture();
        let order = fx
            .engine
            .create_order(
                LegTerms::new(Chain::Evm, "ETH", 1, "maker"),
                LegTerms::new(Chain::Bitcoin, "BTC", 1, "taker"),
            )
            .unwrap();
        let lock = ScriptLockBuilder::new(Network::Regtest)
            .build(&order.hashlock, &fx.maker_btc.public_key(), &fx.taker_btc.public_key(), 900)
            .unwrap();
        let funding = FundedLock::new(Txid::from_inner([1; 32]), 0, 10_000, LockEncoding::Segwit);

        let err = fx
            .engine
            .claim_source(&order.id, &bitcoin_leg(&lock, funding, &fx.maker_btc))
            .unwrap_err();
        assert!(matches!(
            err,
            SwapError::InvalidStateTransition {
                from: OrderStatus::Created,
                ..
            }
        ));
        assert_eq!(fx.engine.get(&order.id).unwrap().status, OrderStatus::Created);
    }

    #[test]
    fn test_foreign_leg_rejected() {
        let fx = fixture();
        let (id, _, _, funding) = funded(&fx);
        let foreign = ScriptLockBuilder::new(Network::Regtest)
            .build(
                &Secret::from_bytes([9; 32]).hashlock(),
                &fx.maker_btc.public_key(),
                &fx.taker_btc.public_key(),
                900,
            )
            .unwrap();
        assert!(matches!(
            fx.engine.claim_source(&id, &bitcoin_leg(&foreign, funding, &fx.maker_btc)),
            Err(SwapError::HashlockMismatch { .. })
        ));
    }

    #[test]
    fn test_refund_rejects_leg_of_other_side() {
        let fx = fixture();
        let (id, handle, lock, funding) = funded(&fx);
        let refunder = bitcoin_leg(&lock, funding, &fx.taker_btc);
        let past_both = ChainClock::new(TIP + 144, START + 3_600);
        let before = fx.engine.get(&id).unwrap();

        let err = fx
            .engine
            .refund(&id, LegSide::Counterparty, &refunder, &past_both)
            .unwrap_err();
        assert!(matches!(err, SwapError::InvalidAddress(_)));
        assert_eq!(fx.engine.get(&id).unwrap(), before);
        assert!(!fx.engine.get(&id).unwrap().escrow.unwrap().cancelled);

        // An escrow leg cannot stand in for the bitcoin lock either
        fx.ledger.advance(3_600);
        let escrow = EscrowLeg::new(fx.maker_escrow.clone(), handle).unwrap();
        let sent = fx.ledger.sent_count();
        assert!(matches!(
            fx.engine.refund(&id, LegSide::Source, &escrow, &past_both),
            Err(SwapError::InvalidAddress(_))
        ));
        assert_eq!(fx.ledger.sent_count(), sent);
        assert_eq!(fx.engine.get(&id).unwrap().status, OrderStatus::SourceLockFunded);

        // The matching pairing still goes through
        let (order, _) = fx
            .engine
            .refund(&id, LegSide::Counterparty, &escrow, &past_both)
            .unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert!(order.escrow.unwrap().cancelled);
    }

    #[test]
    fn test_claim_rejects_unrecorded_escrow() {
        let fx = fixture();
        let (id, handle, lock, funding) = funded(&fx);
        let (order, _) = fx
            .engine
            .claim_source(&id, &bitcoin_leg(&lock, funding, &fx.maker_btc))
            .unwrap();
        let secret = order.secret.unwrap();

        let mut elsewhere = handle;
        elsewhere.locator = Address::repeat_byte(0x99).to_string();
        let escrow = EscrowLeg::new(fx.taker_escrow.clone(), elsewhere).unwrap();
        let sent = fx.ledger.sent_count();
        assert!(matches!(
            fx.engine.claim_counterparty(&id, &escrow, &secret),
            Err(SwapError::InvalidAddress(_))
        ));
        assert_eq!(fx.ledger.sent_count(), sent);
        assert_eq!(fx.engine.get(&id).unwrap().status, OrderStatus::SourceClaimed);
    }

    #[test]
    fn test_order_locks_released() {
        let fx = fixture();
        assert!(matches!(
            fx.engine.apply("nope", SwapEvent::Settle),
            Err(SwapError::OrderNotFound(_))
        ));
        assert!(matches!(
            fx.engine.fill("nope", Identity::ZERO),
            Err(SwapError::OrderNotFound(_))
        ));
        assert_eq!(fx.engine.tracked_locks(), 0);

        let (id, _, _, _) = funded(&fx);
        assert!(fx.engine.settle(&id).is_err());
        assert_eq!(fx.engine.tracked_locks(), 0);
    }

    #[test]
    fn test_taker_order_has_no_secret() {
        let fx = fixture();
        let maker = fx
            .engine
            .create_order(
                LegTerms::new(Chain::Starknet, "STRK", 5, "maker"),
                LegTerms::new(Chain::Bitcoin, "BTC", 5, "taker"),
            )
            .unwrap();
        let mirror = fx
            .engine
            .track_order(maker.maker_leg.clone(), maker.taker_leg.clone(), maker.hashlock)
            .unwrap();
        assert!(mirror.secret.is_none());
        assert_eq!(mirror.hashlock, maker.hashlock);
        assert_ne!(mirror.id, maker.id);
        assert_eq!(fx.engine.list().unwrap().len(), 2);
        assert!(matches!(fx.engine.get("nope"), Err(SwapError::OrderNotFound(_))));
    }
}
