// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 AtomicX Contributors

//! Claim and refund spends of a funded HTLC lock
//!
//! Claim (hashlock branch), segwit witness:
//!   `<sig> <secret> 0x01 <redeem_script>`
//! Refund (timelock branch), segwit witness:
//!   `<sig> <empty> <redeem_script>`
//!
//! Legacy P2SH funding gets the same items in `scriptSig`. Each builder
//! returns a fully signed transaction; broadcasting is the caller's job.

use bitcoin::blockdata::opcodes;
use bitcoin::blockdata::script::{Builder, Script};
use bitcoin::consensus::encode::serialize_hex;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{All, Message, Secp256k1};
use bitcoin::util::sighash::SighashCache;
use bitcoin::{
    Address, EcdsaSig, EcdsaSighashType, Network, OutPoint, PackedLockTime, PublicKey, Sequence,
    Transaction, TxIn, TxOut, Txid, Witness,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::keys::SigningKey;
use super::script::{LockEncoding, LockScript};
use crate::errors::{Result, SwapError};
use crate::swap::timeouts::LOCKTIME_THRESHOLD;
use crate::swap::Secret;

/// Final sequence for claims (no locktime semantics needed)
const SEQUENCE_FINAL: Sequence = Sequence(0xffff_ffff);

/// Non-final sequence so `nLockTime` is enforced for refunds
const SEQUENCE_LOCKTIME: Sequence = Sequence(0xffff_fffe);

/// A confirmed output paying to a lock's address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundedLock {
    pub outpoint: OutPoint,
    /// Output value in satoshis
    pub value: u64,
    pub encoding: LockEncoding,
}

impl FundedLock {
    pub fn new(txid: Txid, vout: u32, value: u64, encoding: LockEncoding) -> Self {
        Self {
            outpoint: OutPoint::new(txid, vout),
            value,
            encoding,
        }
    }
}

/// Signed transaction ready for broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransaction {
    pub txid: Txid,
    /// Consensus-encoded hex
    pub hex: String,
    pub tx: Transaction,
}

impl RawTransaction {
    fn from_tx(tx: Transaction) -> Self {
        Self {
            txid: tx.txid(),
            hex: serialize_hex(&tx),
            tx,
        }
    }
}

/// Which branch of the script a spend takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Branch<'a> {
    Claim(&'a Secret),
    Refund,
}

/// Builds signed claim/refund spends with one designated key.
pub struct LockingTransactionBuilder {
    secp: Secp256k1<All>,
    signer: SigningKey,
    network: Network,
}

impl LockingTransactionBuilder {
    pub fn new(signer: SigningKey, network: Network) -> Self {
        Self {
            secp: Secp256k1::new(),
            signer,
            network,
        }
    }

    pub fn signer_public_key(&self) -> PublicKey {
        self.signer.public_key()
    }

    /// Spend through the hashlock branch, revealing `secret`.
    pub fn build_claim(
        &self,
        lock: &LockScript,
        funded: &FundedLock,
        secret: &Secret,
        destination: &str,
        fee: u64,
    ) -> Result<RawTransaction> {
        if !secret.opens(&lock.hashlock) {
            return Err(SwapError::SecretMismatch);
        }
        self.ensure_signer(&lock.recipient_key)?;
        let output = self.payout(funded, destination, fee)?;

        let tx = self.sign_spend(
            lock,
            funded,
            output,
            PackedLockTime::ZERO,
            SEQUENCE_FINAL,
            Branch::Claim(secret),
        )?;
        tracing::info!(
            txid = %tx.txid,
            outpoint = %funded.outpoint,
            "🔓 built HTLC claim ({} sats, fee {})",
            funded.value - fee,
            fee
        );
        Ok(tx)
    }

    /// Spend through the timelock branch. `lock_time` becomes `nLockTime`
    /// and must be at or past the script's refund height.
    pub fn build_refund(
        &self,
        lock: &LockScript,
        funded: &FundedLock,
        destination: &str,
        fee: u64,
        lock_time: u32,
    ) -> Result<RawTransaction> {
        let script_is_height = lock.timelock_height < LOCKTIME_THRESHOLD;
        if (lock_time < LOCKTIME_THRESHOLD) != script_is_height {
            return Err(SwapError::InvalidTimelocks(format!(
                "locktime {} and script timelock {} use different units",
                lock_time, lock.timelock_height
            )));
        }
        if lock_time < lock.timelock_height {
            return Err(SwapError::TimelockNotReached {
                required: lock.timelock_height as u64,
                requested: lock_time as u64,
            });
        }
        self.ensure_signer(&lock.refund_key)?;
        let output = self.payout(funded, destination, fee)?;

        let tx = self.sign_spend(
            lock,
            funded,
            output,
            PackedLockTime(lock_time),
            SEQUENCE_LOCKTIME,
            Branch::Refund,
        )?;
        tracing::info!(
            txid = %tx.txid,
            outpoint = %funded.outpoint,
            lock_time,
            "↩️ built HTLC refund"
        );
        Ok(tx)
    }

    fn ensure_signer(&self, designated: &PublicKey) -> Result<()> {
        let actual = self.signer.public_key();
        if actual != *designated {
            return Err(SwapError::Unauthorized {
                expected: designated.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(())
    }

    fn payout(&self, funded: &FundedLock, destination: &str, fee: u64) -> Result<TxOut> {
        if funded.value <= fee {
            return Err(SwapError::InsufficientFunds {
                amount: funded.value,
                fee,
            });
        }
        let address = Address::from_str(destination.trim())
            .map_err(|e| SwapError::InvalidAddress(format!("{}: {}", destination, e)))?;
        if !address.is_valid_for_network(self.network) {
            return Err(SwapError::InvalidAddress(format!(
                "{} is not a {} address",
                destination, self.network
            )));
        }
        Ok(TxOut {
            value: funded.value - fee,
            script_pubkey: address.script_pubkey(),
        })
    }

    fn sign_spend(
        &self,
        lock: &LockScript,
        funded: &FundedLock,
        output: TxOut,
        lock_time: PackedLockTime,
        sequence: Sequence,
        branch: Branch<'_>,
    ) -> Result<RawTransaction> {
        let mut tx = Transaction {
            version: 2,
            lock_time,
            input: vec![TxIn {
                previous_output: funded.outpoint,
                script_sig: Script::new(),
                sequence,
                witness: Witness::default(),
            }],
            output: vec![output],
        };

        let signature = self.signature(&tx, lock, funded)?;
        let mut items: Vec<Vec<u8>> = vec![signature];
        match branch {
            Branch::Claim(secret) => {
                items.push(secret.as_bytes().to_vec());
                items.push(vec![0x01]);
            }
            Branch::Refund => items.push(Vec::new()),
        }

        match funded.encoding {
            LockEncoding::Segwit => {
                items.push(lock.redeem_script.as_bytes().to_vec());
                tx.input[0].witness = Witness::from_vec(items);
            }
            LockEncoding::Legacy => {
                tx.input[0].script_sig = legacy_script_sig(&items, &lock.redeem_script);
            }
        }

        Ok(RawTransaction::from_tx(tx))
    }

    fn signature(&self, tx: &Transaction, lock: &LockScript, funded: &FundedLock) -> Result<Vec<u8>> {
        let sighash = spend_sighash(tx, lock, funded)?;
        let message = Message::from_slice(&sighash)
            .map_err(|e| SwapError::Signing(format!("sighash message: {}", e)))?;
        let sig = self.secp.sign_ecdsa(&message, self.signer.secret_key());
        Ok(EcdsaSig {
            sig,
            hash_ty: EcdsaSighashType::All,
        }
        .to_vec())
    }
}

/// SIGHASH_ALL digest of input 0 spending `funded`.
pub fn spend_sighash(tx: &Transaction, lock: &LockScript, funded: &FundedLock) -> Result<[u8; 32]> {
    let digest: [u8; 32] = match funded.encoding {
        LockEncoding::Segwit => {
            let mut cache = SighashCache::new(tx);
            let hash = cache
                .segwit_signature_hash(0, &lock.redeem_script, funded.value, EcdsaSighashType::All)
                .map_err(|e| SwapError::Signing(format!("segwit sighash: {}", e)))?;
            hash.into_inner()
        }
        LockEncoding::Legacy => tx
            .signature_hash(0, &lock.redeem_script, EcdsaSighashType::All.to_u32())
            .into_inner(),
    };
    Ok(digest)
}

/// P2SH unlocking script: witness-style items pushed in order, then the redeem script.
fn legacy_script_sig(items: &[Vec<u8>], redeem_script: &Script) -> Script {
    let mut builder = Builder::new();
    for item in items {
        builder = match item.as_slice() {
            [] => builder.push_opcode(opcodes::OP_FALSE),
            [0x01] => builder.push_opcode(opcodes::all::OP_PUSHNUM_1),
            bytes => builder.push_slice(bytes),
        };
    }
    builder.push_slice(redeem_script.as_bytes()).into_script()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btc::script::ScriptLockBuilder;
    use bitcoin::secp256k1::{ecdsa::Signature, SecretKey};

    struct Fixture {
        secp: Secp256k1<All>,
        recipient: SigningKey,
        refund: SigningKey,
        secret: Secret,
        lock: LockScript,
    }

    fn fixture() -> Fixture {
        let secp = Secp256k1::new();
        let recipient = SigningKey::from_secret_key(&secp, SecretKey::from_slice(&[0x21; 32]).unwrap());
        let refund = SigningKey::from_secret_key(&secp, SecretKey::from_slice(&[0x42; 32]).unwrap());
        let secret = Secret::from_bytes([0x07; 32]);
        let lock = ScriptLockBuilder::new(Network::Testnet)
            .build(&secret.hashlock(), &recipient.public_key(), &refund.public_key(), 2_500_000)
            .unwrap();
        Fixture {
            secp,
            recipient,
            refund,
            secret,
            lock,
        }
    }

    fn funded(encoding: LockEncoding) -> FundedLock {
        FundedLock::new(Txid::from_inner([0xaa; 32]), 1, 100_000, encoding)
    }

    fn destination() -> String {
        let pk = SigningKey::from_secret_key(&Secp256k1::new(), SecretKey::from_slice(&[0x55; 32]).unwrap())
            .public_key();
        Address::p2wpkh(&pk, Network::Testnet).unwrap().to_string()
    }

    fn verify(fx: &Fixture, raw: &RawTransaction, funded: &FundedLock, sig_bytes: &[u8], key: &PublicKey) {
        let (der, hash_ty) = sig_bytes.split_at(sig_bytes.len() - 1);
        assert_eq!(hash_ty, &[0x01]);
        let sig = Signature::from_der(der).unwrap();
        let sighash = spend_sighash(&raw.tx, &fx.lock, funded).unwrap();
        let msg = Message::from_slice(&sighash).unwrap();
        fx.secp.verify_ecdsa(&msg, &sig, &key.inner).unwrap();
    }

    #[test]
    fn test_claim_witness_layout_and_signature() {
        let fx = fixture();
        let funded = funded(LockEncoding::Segwit);
        let builder = LockingTransactionBuilder::new(fx.recipient.clone(), Network::Testnet);
        let raw = builder
            .build_claim(&fx.lock, &funded, &fx.secret, &destination(), 1_000)
            .unwrap();

        let witness = raw.tx.input[0].witness.to_vec();
        assert_eq!(witness.len(), 4);
        assert_eq!(witness[1], fx.secret.as_bytes().to_vec());
        assert_eq!(witness[2], vec![0x01]);
        assert_eq!(witness[3], fx.lock.redeem_script.as_bytes().to_vec());
        assert_eq!(raw.tx.output[0].value, 99_000);
        assert_eq!(raw.tx.lock_time, PackedLockTime::ZERO);
        assert!(raw.tx.input[0].script_sig.is_empty());
        assert_eq!(raw.txid, raw.tx.txid());

        verify(&fx, &raw, &funded, &witness[0], &fx.recipient.public_key());
    }

    #[test]
    fn test_claim_wrong_secret() {
        let fx = fixture();
        let builder = LockingTransactionBuilder::new(fx.recipient.clone(), Network::Testnet);
        let err = builder
            .build_claim(
                &fx.lock,
                &funded(LockEncoding::Segwit),
                &Secret::from_bytes([0x08; 32]),
                &destination(),
                1_000,
            )
            .unwrap_err();
        assert_eq!(err, SwapError::SecretMismatch);
    }

    #[test]
    fn test_claim_requires_recipient_key() {
        let fx = fixture();
        let builder = LockingTransactionBuilder::new(fx.refund.clone(), Network::Testnet);
        let err = builder
            .build_claim(&fx.lock, &funded(LockEncoding::Segwit), &fx.secret, &destination(), 1_000)
            .unwrap_err();
        assert!(matches!(err, SwapError::Unauthorized { .. }));
    }

    #[test]
    fn test_fee_must_be_below_amount() {
        let fx = fixture();
        let builder = LockingTransactionBuilder::new(fx.recipient.clone(), Network::Testnet);
        let err = builder
            .build_claim(&fx.lock, &funded(LockEncoding::Segwit), &fx.secret, &destination(), 100_000)
            .unwrap_err();
        assert_eq!(
            err,
            SwapError::InsufficientFunds {
                amount: 100_000,
                fee: 100_000
            }
        );
    }

    #[test]
    fn test_refund_locktime_and_sequence() {
        let fx = fixture();
        let funded = funded(LockEncoding::Segwit);
        let builder = LockingTransactionBuilder::new(fx.refund.clone(), Network::Testnet);
        let raw = builder
            .build_refund(&fx.lock, &funded, &destination(), 500, 2_500_010)
            .unwrap();

        assert_eq!(raw.tx.lock_time, PackedLockTime(2_500_010));
        assert_eq!(raw.tx.input[0].sequence, Sequence(0xffff_fffe));
        let witness = raw.tx.input[0].witness.to_vec();
        assert_eq!(witness.len(), 3);
        assert!(witness[1].is_empty());
        verify(&fx, &raw, &funded, &witness[0], &fx.refund.public_key());
    }

    #[test]
    fn test_refund_before_timelock() {
        let fx = fixture();
        let builder = LockingTransactionBuilder::new(fx.refund.clone(), Network::Testnet);
        let err = builder
            .build_refund(&fx.lock, &funded(LockEncoding::Segwit), &destination(), 500, 2_499_999)
            .unwrap_err();
        assert_eq!(
            err,
            SwapError::TimelockNotReached {
                required: 2_500_000,
                requested: 2_499_999
            }
        );
    }

    #[test]
    fn test_refund_rejects_timestamp_locktime() {
        let fx = fixture();
        let builder = LockingTransactionBuilder::new(fx.refund.clone(), Network::Testnet);
        let err = builder
            .build_refund(&fx.lock, &funded(LockEncoding::Segwit), &destination(), 500, 1_700_000_000)
            .unwrap_err();
        assert!(matches!(err, SwapError::InvalidTimelocks(_)));
    }

    #[test]
    fn test_legacy_claim_uses_script_sig() {
        let fx = fixture();
        let funded = funded(LockEncoding::Legacy);
        let builder = LockingTransactionBuilder::new(fx.recipient.clone(), Network::Testnet);
        let raw = builder
            .build_claim(&fx.lock, &funded, &fx.secret, &destination(), 1_000)
            .unwrap();
        assert!(raw.tx.input[0].witness.is_empty());
        let script_sig = raw.tx.input[0].script_sig.as_bytes();
        assert!(script_sig.ends_with(fx.lock.redeem_script.as_bytes()));
        assert!(script_sig
            .windows(32)
            .any(|w| w == fx.secret.as_bytes().as_slice()));
    }

    #[test]
    fn test_destination_network_checked() {
        let fx = fixture();
        let builder = LockingTransactionBuilder::new(fx.recipient.clone(), Network::Testnet);
        let mainnet = Address::p2wpkh(&fx.recipient.public_key(), Network::Bitcoin)
            .unwrap()
            .to_string();
        let err = builder
            .build_claim(&fx.lock, &funded(LockEncoding::Segwit), &fx.secret, &mainnet, 1_000)
            .unwrap_err();
        assert!(matches!(err, SwapError::InvalidAddress(_)));

        let err = builder
            .build_claim(&fx.lock, &funded(LockEncoding::Segwit), &fx.secret, "not-an-address", 1_000)
            .unwrap_err();
        assert!(matches!(err, SwapError::InvalidAddress(_)));
    }
}
