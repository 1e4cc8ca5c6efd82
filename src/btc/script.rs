// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 AtomicX Contributors

//! HTLC locking script and address derivation
//!
//! Script layout (byte-exact, observers re-derive the address from it):
//!
//! ```text
//! OP_IF
//!     OP_SHA256 <hashlock> OP_EQUALVERIFY <recipient_pubkey> OP_CHECKSIG
//! OP_ELSE
//!     <locktime> OP_CHECKLOCKTIMEVERIFY OP_DROP <refund_pubkey> OP_CHECKSIG
//! OP_ENDIF
//! ```
//!
//! The same script is published under two encodings: P2WSH (primary) and
//! P2SH (legacy), because the funder may not know which one the
//! counterparty's wallet pays to.

use bitcoin::blockdata::opcodes;
use bitcoin::blockdata::script::{Builder, Script};
use bitcoin::{Address, Network, PublicKey};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::keys::parse_public_key;
use crate::errors::{Result, SwapError};
use crate::swap::{Hashlock, Timelock};

/// Output encoding of a funded lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockEncoding {
    /// Pay-to-witness-script-hash (segregated witness)
    Segwit,
    /// Pay-to-script-hash (legacy)
    Legacy,
}

/// A derived bitcoin lock. Pure function of its inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockScript {
    /// P2WSH address (primary)
    pub locking_address: String,
    /// P2SH address committing to the same script
    pub alternate_address: String,
    pub redeem_script: Script,
    pub timelock_height: u32,
    pub hashlock: Hashlock,
    pub recipient_key: PublicKey,
    pub refund_key: PublicKey,
    pub network: Network,
}

impl LockScript {
    pub fn address(&self, encoding: LockEncoding) -> &str {
        match encoding {
            LockEncoding::Segwit => &self.locking_address,
            LockEncoding::Legacy => &self.alternate_address,
        }
    }

    /// Which encoding, if any, `address` corresponds to.
    pub fn encoding_of(&self, address: &str) -> Option<LockEncoding> {
        let address = address.trim();
        if address.eq_ignore_ascii_case(&self.locking_address) {
            Some(LockEncoding::Segwit)
        } else if address == self.alternate_address {
            Some(LockEncoding::Legacy)
        } else {
            None
        }
    }

    /// Output script a funding transaction must pay to.
    pub fn script_pubkey(&self, encoding: LockEncoding) -> Script {
        match encoding {
            LockEncoding::Segwit => self.redeem_script.to_v0_p2wsh(),
            LockEncoding::Legacy => self.redeem_script.to_p2sh(),
        }
    }

    pub fn refund_timelock(&self) -> Timelock {
        Timelock::BlockHeight(self.timelock_height)
    }

    pub fn redeem_script_hex(&self) -> String {
        hex::encode(self.redeem_script.as_bytes())
    }
}

/// Builds HTLC locks for one bitcoin network.
#[derive(Debug, Clone, Copy)]
pub struct ScriptLockBuilder {
    network: Network,
}

impl ScriptLockBuilder {
    pub fn new(network: Network) -> Self {
        Self { network }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Build from already-parsed material.
    pub fn build(
        &self,
        hashlock: &Hashlock,
        recipient_key: &PublicKey,
        refund_key: &PublicKey,
        timelock_height: u32,
    ) -> Result<LockScript> {
        for (role, key) in [("recipient", recipient_key), ("refund", refund_key)] {
            if !key.compressed {
                return Err(SwapError::InvalidKeyMaterial(format!(
                    "{} key must be compressed",
                    role
                )));
            }
        }

        let redeem_script = htlc_redeem_script(hashlock, recipient_key, refund_key, timelock_height);
        let segwit = Address::p2wsh(&redeem_script, self.network);
        let legacy = Address::p2sh(&redeem_script, self.network)
            .map_err(|e| SwapError::InvalidKeyMaterial(format!("p2sh derivation: {}", e)))?;

        tracing::debug!(
            %hashlock,
            timelock_height,
            "🔒 derived HTLC lock {} (alt {})",
            segwit,
            legacy
        );

        Ok(LockScript {
            locking_address: segwit.to_string(),
            alternate_address: legacy.to_string(),
            redeem_script,
            timelock_height,
            hashlock: *hashlock,
            recipient_key: *recipient_key,
            refund_key: *refund_key,
            network: self.network,
        })
    }

    /// Build from wire encodings: hashlock hex (a `0x` prefix is stripped)
    /// and hex compressed public keys.
    pub fn build_from_hex(
        &self,
        hashlock: &str,
        recipient_key: &str,
        refund_key: &str,
        timelock_height: u32,
    ) -> Result<LockScript> {
        let hashlock = Hashlock::from_str(hashlock)?;
        let recipient = parse_public_key(recipient_key)?;
        let refund = parse_public_key(refund_key)?;
        self.build(&hashlock, &recipient, &refund, timelock_height)
    }
}

/// Assemble the two-branch HTLC redeem script.
pub fn htlc_redeem_script(
    hashlock: &Hashlock,
    recipient_key: &PublicKey,
    refund_key: &PublicKey,
    timelock_height: u32,
) -> Script {
    Builder::new()
        .push_opcode(opcodes::all::OP_IF)
        .push_opcode(opcodes::all::OP_SHA256)
        .push_slice(hashlock.as_bytes())
        .push_opcode(opcodes::all::OP_EQUALVERIFY)
        .push_key(recipient_key)
        .push_opcode(opcodes::all::OP_CHECKSIG)
        .push_opcode(opcodes::all::OP_ELSE)
        .push_int(timelock_height as i64)
        .push_opcode(opcodes::all::OP_CLTV)
        .push_opcode(opcodes::all::OP_DROP)
        .push_key(refund_key)
        .push_opcode(opcodes::all::OP_CHECKSIG)
        .push_opcode(opcodes::all::OP_ENDIF)
        .into_script()
}
