// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 AtomicX Contributors

//! Bitcoin leg: HTLC script locks and their claim/refund spends

pub mod keys;
pub mod script;
pub mod tx;

pub use keys::{parse_public_key, SigningKey};
pub use script::{htlc_redeem_script, LockEncoding, LockScript, ScriptLockBuilder};
pub use tx::{spend_sighash, FundedLock, LockingTransactionBuilder, RawTransaction};
