// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 AtomicX Contributors

//! HTLC hash lock primitives (SHA-256 on every leg)
//!
//! The bitcoin script checks `OP_SHA256`, and the account-chain escrows are
//! deployed with the same digest, so one hash function serves every leg.
//! The hash is always taken over the raw secret bytes, never over a hex or
//! `0x`-prefixed text form.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::errors::{Result, SwapError};

/// Length of a secret preimage in bytes
pub const SECRET_LEN: usize = 32;

/// Length of a hashlock digest in bytes
pub const HASHLOCK_LEN: usize = 32;

/// Compute the SHA-256 hash lock of a preimage.
pub fn htlc_hash_lock(preimage: &[u8]) -> [u8; HASHLOCK_LEN] {
    let digest = Sha256::digest(preimage);
    let mut result = [0u8; HASHLOCK_LEN];
    result.copy_from_slice(&digest);
    result
}

/// Lowercase hex of [`htlc_hash_lock`].
pub fn htlc_hash_lock_hex(preimage: &[u8]) -> String {
    hex::encode(htlc_hash_lock(preimage))
}

/// Strip a leading chain-notation prefix (`0x` / `0X`).
pub fn strip_hex_prefix(input: &str) -> &str {
    let trimmed = input.trim();
    trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed)
}

fn decode_fixed_32(input: &str) -> std::result::Result<[u8; 32], String> {
    let body = strip_hex_prefix(input);
    if body.len() != 64 {
        return Err(format!("expected 64 hex chars, got {}", body.len()));
    }
    let bytes = hex::decode(body).map_err(|e| e.to_string())?;
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(out)
}

// ============================================================================
// SECRET
// ============================================================================

/// Swap preimage. Held only by the maker until it is revealed on-chain.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret([u8; SECRET_LEN]);

impl Secret {
    pub fn from_bytes(bytes: [u8; SECRET_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a revealed secret from hex (optionally `0x`-prefixed).
    pub fn from_hex(input: &str) -> Result<Self> {
        decode_fixed_32(input)
            .map(Self)
            .map_err(|e| SwapError::InvalidKeyMaterial(format!("secret: {}", e)))
    }

    pub fn as_bytes(&self) -> &[u8; SECRET_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The hashlock this secret opens.
    pub fn hashlock(&self) -> Hashlock {
        Hashlock(htlc_hash_lock(&self.0))
    }

    /// True when `H(secret)` equals `hashlock`.
    pub fn opens(&self, hashlock: &Hashlock) -> bool {
        self.hashlock() == *hashlock
    }
}

// Secrets never reach logs.
impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Secret::from_hex(&raw).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// HASHLOCK
// ============================================================================

/// Public commitment `SHA256(secret)` shared verbatim by every leg.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hashlock([u8; HASHLOCK_LEN]);

impl Hashlock {
    pub fn from_bytes(bytes: [u8; HASHLOCK_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HASHLOCK_LEN] {
        &self.0
    }

    /// `0x`-prefixed form used by account chains.
    pub fn to_prefixed_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl FromStr for Hashlock {
    type Err = SwapError;

    /// Accepts 64 hex chars with or without a `0x` prefix, any case.
    fn from_str(s: &str) -> Result<Self> {
        decode_fixed_32(s)
            .map(Self)
            .map_err(SwapError::InvalidHashlockEncoding)
    }
}

impl fmt::Display for Hashlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Hashlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hashlock({})", hex::encode(self.0))
    }
}

impl Serialize for Hashlock {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Hashlock {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// SECRET COMMITMENT
// ============================================================================

/// A freshly drawn secret and its hashlock. Generate exactly one per order.
#[derive(Debug, Clone)]
pub struct SecretCommitment {
    pub secret: Secret,
    pub hashlock: Hashlock,
}

impl SecretCommitment {
    /// Draw 32 bytes from the OS entropy source and commit to them.
    ///
    /// Entropy failure is fatal: `OsRng` panics rather than returning weak bytes.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SECRET_LEN];
        OsRng.fill_bytes(&mut bytes);
        let secret = Secret(bytes);
        let hashlock = secret.hashlock();
        tracing::debug!(%hashlock, "generated swap secret");
        Self { secret, hashlock }
    }

    pub fn into_parts(self) -> (Secret, Hashlock) {
        (self.secret, self.hashlock)
    }
}
