// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 AtomicX Contributors

// Key material for the bitcoin leg.
// Public keys must be compressed (segwit); private keys arrive as raw hex or WIF.

use bitcoin::secp256k1::{All, Secp256k1, SecretKey};
use bitcoin::{Network, PrivateKey, PublicKey};

use crate::errors::{Result, SwapError};
use crate::swap::strip_hex_prefix;

/// Compressed secp256k1 public key length
pub const COMPRESSED_PUBKEY_LEN: usize = 33;

/// Parse a hex compressed public key.
pub fn parse_public_key(input: &str) -> Result<PublicKey> {
    let bytes = hex::decode(strip_hex_prefix(input))
        .map_err(|e| SwapError::InvalidKeyMaterial(format!("public key hex: {}", e)))?;
    public_key_from_slice(&bytes)
}

/// Validate raw public key bytes: exactly 33 bytes and on the curve.
pub fn public_key_from_slice(bytes: &[u8]) -> Result<PublicKey> {
    if bytes.len() != COMPRESSED_PUBKEY_LEN {
        return Err(SwapError::InvalidKeyMaterial(format!(
            "public key must be {} bytes compressed, got {}",
            COMPRESSED_PUBKEY_LEN,
            bytes.len()
        )));
    }
    PublicKey::from_slice(bytes)
        .map_err(|e| SwapError::InvalidKeyMaterial(format!("invalid secp256k1 pubkey: {}", e)))
}

/// Single designated signing key for claim or refund spends.
#[derive(Clone)]
pub struct SigningKey {
    secret: SecretKey,
    public: PublicKey,
}

impl SigningKey {
    pub fn from_secret_key(secp: &Secp256k1<All>, secret: SecretKey) -> Self {
        let public = PublicKey::new(bitcoin::secp256k1::PublicKey::from_secret_key(secp, &secret));
        Self { secret, public }
    }

    /// 32-byte private key as hex (the original env format), `0x` optional.
    pub fn from_hex(secp: &Secp256k1<All>, input: &str) -> Result<Self> {
        let bytes = hex::decode(strip_hex_prefix(input))
            .map_err(|e| SwapError::InvalidKeyMaterial(format!("private key hex: {}", e)))?;
        if bytes.len() != 32 {
            return Err(SwapError::InvalidKeyMaterial(format!(
                "private key must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        let secret = SecretKey::from_slice(&bytes)
            .map_err(|e| SwapError::InvalidKeyMaterial(format!("invalid secret key: {}", e)))?;
        Ok(Self::from_secret_key(secp, secret))
    }

    /// WIF key; must be compressed and match `network`'s WIF family.
    pub fn from_wif(secp: &Secp256k1<All>, wif: &str, network: Network) -> Result<Self> {
        let key = PrivateKey::from_wif(wif.trim())
            .map_err(|e| SwapError::InvalidKeyMaterial(format!("invalid WIF: {}", e)))?;
        if !key.compressed {
            return Err(SwapError::InvalidKeyMaterial(
                "uncompressed WIF keys cannot sign segwit spends".into(),
            ));
        }
        let mainnet_key = key.network == Network::Bitcoin;
        if mainnet_key != (network == Network::Bitcoin) {
            return Err(SwapError::InvalidKeyMaterial(format!(
                "WIF key for {} used on {}",
                key.network, network
            )));
        }
        Ok(Self::from_secret_key(secp, key.inner))
    }

    /// Accept either encoding.
    pub fn parse(secp: &Secp256k1<All>, input: &str, network: Network) -> Result<Self> {
        let body = strip_hex_prefix(input);
        if body.len() == 64 && body.chars().all(|c| c.is_ascii_hexdigit()) {
            Self::from_hex(secp, body)
        } else {
            Self::from_wif(secp, input, network)
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    pub(crate) fn secret_key(&self) -> &SecretKey {
        &self.secret
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKey({})", self.public)
    }
}
