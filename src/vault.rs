// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Maintainers

//! # Key Vault
//!
//! Deposit-address key generation and at-rest encryption of the generated
//! private keys. Every deposit wallet gets a fresh secp256k1 keypair; the
//! private key is sealed with AES-256-GCM before it touches the ledger
//! database and is only unsealed again by the sweep orchestrator.
//!
//! ## Sealed format
//!
//! Ciphertexts are stored as a colon-delimited hex triple:
//!
//! ```text
//! <iv>:<tag>:<ciphertext>
//! ```
//!
//! where `iv` is the random 12-byte GCM nonce, `tag` is the 16-byte
//! authentication tag, and `ciphertext` is the encrypted key material.
//!
//! ## Key derivation
//!
//! The AES key is `SHA-256(WALLET_ENC_SECRET)`. When the secret is not
//! configured the vault still constructs, but every encrypt and decrypt
//! call fails with [`VaultError::MissingSecret`] so the condition surfaces
//! at the operation that needed it rather than at startup.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use sha2::{Digest, Sha256};

use crate::config;

/// GCM nonce length in bytes. The sealed format stores it as the first field.
const IV_LEN: usize = 12;

/// GCM authentication tag length in bytes, stored as the second field.
const TAG_LEN: usize = 16;

// ===== Errors =====

/// Errors produced by vault operations.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// The operator secret (`WALLET_ENC_SECRET`) is not set, so no AES key
    /// can be derived.
    #[error("wallet encryption secret is not configured")]
    MissingSecret,

    /// Encryption failed inside the cipher.
    #[error("encryption failed: {0}")]
    Encrypt(String),

    /// The stored blob does not match the `iv:tag:ciphertext` layout.
    #[error("sealed key is malformed: {0}")]
    Malformed(String),

    /// Authentication failed. The blob was tampered with or sealed under a
    /// different secret.
    #[error("sealed key could not be decrypted")]
    Decrypt,
}

// ===== Key generation =====

/// A freshly generated deposit keypair.
///
/// The private key is plaintext hex at this point; callers must seal it via
/// [`KeyVault::encrypt`] before persisting.
#[derive(Debug, Clone)]
pub struct GeneratedWallet {
    /// EIP-55 style `0x`-prefixed address (lowercase hex).
    pub address: String,
    /// 32-byte private key as unprefixed hex.
    pub private_key_hex: String,
}

/// Generates a new secp256k1 keypair and derives its Ethereum-style address.
///
/// The address is the last 20 bytes of the Keccak-256 hash of the
/// uncompressed public key (without the `0x04` prefix byte).
pub fn generate_wallet() -> GeneratedWallet {
    use alloy::primitives::keccak256;
    use k256::ecdsa::SigningKey;
    use k256::elliptic_curve::rand_core::OsRng as KeyRng;

    let signing_key = SigningKey::random(&mut KeyRng);
    let public_key = signing_key.verifying_key().to_encoded_point(false);
    let public_key_bytes = public_key.as_bytes();

    let hash = keccak256(&public_key_bytes[1..]);
    let address_bytes = &hash[12..];

    GeneratedWallet {
        address: format!("0x{}", alloy::hex::encode(address_bytes)),
        private_key_hex: alloy::hex::encode(signing_key.to_bytes()),
    }
}

// ===== Vault =====

/// Seals and unseals deposit-wallet private keys.
///
/// Cheap to clone around behind an `Arc`; holds only the derived AES key.
pub struct KeyVault {
    key: Option<[u8; 32]>,
}

impl KeyVault {
    /// Builds a vault from an operator secret.
    pub fn new(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        Self {
            key: Some(digest.into()),
        }
    }

    /// Builds a vault from the `WALLET_ENC_SECRET` environment variable.
    ///
    /// A missing or blank secret yields an unconfigured vault rather than an
    /// error; sealing operations report [`VaultError::MissingSecret`] later.
    pub fn from_env() -> Self {
        match std::env::var(config::WALLET_ENC_SECRET_ENV) {
            Ok(secret) if !secret.trim().is_empty() => Self::new(secret.trim()),
            _ => Self::unconfigured(),
        }
    }

    /// A vault with no key material. All seal/unseal calls fail.
    pub fn unconfigured() -> Self {
        Self { key: None }
    }

    /// Whether a secret was provided at construction.
    pub fn is_configured(&self) -> bool {
        self.key.is_some()
    }

    fn cipher(&self) -> Result<Aes256Gcm, VaultError> {
        let key = self.key.as_ref().ok_or(VaultError::MissingSecret)?;
        Aes256Gcm::new_from_slice(key).map_err(|e| VaultError::Encrypt(e.to_string()))
    }

    /// Seals `plaintext` into the `iv:tag:ciphertext` hex format.
    ///
    /// A random nonce is drawn per call, so sealing the same plaintext twice
    /// produces different blobs.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        let cipher = self.cipher()?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        // RustCrypto appends the tag to the ciphertext; split it back out so
        // the stored layout keeps the tag as its own field.
        let sealed = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| VaultError::Encrypt("cipher rejected plaintext".to_string()))?;
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

        Ok(format!(
            "{}:{}:{}",
            alloy::hex::encode(nonce),
            alloy::hex::encode(tag),
            alloy::hex::encode(ciphertext)
        ))
    }

    /// Unseals a blob produced by [`KeyVault::encrypt`].
    pub fn decrypt(&self, blob: &str) -> Result<String, VaultError> {
        let cipher = self.cipher()?;

        let parts: Vec<&str> = blob.split(':').collect();
        if parts.len() != 3 {
            return Err(VaultError::Malformed(format!(
                "expected 3 colon-separated fields, got {}",
                parts.len()
            )));
        }

        let iv = alloy::hex::decode(parts[0])
            .map_err(|e| VaultError::Malformed(format!("bad iv hex: {e}")))?;
        let tag = alloy::hex::decode(parts[1])
            .map_err(|e| VaultError::Malformed(format!("bad tag hex: {e}")))?;
        let ciphertext = alloy::hex::decode(parts[2])
            .map_err(|e| VaultError::Malformed(format!("bad ciphertext hex: {e}")))?;

        if iv.len() != IV_LEN {
            return Err(VaultError::Malformed(format!(
                "iv must be {IV_LEN} bytes, got {}",
                iv.len()
            )));
        }
        if tag.len() != TAG_LEN {
            return Err(VaultError::Malformed(format!(
                "tag must be {TAG_LEN} bytes, got {}",
                tag.len()
            )));
        }

        let mut sealed = ciphertext;
        sealed.extend_from_slice(&tag);

        let plain = cipher
            .decrypt(Nonce::from_slice(&iv), sealed.as_slice())
            .map_err(|_| VaultError::Decrypt)?;

        String::from_utf8(plain).map_err(|_| VaultError::Decrypt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generated_wallets_have_valid_addresses() {
        let wallet = generate_wallet();
        assert!(wallet.address.starts_with("0x"));
        assert_eq!(wallet.address.len(), 42);
        assert!(wallet.address[2..].chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(wallet.private_key_hex.len(), 64);
    }

    #[test]
    fn generated_wallets_are_unique() {
        let mut addresses = HashSet::new();
        for _ in 0..10 {
            let wallet = generate_wallet();
            assert!(addresses.insert(wallet.address), "duplicate address generated");
        }
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let vault = KeyVault::new("correct horse battery staple");
        let plaintext = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

        let sealed = vault.encrypt(plaintext).unwrap();
        assert_eq!(sealed.split(':').count(), 3);

        let recovered = vault.decrypt(&sealed).unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn sealed_blobs_use_fresh_nonces() {
        let vault = KeyVault::new("secret");
        let a = vault.encrypt("same key").unwrap();
        let b = vault.encrypt("same key").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn sealed_fields_have_expected_lengths() {
        let vault = KeyVault::new("secret");
        let sealed = vault.encrypt("payload").unwrap();
        let parts: Vec<&str> = sealed.split(':').collect();
        assert_eq!(parts[0].len(), IV_LEN * 2);
        assert_eq!(parts[1].len(), TAG_LEN * 2);
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let vault = KeyVault::new("secret");
        let sealed = vault.encrypt("payload").unwrap();

        let mut parts: Vec<String> = sealed.split(':').map(String::from).collect();
        let flipped = if parts[2].starts_with('0') { "1" } else { "0" };
        parts[2].replace_range(0..1, flipped);

        let result = vault.decrypt(&parts.join(":"));
        assert!(matches!(result, Err(VaultError::Decrypt)));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let sealed = KeyVault::new("alpha").encrypt("payload").unwrap();
        let result = KeyVault::new("beta").decrypt(&sealed);
        assert!(matches!(result, Err(VaultError::Decrypt)));
    }

    #[test]
    fn malformed_blob_is_rejected() {
        let vault = KeyVault::new("secret");
        assert!(matches!(
            vault.decrypt("deadbeef:cafe"),
            Err(VaultError::Malformed(_))
        ));
        assert!(matches!(
            vault.decrypt("not hex at all:zz:zz"),
            Err(VaultError::Malformed(_))
        ));
    }

    #[test]
    fn unconfigured_vault_refuses_to_seal() {
        let vault = KeyVault::unconfigured();
        assert!(!vault.is_configured());
        assert!(matches!(
            vault.encrypt("payload"),
            Err(VaultError::MissingSecret)
        ));
        assert!(matches!(
            vault.decrypt("aa:bb:cc"),
            Err(VaultError::MissingSecret)
        ));
    }
}
