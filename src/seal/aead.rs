// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Local AES-256-GCM seal backend.
//!
//! Holds a key ring in process memory. Useful for development, for the
//! standalone daemon, and for exercising key rotation: after
//! [`AeadWrapper::rotate_key`] new values use the new key while older keys
//! stay available for decryption, so previously wrapped entries report as
//! not up to date until they are upgraded.
//!
//! Key ids are the first 8 bytes of the SHA-256 of the key, hex encoded.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};

use super::access::SealWrapper;
use super::wrapped::BlobInfo;
use crate::error::{SealError, SealResult};

/// Required key length in bytes.
pub const AEAD_KEY_LEN: usize = 32;

/// Seal type reported by [`AeadWrapper`] unless overridden.
pub const AEAD_SEAL_TYPE: &str = "aead";

struct KeyRing {
    current: String,
    keys: HashMap<String, [u8; AEAD_KEY_LEN]>,
}

/// In-process AES-256-GCM [`SealWrapper`].
pub struct AeadWrapper {
    seal_type: String,
    rng: SystemRandom,
    ring: RwLock<KeyRing>,
}

impl AeadWrapper {
    /// Create a wrapper whose current key is `key` (32 bytes).
    pub fn new(key: &[u8]) -> SealResult<Self> {
        let key = to_key(key)?;
        let id = key_id_for(&key);
        Ok(Self {
            seal_type: AEAD_SEAL_TYPE.to_string(),
            rng: SystemRandom::new(),
            ring: RwLock::new(KeyRing {
                current: id.clone(),
                keys: HashMap::from([(id, key)]),
            }),
        })
    }

    /// Create a wrapper with a freshly generated key.
    pub fn generate() -> SealResult<Self> {
        let key = random_key(&SystemRandom::new())?;
        Self::new(&key)
    }

    /// Report a different seal type (lets tests model several backend kinds).
    pub fn with_seal_type(mut self, seal_type: impl Into<String>) -> Self {
        self.seal_type = seal_type.into();
        self
    }

    /// Add `key` to the ring and make it current. Returns its key id.
    pub fn add_key(&self, key: &[u8]) -> SealResult<String> {
        let key = to_key(key)?;
        let id = key_id_for(&key);
        let mut ring = self.ring.write().map_err(|_| poisoned())?;
        ring.keys.insert(id.clone(), key);
        ring.current = id.clone();
        Ok(id)
    }

    /// Generate a new current key. Returns its key id.
    pub fn rotate_key(&self) -> SealResult<String> {
        let key = random_key(&self.rng)?;
        self.add_key(&key)
    }

    pub fn current_key_id(&self) -> SealResult<String> {
        let ring = self.ring.read().map_err(|_| poisoned())?;
        Ok(ring.current.clone())
    }

    fn key(&self, key_id: Option<&str>) -> SealResult<(String, LessSafeKey)> {
        let ring = self.ring.read().map_err(|_| poisoned())?;
        let id = key_id.unwrap_or(&ring.current);
        let bytes = ring
            .keys
            .get(id)
            .ok_or_else(|| SealError::crypto(format!("unknown key id {id:?}")))?;
        let unbound = UnboundKey::new(&AES_256_GCM, bytes)
            .map_err(|_| SealError::crypto("invalid AES-256-GCM key"))?;
        Ok((id.to_string(), LessSafeKey::new(unbound)))
    }
}

#[async_trait]
impl SealWrapper for AeadWrapper {
    fn seal_type(&self) -> &str {
        &self.seal_type
    }

    async fn key_id(&self) -> SealResult<String> {
        self.current_key_id()
    }

    async fn encrypt(&self, plaintext: &[u8], aad: Option<&[u8]>) -> SealResult<BlobInfo> {
        let (key_id, key) = self.key(None)?;

        let mut nonce = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce)
            .map_err(|_| SealError::crypto("failed to generate nonce"))?;

        let mut in_out = plaintext.to_vec();
        key.seal_in_place_append_tag(
            Nonce::assume_unique_for_key(nonce),
            Aad::from(aad.unwrap_or_default()),
            &mut in_out,
        )
        .map_err(|_| SealError::crypto("AES-256-GCM encryption failed"))?;

        Ok(BlobInfo::new(key_id, nonce.to_vec(), in_out))
    }

    async fn decrypt(&self, blob: &BlobInfo, aad: Option<&[u8]>) -> SealResult<Vec<u8>> {
        let (_, key) = self.key(Some(&blob.key_id))?;
        let nonce = Nonce::try_assume_unique_for_key(&blob.nonce)
            .map_err(|_| SealError::crypto("invalid nonce length"))?;

        let mut in_out = blob.ciphertext.clone();
        let plaintext = key
            .open_in_place(nonce, Aad::from(aad.unwrap_or_default()), &mut in_out)
            .map_err(|_| SealError::crypto("AES-256-GCM decryption failed"))?;
        Ok(plaintext.to_vec())
    }
}

fn to_key(key: &[u8]) -> SealResult<[u8; AEAD_KEY_LEN]> {
    key.try_into().map_err(|_| {
        SealError::validation(format!(
            "AEAD seal key must be {AEAD_KEY_LEN} bytes, got {}",
            key.len()
        ))
    })
}

fn random_key(rng: &SystemRandom) -> SealResult<[u8; AEAD_KEY_LEN]> {
    let mut key = [0u8; AEAD_KEY_LEN];
    rng.fill(&mut key)
        .map_err(|_| SealError::crypto("failed to generate seal key"))?;
    Ok(key)
}

fn key_id_for(key: &[u8]) -> String {
    hex::encode(&Sha256::digest(key)[..8])
}

fn poisoned() -> SealError {
    SealError::crypto("AEAD key ring lock poisoned")
}
