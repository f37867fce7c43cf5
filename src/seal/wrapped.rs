// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Seal-wrapped values and the codec for wrapped key entries.
//!
//! A [`SealWrappedValue`] carries one [`BlobInfo`] per seal backend that
//! encrypted it, each tagged with the backend name and the key id used. The
//! tags are what `SealAccess::is_up_to_date` compares against the backends'
//! current keys.
//!
//! ## Encoding
//!
//! Values are stored as JSON with byte fields in standard base64:
//!
//! ```text
//! {"generation":1,"blobs":[{"seal_name":"kms-a","key_id":"3f2a..","nonce":"..","ciphertext":".."}]}
//! ```
//!
//! Root key shares are serialized as a JSON array of base64 strings before
//! being wrapped.

use serde::{Deserialize, Serialize};

use super::access::SealAccess;
use crate::error::{SealError, SealResult};
use crate::storage::paths::{RECOVERY_KEY_PATH, STORED_BARRIER_KEYS_PATH};
use crate::storage::Entry;

/// Ciphertext produced by one seal backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobInfo {
    /// Name of the backend that produced this blob.
    pub seal_name: String,
    /// Backend key identifier at encryption time.
    pub key_id: String,
    #[serde(with = "base64_bytes")]
    pub nonce: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
}

impl BlobInfo {
    /// Blob not yet attributed to a named backend.
    pub fn new(key_id: impl Into<String>, nonce: Vec<u8>, ciphertext: Vec<u8>) -> Self {
        Self {
            seal_name: String::new(),
            key_id: key_id.into(),
            nonce,
            ciphertext,
        }
    }
}

/// A value encrypted by one or more seal backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealWrappedValue {
    /// Seal generation that produced the value.
    pub generation: u64,
    pub blobs: Vec<BlobInfo>,
}

impl SealWrappedValue {
    pub fn new(generation: u64, blobs: Vec<BlobInfo>) -> Self {
        Self { generation, blobs }
    }

    /// Blob written by the named backend, if any.
    pub fn blob(&self, seal_name: &str) -> Option<&BlobInfo> {
        self.blobs.iter().find(|b| b.seal_name == seal_name)
    }

    pub fn marshal(&self) -> SealResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| SealError::crypto(format!("failed to marshal seal wrapped value: {e}")))
    }

    pub fn unmarshal(bytes: &[u8]) -> SealResult<Self> {
        let value: Self = serde_json::from_slice(bytes).map_err(|e| {
            SealError::crypto(format!("failed to unmarshal seal wrapped value: {e}"))
        })?;
        if value.blobs.is_empty() {
            return Err(SealError::crypto("seal wrapped value has no blobs"));
        }
        Ok(value)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(transparent)]
struct KeyShare(#[serde(with = "base64_bytes")] Vec<u8>);

/// Serialize root key shares for wrapping.
pub fn encode_key_shares(keys: &[Vec<u8>]) -> SealResult<Vec<u8>> {
    let shares: Vec<KeyShare> = keys.iter().cloned().map(KeyShare).collect();
    serde_json::to_vec(&shares)
        .map_err(|e| SealError::crypto(format!("failed to encode stored keys: {e}")))
}

/// Inverse of [`encode_key_shares`].
pub fn decode_key_shares(bytes: &[u8]) -> SealResult<Vec<Vec<u8>>> {
    let shares: Vec<KeyShare> = serde_json::from_slice(bytes)
        .map_err(|e| SealError::crypto(format!("failed to decode stored keys: {e}")))?;
    Ok(shares.into_iter().map(|s| s.0).collect())
}

/// Encrypt root key shares into the entry stored at
/// [`STORED_BARRIER_KEYS_PATH`].
pub async fn seal_wrap_stored_keys(access: &dyn SealAccess, keys: &[Vec<u8>]) -> SealResult<Entry> {
    let plaintext = encode_key_shares(keys)?;
    let wrapped = access
        .encrypt(&plaintext, None)
        .await
        .map_err(|e| e.context("failed to encrypt keys for storage"))?;
    Ok(Entry::new(STORED_BARRIER_KEYS_PATH, wrapped.marshal()?))
}

/// Decrypt the root key shares held in `entry`.
pub async fn unseal_wrap_stored_keys(
    access: &dyn SealAccess,
    entry: &Entry,
) -> SealResult<Vec<Vec<u8>>> {
    let wrapped = SealWrappedValue::unmarshal(&entry.value)
        .map_err(|e| e.context("failed to unmarshal stored keys"))?;
    let plaintext = access
        .decrypt(&wrapped, None)
        .await
        .map_err(|e| e.context("failed to decrypt encrypted stored keys"))?;
    decode_key_shares(&plaintext)
}

/// Encrypt the recovery key into the entry stored at [`RECOVERY_KEY_PATH`].
pub async fn seal_wrap_recovery_key(access: &dyn SealAccess, key: &[u8]) -> SealResult<Entry> {
    let wrapped = access
        .encrypt(key, None)
        .await
        .map_err(|e| e.context("failed to encrypt recovery key for storage"))?;
    Ok(Entry::new(RECOVERY_KEY_PATH, wrapped.marshal()?))
}

/// Decrypt the recovery key held in `entry`.
pub async fn unseal_wrap_recovery_key(access: &dyn SealAccess, entry: &Entry) -> SealResult<Vec<u8>> {
    let wrapped = SealWrappedValue::unmarshal(&entry.value)
        .map_err(|e| e.context("failed to unmarshal recovery key"))?;
    access
        .decrypt(&wrapped, None)
        .await
        .map_err(|e| e.context("failed to decrypt recovery key"))
}

mod base64_bytes {
    use base64ct::{Base64, Encoding};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&Base64::encode_string(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Base64::decode_vec(&encoded).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_value() -> SealWrappedValue {
        let mut blob = BlobInfo::new("k1", vec![0u8; 12], vec![1, 2, 3, 255]);
        blob.seal_name = "kms-a".to_string();
        SealWrappedValue::new(3, vec![blob])
    }

    #[test]
    fn marshal_uses_base64_fields() {
        let bytes = sample_value().marshal().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["generation"], 3);
        assert_eq!(json["blobs"][0]["seal_name"], "kms-a");
        assert_eq!(json["blobs"][0]["ciphertext"], "AQID/w==");

        let back = SealWrappedValue::unmarshal(&bytes).unwrap();
        assert_eq!(back, sample_value());
        assert_eq!(back.blob("kms-a").unwrap().key_id, "k1");
        assert!(back.blob("kms-b").is_none());
    }

    #[test]
    fn unmarshal_rejects_garbage_and_empty_values() {
        assert!(matches!(
            SealWrappedValue::unmarshal(b"not json"),
            Err(SealError::Crypto(_))
        ));
        let empty = serde_json::to_vec(&SealWrappedValue::new(1, vec![])).unwrap();
        assert!(matches!(
            SealWrappedValue::unmarshal(&empty),
            Err(SealError::Crypto(_))
        ));
    }

    #[test]
    fn key_shares_keep_empty_entries() {
        let keys = vec![vec![], vec![7], vec![1, 2, 3]];
        let decoded = decode_key_shares(&encode_key_shares(&keys).unwrap()).unwrap();
        assert_eq!(decoded, keys);
    }

    proptest! {
        #[test]
        fn key_shares_roundtrip(keys in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..8)) {
            let decoded = decode_key_shares(&encode_key_shares(&keys).unwrap()).unwrap();
            prop_assert_eq!(decoded, keys);
        }
    }
}
