// src/core/hash.rs

//! Hashing utilities: the CRC-64 key hash that places objects on a triad, and the
//! SHA-256 content hash used for change detection and content-addressed storage.

use crc::{CRC_64_XZ, Crc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// The CRC-64 variant used for object key hashing.
const CRC64_ALGO: Crc<u64> = Crc::<u64>::new(&CRC_64_XZ);

/// Length of a content hash in bytes.
pub const CONTENT_HASH_LEN: usize = 32;

/// Hashes an object key. The result selects both the server group and the owner tag.
pub fn key_hash(key: &[u8]) -> u64 {
    CRC64_ALGO.checksum(key)
}

/// Hashes a store id and object id as the single `store;object` unique id.
pub fn object_key_hash(store_id: &str, object_id: &str) -> u64 {
    let mut digest = CRC64_ALGO.digest();
    digest.update(store_id.as_bytes());
    digest.update(b";");
    digest.update(object_id.as_bytes());
    digest.finalize()
}

/// A SHA-256 digest of a serialized payload.
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    bincode::Encode,
    bincode::Decode,
)]
pub struct ContentHash(pub [u8; CONTENT_HASH_LEN]);

impl ContentHash {
    /// Computes the content hash of `data`.
    pub fn of(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        let mut out = [0u8; CONTENT_HASH_LEN];
        out.copy_from_slice(&digest);
        ContentHash(out)
    }

    /// Lowercase hex rendering, used for blob file names.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a hex rendering produced by `to_hex`.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; CONTENT_HASH_LEN] = bytes.try_into().ok()?;
        Some(ContentHash(arr))
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
