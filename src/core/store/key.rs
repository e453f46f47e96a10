// src/core/store/key.rs

//! The identity of a replicated object.

use crate::core::hash::object_key_hash;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies an object by the store it belongs to and its id within that store.
#[derive(
    Debug,
    Clone,
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
pub struct ObjectKey {
    pub store_id: String,
    pub object_id: String,
}

impl ObjectKey {
    pub fn new(store_id: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            store_id: store_id.into(),
            object_id: object_id.into(),
        }
    }

    /// The CRC-64 of the `store;object` unique id.
    pub fn hash64(&self) -> u64 {
        object_key_hash(&self.store_id, &self.object_id)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{}", self.store_id, self.object_id)
    }
}
