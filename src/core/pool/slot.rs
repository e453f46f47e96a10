// src/core/pool/slot.rs

//! Defines `ConnectionSlot`, one pooled transport connection plus its bookkeeping.

use crate::core::transport::Connection;

/// A transport connection owned by exactly one pool.
///
/// A slot is either checked out (inside a `PooledConnection`) or parked in the
/// pool's idle ring. Dropping a slot closes its transport.
#[derive(Debug)]
pub struct ConnectionSlot {
    pub(crate) id: u64,
    pub(crate) connection: Box<dyn Connection>,
    pub(crate) created_at: u64,
    /// When the slot was last returned to the idle ring; 0 while checked out.
    pub(crate) free_at: u64,
    pub(crate) lifetime_uses: u64,
}

impl ConnectionSlot {
    pub(crate) fn new(id: u64, connection: Box<dyn Connection>, created_at: u64) -> Self {
        Self {
            id,
            connection,
            created_at,
            free_at: 0,
            lifetime_uses: 0,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn free_at(&self) -> u64 {
        self.free_at
    }

    pub fn lifetime_uses(&self) -> u64 {
        self.lifetime_uses
    }

    /// Whether an idle slot may still be reused at `now`.
    pub(crate) fn is_fresh(&self, now: u64, idle_timeout_ms: u64) -> bool {
        now < self.free_at + idle_timeout_ms
    }
}
