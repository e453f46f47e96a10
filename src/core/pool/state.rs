// src/core/pool/state.rs

//! The health states of a connection pool and the transitions between them.

use serde::Serialize;
use strum_macros::{Display, EnumString, IntoStaticStr};

/// The health state of one target server as seen by its pool.
///
/// Each state answers a fixed set of capability questions (`is_enabled`,
/// `is_live`, ...) and decides which transitions it accepts. A rejected transition
/// returns the current state unchanged.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoolState {
    /// Created but not yet initialised.
    New,
    /// Administratively disabled; nothing is admitted.
    Standby,
    /// Only session-affinity requests are admitted.
    SessionOnly,
    /// Enabled, no confirmed success yet.
    Starting,
    /// At least one success; admission is throttled by the ramp table.
    Warmup,
    /// The target signaled overload.
    Busy,
    /// A connect or I/O failure occurred.
    Fail,
    /// Warmup complete, unrestricted admission.
    Active,
    /// Terminal.
    Closed,
}

impl PoolState {
    /// False only before `init` and after `close`.
    pub fn is_init(self) -> bool {
        !matches!(self, PoolState::New | PoolState::Closed)
    }

    pub fn is_closed(self) -> bool {
        self == PoolState::Closed
    }

    /// True while the pool is recovering (no completed warmup).
    pub fn is_starting(self) -> bool {
        matches!(
            self,
            PoolState::Starting | PoolState::Warmup | PoolState::Busy | PoolState::Fail
        )
    }

    /// True when the target is believed reachable right now.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            PoolState::Starting | PoolState::Warmup | PoolState::Active
        )
    }

    /// True when session-affinity requests may be sent.
    pub fn is_session_enabled(self) -> bool {
        !matches!(
            self,
            PoolState::New | PoolState::Standby | PoolState::Closed
        )
    }

    /// True when load-balanced requests may be sent.
    pub fn is_enabled(self) -> bool {
        !matches!(
            self,
            PoolState::New | PoolState::Standby | PoolState::SessionOnly | PoolState::Closed
        )
    }

    pub fn to_start(self) -> Self {
        match self {
            PoolState::Warmup | PoolState::Active | PoolState::Closed => self,
            _ => PoolState::Starting,
        }
    }

    pub fn to_active(self) -> Self {
        match self {
            PoolState::Standby | PoolState::Closed => self,
            _ => PoolState::Active,
        }
    }

    pub fn to_fail(self) -> Self {
        match self {
            PoolState::Standby | PoolState::SessionOnly | PoolState::Closed => self,
            _ => PoolState::Fail,
        }
    }

    pub fn to_busy(self) -> Self {
        match self {
            PoolState::Standby | PoolState::SessionOnly | PoolState::Closed => self,
            _ => PoolState::Busy,
        }
    }

    pub fn to_standby(self) -> Self {
        match self {
            PoolState::Closed => self,
            _ => PoolState::Standby,
        }
    }

    pub fn to_session_only(self) -> Self {
        match self {
            PoolState::Standby | PoolState::Closed => self,
            _ => PoolState::SessionOnly,
        }
    }
}
