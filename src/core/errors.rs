// src/core/errors.rs

//! Defines the primary error type for the clustering core.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all failures that can cross a module boundary.
///
/// Connection-level variants (`Unreachable`, `Timeout`, `RemoteBusy`) are absorbed by
/// the pool and turned into state transitions; the replication layer converts what is
/// left into "not available" results, so callers of the object cache never see them.
#[derive(Error, Debug)]
pub enum TriadError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    /// No transport could be opened to the target.
    #[error("server '{0}' is unreachable")]
    Unreachable(String),

    /// A connect or request exceeded its configured timeout.
    #[error("timeout talking to '{0}'")]
    Timeout(String),

    /// The target explicitly signaled overload.
    #[error("server '{0}' is busy")]
    RemoteBusy(String),

    #[error("object not found")]
    NotFound,

    /// The payload cannot be serialized; the object is given up on.
    #[error("object cannot be serialized: {0}")]
    NonSerializable(String),

    #[error("no backing store configured for '{0}'")]
    StoreNotConfigured(String),

    #[error("connection pool for '{0}' is closed")]
    Closed(String),

    #[error("Protocol Error: {0}")]
    Protocol(String),

    /// The remote side processed the request and reported a failure.
    #[error("Remote Error: {0}")]
    Remote(String),

    #[error("Internal Error: {0}")]
    Internal(String),
}

impl TriadError {
    /// Returns true for failures that reflect the health of the target rather than
    /// the request itself.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            TriadError::Io(_)
                | TriadError::Unreachable(_)
                | TriadError::Timeout(_)
                | TriadError::Protocol(_)
        )
    }
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
impl Clone for TriadError {
    fn clone(&self) -> Self {
        match self {
            TriadError::Io(e) => TriadError::Io(Arc::clone(e)),
            TriadError::Unreachable(s) => TriadError::Unreachable(s.clone()),
            TriadError::Timeout(s) => TriadError::Timeout(s.clone()),
            TriadError::RemoteBusy(s) => TriadError::RemoteBusy(s.clone()),
            TriadError::NotFound => TriadError::NotFound,
            TriadError::NonSerializable(s) => TriadError::NonSerializable(s.clone()),
            TriadError::StoreNotConfigured(s) => TriadError::StoreNotConfigured(s.clone()),
            TriadError::Closed(s) => TriadError::Closed(s.clone()),
            TriadError::Protocol(s) => TriadError::Protocol(s.clone()),
            TriadError::Remote(s) => TriadError::Remote(s.clone()),
            TriadError::Internal(s) => TriadError::Internal(s.clone()),
        }
    }
}

impl PartialEq for TriadError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TriadError::Io(e1), TriadError::Io(e2)) => e1.to_string() == e2.to_string(),
            (TriadError::Unreachable(s1), TriadError::Unreachable(s2)) => s1 == s2,
            (TriadError::Timeout(s1), TriadError::Timeout(s2)) => s1 == s2,
            (TriadError::RemoteBusy(s1), TriadError::RemoteBusy(s2)) => s1 == s2,
            (TriadError::NonSerializable(s1), TriadError::NonSerializable(s2)) => s1 == s2,
            (TriadError::StoreNotConfigured(s1), TriadError::StoreNotConfigured(s2)) => s1 == s2,
            (TriadError::Closed(s1), TriadError::Closed(s2)) => s1 == s2,
            (TriadError::Protocol(s1), TriadError::Protocol(s2)) => s1 == s2,
            (TriadError::Remote(s1), TriadError::Remote(s2)) => s1 == s2,
            (TriadError::Internal(s1), TriadError::Internal(s2)) => s1 == s2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for TriadError {
    fn from(e: std::io::Error) -> Self {
        TriadError::Io(Arc::new(e))
    }
}

impl From<bincode::error::EncodeError> for TriadError {
    fn from(e: bincode::error::EncodeError) -> Self {
        TriadError::Protocol(format!("encode failed: {e}"))
    }
}

impl From<bincode::error::DecodeError> for TriadError {
    fn from(e: bincode::error::DecodeError) -> Self {
        TriadError::Protocol(format!("decode failed: {e}"))
    }
}

impl From<serde_json::Error> for TriadError {
    fn from(e: serde_json::Error) -> Self {
        TriadError::Internal(format!("JSON serialization/deserialization error: {e}"))
    }
}
