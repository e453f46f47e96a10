// src/core/transport/mod.rs

//! The transport seam between the pool and the network.
//!
//! A `Connector` opens connections to an address; a `Connection` carries one
//! request/response exchange at a time. The pool never touches sockets directly,
//! which lets tests substitute in-memory transports.

pub mod protocol;
pub mod tcp;

use crate::core::TriadError;
use async_trait::async_trait;
use std::fmt::Debug;

pub use protocol::{RequestBody, ResponseBody, RpcCodec, RpcRequest, RpcResponse};
pub use tcp::TcpConnector;

/// An opened transport connection to a sibling server.
#[async_trait]
pub trait Connection: Send + Debug {
    /// Sends one request and waits for its correlated response.
    ///
    /// Timeouts are applied by the caller; an error here means the connection is no
    /// longer usable.
    async fn call(&mut self, request: RpcRequest) -> Result<RpcResponse, TriadError>;
}

/// Opens transport connections; supplied by the networking layer.
#[async_trait]
pub trait Connector: Send + Sync + Debug {
    async fn connect(&self, address: &str) -> std::io::Result<Box<dyn Connection>>;
}
