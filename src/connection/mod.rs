// src/connection/mod.rs

//! Serves sibling RPC connections: framing, request dispatch to local stores,
//! and overload signalling.

mod handler;
mod service;

pub use handler::ConnectionHandler;
pub use service::{MessageListener, RequestService};
