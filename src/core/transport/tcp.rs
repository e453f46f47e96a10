// src/core/transport/tcp.rs

//! The default TCP transport: one framed `TcpStream` per connection.

use super::protocol::ClientCodec;
use super::{Connection, Connector, RpcRequest, RpcResponse};
use crate::core::TriadError;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::debug;

/// Opens plain TCP connections with `TCP_NODELAY` set.
#[derive(Debug, Default, Clone)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, address: &str) -> std::io::Result<Box<dyn Connection>> {
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;
        debug!("Opened TCP connection to {}", address);
        Ok(Box::new(TcpConnection {
            address: address.to_string(),
            framed: Framed::new(stream, ClientCodec::new()),
        }))
    }
}

/// A framed client connection to a sibling's RPC listener.
#[derive(Debug)]
pub struct TcpConnection {
    address: String,
    framed: Framed<TcpStream, ClientCodec>,
}

#[async_trait]
impl Connection for TcpConnection {
    async fn call(&mut self, request: RpcRequest) -> Result<RpcResponse, TriadError> {
        let id = request.id;
        self.framed.send(request).await?;

        match self.framed.next().await {
            Some(Ok(response)) if response.id == id => Ok(response),
            Some(Ok(response)) => Err(TriadError::Protocol(format!(
                "response id {} does not match request id {} from {}",
                response.id, id, self.address
            ))),
            Some(Err(e)) => Err(e),
            None => Err(TriadError::Unreachable(format!(
                "{} closed the connection",
                self.address
            ))),
        }
    }
}
