// src/connection/handler.rs

//! Defines the `ConnectionHandler` which serves one sibling connection.

use super::service::RequestService;
use crate::core::TriadError;
use crate::core::transport::protocol::ServerCodec;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

/// Reads requests from a sibling and writes back one response per request.
pub struct ConnectionHandler {
    framed: Framed<TcpStream, ServerCodec>,
    addr: SocketAddr,
    service: Arc<RequestService>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl ConnectionHandler {
    pub fn new(
        socket: TcpStream,
        addr: SocketAddr,
        service: Arc<RequestService>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            framed: Framed::new(socket, ServerCodec::new()),
            addr,
            service,
            shutdown_rx,
        }
    }

    /// The main loop for the connection. Returns when the peer disconnects, the
    /// stream breaks, or the server shuts down.
    pub async fn run(&mut self) -> Result<(), TriadError> {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown_rx.recv() => {
                    info!("Connection handler for {} received shutdown signal.", self.addr);
                    return Ok(());
                }
                result = self.framed.next() => {
                    match result {
                        Some(Ok(request)) => {
                            debug!("{}: {} request #{} from '{}'", self.addr, request.body.kind(), request.id, request.source);
                            let response = self.service.handle(request).await;
                            self.framed.send(response).await?;
                        }
                        Some(Err(e)) => {
                            if is_normal_disconnect(&e) {
                                debug!("Connection from {} closed by peer: {}", self.addr, e);
                                return Ok(());
                            }
                            warn!("Connection error for {}: {}", self.addr, e);
                            return Err(e);
                        }
                        None => {
                            debug!("Connection from {} closed by peer.", self.addr);
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

fn is_normal_disconnect(e: &TriadError) -> bool {
    matches!(e, TriadError::Io(arc_err) if matches!(
        arc_err.kind(),
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionAborted
    ))
}
