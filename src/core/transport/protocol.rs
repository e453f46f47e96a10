// src/core/transport/protocol.rs

//! Implements the sibling RPC messages and the length-prefixed codec that frames them.
//!
//! Every frame is a 4-byte big-endian length followed by a bincode-encoded message.
//! A response always echoes the id of the request it answers.

use crate::core::TriadError;
use crate::core::hash::ContentHash;
use crate::core::store::ObjectKey;
use bincode::config;
use bytes::{Buf, BufMut, BytesMut};
use std::marker::PhantomData;
use tokio_util::codec::{Decoder, Encoder};

/// Frames larger than this are rejected before allocation.
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;
const LENGTH_PREFIX: usize = 4;

/// The bincode configuration for everything sent between siblings.
///
/// The limit also bounds every length prefix inside a message, so a frame can
/// never claim a larger allocation than a whole frame may hold.
pub fn wire_config() -> impl config::Config {
    config::standard().with_limit::<MAX_FRAME_SIZE>()
}

/// A request sent from one server to a sibling.
#[derive(Debug, Clone, PartialEq, bincode::Encode, bincode::Decode)]
pub struct RpcRequest {
    pub id: u64,
    /// The id of the sending server.
    pub source: String,
    /// The id of the server the request is meant for.
    pub target: String,
    pub body: RequestBody,
}

#[derive(Debug, Clone, PartialEq, bincode::Encode, bincode::Decode)]
pub enum RequestBody {
    Ping,
    Load {
        key: ObjectKey,
    },
    Store {
        key: ObjectKey,
        data: Vec<u8>,
        content_hash: ContentHash,
        expire_interval_ms: u64,
    },
    Touch {
        key: ObjectKey,
        now: u64,
    },
    Remove {
        key: ObjectKey,
    },
    /// An opaque application message delivered to the sibling's message listener.
    Message {
        payload: Vec<u8>,
    },
}

impl RequestBody {
    /// A short name for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            RequestBody::Ping => "ping",
            RequestBody::Load { .. } => "load",
            RequestBody::Store { .. } => "store",
            RequestBody::Touch { .. } => "touch",
            RequestBody::Remove { .. } => "remove",
            RequestBody::Message { .. } => "message",
        }
    }
}

/// A response correlated to a request by `id`.
#[derive(Debug, Clone, PartialEq, bincode::Encode, bincode::Decode)]
pub struct RpcResponse {
    pub id: u64,
    pub body: ResponseBody,
}

#[derive(Debug, Clone, PartialEq, bincode::Encode, bincode::Decode)]
pub enum ResponseBody {
    Pong,
    Loaded {
        data: Vec<u8>,
        content_hash: ContentHash,
        accessed_at: u64,
        expire_interval_ms: u64,
    },
    NotFound,
    Ok,
    /// The server is overloaded and did not process the request.
    Busy,
    Error(String),
}

impl RpcResponse {
    pub fn new(id: u64, body: ResponseBody) -> Self {
        Self { id, body }
    }
}

/// A `tokio_util::codec` implementation for length-prefixed bincode messages.
///
/// `E` is the outgoing message type and `D` the incoming one, so the client side is
/// `RpcCodec<RpcRequest, RpcResponse>` and the server side the reverse.
#[derive(Debug)]
pub struct RpcCodec<E, D> {
    _marker: PhantomData<fn(E) -> D>,
}

impl<E, D> RpcCodec<E, D> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<E, D> Default for RpcCodec<E, D> {
    fn default() -> Self {
        Self::new()
    }
}

/// The codec a client uses: writes requests, reads responses.
pub type ClientCodec = RpcCodec<RpcRequest, RpcResponse>;
/// The codec a server uses: reads requests, writes responses.
pub type ServerCodec = RpcCodec<RpcResponse, RpcRequest>;

impl<E: bincode::Encode, D> Encoder<E> for RpcCodec<E, D> {
    type Error = TriadError;

    fn encode(&mut self, item: E, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = bincode::encode_to_vec(&item, wire_config())?;
        if body.len() > MAX_FRAME_SIZE {
            return Err(TriadError::Protocol(format!(
                "frame of {} bytes exceeds the {} byte limit",
                body.len(),
                MAX_FRAME_SIZE
            )));
        }
        dst.reserve(LENGTH_PREFIX + body.len());
        dst.put_u32(body.len() as u32);
        dst.extend_from_slice(&body);
        Ok(())
    }
}

impl<E, D: bincode::Decode<()>> Decoder for RpcCodec<E, D> {
    type Item = D;
    type Error = TriadError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_PREFIX {
            return Ok(None);
        }

        let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(TriadError::Protocol(format!(
                "frame of {len} bytes exceeds the {MAX_FRAME_SIZE} byte limit"
            )));
        }

        if src.len() < LENGTH_PREFIX + len {
            src.reserve(LENGTH_PREFIX + len - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX);
        let frame = src.split_to(len);
        let (item, _) = bincode::decode_from_slice::<D, _>(&frame, wire_config())?;
        Ok(Some(item))
    }
}
