//! Wire format.
//!
//! Every datagram carries exactly one frame. There is no length prefix, the payload runs to the
//! end of the datagram and relies on the message boundary of the transport.
//!
//! ```text
//! offset  len        field
//! 0       1          kind: 0x02 request, 0x03 response
//! 1       20         correlation id, opaque random bytes
//! 21      remaining  codec payload
//! ```
//!
//! Request payload is `[method: str, args: array]`. A response reuses the id of its request and
//! its payload is whatever value the handler returned.

use crate::error::{FrameError, RpcError};
use rand::RngCore;
use rmpv::Value;
use std::fmt;

pub const REQUEST_BYTE: u8 = 0x02;
pub const RESPONSE_BYTE: u8 = 0x03;

pub const ID_LEN: usize = 20;
pub const HEADER_LEN: usize = 1 + ID_LEN;
/// Anything shorter is dropped before looking at the tag.
pub const MIN_DATAGRAM_LEN: usize = HEADER_LEN + 1;
/// Default limit for an encoded request payload.
pub const MAX_PAYLOAD: usize = 8192;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    Request = REQUEST_BYTE,
    Response = RESPONSE_BYTE,
}

impl TryFrom<u8> for FrameKind {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            REQUEST_BYTE => Ok(FrameKind::Request),
            RESPONSE_BYTE => Ok(FrameKind::Response),
            _ => Err(FrameError::UnknownKind(value)),
        }
    }
}

/// Pairs a request with its response.
///
/// Drawn from the thread-local CSPRNG. Uniqueness is never checked, with 160 bits a collision
/// among outstanding calls is not a practical concern.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId([u8; ID_LEN]);

impl CorrelationId {
    pub fn random() -> Self {
        let mut id = [0u8; ID_LEN];
        rand::thread_rng().fill_bytes(&mut id);
        Self(id)
    }

    #[inline]
    pub fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
        Self(bytes)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for b in self.0.iter() {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for CorrelationId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "id({})", self)
    }
}

/// A frame borrowed from a datagram buffer.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub kind: FrameKind,
    pub id: CorrelationId,
    pub payload: &'a [u8],
}

impl<'a> Frame<'a> {
    #[inline]
    pub fn new(kind: FrameKind, id: CorrelationId, payload: &'a [u8]) -> Self {
        Self { kind, id, payload }
    }

    /// Split a datagram into kind, id and payload.
    ///
    /// The payload is not inspected here, decode failures belong to the layer above.
    pub fn parse(datagram: &'a [u8]) -> Result<Self, FrameError> {
        if datagram.len() < MIN_DATAGRAM_LEN {
            return Err(FrameError::Undersized(datagram.len()));
        }
        let kind = FrameKind::try_from(datagram[0])?;
        let mut id = [0u8; ID_LEN];
        id.copy_from_slice(&datagram[1..HEADER_LEN]);
        Ok(Self { kind, id: CorrelationId(id), payload: &datagram[HEADER_LEN..] })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buf.push(self.kind as u8);
        buf.extend_from_slice(&self.id.0);
        buf.extend_from_slice(self.payload);
        buf
    }
}

impl<'a> fmt::Debug for Frame<'a> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "frame(kind={:?}, {:?}, payload={}B)", self.kind, self.id, self.payload.len())
    }
}

/// A decoded request payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEnvelope {
    pub method: String,
    pub args: Vec<Value>,
}

impl RequestEnvelope {
    /// Accepts exactly `[method: str, args: array]`.
    pub fn from_value(value: Value) -> Result<Self, RpcError> {
        let mut items = match value {
            Value::Array(items) if items.len() == 2 => items,
            other => {
                return Err(RpcError::MalformedRequest(format!("could not read packet: {}", other)));
            }
        };
        let args = items.pop();
        let method = items.pop();
        match (method, args) {
            (Some(Value::String(method)), Some(Value::Array(args))) => match method.into_str() {
                Some(method) => Ok(Self { method, args }),
                None => Err(RpcError::MalformedRequest("method name is not utf-8".to_string())),
            },
            (method, args) => Err(RpcError::MalformedRequest(format!(
                "expected [method, [args...]], got [{}, {}]",
                method.unwrap_or(Value::Nil),
                args.unwrap_or(Value::Nil)
            ))),
        }
    }
}
