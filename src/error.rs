use std::{fmt, io, time::Duration};

/// Reasons a datagram cannot be split into a frame.
///
/// These are never surfaced to a caller, the receiving side logs and drops the datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Shorter than the header plus one payload byte.
    Undersized(usize),
    /// The kind tag is neither request nor response.
    UnknownKind(u8),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Undersized(len) => write!(f, "datagram too small ({} bytes)", len),
            FrameError::UnknownKind(tag) => write!(f, "unknown frame kind {:#04x}", tag),
        }
    }
}

impl std::error::Error for FrameError {}

/// Error returned by a registered handler.
///
/// There is no wire shape for failures, so the message only ends up in the local log and the
/// remote caller times out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError(String);

impl HandlerError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for HandlerError {}

impl From<String> for HandlerError {
    fn from(msg: String) -> Self {
        Self(msg)
    }
}

impl From<&str> for HandlerError {
    fn from(msg: &str) -> Self {
        Self(msg.to_string())
    }
}

impl From<io::Error> for HandlerError {
    fn from(e: io::Error) -> Self {
        Self(e.to_string())
    }
}

/// Error type for the rpc engine.
#[derive(Debug)]
pub enum RpcError {
    /// Encoded `[method, args]` is over the configured limit, nothing was sent.
    PayloadTooLarge { size: usize, max: usize },
    /// Inbound request payload is not a `[method, [args...]]` pair.
    MalformedRequest(String),
    /// The codec failed to serialize a value.
    Encode,
    /// The codec failed to deserialize a payload.
    Decode,
    /// The transport rejected a datagram with a non-transient error.
    Send(io::Error),
    /// The transport stayed congested for the whole send window.
    SendTimeout(Duration),
    /// No reply arrived within the wait window.
    CallTimeout,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcError::PayloadTooLarge { size, max } => {
                write!(f, "payload too large: {} bytes, max {} bytes", size, max)
            }
            RpcError::MalformedRequest(msg) => write!(f, "malformed request: {}", msg),
            RpcError::Encode => write!(f, "encode error"),
            RpcError::Decode => write!(f, "decode error"),
            RpcError::Send(e) => write!(f, "send error: {}", e),
            RpcError::SendTimeout(window) => {
                write!(f, "send buffer stayed full for {:?}, datagram dropped", window)
            }
            RpcError::CallTimeout => write!(f, "no reply within the wait window"),
        }
    }
}

impl std::error::Error for RpcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RpcError::Send(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for RpcError {
    fn from(e: io::Error) -> Self {
        RpcError::Send(e)
    }
}
