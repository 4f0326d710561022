use crate::proto::MAX_PAYLOAD;
use std::time::Duration;

/// General config for an [RpcNode](crate::RpcNode)
#[derive(Clone, Debug)]
pub struct RpcConfig {
    /// A call is considered failed if no reply arrives within this window.
    pub wait_timeout: Duration,
    /// Default window for retrying a datagram while the socket buffer is full.
    pub send_timeout: Duration,
    /// Pause between send attempts on backpressure.
    pub send_backoff: Duration,
    /// In bytes, the limit for an encoded `[method, args]` payload.
    pub max_payload: usize,
    /// In bytes, the receive buffer of [RpcNode::run](crate::RpcNode::run).
    pub recv_buf_size: usize,
    /// Log every datagram in and out at trace level.
    pub noisy: bool,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_secs(5),
            send_timeout: Duration::from_secs(5),
            send_backoff: Duration::from_millis(1),
            max_payload: MAX_PAYLOAD,
            recv_buf_size: 65536,
            noisy: false,
        }
    }
}
