use crate::codec::{Codec, MsgpCodec};
use crate::config::RpcConfig;
use crate::error::{HandlerError, RpcError};
use crate::pending::{PendingCall, PendingTable};
use crate::proto::{CorrelationId, Frame, FrameKind, RequestEnvelope};
use crate::scheduler::Scheduler;
use crate::server::{Handler, HandlerRegistry};
use crate::transport::{DatagramTransport, is_recv_recoverable, is_transient};
use rmpv::Value;
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use std::{fmt, io};
use tokio::sync::oneshot;

/// One endpoint of the datagram rpc, caller and responder at once.
///
/// Cloning is cheap and every clone drives the same pending-call table and handler registry.
/// Both are behind locks, so a node may be shared across the threads of a multi-threaded
/// runtime: matching a response and firing its timeout each remove the entry under the table
/// lock, only the one that removes it resolves the call.
pub struct RpcNode<T, S, C = MsgpCodec>
where
    T: DatagramTransport,
    S: Scheduler,
    C: Codec,
{
    inner: Arc<NodeInner<T, S, C>>,
}

struct NodeInner<T, S, C> {
    transport: T,
    scheduler: S,
    codec: C,
    config: RpcConfig,
    pending: Arc<PendingTable>,
    handlers: HandlerRegistry,
}

impl<T, S, C> Clone for RpcNode<T, S, C>
where
    T: DatagramTransport,
    S: Scheduler,
    C: Codec,
{
    #[inline]
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T, S, C> fmt::Debug for RpcNode<T, S, C>
where
    T: DatagramTransport,
    S: Scheduler,
    C: Codec,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "RpcNode(local={:?}, pending={}, {:?})",
            self.inner.transport.local_addr().ok(),
            self.inner.pending.len(),
            self.inner.handlers
        )
    }
}

impl<T, S, C> RpcNode<T, S, C>
where
    T: DatagramTransport,
    S: Scheduler,
    C: Codec,
{
    pub fn new(transport: T, scheduler: S, config: RpcConfig) -> Self {
        Self::with_codec(transport, scheduler, C::default(), config)
    }

    pub fn with_codec(transport: T, scheduler: S, codec: C, config: RpcConfig) -> Self {
        let inner = NodeInner {
            transport,
            scheduler,
            codec,
            config,
            pending: Arc::new(PendingTable::new()),
            handlers: HandlerRegistry::new(),
        };
        Self { inner: Arc::new(inner) }
    }

    #[inline]
    pub fn config(&self) -> &RpcConfig {
        &self.inner.config
    }

    #[inline]
    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    #[inline]
    pub fn scheduler(&self) -> &S {
        &self.inner.scheduler
    }

    #[inline]
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.transport.local_addr()
    }

    /// Number of calls still waiting for a reply or a timeout.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Serve `method` with a closure, replacing any previous handler of that name.
    pub fn register<F, FH>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(SocketAddr, Vec<Value>) -> FH + Send + Sync + 'static,
        FH: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        self.inner.handlers.register(method, Arc::new(handler));
    }

    /// Serve `method` with a [Handler] implementation.
    pub fn register_handler(&self, method: impl Into<String>, handler: Arc<dyn Handler>) {
        self.inner.handlers.register(method, handler);
    }

    /// Returns false if nothing was registered under `method`.
    pub fn unregister(&self, method: &str) -> bool {
        self.inner.handlers.unregister(method).is_some()
    }

    #[inline]
    pub fn has_handler(&self, method: &str) -> bool {
        self.inner.handlers.contains(method)
    }

    /// Call `method` on `peer`.
    ///
    /// `args` must serialize as a sequence, a tuple or a `Vec`, anything else is refused with
    /// [RpcError::MalformedRequest]. Returns once the request is handed to the socket, the
    /// [PendingCall] then resolves with the reply or, `wait_timeout` after the send, with a
    /// failure marker.
    ///
    /// Fails without sending anything when the encoded `[method, args]` exceeds `max_payload`.
    pub async fn call<A: Serialize>(
        &self, method: &str, peer: SocketAddr, args: A,
    ) -> Result<PendingCall, RpcError> {
        let inner = &self.inner;
        let args = rmpv::ext::to_value(&args).map_err(|e| {
            warn!("cannot serialize arguments of {}: {}", method, e);
            RpcError::Encode
        })?;
        if !args.is_array() {
            return Err(RpcError::MalformedRequest(format!(
                "arguments of {} must be a sequence, got {}",
                method, args
            )));
        }
        let payload = inner.codec.encode(&(method, &args)).map_err(|_| RpcError::Encode)?;
        if payload.len() > inner.config.max_payload {
            return Err(RpcError::PayloadTooLarge {
                size: payload.len(),
                max: inner.config.max_payload,
            });
        }
        let id = CorrelationId::random();
        let datagram = Frame::new(FrameKind::Request, id, &payload).to_bytes();
        if inner.config.noisy {
            trace!("calling remote function {} on {} (msg id {})", method, peer, id);
        }

        // registered before sending, a fast reply must find its entry
        let (tx, rx) = oneshot::channel();
        inner.pending.register(id, tx);
        if let Err(e) = self.send_reliably(&datagram, peer, inner.config.send_timeout).await {
            inner.pending.discard(&id);
            return Err(e);
        }

        // the reply window starts once the request is out
        let wait = inner.config.wait_timeout;
        let table = Arc::downgrade(&inner.pending);
        inner.pending.arm(&id, || {
            inner.scheduler.after(
                wait,
                Box::new(move || {
                    if let Some(table) = table.upgrade() {
                        table.expire(&id, wait);
                    }
                }),
            )
        });
        Ok(PendingCall::new(id, rx))
    }

    /// Retry a datagram while the socket reports backpressure, for at most `window`.
    ///
    /// Backoff goes through the scheduler, other tasks keep running meanwhile. Any other
    /// transport error is returned at once as [RpcError::Send]. If the buffer stays full for the
    /// whole window the datagram is dropped and [RpcError::SendTimeout] returned.
    pub async fn send_reliably(
        &self, data: &[u8], peer: SocketAddr, window: Duration,
    ) -> Result<(), RpcError> {
        let inner = &self.inner;
        let deadline = inner.scheduler.now() + window;
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            match inner.transport.try_send_to(data, peer) {
                Ok(_) => {
                    if attempts > 1 {
                        debug!("sent {}B to {} after {} attempts", data.len(), peer, attempts);
                    }
                    return Ok(());
                }
                Err(e) if is_transient(&e) => {
                    if inner.scheduler.now() >= deadline {
                        break;
                    }
                    trace!("send to {} would block ({}), retry", peer, e);
                    inner.scheduler.sleep(inner.config.send_backoff).await;
                }
                Err(e) => {
                    warn!("send to {} failed: {}", peer, e);
                    return Err(RpcError::Send(e));
                }
            }
        }
        warn!(
            "send to {} still blocked after {:?} and {} attempts, dropped",
            peer, window, attempts
        );
        Err(RpcError::SendTimeout(window))
    }

    /// Receive datagrams until the transport fails.
    ///
    /// Each datagram is handled on its own task, a slow handler does not hold up the ones
    /// behind it. Errors returned by [RpcNode::handle_datagram] are logged here.
    pub async fn run(&self) -> io::Result<()> {
        let mut buf = vec![0u8; self.inner.config.recv_buf_size];
        debug!("rpc node listening on {:?}", self.local_addr());
        loop {
            let (len, peer) = match self.inner.transport.recv_from(&mut buf).await {
                Ok(r) => r,
                Err(e) if is_recv_recoverable(&e) => {
                    debug!("recv error ignored: {}", e);
                    continue;
                }
                Err(e) => {
                    error!("recv failed: {}", e);
                    return Err(e);
                }
            };
            let datagram = buf[..len].to_vec();
            let node = self.clone();
            self.inner.scheduler.spawn(async move {
                if let Err(e) = node.handle_datagram(&datagram, peer).await {
                    warn!("datagram from {} rejected: {}", peer, e);
                }
            });
        }
    }

    /// Process one inbound datagram.
    ///
    /// Undersized, unknown-kind and unmatched datagrams are logged and dropped with `Ok`.
    /// A request whose payload is not `[method, [args...]]` returns
    /// [RpcError::MalformedRequest], an undecodable payload [RpcError::Decode]. No response is
    /// sent in either case, nor for unknown methods or failing handlers.
    pub async fn handle_datagram(
        &self, datagram: &[u8], peer: SocketAddr,
    ) -> Result<(), RpcError> {
        if self.inner.config.noisy {
            trace!("received datagram from {}", peer);
        }
        let frame = match Frame::parse(datagram) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("received {} from {}, ignoring", e, peer);
                return Ok(());
            }
        };
        match frame.kind {
            FrameKind::Response => self.accept_response(frame.id, frame.payload, peer),
            FrameKind::Request => self.accept_request(frame.id, frame.payload, peer).await,
        }
    }

    fn accept_response(
        &self, id: CorrelationId, payload: &[u8], peer: SocketAddr,
    ) -> Result<(), RpcError> {
        let data: Value = self.inner.codec.decode(payload).map_err(|_| RpcError::Decode)?;
        if self.inner.pending.resolve(&id, data) {
            if self.inner.config.noisy {
                trace!("received response for msg id {} from {}", id, peer);
            }
        } else {
            warn!("received unknown response {} from {}; ignoring", id, peer);
        }
        Ok(())
    }

    async fn accept_request(
        &self, id: CorrelationId, payload: &[u8], peer: SocketAddr,
    ) -> Result<(), RpcError> {
        let value: Value = self.inner.codec.decode(payload).map_err(|_| RpcError::Decode)?;
        let RequestEnvelope { method, args } = RequestEnvelope::from_value(value)?;
        let Some(handler) = self.inner.handlers.get(&method) else {
            warn!("no handler for method {:?}, ignoring request {} from {}", method, id, peer);
            return Ok(());
        };
        match handler.call(peer, args).await {
            Ok(result) => self.send_response(id, &result, peer).await,
            Err(e) => {
                // nothing on the wire can carry a failure, the caller times out
                error!("handler {:?} failed on request {} from {}: {}", method, id, peer, e);
                Ok(())
            }
        }
    }

    async fn send_response(
        &self, id: CorrelationId, result: &Value, peer: SocketAddr,
    ) -> Result<(), RpcError> {
        let payload = self.inner.codec.encode(result).map_err(|_| RpcError::Encode)?;
        let datagram = Frame::new(FrameKind::Response, id, &payload).to_bytes();
        if self.inner.config.noisy {
            trace!("sending response for msg id {} to {}", id, peer);
        }
        self.send_reliably(&datagram, peer, self.inner.config.send_timeout).await
    }
}
