#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(docsrs, allow(unused_attributes))]

//! # razor-udp
//!
//! A minimal RPC transport layered directly over UDP datagrams.
//!
//! A call to method `foo` on a peer is turned into one framed datagram, the reply is matched
//! back to the caller by a random correlation ID, and the caller is resolved with either the reply
//! payload or a timeout marker. The same [RpcNode] also accepts inbound requests and dispatches
//! them to handlers registered by name.
//!
//! There is no reliability layer: a lost request, a lost reply, an unknown method and a failing
//! handler all look the same to the caller, a timeout.
//!
//! ## Components
//!
//! The engine is generic over three seams, so each can be swapped for tests or another runtime:
//!
//! - [Codec](crate::codec::Codec): serialization of argument lists and results.
//!   [MsgpCodec](crate::codec::MsgpCodec) is the default, values are [rmpv::Value].
//! - [DatagramTransport](crate::transport::DatagramTransport): implemented for
//!   [tokio::net::UdpSocket].
//! - [Scheduler](crate::scheduler::Scheduler): timers, backoff and task spawning.
//!   [TokioScheduler](crate::scheduler::TokioScheduler) for production,
//!   [ManualScheduler](crate::scheduler::ManualScheduler) to drive timeouts by hand.
//!
//! ## Protocol
//!
//! Each datagram is one frame, described in [crate::proto]:
//!
//! ```text
//! +------+-------------------------+------------------------+
//! | kind | correlation id (20 B)   | msgpack payload        |
//! +------+-------------------------+------------------------+
//! ```
//!
//! A request payload is `[method, [args...]]`, a response payload is the handler's result value.
//!
//! ## Usage
//!
//! ```no_run
//! use razor_udp::{HandlerError, RpcConfig, RpcNode, Value};
//! use razor_udp::{scheduler::TokioScheduler, transport::bind_udp};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let socket = bind_udp("127.0.0.1:0").await?;
//! let node: RpcNode<_, _> = RpcNode::new(socket, TokioScheduler::current(), RpcConfig::default());
//! node.register("echo", |_peer, args: Vec<Value>| async move {
//!     Ok::<_, HandlerError>(Value::Array(args))
//! });
//!
//! let server = node.clone();
//! tokio::spawn(async move { server.run().await });
//!
//! let reply = node.call("echo", "127.0.0.1:4000".parse()?, ("hello",)).await?.await;
//! if reply.success {
//!     println!("{:?}", reply.data);
//! }
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate captains_log;

pub mod codec;
pub mod config;
pub mod error;
mod node;
pub mod pending;
pub mod proto;
pub mod scheduler;
pub mod server;
pub mod transport;

pub use config::RpcConfig;
pub use error::{FrameError, HandlerError, RpcError};
pub use node::RpcNode;
pub use pending::{CallResult, PendingCall};
pub use rmpv::Value;
