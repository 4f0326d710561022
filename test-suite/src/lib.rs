pub mod api;
pub mod mock;

extern crate captains_log;
extern crate log;
pub use captains_log::logfn;
use captains_log::*;
pub use mock::MockTransport;
use razor_udp::codec::{Codec, MsgpCodec};
use razor_udp::proto::{CorrelationId, Frame, FrameKind};
use razor_udp::scheduler::{ManualScheduler, Scheduler, TokioScheduler};
use razor_udp::transport::bind_udp;
use razor_udp::{RpcConfig, RpcNode, Value};
use rstest::*;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::runtime::Runtime;

pub type UdpNode = RpcNode<UdpSocket, TokioScheduler>;
pub type MockNode<S> = RpcNode<MockTransport, S>;

#[fixture]
pub fn runner() -> TestRunner {
    TestRunner::new()
}

/// Current-thread runtime with the clock paused, sleeps auto-advance when idle.
#[fixture]
pub fn paused_runner() -> TestRunner {
    TestRunner::paused()
}

impl fmt::Debug for TestRunner {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "")
    }
}

pub struct TestRunner {
    pub rt: Runtime,
}

impl TestRunner {
    pub fn new() -> Self {
        setup_log();
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
            .enable_all()
            .build()
            .expect("runtime");
        Self { rt }
    }

    pub fn paused() -> Self {
        setup_log();
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .expect("runtime");
        Self { rt }
    }

    pub fn block_on<F: Future<Output = ()>>(&self, f: F) {
        self.rt.block_on(f);
    }
}

fn setup_log() {
    recipe::raw_file_logger("/tmp/razor_udp_test.log", Level::Trace).test().build().expect("log");
}

pub fn test_config() -> RpcConfig {
    RpcConfig { noisy: true, ..Default::default() }
}

pub fn node_addr() -> SocketAddr {
    "10.0.0.1:4000".parse().expect("addr")
}

pub fn peer_addr() -> SocketAddr {
    "10.0.0.2:4000".parse().expect("addr")
}

pub fn mock_node<S: Scheduler>(scheduler: S, config: RpcConfig) -> MockNode<S> {
    RpcNode::new(MockTransport::new(node_addr()), scheduler, config)
}

/// A node on a mock socket with a hand-driven clock.
pub fn manual_node(config: RpcConfig) -> (MockNode<ManualScheduler>, ManualScheduler) {
    let scheduler = ManualScheduler::new();
    (mock_node(scheduler.clone(), config), scheduler)
}

/// Bind a loopback socket and start serving it, must be called inside the runtime.
pub async fn udp_node(config: RpcConfig) -> UdpNode {
    let socket = bind_udp("127.0.0.1:0").await.expect("bind");
    let node = UdpNode::new(socket, TokioScheduler::current(), config);
    let server = node.clone();
    tokio::spawn(async move {
        if let Err(e) = server.run().await {
            log::error!("node stopped: {}", e);
        }
    });
    node
}

pub fn request_frame(id: CorrelationId, method: &str, args: Vec<Value>) -> Vec<u8> {
    let payload = MsgpCodec.encode(&(method, args)).expect("encode");
    Frame::new(FrameKind::Request, id, &payload).to_bytes()
}

pub fn response_frame(id: CorrelationId, value: &Value) -> Vec<u8> {
    let payload = MsgpCodec.encode(value).expect("encode");
    Frame::new(FrameKind::Response, id, &payload).to_bytes()
}

/// Split a captured datagram and decode its payload.
pub fn decode_frame(datagram: &[u8]) -> (FrameKind, CorrelationId, Value) {
    let frame = Frame::parse(datagram).expect("frame");
    let value: Value = MsgpCodec.decode(frame.payload).expect("payload");
    (frame.kind, frame.id, value)
}
