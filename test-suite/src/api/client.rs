//! Typed wrappers over `RpcNode::call`, one method per remote function.

use razor_udp::scheduler::Scheduler;
use razor_udp::transport::DatagramTransport;
use razor_udp::{RpcError, RpcNode, Value};
use std::net::SocketAddr;

pub struct CalClient<T: DatagramTransport, S: Scheduler> {
    node: RpcNode<T, S>,
    peer: SocketAddr,
}

impl<T: DatagramTransport, S: Scheduler> CalClient<T, S> {
    pub fn new(node: RpcNode<T, S>, peer: SocketAddr) -> Self {
        Self { node, peer }
    }

    pub async fn add(&self, a: i64, b: i64) -> Result<i64, RpcError> {
        let res = self.node.call("add", self.peer, (a, b)).await?.await.into_result()?;
        res.as_i64().ok_or(RpcError::Decode)
    }

    pub async fn div(&self, a: i64, b: i64) -> Result<i64, RpcError> {
        let res = self.node.call("div", self.peer, (a, b)).await?.await.into_result()?;
        res.as_i64().ok_or(RpcError::Decode)
    }
}

pub struct EchoClient<T: DatagramTransport, S: Scheduler> {
    node: RpcNode<T, S>,
    peer: SocketAddr,
}

impl<T: DatagramTransport, S: Scheduler> EchoClient<T, S> {
    pub fn new(node: RpcNode<T, S>, peer: SocketAddr) -> Self {
        Self { node, peer }
    }

    pub async fn repeat(&self, msg: &str) -> Result<String, RpcError> {
        let res = self.node.call("echo", self.peer, (msg,)).await?.await.into_result()?;
        match res {
            Value::Array(mut items) if items.len() == 1 => match items.pop() {
                Some(Value::String(s)) => s.into_str().ok_or(RpcError::Decode),
                _ => Err(RpcError::Decode),
            },
            _ => Err(RpcError::Decode),
        }
    }

    pub async fn whoami(&self) -> Result<String, RpcError> {
        let args: Vec<Value> = Vec::new();
        let res = self.node.call("whoami", self.peer, args).await?.await.into_result()?;
        res.as_str().map(|s| s.to_string()).ok_or(RpcError::Decode)
    }
}
