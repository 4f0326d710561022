use razor_udp::scheduler::Scheduler;
use razor_udp::server::arg;
use razor_udp::transport::DatagramTransport;
use razor_udp::{HandlerError, RpcNode, Value};
use std::net::SocketAddr;
use std::time::Duration;

pub async fn echo(_peer: SocketAddr, args: Vec<Value>) -> Result<Value, HandlerError> {
    Ok(Value::Array(args))
}

/// Replies with the address the request came from.
pub async fn whoami(peer: SocketAddr, _args: Vec<Value>) -> Result<Value, HandlerError> {
    Ok(Value::from(peer.to_string()))
}

fn int_arg(args: &[Value], idx: usize) -> Result<i64, HandlerError> {
    arg(args, idx)?
        .as_i64()
        .ok_or_else(|| HandlerError::new(format!("argument {} is not an int", idx)))
}

pub async fn add(_peer: SocketAddr, args: Vec<Value>) -> Result<Value, HandlerError> {
    let (a, b) = (int_arg(&args, 0)?, int_arg(&args, 1)?);
    a.checked_add(b).map(Value::from).ok_or_else(|| "overflow".into())
}

pub async fn div(_peer: SocketAddr, args: Vec<Value>) -> Result<Value, HandlerError> {
    let (a, b) = (int_arg(&args, 0)?, int_arg(&args, 1)?);
    if b == 0 {
        return Err("divide by zero".into());
    }
    Ok(Value::from(a / b))
}

/// Sleeps for `args[0]` milliseconds before echoing the rest.
pub async fn slow(_peer: SocketAddr, mut args: Vec<Value>) -> Result<Value, HandlerError> {
    let ms = int_arg(&args, 0)?;
    tokio::time::sleep(Duration::from_millis(ms as u64)).await;
    args.remove(0);
    Ok(Value::Array(args))
}

pub fn register_services<T, S>(node: &RpcNode<T, S>)
where
    T: DatagramTransport,
    S: Scheduler,
{
    node.register("echo", echo);
    node.register("whoami", whoami);
    node.register("add", add);
    node.register("div", div);
    node.register("slow", slow);
}
