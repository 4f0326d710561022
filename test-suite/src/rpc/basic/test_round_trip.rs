use crate::api::{client::*, server::*};
use crate::*;
use log::info;
use razor_udp::RpcError;
use std::time::Duration;

#[logfn]
#[rstest]
fn test_echo_round_trip(runner: TestRunner) {
    runner.block_on(async move {
        let server = udp_node(test_config()).await;
        register_services(&server);
        let client = udp_node(test_config()).await;
        let server_addr = server.local_addr().expect("server addr");

        let reply = client.call("echo", server_addr, ("x",)).await.expect("call").await;
        assert!(reply.success);
        assert_eq!(reply.data, Some(Value::Array(vec![Value::from("x")])));
        assert_eq!(client.pending_count(), 0);
        info!("echo round trip done");
    });
}

#[logfn]
#[rstest]
#[case(1, 2, 3)]
#[case(-5, 5, 0)]
#[case(i64::MAX - 1, 1, i64::MAX)]
fn test_typed_client(runner: TestRunner, #[case] a: i64, #[case] b: i64, #[case] sum: i64) {
    runner.block_on(async move {
        let server = udp_node(test_config()).await;
        register_services(&server);
        let client = udp_node(test_config()).await;
        let cal = CalClient::new(client.clone(), server.local_addr().expect("server addr"));
        assert_eq!(cal.add(a, b).await.expect("add"), sum);
    });
}

#[logfn]
#[rstest]
fn test_handler_sees_sender(runner: TestRunner) {
    runner.block_on(async move {
        let server = udp_node(test_config()).await;
        register_services(&server);
        let client = udp_node(test_config()).await;
        let echo = EchoClient::new(client.clone(), server.local_addr().expect("server addr"));
        assert_eq!(echo.repeat("hello").await.expect("repeat"), "hello");
        let me = client.local_addr().expect("client addr").to_string();
        assert_eq!(echo.whoami().await.expect("whoami"), me);
    });
}

/// A failing handler sends nothing back, the caller only sees a timeout.
#[logfn]
#[rstest]
fn test_handler_failure_times_out(runner: TestRunner) {
    runner.block_on(async move {
        let server = udp_node(test_config()).await;
        register_services(&server);
        let config = RpcConfig { wait_timeout: Duration::from_millis(300), ..test_config() };
        let client = udp_node(config).await;
        let cal = CalClient::new(client.clone(), server.local_addr().expect("server addr"));
        assert_eq!(cal.div(9, 3).await.expect("div"), 3);
        assert!(matches!(cal.div(1, 0).await, Err(RpcError::CallTimeout)));
        assert_eq!(client.pending_count(), 0);
    });
}

/// Replies are matched by id, not by arrival order.
#[logfn]
#[rstest]
fn test_concurrent_calls(runner: TestRunner) {
    runner.block_on(async move {
        let server = udp_node(test_config()).await;
        register_services(&server);
        let client = udp_node(test_config()).await;
        let server_addr = server.local_addr().expect("server addr");

        let mut tasks = Vec::new();
        for i in 0..50i64 {
            let client = client.clone();
            // earlier calls sleep longer, so replies come back reversed
            let delay = (50 - i) * 2;
            tasks.push(tokio::spawn(async move {
                let reply = client.call("slow", server_addr, (delay, i)).await.expect("call").await;
                (i, reply)
            }));
        }
        for task in tasks {
            let (i, reply) = task.await.expect("join");
            assert!(reply.success);
            assert_eq!(reply.data, Some(Value::Array(vec![Value::from(i)])));
        }
        assert_eq!(client.pending_count(), 0);
    });
}

#[logfn]
#[rstest]
fn test_silent_peer_times_out(runner: TestRunner) {
    runner.block_on(async move {
        // bound but never served
        let silent = tokio::net::UdpSocket::bind("127.0.0.1:0").await.expect("bind");
        let config = RpcConfig { wait_timeout: Duration::from_millis(200), ..test_config() };
        let client = udp_node(config).await;
        let pending = client
            .call("echo", silent.local_addr().expect("addr"), ("x",))
            .await
            .expect("call");
        assert_eq!(client.pending_count(), 1);
        let reply = pending.await;
        assert!(!reply.success);
        assert_eq!(reply.data, None);
        assert_eq!(client.pending_count(), 0);
    });
}
