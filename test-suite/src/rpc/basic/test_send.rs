use crate::*;
use nix::errno::Errno;
use razor_udp::{CallResult, RpcError};
use std::io;
use std::time::Duration;

#[logfn]
#[rstest]
fn test_payload_too_large(paused_runner: TestRunner) {
    paused_runner.block_on(async move {
        let node = mock_node(TokioScheduler::current(), test_config());
        let big = "a".repeat(9000);
        match node.call("echo", peer_addr(), (big,)).await {
            Err(RpcError::PayloadTooLarge { size, max }) => {
                assert!(size > 9000);
                assert_eq!(max, 8192);
            }
            Err(e) => panic!("unexpected error {}", e),
            Ok(_) => panic!("oversized call was sent"),
        }
        // rejected before touching the socket
        assert_eq!(node.transport().attempts(), 0);
        assert_eq!(node.pending_count(), 0);
    });
}

/// `["m", ["a" * n]]` encodes to n + 5 bytes while n < 32.
#[logfn]
#[rstest]
#[case(27, true)]
#[case(28, false)]
fn test_payload_limit_edge(paused_runner: TestRunner, #[case] n: usize, #[case] fits: bool) {
    paused_runner.block_on(async move {
        let config = RpcConfig { max_payload: 32, ..test_config() };
        let node = mock_node(TokioScheduler::current(), config);
        let res = node.call("m", peer_addr(), ("a".repeat(n),)).await;
        if fits {
            assert!(res.is_ok());
            assert_eq!(node.transport().sent_count(), 1);
        } else {
            assert!(matches!(res, Err(RpcError::PayloadTooLarge { size: 33, max: 32 })));
            assert_eq!(node.transport().sent_count(), 0);
        }
    });
}

#[logfn]
#[rstest]
fn test_backpressure_retried(paused_runner: TestRunner) {
    paused_runner.block_on(async move {
        let node = mock_node(TokioScheduler::current(), test_config());
        let transport = node.transport();
        transport.push_failure(io::ErrorKind::WouldBlock.into());
        transport.push_failure(io::Error::from_raw_os_error(Errno::EAGAIN as i32));
        transport.push_failure(io::Error::from_raw_os_error(Errno::ENOBUFS as i32));
        transport.push_failure(io::ErrorKind::WouldBlock.into());

        let start = tokio::time::Instant::now();
        let pending = node.call("echo", peer_addr(), ("x",)).await.expect("call");
        assert_eq!(transport.attempts(), 5);
        assert_eq!(transport.sent_count(), 1);
        assert_eq!(node.pending_count(), 1);
        // four backoffs of 1ms on the paused clock
        assert!(start.elapsed() >= Duration::from_millis(4));
        assert!(start.elapsed() < Duration::from_millis(100));
        let (_, id, _) = decode_frame(&transport.sent()[0].0);
        assert_eq!(id, pending.id());
    });
}

#[logfn]
#[rstest]
#[case(io::ErrorKind::PermissionDenied)]
#[case(io::ErrorKind::AddrNotAvailable)]
fn test_fatal_send_error(paused_runner: TestRunner, #[case] kind: io::ErrorKind) {
    paused_runner.block_on(async move {
        let node = mock_node(TokioScheduler::current(), test_config());
        node.transport().push_failure(kind.into());
        match node.call("echo", peer_addr(), ("x",)).await {
            Err(RpcError::Send(e)) => assert_eq!(e.kind(), kind),
            Err(e) => panic!("unexpected error {}", e),
            Ok(_) => panic!("call should fail"),
        }
        assert_eq!(node.transport().attempts(), 1);
        // the entry registered for the call is gone with its timer
        assert_eq!(node.pending_count(), 0);
    });
}

#[logfn]
#[rstest]
fn test_send_window_exhausted(paused_runner: TestRunner) {
    paused_runner.block_on(async move {
        let node = mock_node(TokioScheduler::current(), test_config());
        node.transport().set_blocked(true);
        let window = Duration::from_millis(50);
        let start = tokio::time::Instant::now();
        let res = node.send_reliably(b"datagram", peer_addr(), window).await;
        assert!(matches!(res, Err(RpcError::SendTimeout(w)) if w == window), "{:?}", res);
        assert!(start.elapsed() >= window);
        assert!(node.transport().attempts() > 1);
        assert_eq!(node.transport().sent_count(), 0);
    });
}

#[logfn]
#[rstest]
fn test_call_send_timeout(paused_runner: TestRunner) {
    paused_runner.block_on(async move {
        let config = RpcConfig { send_timeout: Duration::from_millis(20), ..test_config() };
        let node = mock_node(TokioScheduler::current(), config);
        node.transport().set_blocked(true);
        let res = node.call("echo", peer_addr(), ("x",)).await;
        assert!(matches!(res, Err(RpcError::SendTimeout(_))));
        assert_eq!(node.pending_count(), 0);
    });
}

/// Backoff yields to the runtime, other tasks run while a send is congested.
#[logfn]
#[rstest]
fn test_backoff_not_blocking(paused_runner: TestRunner) {
    paused_runner.block_on(async move {
        let node = mock_node(TokioScheduler::current(), test_config());
        node.transport().set_blocked(true);
        let sender = node.clone();
        let task = tokio::spawn(async move {
            sender.send_reliably(b"datagram", peer_addr(), Duration::from_secs(1)).await
        });

        // this sleep only completes if the sender is parked between attempts
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!task.is_finished());
        assert_eq!(node.transport().sent_count(), 0);

        node.transport().set_blocked(false);
        task.await.expect("join").expect("sent after congestion cleared");
        assert_eq!(node.transport().sent_count(), 1);
    });
}

fn congested_for(node: &MockNode<TokioScheduler>, period: Duration) {
    node.transport().set_blocked(true);
    let unblock = node.clone();
    tokio::spawn(async move {
        tokio::time::sleep(period).await;
        unblock.transport().set_blocked(false);
    });
}

/// Time spent retrying a congested send does not count against the reply window.
#[logfn]
#[rstest]
fn test_slow_send_keeps_reply_window(paused_runner: TestRunner) {
    paused_runner.block_on(async move {
        let config = RpcConfig {
            wait_timeout: Duration::from_secs(1),
            send_timeout: Duration::from_secs(5),
            ..test_config()
        };
        let node = mock_node(TokioScheduler::current(), config);

        congested_for(&node, Duration::from_secs(2));
        let start = tokio::time::Instant::now();
        let mut answered = node.call("echo", peer_addr(), ("x",)).await.expect("call");
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert_eq!(node.transport().sent_count(), 1);
        assert!(answered.try_result().is_none());
        let reply = response_frame(answered.id(), &Value::from("x"));
        node.handle_datagram(&reply, peer_addr()).await.expect("response");
        assert_eq!(answered.await, CallResult::reply(Value::from("x")));
        assert_eq!(node.pending_count(), 0);

        // unanswered, it expires one full window after the send
        congested_for(&node, Duration::from_secs(2));
        let mut silent = node.call("echo", peer_addr(), ("y",)).await.expect("call");
        assert_eq!(node.transport().sent_count(), 2);
        tokio::time::sleep(Duration::from_millis(900)).await;
        assert!(silent.try_result().is_none());
        assert_eq!(node.pending_count(), 1);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(silent.try_result(), Some(CallResult::timed_out()));
        assert_eq!(node.pending_count(), 0);
    });
}

#[logfn]
#[rstest]
fn test_args_not_sequence(paused_runner: TestRunner) {
    paused_runner.block_on(async move {
        let node = mock_node(TokioScheduler::current(), test_config());
        let res = node.call("m", peer_addr(), "abc").await;
        assert!(matches!(res, Err(RpcError::MalformedRequest(_))), "{:?}", res.err());
        let res = node.call("m", peer_addr(), 5u32).await;
        assert!(matches!(res, Err(RpcError::MalformedRequest(_))), "{:?}", res.err());
        // refused before anything reached the socket
        assert_eq!(node.transport().attempts(), 0);
        assert_eq!(node.pending_count(), 0);
        assert!(node.call("m", peer_addr(), vec!["abc"]).await.is_ok());
    });
}
