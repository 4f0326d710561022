use crate::*;
use razor_udp::CallResult;
use std::collections::HashSet;
use std::time::Duration;

const CALLS: usize = 10_000;

#[logfn]
#[rstest]
fn test_outstanding_ids_distinct(runner: TestRunner) {
    runner.block_on(async move {
        let config = RpcConfig { noisy: false, ..test_config() };
        let (node, sched) = manual_node(config);

        let mut calls = Vec::with_capacity(CALLS);
        for i in 0..CALLS {
            calls.push(node.call("echo", peer_addr(), (i as u64,)).await.expect("call"));
        }
        assert_eq!(node.pending_count(), CALLS);

        let ids: HashSet<CorrelationId> = calls.iter().map(|c| c.id()).collect();
        assert_eq!(ids.len(), CALLS);
        let wire_ids: HashSet<CorrelationId> =
            node.transport().sent().iter().map(|(datagram, _)| decode_frame(datagram).1).collect();
        assert_eq!(wire_ids, ids);

        sched.advance(Duration::from_secs(5));
        assert_eq!(node.pending_count(), 0);
        for call in calls {
            assert_eq!(call.await, CallResult::timed_out());
        }
    });
}
