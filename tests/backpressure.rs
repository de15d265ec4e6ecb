use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use statsd_agg::ingestion::{bounded_queue, try_enqueue, QueueItem};
use statsd_agg::telemetry::Telemetry;

fn item() -> QueueItem {
    QueueItem {
        payload: bytes::BytesMut::from(&b"x:1|c"[..]),
        received_at: Instant::now(),
        source: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
    }
}

/// A burst of `N > AllowedPendingMessages` datagrams with no worker draining
/// the queue: exactly `AllowedPendingMessages` are accepted, the remainder
/// are counted as drops.
#[test]
fn burst_with_paused_workers_drops_exact_remainder() {
    let depth = 10;
    let burst = 37;

    let (tx, _rx) = bounded_queue(depth);
    let telemetry = Arc::new(Telemetry::default());

    for _ in 0..burst {
        try_enqueue(&tx, item(), &telemetry, depth);
    }

    assert_eq!(
        telemetry.udp_packets_dropped.load(Ordering::Relaxed),
        (burst - depth) as u64
    );
    assert_eq!(tx.max_capacity() - tx.capacity(), depth);
}
