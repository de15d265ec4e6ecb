use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Self-stats for the ingestion pipeline, named after the self-stats table.
/// Mirrored into the `metrics` facade (see `publish`) so the service stays
/// observable independent of whatever `Sink` is configured.
#[derive(Default)]
pub struct Telemetry {
    pub tcp_max_connections: AtomicUsize,
    pub tcp_current_connections: AtomicUsize,
    pub tcp_total_connections: AtomicU64,
    pub tcp_packets_received: AtomicU64,
    pub tcp_bytes_received: AtomicU64,
    pub udp_packets_received: AtomicU64,
    pub udp_packets_dropped: AtomicU64,
    pub udp_bytes_received: AtomicU64,
    pub parse_time_ns: AtomicU64,
    pub pending_messages: AtomicUsize,
    pub max_pending_messages: AtomicUsize,
}

impl Telemetry {
    pub fn publish(&self) {
        metrics::gauge!("tcp_max_connections").set(self.tcp_max_connections.load(Ordering::Relaxed) as f64);
        metrics::gauge!("tcp_current_connections")
            .set(self.tcp_current_connections.load(Ordering::Relaxed) as f64);
        metrics::counter!("tcp_total_connections").absolute(self.tcp_total_connections.load(Ordering::Relaxed));
        metrics::counter!("tcp_packets_received").absolute(self.tcp_packets_received.load(Ordering::Relaxed));
        metrics::counter!("tcp_bytes_received").absolute(self.tcp_bytes_received.load(Ordering::Relaxed));
        metrics::counter!("udp_packets_received").absolute(self.udp_packets_received.load(Ordering::Relaxed));
        metrics::counter!("udp_packets_dropped").absolute(self.udp_packets_dropped.load(Ordering::Relaxed));
        metrics::counter!("udp_bytes_received").absolute(self.udp_bytes_received.load(Ordering::Relaxed));
        metrics::gauge!("parse_time_ns").set(self.parse_time_ns.load(Ordering::Relaxed) as f64);
        metrics::gauge!("pending_messages").set(self.pending_messages.load(Ordering::Relaxed) as f64);
        metrics::gauge!("max_pending_messages").set(self.max_pending_messages.load(Ordering::Relaxed) as f64);
    }
}
