pub mod pool;
pub mod tcp;
pub mod udp;
pub mod worker;

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::time::Instant;

use bytes::BytesMut;
use tokio::sync::mpsc;
use tracing::warn;

use crate::telemetry::Telemetry;

/// One framed payload handed from a listener to a parser worker: either a
/// UDP datagram or a `\n`-framed TCP line.
pub struct QueueItem {
    pub payload: BytesMut,
    pub received_at: Instant,
    pub source: SocketAddr,
}

pub type QueueSender = mpsc::Sender<QueueItem>;
pub type QueueReceiver = mpsc::Receiver<QueueItem>;

pub fn bounded_queue(depth: usize) -> (QueueSender, QueueReceiver) {
    mpsc::channel(depth)
}

/// Non-blocking enqueue. On overflow, increments `telemetry.udp_packets_dropped`
/// (the one drop self-stat, shared by both listener protocols) and logs the
/// first drop and every `AllowedPendingMessages`-th drop thereafter, rather
/// than blocking the listener.
pub fn try_enqueue(queue: &QueueSender, item: QueueItem, telemetry: &Telemetry, log_every: usize) {
    telemetry
        .pending_messages
        .store(queue.max_capacity() - queue.capacity(), Ordering::Relaxed);

    if let Err(mpsc::error::TrySendError::Full(_)) = queue.try_send(item) {
        let dropped = telemetry.udp_packets_dropped.fetch_add(1, Ordering::Relaxed) + 1;
        if dropped == 1 || (log_every > 0 && dropped as usize % log_every == 0) {
            warn!(dropped, "queue full, dropping message");
        }
    }
}
