use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::error;

use crate::aggregator::Aggregator;
use crate::ingestion::pool::BufferPool;
use crate::ingestion::QueueReceiver;
use crate::parser::{parse_line, ParsedLine, ParserOptions};
use crate::shutdown::ShutdownSignal;
use crate::telemetry::Telemetry;

/// A queue receiver shared by every worker in the pool. Workers take turns
/// holding the lock only for the duration of a single `recv()` call, so all
/// `N` workers genuinely compete for the next item rather than one worker
/// monopolizing the channel.
pub type SharedQueueReceiver = Arc<Mutex<QueueReceiver>>;

/// One parser worker: pulls framed payloads off the shared queue, splits
/// them into lines, and applies each parsed sample to the aggregator. Parse
/// errors are logged and the offending line is dropped; the worker itself
/// never exits on a parse error, only on queue closure or shutdown.
pub async fn run(
    queue: SharedQueueReceiver,
    aggregator: Arc<Aggregator>,
    opts: ParserOptions,
    telemetry: Arc<Telemetry>,
    pool: Arc<BufferPool>,
    mut shutdown: ShutdownSignal,
) {
    loop {
        let item = tokio::select! {
            biased;
            _ = shutdown.wait() => break,
            item = async { queue.lock().await.recv().await } => item,
        };
        let Some(item) = item else { break };

        let start = Instant::now();
        let text = String::from_utf8_lossy(&item.payload);
        for line in text.split('\n') {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match parse_line(line, opts) {
                Ok(ParsedLine::Samples(samples)) => {
                    for sample in samples {
                        aggregator.apply(&sample, item.received_at);
                    }
                }
                Ok(ParsedLine::Event(_event)) => {
                    // Event lines are routed to an external event handler
                    // that is out of scope for this core; we only need to
                    // tolerate them without aborting the batch.
                }
                Err(err) => {
                    error!(%err, "dropping unparseable line");
                }
            }
        }
        telemetry
            .parse_time_ns
            .store(start.elapsed().as_nanos() as u64, Ordering::Relaxed);

        pool.release(item.payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::ingestion::{bounded_queue, QueueItem};
    use crate::keying::IdentityMapper;
    use crate::shutdown::ShutdownHandle;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    #[tokio::test]
    async fn parses_queued_batch_and_tolerates_bad_lines() {
        let (tx, rx) = bounded_queue(10);
        let aggregator = Arc::new(Aggregator::new(Config::default(), Box::new(IdentityMapper)));
        let telemetry = Arc::new(Telemetry::default());
        let pool = Arc::new(BufferPool::new());
        let (handle, signal) = ShutdownHandle::new();

        let rx = Arc::new(Mutex::new(rx));
        let worker = tokio::spawn(run(
            rx,
            aggregator.clone(),
            ParserOptions::default(),
            telemetry,
            pool,
            signal,
        ));

        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        tx.send(QueueItem {
            payload: bytes::BytesMut::from(&b"load:1|g\nnot-a-valid-line\nrt:2|ms"[..]),
            received_at: Instant::now(),
            source: addr,
        })
        .await
        .unwrap();

        // Give the worker a beat to process, then shut it down.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        handle.shutdown();
        worker.await.unwrap();

        aggregator.with_caches(|c| {
            assert_eq!(c.gauges().len(), 1);
            assert_eq!(c.timings().len(), 1);
        });
    }
}
