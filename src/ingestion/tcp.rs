use std::io;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use rand::Rng;
use snafu::ResultExt;
use socket2::{SockRef, TcpKeepalive};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Semaphore};
use tokio_stream::StreamExt;
use tokio_util::codec::{Decoder, FramedRead};
use tracing::{info, warn};

use crate::error::{Error, IoSnafu};
use crate::ingestion::pool::BufferPool;
use crate::ingestion::{try_enqueue, QueueItem, QueueSender};
use crate::shutdown::ShutdownSignal;
use crate::telemetry::Telemetry;

/// Decodes `\n`-delimited frames without requiring valid UTF-8, mirroring
/// the reference codebase's own delimiter-based framing codec.
struct LineCodec;

impl Decoder for LineCodec {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, io::Error> {
        match buf.iter().position(|b| *b == b'\n') {
            Some(pos) => {
                let mut frame = buf.split_to(pos + 1);
                let frame = frame.split_to(frame.len() - 1);
                Ok(Some(frame.freeze()))
            }
            None => Ok(None),
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, io::Error> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None if !buf.is_empty() => Ok(Some(buf.split_to(buf.len()).freeze())),
            None => Ok(None),
        }
    }
}

pub struct TcpOptions {
    pub max_connections: usize,
    pub keep_alive: bool,
    pub keep_alive_period: Duration,
}

/// Live TCP connections, keyed by a random 6-character id, so `Stop` can
/// close every socket under one lock without racing the accept loop.
#[derive(Default)]
struct ConnTable {
    ids: std::collections::HashMap<String, ()>,
}

pub async fn run(
    addr: SocketAddr,
    opts: TcpOptions,
    queue: QueueSender,
    telemetry: Arc<Telemetry>,
    pool: Arc<BufferPool>,
    log_every: usize,
    mut shutdown: ShutdownSignal,
) -> Result<(), Error> {
    let listener = TcpListener::bind(addr)
        .await
        .context(IoSnafu { during: "tcp bind" })?;
    info!(%addr, "tcp listener bound");

    telemetry
        .tcp_max_connections
        .store(opts.max_connections, Ordering::Relaxed);

    let permits = Arc::new(Semaphore::new(opts.max_connections));
    let conns = Arc::new(Mutex::new(ConnTable::default()));
    let keep_alive = opts.keep_alive;
    let keep_alive_period = opts.keep_alive_period;

    loop {
        let accepted = tokio::select! {
            biased;
            _ = shutdown.wait() => break,
            res = listener.accept() => res,
        };

        let (stream, peer) = match accepted {
            Ok(v) => v,
            Err(e) if is_closed(&e) => break,
            Err(e) => return Err(Error::Io { during: "tcp accept", source: e }),
        };

        let Ok(permit) = Arc::clone(&permits).try_acquire_owned() else {
            warn!(%peer, "refusing tcp connection: max_tcp_connections reached");
            drop(stream);
            continue;
        };

        if keep_alive {
            if let Err(e) = set_keepalive(&stream, keep_alive_period) {
                warn!(%peer, error = %e, "failed to set tcp keepalive");
            }
        }

        let conn_id = random_id();
        conns.lock().await.ids.insert(conn_id.clone(), ());
        telemetry.tcp_total_connections.fetch_add(1, Ordering::Relaxed);
        telemetry
            .tcp_current_connections
            .fetch_add(1, Ordering::Relaxed);

        let queue = queue.clone();
        let telemetry = telemetry.clone();
        let pool = pool.clone();
        let conns = conns.clone();
        let mut conn_shutdown = shutdown.clone();

        tokio::spawn(async move {
            handle_connection(
                stream,
                peer,
                queue,
                telemetry.clone(),
                pool,
                log_every,
                &mut conn_shutdown,
            )
            .await;

            conns.lock().await.ids.remove(&conn_id);
            telemetry
                .tcp_current_connections
                .fetch_sub(1, Ordering::Relaxed);
            drop(permit);
        });
    }
    Ok(())
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    queue: QueueSender,
    telemetry: Arc<Telemetry>,
    pool: Arc<BufferPool>,
    log_every: usize,
    shutdown: &mut ShutdownSignal,
) {
    let mut framed = FramedRead::new(stream, LineCodec);
    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.wait() => break,
            next = framed.next() => next,
        };
        let Some(frame) = next else { break };
        let line = match frame {
            Ok(line) => line,
            Err(e) => {
                warn!(%peer, error = %e, "tcp read error");
                break;
            }
        };

        telemetry.tcp_packets_received.fetch_add(1, Ordering::Relaxed);
        telemetry
            .tcp_bytes_received
            .fetch_add(line.len() as u64, Ordering::Relaxed);

        let mut buf = pool.acquire();
        buf.extend_from_slice(&line);
        buf.extend_from_slice(b"\n");

        let item = QueueItem {
            payload: buf,
            received_at: Instant::now(),
            source: peer,
        };
        try_enqueue(&queue, item, &telemetry, log_every);
    }
}

fn set_keepalive(stream: &TcpStream, period: Duration) -> io::Result<()> {
    let sock_ref = SockRef::from(stream);
    let keepalive = TcpKeepalive::new().with_time(period);
    sock_ref.set_tcp_keepalive(&keepalive)
}

fn random_id() -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::rng();
    (0..6)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect()
}

fn is_closed(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::NotConnected)
}
