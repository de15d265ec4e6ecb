use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use snafu::ResultExt;
use socket2::{Domain, Socket, Type};
use tokio::net::UdpSocket;
use tracing::info;

use crate::error::{Error, IoSnafu};
use crate::ingestion::pool::BufferPool;
use crate::ingestion::{try_enqueue, QueueItem, QueueSender};
use crate::shutdown::ShutdownSignal;
use crate::telemetry::Telemetry;

/// Max UDP datagram size per the wire protocol.
const MAX_DATAGRAM: usize = 65_536;

/// Binds the UDP socket, tuning `SO_RCVBUF` via `socket2` when configured,
/// then reads datagrams into a fixed staging buffer until shutdown.
pub async fn run(
    addr: SocketAddr,
    read_buffer_size: usize,
    queue: QueueSender,
    telemetry: Arc<Telemetry>,
    pool: Arc<BufferPool>,
    log_every: usize,
    mut shutdown: ShutdownSignal,
) -> Result<(), Error> {
    let socket = bind_udp(addr, read_buffer_size)?;
    info!(%addr, "udp listener bound");

    let mut staging = vec![0u8; MAX_DATAGRAM];
    loop {
        let (len, source) = tokio::select! {
            biased;
            _ = shutdown.wait() => break,
            res = socket.recv_from(&mut staging) => match res {
                Ok(v) => v,
                Err(e) if is_closed(&e) => break,
                Err(e) => return Err(Error::Io { during: "udp recv", source: e }),
            },
        };

        let mut buf = pool.acquire();
        buf.extend_from_slice(&staging[..len]);

        telemetry
            .udp_packets_received
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        telemetry
            .udp_bytes_received
            .fetch_add(len as u64, std::sync::atomic::Ordering::Relaxed);

        let item = QueueItem {
            payload: buf,
            received_at: Instant::now(),
            source,
        };
        try_enqueue(&queue, item, &telemetry, log_every);
    }
    Ok(())
}

fn bind_udp(addr: SocketAddr, read_buffer_size: usize) -> Result<UdpSocket, Error> {
    let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
    let socket = Socket::new(domain, Type::DGRAM, None).context(IoSnafu { during: "udp socket create" })?;
    socket
        .set_nonblocking(true)
        .context(IoSnafu { during: "udp set nonblocking" })?;
    if read_buffer_size > 0 {
        socket
            .set_recv_buffer_size(read_buffer_size)
            .context(IoSnafu { during: "udp set SO_RCVBUF" })?;
    }
    socket.bind(&addr.into()).context(IoSnafu { during: "udp bind" })?;
    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket).context(IoSnafu { during: "udp into tokio socket" })
}

fn is_closed(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::NotConnected | std::io::ErrorKind::BrokenPipe
    )
}
