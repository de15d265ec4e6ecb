use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

use crate::aggregator::Aggregator;
use crate::config::{Config, Protocol};
use crate::error::{ConfigSnafu, Error};
use crate::flush::Flusher;
use crate::ingestion::pool::BufferPool;
use crate::ingestion::tcp::TcpOptions;
use crate::ingestion::{bounded_queue, tcp, udp, worker};
use crate::keying::NameMapper;
use crate::parser::ParserOptions;
use crate::shutdown::ShutdownHandle;
use crate::sink::Sink;
use crate::telemetry::Telemetry;

/// Owns the running listener, worker, and (future) flush tasks for one
/// configured ingestion pipeline. `gather` is driven externally, matching
/// the "periodic external trigger" in the core design: this crate does not
/// itself decide when to flush.
pub struct Service {
    config: Config,
    aggregator: Arc<Aggregator>,
    flusher: Flusher,
    telemetry: Arc<Telemetry>,
    shutdown: ShutdownHandle,
    tasks: Vec<JoinHandle<Result<(), Error>>>,
}

impl Service {
    pub async fn start(config: Config, mapper: Box<dyn NameMapper>) -> Result<Self, Error> {
        config.validate()?;

        let addr = resolve_addr(&config.service_address)?;
        let telemetry = Arc::new(Telemetry::default());
        let aggregator = Arc::new(Aggregator::new(config.clone(), mapper));
        let flusher = Flusher::new(config.clone());
        let (shutdown, shutdown_signal) = ShutdownHandle::new();
        let pool = Arc::new(BufferPool::new());

        let (tx, rx) = bounded_queue(config.allowed_pending_messages);
        telemetry
            .max_pending_messages
            .store(config.allowed_pending_messages, std::sync::atomic::Ordering::Relaxed);

        let mut tasks: Vec<JoinHandle<Result<(), Error>>> = Vec::new();

        match config.protocol {
            Protocol::Udp => {
                let queue = tx.clone();
                let telemetry = telemetry.clone();
                let pool = pool.clone();
                let shutdown_signal = shutdown_signal.clone();
                let read_buffer_size = config.read_buffer_size;
                let log_every = config.allowed_pending_messages;
                tasks.push(tokio::spawn(async move {
                    udp::run(
                        addr,
                        read_buffer_size,
                        queue,
                        telemetry,
                        pool,
                        log_every,
                        shutdown_signal,
                    )
                    .await
                }));
            }
            Protocol::Tcp => {
                let queue = tx.clone();
                let telemetry = telemetry.clone();
                let pool = pool.clone();
                let shutdown_signal = shutdown_signal.clone();
                let opts = TcpOptions {
                    max_connections: config.max_tcp_connections,
                    keep_alive: config.tcp_keep_alive,
                    keep_alive_period: Duration::from_secs(config.tcp_keep_alive_period_secs),
                };
                let log_every = config.allowed_pending_messages;
                tasks.push(tokio::spawn(async move {
                    tcp::run(
                        addr,
                        opts,
                        queue,
                        telemetry,
                        pool,
                        log_every,
                        shutdown_signal,
                    )
                    .await
                }));
            }
        }
        drop(tx);

        let parser_opts = ParserOptions {
            datadog_extensions: config.datadog_extensions,
            datadog_keep_container_tag: config.datadog_keep_container_tag,
        };

        let num_workers = config.number_worker_threads;
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        for _ in 0..num_workers {
            let rx = rx.clone();
            let aggregator = aggregator.clone();
            let telemetry = telemetry.clone();
            let pool = pool.clone();
            let shutdown_signal = shutdown_signal.clone();
            tasks.push(tokio::spawn(async move {
                // Every worker shares the one receiver, locking it only for
                // the span of each `recv()` call, so all `num_workers`
                // workers genuinely interleave over the same bounded queue.
                worker::run(rx, aggregator, parser_opts, telemetry, pool, shutdown_signal).await;
                Ok(())
            }));
        }

        Ok(Self {
            config,
            aggregator,
            flusher,
            telemetry,
            shutdown,
            tasks,
        })
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Drains the aggregator's caches into `sink`. Callers trigger this on
    /// whatever cadence their environment dictates (a timer, an external
    /// `Gather` call, …); the core itself has no opinion on cadence.
    pub fn gather(&self, sink: &mut dyn Sink) {
        self.flusher.gather(&self.aggregator, sink, Instant::now());
        self.telemetry.publish();
    }

    pub async fn stop(self) {
        self.shutdown.shutdown();
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

/// Resolves `service_address` to a concrete `SocketAddr`. A bare `":<port>"`
/// (the documented default, e.g. `":8125"`) has an empty host, which
/// `str::to_socket_addrs` rejects outright (`getaddrinfo("", ...)` fails
/// with `EAI_NONAME`) rather than treating it as "every interface" the way
/// the convention intends; that empty host is rewritten to the IPv4 wildcard
/// `0.0.0.0` before resolution so the default actually binds all interfaces.
fn resolve_addr(service_address: &str) -> Result<SocketAddr, Error> {
    let rewritten;
    let service_address = if let Some(port) = service_address.strip_prefix(':') {
        rewritten = format!("0.0.0.0:{port}");
        rewritten.as_str()
    } else {
        service_address
    };

    service_address
        .to_socket_addrs()
        .map_err(|e| Error::Config {
            reason: format!("invalid service_address {service_address:?}: {e}"),
        })?
        .next()
        .ok_or_else(|| {
            ConfigSnafu {
                reason: format!("service_address {service_address:?} resolved to no addresses"),
            }
            .build()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keying::IdentityMapper;
    use crate::sink::RecordingSink;

    #[tokio::test]
    async fn starts_and_stops_udp_service() {
        let mut config = Config::default();
        config.service_address = "127.0.0.1:0".to_string();
        let service = Service::start(config, Box::new(IdentityMapper)).await.unwrap();
        let mut sink = RecordingSink::default();
        service.gather(&mut sink);
        service.stop().await;
    }

    #[test]
    fn resolve_addr_rewrites_bare_port_to_wildcard() {
        let addr = resolve_addr(":8125").unwrap();
        assert_eq!(addr, SocketAddr::new(std::net::Ipv4Addr::UNSPECIFIED.into(), 8125));
    }

    #[tokio::test]
    async fn starts_with_literal_default_service_address() {
        // Port 0 still exercises the empty-host rewrite in `resolve_addr`;
        // binding literally to ":8125" would collide across test runs.
        let mut config = Config::default();
        config.service_address = ":0".to_string();
        let service = Service::start(config, Box::new(IdentityMapper)).await.unwrap();
        service.stop().await;
    }
}
