use std::time::Duration;

use clap::Parser;
use statsd_agg::config::{Config, Protocol};
use statsd_agg::keying::IdentityMapper;
use statsd_agg::sink::StdoutSink;
use statsd_agg::Service;
use tracing::info;

/// Standalone StatsD/DogStatsD ingestion daemon. Binds a listener, runs the
/// configured number of parser workers, and flushes the aggregated state to
/// stdout on a fixed interval until interrupted.
#[derive(Parser, Debug)]
#[clap(name = "statsd-agg", about = "StatsD/DogStatsD ingestion and aggregation")]
struct Cmd {
    /// Address to listen on, e.g. "0.0.0.0:8125".
    #[clap(long, default_value = ":8125")]
    address: String,

    /// "udp" or "tcp".
    #[clap(long, default_value = "udp")]
    protocol: String,

    /// Number of parser worker tasks consuming the ingestion queue.
    #[clap(long, default_value_t = 5)]
    workers: usize,

    /// Percentiles to compute for timers and distributions, e.g. "90,95,99".
    #[clap(long, default_value = "90")]
    percentiles: String,

    /// Seconds between flushes to stdout.
    #[clap(long, default_value_t = 10)]
    flush_interval_secs: u64,

    /// Enable DogStatsD tag and event extensions.
    #[clap(long)]
    datadog_extensions: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let cmd = Cmd::parse();
    let percentiles: Vec<f64> = cmd
        .percentiles
        .split(',')
        .filter_map(|p| p.trim().parse().ok())
        .collect();

    let config = Config {
        protocol: Protocol::from_str_lenient(&cmd.protocol),
        service_address: cmd.address,
        number_worker_threads: cmd.workers,
        percentiles,
        datadog_extensions: cmd.datadog_extensions,
        ..Config::default()
    };

    let service = Service::start(config, Box::new(IdentityMapper)).await?;
    info!("statsd-agg running");

    let mut ticker = tokio::time::interval(Duration::from_secs(cmd.flush_interval_secs));
    let mut sink = StdoutSink;
    loop {
        tokio::select! {
            _ = ticker.tick() => service.gather(&mut sink),
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    service.stop().await;
    Ok(())
}
