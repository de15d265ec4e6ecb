use std::time::Duration;

use statsd_agg::config::Config;
use statsd_agg::keying::IdentityMapper;
use statsd_agg::sink::RecordingSink;
use statsd_agg::Service;
use tokio::net::UdpSocket;

/// Sends real UDP datagrams at a bound service and checks the aggregated
/// result comes back out through `gather`, exercising the listener, queue,
/// worker, and flush path together rather than any one module in isolation.
#[tokio::test]
async fn udp_counter_and_gauge_round_trip() {
    let port = 18_000 + (std::process::id() % 4000) as u16;
    let addr = format!("127.0.0.1:{port}");

    let mut config = Config::default();
    config.service_address = addr.clone();
    let service = Service::start(config, Box::new(IdentityMapper)).await.unwrap();

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.connect(&addr).await.unwrap();
    client.send(b"requests:1|c\nrequests:1|c\nload:42|g").await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut sink = RecordingSink::default();
    service.gather(&mut sink);

    assert_eq!(sink.counters.len(), 1);
    assert_eq!(sink.counters[0].0, "requests");
    assert_eq!(sink.gauges.len(), 1);
    assert_eq!(sink.gauges[0].0, "load");

    service.stop().await;
}
