//! Datagram gateway: validation, bounded queue and UDP round trips.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use common::{CountingOrigin, relay_with, test_options};
use relay_server::Relay;
use relay_server::config::GatewayConfig;
use relay_server::gateway::TransportGateway;
use relay_server::workers::TaskResponse;
use serde_json::{Value, json};
use tokio::net::UdpSocket;

fn gateway_config(queue_capacity: usize) -> GatewayConfig {
    GatewayConfig {
        enabled: true,
        bind: "127.0.0.1:0".to_string(),
        max_datagram_bytes: 1024,
        queue_capacity,
        tick_ms: 1,
    }
}

fn datagram(value: Value) -> Vec<u8> {
    serde_json::to_vec(&value).unwrap()
}

fn ping(id: &str) -> Vec<u8> {
    datagram(json!({"id": id, "type": "ping", "payload": {}, "timestamp": 1_700_000_000_000u64}))
}

fn peer() -> SocketAddr {
    "127.0.0.1:9".parse().unwrap()
}

async fn recv_response(socket: &UdpSocket, wait: Duration) -> Option<TaskResponse> {
    let mut buf = vec![0u8; 64 * 1024];
    let (len, _) = tokio::time::timeout(wait, socket.recv_from(&mut buf))
        .await
        .ok()?
        .ok()?;
    serde_json::from_slice(&buf[..len]).ok()
}

#[tokio::test]
async fn test_overflow_drops_and_counts() {
    let relay = relay_with(Arc::new(CountingOrigin::new()));
    let gateway = TransportGateway::bind(&gateway_config(2), Arc::clone(relay.pool()))
        .await
        .unwrap();

    assert!(gateway.handle_datagram(&ping("1"), peer()));
    assert!(gateway.handle_datagram(&ping("2"), peer()));
    assert!(!gateway.handle_datagram(&ping("3"), peer()));

    let stats = gateway.stats();
    assert_eq!(stats.queued, 2);
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.received, 3);
}

#[tokio::test]
async fn test_malformed_datagrams_are_not_queued() {
    let relay = relay_with(Arc::new(CountingOrigin::new()));
    let gateway = TransportGateway::bind(&gateway_config(10), Arc::clone(relay.pool()))
        .await
        .unwrap();

    let missing_type = datagram(json!({"id": "x", "payload": {}, "timestamp": 1}));
    assert!(!gateway.handle_datagram(&missing_type, peer()));
    assert!(!gateway.handle_datagram(b"not json", peer()));
    assert!(!gateway.handle_datagram(&vec![b' '; 2048], peer()));

    let stats = gateway.stats();
    assert_eq!(stats.queued, 0);
    assert_eq!(stats.invalid, 2);
    assert_eq!(stats.oversized, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_udp_round_trip() {
    let mut options = test_options();
    options.gateway = Some(gateway_config(100));
    let relay = Relay::new(
        common::memory_chain(),
        Arc::new(CountingOrigin::new()),
        options,
    );
    relay.start().await.unwrap();
    let addr = relay.gateway().unwrap().local_addr().unwrap();

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let request = datagram(json!({
        "id": "req-42",
        "type": "resource_detail",
        "payload": {"resourceId": "character:1"},
        "timestamp": 1_700_000_000_000u64
    }));
    client.send_to(&request, addr).await.unwrap();

    let response = recv_response(&client, Duration::from_secs(2))
        .await
        .expect("response");
    assert_eq!(response.id, "req-42");
    assert!(response.success);
    assert_eq!(response.data.unwrap()["source"], "origin");

    relay.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_malformed_datagram_gets_no_response() {
    let mut options = test_options();
    options.gateway = Some(gateway_config(100));
    let relay = Relay::new(
        common::memory_chain(),
        Arc::new(CountingOrigin::new()),
        options,
    );
    relay.start().await.unwrap();
    let addr = relay.gateway().unwrap().local_addr().unwrap();

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let missing_type = datagram(json!({"id": "bad", "payload": {}, "timestamp": 1}));
    client.send_to(&missing_type, addr).await.unwrap();
    client.send_to(&ping("good"), addr).await.unwrap();

    let response = recv_response(&client, Duration::from_secs(2))
        .await
        .expect("ping response");
    assert_eq!(response.id, "good");
    assert!(recv_response(&client, Duration::from_millis(200)).await.is_none());

    let stats = relay.stats().await.gateway.unwrap();
    assert_eq!(stats.invalid, 1);
    assert_eq!(stats.responded, 1);

    relay.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_task_does_not_hold_back_later_ones() {
    let mut options = test_options();
    options.gateway = Some(gateway_config(100));
    let relay = Relay::new(
        common::memory_chain(),
        Arc::new(CountingOrigin::with_delay(Duration::from_millis(500))),
        options,
    );
    relay.start().await.unwrap();
    let addr = relay.gateway().unwrap().local_addr().unwrap();

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let slow = datagram(json!({
        "id": "slow",
        "type": "resource_detail",
        "payload": {"resourceId": "news:latest"},
        "timestamp": 1_700_000_000_000u64
    }));
    client.send_to(&slow, addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.send_to(&ping("fast"), addr).await.unwrap();

    let first = recv_response(&client, Duration::from_secs(2))
        .await
        .expect("ping response");
    assert_eq!(first.id, "fast");
    let second = recv_response(&client, Duration::from_secs(2))
        .await
        .expect("detail response");
    assert_eq!(second.id, "slow");
    assert!(second.success);

    relay.stop().await;
}
