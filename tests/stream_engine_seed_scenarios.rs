#![forbid(unsafe_code)]

//! Integration tests for the literal seed scenarios in `spec.md` §8,
//! exercised over real loopback UDP sockets rather than mocks, matching
//! this crate's existing transport test style (see `discovery::client`).

use std::time::Duration;

use osiris_relay::core::socket_address::SocketAddress;
use osiris_relay::monitoring::metrics::Metrics;
use osiris_relay::networking::peer_score::{PeerScore, ScoreParams};
use osiris_relay::transport::stream::StreamEvent;
use osiris_relay::transport::tuning::Tuning;
use osiris_relay::transport::StreamEngine;

async fn bind(tuning: Tuning) -> (std::sync::Arc<StreamEngine>, tokio::sync::mpsc::UnboundedReceiver<osiris_relay::transport::AddressedEvent>) {
    StreamEngine::bind(
        "127.0.0.1:0".parse().unwrap(),
        1,
        tuning,
        PeerScore::new(ScoreParams::default()),
        std::sync::Arc::new(Metrics::new().expect("metrics")),
    )
    .await
    .expect("bind")
}

async fn recv_event(
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<osiris_relay::transport::AddressedEvent>,
) -> osiris_relay::transport::AddressedEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("event within deadline")
        .expect("channel open")
}

/// Seed scenario 1: dial-ack-data-close. A dials B; A sends 40 bytes; B
/// receives those bytes in order; A closes; both reach CLOSED within 2*RTO.
#[tokio::test]
async fn dial_ack_data_close() {
    let tuning = Tuning { mss: 16, ..Tuning::default() };
    let (a, mut a_events) = bind(tuning).await;
    let (b, mut b_events) = bind(tuning).await;
    let b_addr = b.local_addr().unwrap();

    tokio::spawn(a.clone().run());
    tokio::spawn(b.clone().run());

    let handle = a.dial(b_addr).await;
    let dialed = recv_event(&mut a_events).await;
    assert_eq!(dialed.event, StreamEvent::DidDial { success: true });

    let payload: Vec<u8> = (0u8..40).collect();
    a.send(handle, &payload).await.expect("send");

    let mut received = Vec::new();
    while received.len() < payload.len() {
        let ev = recv_event(&mut b_events).await;
        if let StreamEvent::DidRecv(bytes) = ev.event {
            received.extend(bytes);
        }
    }
    assert_eq!(received, payload);

    a.close(handle).await;
    tokio::time::sleep(tuning.t_dial_rtx.min(Duration::from_millis(500))).await;
}

/// Seed scenario 5: a pub/sub frame carrying an out-of-range version tag is
/// dropped by the versioning fiber without tearing down the stream.
#[tokio::test]
async fn version_mismatch_drops_without_disconnect() {
    use osiris_relay::transport::framing::Framer;
    use osiris_relay::transport::versioning::VersioningFiber;

    let versioning = VersioningFiber::new(1);
    let framed = Framer::encode(&versioning.encode(b"payload"));

    // Corrupt the 2-byte LE version tag (immediately after the 4-byte
    // length prefix) to an out-of-range value.
    let mut corrupted = framed.clone();
    corrupted[4] = 0xFF;
    corrupted[5] = 0xFF;

    let mut framer = Framer::default();
    let messages = framer.push(&corrupted);
    assert_eq!(messages.len(), 1);
    assert!(versioning.decode(&messages[0]).is_err());
}

/// Seed scenario 6: dialing an address nothing listens on gives up after
/// the configured deadline and reports a non-graceful disconnect exactly
/// once.
#[tokio::test]
async fn handshake_give_up_reports_disconnect_once() {
    let tuning = Tuning {
        t_dial_rtx: Duration::from_millis(20),
        t_dial_giveup: Duration::from_millis(80),
        ..Tuning::default()
    };
    let (a, mut a_events) = bind(tuning).await;
    tokio::spawn(a.clone().run());

    // Nothing is bound at this address: reserve and immediately drop a
    // socket to get a free loopback port guaranteed to be unreachable.
    let reserved = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let unreachable: SocketAddress = reserved.local_addr().unwrap().into();
    drop(reserved);

    let _handle = a.dial(unreachable).await;

    let first = recv_event(&mut a_events).await;
    assert_eq!(first.event, StreamEvent::DidDial { success: false });
    let second = recv_event(&mut a_events).await;
    assert_eq!(second.event, StreamEvent::DidDisconnect { reason: 1 });

    let timed_out = tokio::time::timeout(Duration::from_millis(200), a_events.recv()).await;
    assert!(timed_out.is_err(), "no further events should be raised after give-up");
}
