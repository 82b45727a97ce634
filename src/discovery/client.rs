// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Component K: the client-side half of peer discovery. Periodically
//! exchanges `(key, supported_protocols)` with a beacon address and hands
//! the relay a peer set grouped by protocol number.

use std::io;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::core::socket_address::SocketAddress;
use crate::discovery::wire::{BeaconMessage, ProtocolSupport};
use crate::monitoring::metrics::Metrics;
use crate::transport::tuning::Tuning;

/// Upward notifications from the discovery client.
pub trait DiscoveryUpcalls: Send + Sync {
    /// A candidate peer was learned for `protocol`. `addr` already carries
    /// its port, so this crate's rendering of `spec.md` §4.7's
    /// `new_peer(addr, protocol, port)` folds the redundant port parameter
    /// into `addr`.
    fn new_peer(&self, addr: SocketAddress, protocol: u32);
}

/// Errors from the discovery client's socket setup.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// Underlying socket bind failure.
    #[error("discovery io error")]
    Io(#[from] io::Error),
}

/// Periodic beacon client: announces this node's key and protocol set every
/// `T_beacon`, and reports every peer in the beacon's response upward.
pub struct DiscoveryClient {
    socket: UdpSocket,
    beacon_addr: SocketAddress,
    node_key: [u8; 32],
    protocols: Vec<ProtocolSupport>,
    tuning: Tuning,
    metrics: Arc<Metrics>,
}

impl DiscoveryClient {
    /// Bind a discovery client at `local`, targeting `beacon_addr`.
    pub async fn bind(
        local: SocketAddress,
        beacon_addr: SocketAddress,
        node_key: [u8; 32],
        protocols: Vec<ProtocolSupport>,
        tuning: Tuning,
        metrics: Arc<Metrics>,
    ) -> Result<Self, DiscoveryError> {
        let socket = UdpSocket::bind(std::net::SocketAddr::from(local)).await?;
        Ok(Self { socket, beacon_addr, node_key, protocols, tuning, metrics })
    }

    /// Local bound address.
    pub fn local_addr(&self) -> io::Result<SocketAddress> {
        self.socket.local_addr().map(SocketAddress::from)
    }

    async fn send_hello(&self) {
        let hello = BeaconMessage::Hello { key: self.node_key, protocols: self.protocols.clone() };
        if let Err(e) = self.socket.send_to(&hello.encode(), std::net::SocketAddr::from(self.beacon_addr)).await {
            debug!(error = ?e, "beacon hello send failed");
        }
    }

    /// Drive the beacon exchange forever: announces every `T_beacon`,
    /// retrying with the same exponential backoff as the stream transport's
    /// DIAL schedule (`spec.md` §4.7) whenever a round trip times out, and
    /// reporting every peer in a `PEERLIST` response to `upcalls`.
    pub async fn run(mut self, upcalls: Arc<dyn DiscoveryUpcalls>) {
        let mut backoff = self.tuning.t_dial_rtx;
        let mut buf = vec![0u8; 4096];
        loop {
            self.send_hello().await;
            match tokio::time::timeout(backoff, self.socket.recv_from(&mut buf)).await {
                Ok(Ok((n, from))) => {
                    let from = SocketAddress::from(from);
                    if from != self.beacon_addr {
                        continue;
                    }
                    self.on_response(&buf[..n], upcalls.as_ref());
                    backoff = self.tuning.t_dial_rtx;
                    tokio::time::sleep(self.tuning.t_beacon).await;
                }
                Ok(Err(e)) => {
                    warn!(error = ?e, "discovery socket recv failed");
                }
                Err(_elapsed) => {
                    self.metrics.discovery_reconnects_total.inc();
                    backoff = (backoff * 2).min(crate::transport::tuning::T_DIAL_RTX_MAX);
                    debug!(?backoff, "beacon hello unanswered, backing off");
                }
            }
        }
    }

    fn on_response(&mut self, bytes: &[u8], upcalls: &dyn DiscoveryUpcalls) {
        let Some(BeaconMessage::PeerList { protocols, peers, .. }) = BeaconMessage::decode(bytes) else {
            debug!("dropping malformed or non-PEERLIST beacon response");
            return;
        };
        info!(count = peers.len(), "beacon peer list received");
        for peer in peers {
            for proto in &protocols {
                upcalls.new_peer(peer, proto.proto_id);
            }
            self.metrics.discovery_peers_learned_total.inc();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder(Mutex<Vec<(SocketAddress, u32)>>);

    impl DiscoveryUpcalls for Recorder {
        fn new_peer(&self, addr: SocketAddress, protocol: u32) {
            self.0.lock().unwrap().push((addr, protocol));
        }
    }

    #[tokio::test]
    async fn beacon_round_trip_reports_peers() {
        let beacon = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let beacon_addr: SocketAddress = beacon.local_addr().unwrap().into();

        let metrics = Arc::new(Metrics::new().unwrap());
        let client = DiscoveryClient::bind(
            "127.0.0.1:0".parse().unwrap(),
            beacon_addr,
            [1u8; 32],
            vec![ProtocolSupport { proto_id: 7, version_min: 1, version_max: 1 }],
            Tuning { t_beacon: std::time::Duration::from_secs(3600), ..Tuning::default() },
            metrics,
        )
        .await
        .unwrap();
        let client_addr = client.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            let (n, from) = beacon.recv_from(&mut buf).await.unwrap();
            assert!(matches!(BeaconMessage::decode(&buf[..n]), Some(BeaconMessage::Hello { .. })));
            let resp = BeaconMessage::PeerList {
                key: [2u8; 32],
                protocols: vec![ProtocolSupport { proto_id: 7, version_min: 1, version_max: 1 }],
                peers: vec!["10.0.0.5:9000".parse().unwrap()],
            };
            beacon.send_to(&resp.encode(), from).await.unwrap();
        });

        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let recorder_for_run = recorder.clone();
        let run_task = tokio::spawn(async move { client.run(recorder_for_run).await });

        server.await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        run_task.abort();

        let got = recorder.0.lock().unwrap();
        assert_eq!(*got, vec![("10.0.0.5:9000".parse::<SocketAddress>().unwrap(), 7)]);
        let _ = client_addr;
    }
}
