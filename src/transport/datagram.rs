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

//! Datagram transport: a thin `UdpSocket` wrapper with a peer-scoring accept
//! hook. Retry/retransmit logic is entirely the stream layer's concern; this
//! module only moves bytes.

use std::io;
use std::sync::{Arc, Mutex};

use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::core::socket_address::SocketAddress;
use crate::monitoring::metrics::Metrics;
use crate::networking::peer_score::{Decision, PeerScore};

/// Errors from the datagram transport.
#[derive(Debug, thiserror::Error)]
pub enum DatagramError {
    /// Underlying socket I/O failure (bind, send).
    #[error("datagram io error")]
    Io(#[from] io::Error),
}

/// A bound UDP socket paired with a peer-scoring accept policy.
pub struct DatagramTransport {
    socket: UdpSocket,
    score: Mutex<PeerScore>,
    metrics: Arc<Metrics>,
}

impl DatagramTransport {
    /// Bind a new datagram transport at `local`.
    pub async fn bind(local: SocketAddress, score: PeerScore, metrics: Arc<Metrics>) -> Result<Self, DatagramError> {
        let socket = UdpSocket::bind(std::net::SocketAddr::from(local)).await?;
        Ok(Self { socket, score: Mutex::new(score), metrics })
    }

    /// Local address the socket is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddress> {
        self.socket.local_addr().map(SocketAddress::from)
    }

    /// Send a datagram to `addr`. Short sends and `WouldBlock` are transient
    /// I/O per the error taxonomy: the caller's retransmit timer, not this
    /// function, is responsible for recovery.
    pub async fn send_to(&self, addr: SocketAddress, bytes: &[u8]) -> Result<(), DatagramError> {
        self.socket.send_to(bytes, std::net::SocketAddr::from(addr)).await?;
        Ok(())
    }

    /// Receive the next datagram, returning its sender address and payload.
    pub async fn recv_from(&self, buf: &mut [u8]) -> Result<(SocketAddress, usize), DatagramError> {
        let (n, from) = self.socket.recv_from(buf).await?;
        Ok((SocketAddress::from(from), n))
    }

    /// Whether a DIAL from `addr` should be accepted, consulting and updating
    /// the peer-scoring table.
    pub fn should_accept(&self, addr: &SocketAddress) -> bool {
        let key = format!("{addr}").into_bytes();
        let mut guard = self.score.lock().expect("peer score lock poisoned");
        let decision = guard.observe_good(key, std::time::Instant::now(), 1);
        match decision {
            Decision::Allow => true,
            Decision::Throttle => {
                self.metrics.p2p_rate_limited_total.inc();
                debug!(%addr, "throttling dial, peer score negative");
                true
            }
            Decision::Ban => {
                self.metrics.p2p_banned_total.inc();
                warn!(%addr, "rejecting dial, peer banned");
                false
            }
        }
    }

    /// Record a protocol violation from `addr`, penalizing its score.
    pub fn observe_violation(&self, addr: &SocketAddress) {
        let key = format!("{addr}").into_bytes();
        let mut guard = self.score.lock().expect("peer score lock poisoned");
        let decision = guard.observe_bad(key, std::time::Instant::now(), 1);
        if decision == Decision::Ban {
            self.metrics.p2p_reputation_throttled_total.inc();
        }
    }
}
