#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Reliable stream transport: datagram I/O, framing/versioning fibers, the
//! per-connection state machine, and the generation-token manager that ties
//! them to a running node.

pub mod datagram;
pub mod framing;
pub mod manager;
pub mod stream;
pub mod tuning;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::core::socket_address::SocketAddress;
use crate::monitoring::metrics::Metrics;
use crate::networking::peer_score::PeerScore;
use datagram::DatagramTransport;
use manager::{TransportHandle, TransportManager};
use stream::{ConnState, Frame, StreamAction, StreamConnection, StreamEvent};
use tuning::Tuning;

/// Error returned by [`StreamEngine::send_to_addr`] when no connection
/// exists for the given address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendToAddrError {
    /// No transport has ever been dialed or accepted at this address.
    #[error("no transport for address")]
    NotConnected,
    /// A transport exists but its send buffer is full.
    #[error("send buffer full")]
    Full,
}

impl From<stream::SendBufferFull> for SendToAddrError {
    fn from(_: stream::SendBufferFull) -> Self {
        Self::Full
    }
}

/// An event raised by a connection, tagged with the peer address it concerns
/// so a single channel can multiplex every open connection's upcalls.
#[derive(Debug, Clone)]
pub struct AddressedEvent {
    /// Peer the event concerns.
    pub addr: SocketAddress,
    /// The event itself.
    pub event: StreamEvent,
}

/// Owns the datagram socket and every stream connection dialed or accepted
/// on it, driving the single-threaded cooperative event loop described for
/// this crate's concurrency model: one task services socket reads, timers,
/// and connection state transitions.
pub struct StreamEngine {
    datagram: Arc<DatagramTransport>,
    manager: Mutex<TransportManager<StreamConnection>>,
    tuning: Tuning,
    local_version: u16,
    next_conn_id: AtomicU32,
    events_tx: mpsc::UnboundedSender<AddressedEvent>,
    metrics: Arc<Metrics>,
}

impl StreamEngine {
    /// Bind a new engine at `local`, returning it and the receiving half of
    /// its upward event channel.
    pub async fn bind(
        local: SocketAddress,
        local_version: u16,
        tuning: Tuning,
        score: PeerScore,
        metrics: Arc<Metrics>,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<AddressedEvent>), datagram::DatagramError> {
        let datagram = Arc::new(DatagramTransport::bind(local, score, metrics.clone()).await?);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let engine = Arc::new(Self {
            datagram,
            manager: Mutex::new(TransportManager::new()),
            tuning,
            local_version,
            next_conn_id: AtomicU32::new(1),
            events_tx,
            metrics,
        });
        Ok((engine, events_rx))
    }

    /// Local bound address.
    pub fn local_addr(&self) -> std::io::Result<SocketAddress> {
        self.datagram.local_addr()
    }

    fn fresh_conn_id(&self) -> u32 {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Dial `addr`, sending the initial DIAL frame immediately.
    pub async fn dial(&self, addr: SocketAddress) -> TransportHandle {
        let mut mgr = self.manager.lock().await;
        let conn_id = self.fresh_conn_id();
        let now = Instant::now();
        let (conn, dial_frame) = StreamConnection::dial(conn_id, self.local_version, now, self.tuning);
        let (handle, _created) = mgr.get_or_create(addr, || conn);
        drop(mgr);
        let _ = self.datagram.send_to(addr, &dial_frame.encode()).await;
        handle
    }

    /// Queue bytes for reliable ordered delivery on an established connection.
    pub async fn send(&self, handle: TransportHandle, bytes: &[u8]) -> Result<(), stream::SendBufferFull> {
        let mut mgr = self.manager.lock().await;
        let conn = mgr.resolve_mut(handle).ok_or(stream::SendBufferFull)?;
        conn.send(bytes)?;
        let action = conn.poll_timers(Instant::now());
        drop(mgr);
        self.dispatch(handle.address(), action).await;
        Ok(())
    }

    /// Queue bytes for delivery to whatever transport is currently
    /// connected at `addr`, resolving the handle for the caller. Pub/sub
    /// layers above this engine address peers by [`SocketAddress`], not by
    /// handle, and keep no retry queue of their own (§4.5: "retransmission
    /// is the stream's responsibility").
    pub async fn send_to_addr(&self, addr: SocketAddress, bytes: &[u8]) -> Result<(), SendToAddrError> {
        let mut mgr = self.manager.lock().await;
        let handle = mgr.get(&addr).ok_or(SendToAddrError::NotConnected)?;
        let conn = mgr.resolve_mut(handle).ok_or(SendToAddrError::NotConnected)?;
        conn.send(bytes)?;
        let action = conn.poll_timers(Instant::now());
        drop(mgr);
        self.dispatch(addr, action).await;
        Ok(())
    }

    /// Whether `addr` currently has a connection in
    /// [`ConnState::Established`].
    pub async fn is_established(&self, addr: SocketAddress) -> bool {
        let mgr = self.manager.lock().await;
        mgr.get_value(&addr).map(|c| c.state() == ConnState::Established).unwrap_or(false)
    }

    /// Request a graceful close of `handle`.
    pub async fn close(&self, handle: TransportHandle) {
        let mut mgr = self.manager.lock().await;
        let Some(conn) = mgr.resolve_mut(handle) else { return };
        let action = conn.close(Instant::now());
        drop(mgr);
        self.dispatch(handle.address(), action).await;
    }

    async fn dispatch(&self, addr: SocketAddress, action: StreamAction) {
        if action.retransmits > 0 {
            self.metrics.stream_retransmits_total.inc_by(action.retransmits as u64);
        }
        for frame in action.to_send {
            if matches!(frame, Frame::Ack { .. }) {
                self.metrics.stream_acks_sent_total.inc();
            }
            if let Err(e) = self.datagram.send_to(addr, &frame.encode()).await {
                debug!(%addr, error = ?e, "datagram send failed, relying on retransmit");
            }
        }
        for event in action.events {
            let _ = self.events_tx.send(AddressedEvent { addr, event });
        }
    }

    /// Drive the engine until the socket is closed: reads datagrams, feeds
    /// them to the right connection (creating a listener on an accepted
    /// DIAL), and ticks every connection's timers on a fixed interval.
    pub async fn run(self: Arc<Self>) {
        let mut buf = vec![0u8; 65536];
        let mut ticker = tokio::time::interval(Duration::from_millis(10));
        loop {
            tokio::select! {
                recvd = self.datagram.recv_from(&mut buf) => {
                    match recvd {
                        Ok((from, n)) => self.on_datagram(from, &buf[..n]).await,
                        Err(e) => warn!(error = ?e, "datagram recv failed"),
                    }
                }
                _ = ticker.tick() => self.on_tick().await,
            }
        }
    }

    async fn on_datagram(&self, from: SocketAddress, bytes: &[u8]) {
        let Some(frame) = Frame::decode(bytes) else {
            self.metrics.p2p_invalid_msg_total.inc();
            debug!(%from, "dropping malformed frame");
            return;
        };

        let now = Instant::now();
        let mut mgr = self.manager.lock().await;
        let existing = mgr.get(&from);
        let (action, erase) = match existing {
            Some(handle) => {
                let conn = mgr.resolve_mut(handle).expect("handle just resolved");
                let action = conn.on_frame(frame, now);
                let erase = conn.is_closed();
                (action, erase)
            }
            None => {
                if !matches!(frame, Frame::Dial { .. }) {
                    debug!(%from, "frame for unknown connection, dropping");
                    (StreamAction::default(), false)
                } else if !self.datagram.should_accept(&from) {
                    (StreamAction::default(), false)
                } else {
                    let conn_id = self.fresh_conn_id();
                    let conn = StreamConnection::listen(conn_id, self.local_version, self.tuning);
                    let (handle, _) = mgr.get_or_create(from, || conn);
                    let conn = mgr.resolve_mut(handle).expect("just inserted");
                    let action = conn.on_frame(frame, now);
                    (action, false)
                }
            }
        };
        if erase {
            mgr.erase(&from);
        }
        drop(mgr);
        self.dispatch(from, action).await;
    }

    async fn on_tick(&self) {
        let now = Instant::now();
        let mut mgr = self.manager.lock().await;
        let addrs: Vec<SocketAddress> = mgr.iter().map(|(a, _)| *a).collect();
        let mut to_erase = Vec::new();
        let mut actions = Vec::new();
        let mut established = 0i64;
        for addr in &addrs {
            if let Some(conn) = mgr.get_value_mut(addr) {
                let action = conn.poll_timers(now);
                if conn.is_closed() {
                    to_erase.push(*addr);
                } else if conn.state() == ConnState::Established {
                    established += 1;
                }
                actions.push((*addr, action));
            }
        }
        for addr in &to_erase {
            mgr.erase(addr);
        }
        drop(mgr);
        self.metrics.p2p_peers.set(established);
        for (addr, action) in actions {
            self.dispatch(addr, action).await;
        }
    }
}
