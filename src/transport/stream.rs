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

//! A reliable, ordered, duplex byte stream multiplexed over a single
//! bidirectional datagram path. This is the core subsystem of the crate:
//! handshake/retry, congestion control, RTO estimation, flow control,
//! out-of-order reassembly, and delayed ACKs.

use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::core::buffer::Buffer;
use crate::transport::tuning::Tuning;

/// Frame type tags, as laid out on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum FrameType {
    Dial = 0,
    DialRsp = 1,
    Ack = 2,
    Data = 3,
    Rst = 4,
    Close = 5,
    KeepAlive = 6,
}

impl FrameType {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Dial),
            1 => Some(Self::DialRsp),
            2 => Some(Self::Ack),
            3 => Some(Self::Data),
            4 => Some(Self::Rst),
            5 => Some(Self::Close),
            6 => Some(Self::KeepAlive),
            _ => None,
        }
    }
}

/// A decoded stream-transport wire frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Handshake initiation.
    Dial { src_conn_id: u32, dst_conn_id: u32, version: u16 },
    /// Handshake response.
    DialRsp { src_conn_id: u32, dst_conn_id: u32, chosen_version: u16 },
    /// Acknowledgement, carrying newly-acked packet numbers since the last ACK
    /// and the sender's advertised receive window.
    Ack {
        src_conn_id: u32,
        dst_conn_id: u32,
        largest_acked: u64,
        ack_delay_ticks: u16,
        recv_window: u32,
        ranges: Vec<(u64, u64)>,
    },
    /// A segment of stream data.
    Data { src_conn_id: u32, dst_conn_id: u32, packet_number: u64, stream_offset: u64, payload: Vec<u8> },
    /// Hard reset: immediate, non-graceful teardown.
    Rst { src_conn_id: u32, dst_conn_id: u32 },
    /// Graceful close request.
    Close { src_conn_id: u32, dst_conn_id: u32 },
    /// Idle-connection keepalive.
    KeepAlive { src_conn_id: u32, dst_conn_id: u32 },
}

impl Frame {
    fn conn_ids(&self) -> (u32, u32) {
        match self {
            Frame::Dial { src_conn_id, dst_conn_id, .. }
            | Frame::DialRsp { src_conn_id, dst_conn_id, .. }
            | Frame::Ack { src_conn_id, dst_conn_id, .. }
            | Frame::Data { src_conn_id, dst_conn_id, .. }
            | Frame::Rst { src_conn_id, dst_conn_id }
            | Frame::Close { src_conn_id, dst_conn_id }
            | Frame::KeepAlive { src_conn_id, dst_conn_id } => (*src_conn_id, *dst_conn_id),
        }
    }

    /// Serialize to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Frame::Dial { src_conn_id, dst_conn_id, version } => {
                let mut b = Buffer::new(1 + 4 + 4 + 2);
                b.write_uint8_le(0, FrameType::Dial as u8);
                b.write_uint32_le(1, *src_conn_id);
                b.write_uint32_le(5, *dst_conn_id);
                b.write_uint16_le(9, *version);
                b.as_slice().to_vec()
            }
            Frame::DialRsp { src_conn_id, dst_conn_id, chosen_version } => {
                let mut b = Buffer::new(1 + 4 + 4 + 2 + 2);
                b.write_uint8_le(0, FrameType::DialRsp as u8);
                b.write_uint32_le(1, *src_conn_id);
                b.write_uint32_le(5, *dst_conn_id);
                b.write_uint16_le(9, 0); // version (unused on response)
                b.write_uint16_le(11, *chosen_version);
                b.as_slice().to_vec()
            }
            Frame::Ack { src_conn_id, dst_conn_id, largest_acked, ack_delay_ticks, recv_window, ranges } => {
                let mut b = Buffer::new(1 + 4 + 4 + 8 + 2 + 4 + 2 + ranges.len() * 16);
                b.write_uint8_le(0, FrameType::Ack as u8);
                b.write_uint32_le(1, *src_conn_id);
                b.write_uint32_le(5, *dst_conn_id);
                b.write_uint64_le(9, *largest_acked);
                b.write_uint16_le(17, *ack_delay_ticks);
                b.write_uint32_le(19, *recv_window);
                b.write_uint16_le(23, ranges.len() as u16);
                let mut off = 25;
                for (start, end) in ranges {
                    b.write_uint64_le(off, *start);
                    b.write_uint64_le(off + 8, *end);
                    off += 16;
                }
                b.as_slice().to_vec()
            }
            Frame::Data { src_conn_id, dst_conn_id, packet_number, stream_offset, payload } => {
                let mut b = Buffer::new(1 + 4 + 4 + 8 + 8 + 2 + payload.len());
                b.write_uint8_le(0, FrameType::Data as u8);
                b.write_uint32_le(1, *src_conn_id);
                b.write_uint32_le(5, *dst_conn_id);
                b.write_uint64_le(9, *packet_number);
                b.write_uint64_le(17, *stream_offset);
                b.write_uint16_le(25, payload.len() as u16);
                b.write(27, payload);
                b.as_slice().to_vec()
            }
            Frame::Rst { src_conn_id, dst_conn_id } => encode_bare(FrameType::Rst, *src_conn_id, *dst_conn_id),
            Frame::Close { src_conn_id, dst_conn_id } => encode_bare(FrameType::Close, *src_conn_id, *dst_conn_id),
            Frame::KeepAlive { src_conn_id, dst_conn_id } => {
                encode_bare(FrameType::KeepAlive, *src_conn_id, *dst_conn_id)
            }
        }
    }

    /// Parse a wire frame. Returns `None` on malformed input (unknown type,
    /// truncated fields) — the caller treats this as a protocol violation.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let b = Buffer::from_vec(bytes.to_vec());
        let ty = FrameType::from_u8(b.read_uint8_le(0)?)?;
        let src_conn_id = b.read_uint32_le(1)?;
        let dst_conn_id = b.read_uint32_le(5)?;
        match ty {
            FrameType::Dial => {
                let version = b.read_uint16_le(9)?;
                Some(Frame::Dial { src_conn_id, dst_conn_id, version })
            }
            FrameType::DialRsp => {
                let chosen_version = b.read_uint16_le(11)?;
                Some(Frame::DialRsp { src_conn_id, dst_conn_id, chosen_version })
            }
            FrameType::Ack => {
                let largest_acked = b.read_uint64_le(9)?;
                let ack_delay_ticks = b.read_uint16_le(17)?;
                let recv_window = b.read_uint32_le(19)?;
                let count = b.read_uint16_le(23)? as usize;
                let mut ranges = Vec::with_capacity(count);
                let mut off = 25;
                for _ in 0..count {
                    let start = b.read_uint64_le(off)?;
                    let end = b.read_uint64_le(off + 8)?;
                    ranges.push((start, end));
                    off += 16;
                }
                Some(Frame::Ack { src_conn_id, dst_conn_id, largest_acked, ack_delay_ticks, recv_window, ranges })
            }
            FrameType::Data => {
                let packet_number = b.read_uint64_le(9)?;
                let stream_offset = b.read_uint64_le(17)?;
                let payload_length = b.read_uint16_le(25)? as usize;
                let slice = b.as_slice();
                let payload = slice.get(27..27 + payload_length)?.to_vec();
                Some(Frame::Data { src_conn_id, dst_conn_id, packet_number, stream_offset, payload })
            }
            FrameType::Rst => Some(Frame::Rst { src_conn_id, dst_conn_id }),
            FrameType::Close => Some(Frame::Close { src_conn_id, dst_conn_id }),
            FrameType::KeepAlive => Some(Frame::KeepAlive { src_conn_id, dst_conn_id }),
        }
    }
}

fn encode_bare(ty: FrameType, src_conn_id: u32, dst_conn_id: u32) -> Vec<u8> {
    let mut b = Buffer::new(9);
    b.write_uint8_le(0, ty as u8);
    b.write_uint32_le(1, src_conn_id);
    b.write_uint32_le(5, dst_conn_id);
    b.as_slice().to_vec()
}

/// Upward events a connection raises for its owner to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Handshake completed (dialer only; listeners establish silently on first DATA).
    DidDial { success: bool },
    /// In-order bytes are ready for the application.
    DidRecv(Vec<u8>),
    /// Previously full send buffer has drained; more `send()` calls will succeed.
    DidSend,
    /// Connection has been torn down. `reason` 0 = graceful, 1 = non-graceful (RST).
    DidDisconnect { reason: u8 },
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Listener awaiting a DIAL.
    Listen,
    /// Dialer awaiting a DIALRSP.
    Dialing,
    /// Handshake complete; data may flow.
    Established,
    /// CLOSE sent or received; draining in-flight ACKs before erase.
    Closing,
    /// Terminal.
    Closed,
}

/// Why a connection attempt or established session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// CLOSE handshake completed normally.
    Graceful = 0,
    /// RST received or sent, or handshake gave up.
    NonGraceful = 1,
}

struct InFlightSegment {
    offset: u64,
    payload: Vec<u8>,
    sent_at: Instant,
    retransmitted: bool,
}

const MAX_SEND_BUFFER_SEGMENTS: usize = 4096;

/// One reliable ordered stream connection's state machine. Bytes in, frames
/// out: this type owns no socket and performs no I/O; its owner feeds it
/// received frames and timer ticks and sends whatever frames it returns.
pub struct StreamConnection {
    tuning: Tuning,
    is_dialer: bool,
    state: ConnState,
    local_conn_id: u32,
    peer_conn_id: u32,
    local_version: u16,
    negotiated_version: u16,

    // dial retry
    dial_next_rtx_at: Instant,
    dial_backoff: Duration,
    dial_deadline: Instant,

    // send side
    unsent: VecDeque<u8>,
    next_send_offset: u64,
    next_packet_number: u64,
    inflight: BTreeMap<u64, InFlightSegment>,
    cwnd: usize,
    ssthresh: usize,
    bytes_in_flight: usize,
    peer_rwnd: usize,
    last_largest_acked: Option<u64>,
    dup_ack_count: u32,
    srtt: Option<Duration>,
    rttvar: Duration,
    rto: Duration,
    rto_deadline: Option<Instant>,

    // receive side
    next_expected_offset: u64,
    reorder_buffer: BTreeMap<u64, Vec<u8>>,
    pending_acks: Vec<u64>,
    largest_received: u64,
    ack_deadline: Option<Instant>,

    // idle/keepalive
    idle_deadline: Option<Instant>,
    keepalive_deadline: Option<Instant>,

    // close
    close_deadline: Option<Instant>,
    disconnected: bool,
}

/// Outcome of feeding a connection a frame or a timer tick: frames to send
/// on the wire and events to raise upward.
#[derive(Debug, Default)]
pub struct StreamAction {
    /// Frames the caller must transmit to the peer.
    pub to_send: Vec<Frame>,
    /// Events the caller must deliver to the upper half.
    pub events: Vec<StreamEvent>,
    /// Number of segments retransmitted while producing this action (RTO or
    /// fast-retransmit), for the caller's observability counters.
    pub retransmits: u32,
}

impl StreamAction {
    fn merge(&mut self, other: StreamAction) {
        self.to_send.extend(other.to_send);
        self.events.extend(other.events);
        self.retransmits += other.retransmits;
    }
}

/// Error returned by [`StreamConnection::send`] when the send buffer is full.
/// Mirrors the source's "-1 from send" backpressure signal; the caller
/// retries after observing [`StreamEvent::DidSend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("send buffer full")]
pub struct SendBufferFull;

impl StreamConnection {
    /// Start a new connection as the dialer, returning it alongside the
    /// initial DIAL frame to transmit.
    pub fn dial(local_conn_id: u32, version: u16, now: Instant, tuning: Tuning) -> (Self, Frame) {
        let mut conn = Self::new(local_conn_id, version, true, tuning);
        conn.state = ConnState::Dialing;
        conn.dial_deadline = now + tuning.t_dial_giveup;
        conn.dial_next_rtx_at = now + tuning.t_dial_rtx;
        conn.dial_backoff = tuning.t_dial_rtx;
        let frame = Frame::Dial { src_conn_id: conn.local_conn_id, dst_conn_id: 0, version };
        (conn, frame)
    }

    /// Start a new connection as the listener, awaiting a DIAL.
    pub fn listen(local_conn_id: u32, version: u16, tuning: Tuning) -> Self {
        let mut conn = Self::new(local_conn_id, version, false, tuning);
        conn.state = ConnState::Listen;
        conn
    }

    fn new(local_conn_id: u32, version: u16, is_dialer: bool, tuning: Tuning) -> Self {
        Self {
            tuning,
            is_dialer,
            state: ConnState::Listen,
            local_conn_id,
            peer_conn_id: 0,
            local_version: version,
            negotiated_version: version,
            dial_next_rtx_at: Instant::now(),
            dial_backoff: tuning.t_dial_rtx,
            dial_deadline: Instant::now(),
            unsent: VecDeque::new(),
            next_send_offset: 0,
            next_packet_number: 0,
            inflight: BTreeMap::new(),
            cwnd: tuning.mss.max(1) * 10,
            ssthresh: usize::MAX,
            bytes_in_flight: 0,
            peer_rwnd: tuning.rwnd,
            last_largest_acked: None,
            dup_ack_count: 0,
            srtt: None,
            rttvar: Duration::from_millis(0),
            rto: Duration::from_millis(200),
            rto_deadline: None,
            next_expected_offset: 0,
            reorder_buffer: BTreeMap::new(),
            pending_acks: Vec::new(),
            largest_received: 0,
            ack_deadline: None,
            idle_deadline: None,
            keepalive_deadline: None,
            close_deadline: None,
            disconnected: false,
        }
    }

    /// Bytes the peer may currently accept without us waiting on more ACKs:
    /// the lesser of the congestion window and the peer's last-advertised
    /// receive window.
    fn available_window(&self) -> usize {
        self.cwnd.min(self.peer_rwnd)
    }

    /// Our own advertised receive window: the configured capacity minus
    /// bytes already buffered out of order, which the peer cannot yet retire.
    fn advertised_window(&self) -> u32 {
        let buffered: usize = self.reorder_buffer.values().map(|v| v.len()).sum();
        self.tuning.rwnd.saturating_sub(buffered).min(u32::MAX as usize) as u32
    }

    /// Current connection state.
    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Whether this side initiated the connection.
    pub fn is_dialer(&self) -> bool {
        self.is_dialer
    }

    /// Whether the connection has reached its terminal state.
    pub fn is_closed(&self) -> bool {
        matches!(self.state, ConnState::Closed)
    }

    /// Queue bytes for reliable ordered delivery. Fails with
    /// [`SendBufferFull`] if the unsent buffer is already saturated.
    pub fn send(&mut self, bytes: &[u8]) -> Result<(), SendBufferFull> {
        if self.unsent.len() + bytes.len() > MAX_SEND_BUFFER_SEGMENTS * self.tuning.mss {
            return Err(SendBufferFull);
        }
        self.unsent.extend(bytes.iter().copied());
        Ok(())
    }

    /// Request a graceful close. Drains in-flight ACKs for `2 * RTO` before
    /// the caller should erase the connection (observe [`ConnState::Closed`]).
    pub fn close(&mut self, now: Instant) -> StreamAction {
        if matches!(self.state, ConnState::Closing | ConnState::Closed) {
            return StreamAction::default();
        }
        self.state = ConnState::Closing;
        self.close_deadline = Some(now + self.rto * 2);
        // A close cancels the retransmit, keepalive, and idle timers: the
        // close drain deadline is now the only thing that can erase this
        // connection.
        self.rto_deadline = None;
        self.keepalive_deadline = None;
        self.idle_deadline = None;
        StreamAction {
            to_send: vec![Frame::Close { src_conn_id: self.local_conn_id, dst_conn_id: self.peer_conn_id }],
            events: vec![],
            ..Default::default()
        }
    }

    fn reset(&mut self) -> StreamAction {
        self.state = ConnState::Closed;
        self.rto_deadline = None;
        self.keepalive_deadline = None;
        self.idle_deadline = None;
        let already = self.disconnected;
        self.disconnected = true;
        StreamAction {
            to_send: vec![Frame::Rst { src_conn_id: self.local_conn_id, dst_conn_id: self.peer_conn_id }],
            events: if already { vec![] } else { vec![StreamEvent::DidDisconnect { reason: DisconnectReason::NonGraceful as u8 }] },
            ..Default::default()
        }
    }

    /// Feed a received frame. `frame_conn_ids_match` has already been used by
    /// the caller (the transport manager) to route the frame to this
    /// connection; this method still validates state compatibility.
    pub fn on_frame(&mut self, frame: Frame, now: Instant) -> StreamAction {
        let mut action = StreamAction::default();

        // Any frame from the peer is proof of life: refresh the idle-timeout
        // deadline while the session is still established. A close already
        // cancelled this timer; it stays cancelled while draining.
        if self.state == ConnState::Established {
            self.idle_deadline = Some(now + self.tuning.t_idle_timeout);
        }

        match (&self.state, &frame) {
            (ConnState::Listen, Frame::Dial { src_conn_id, version, .. }) => {
                self.peer_conn_id = *src_conn_id;
                self.negotiated_version = (*version).min(self.local_version);
                self.state = ConnState::Established;
                self.idle_deadline = Some(now + self.tuning.t_idle_timeout);
                self.keepalive_deadline = Some(now + self.tuning.t_keepalive);
                action.to_send.push(Frame::DialRsp {
                    src_conn_id: self.local_conn_id,
                    dst_conn_id: self.peer_conn_id,
                    chosen_version: self.negotiated_version,
                });
            }
            (ConnState::Dialing, Frame::DialRsp { src_conn_id, chosen_version, .. }) => {
                self.peer_conn_id = *src_conn_id;
                self.negotiated_version = *chosen_version;
                self.state = ConnState::Established;
                self.idle_deadline = Some(now + self.tuning.t_idle_timeout);
                self.keepalive_deadline = Some(now + self.tuning.t_keepalive);
                action.events.push(StreamEvent::DidDial { success: true });
            }
            (ConnState::Established, Frame::Data { packet_number, stream_offset, payload, .. }) => {
                action.merge(self.on_data(*packet_number, *stream_offset, payload, now));
            }
            (ConnState::Established, Frame::Ack { largest_acked, ranges, recv_window, .. }) => {
                self.peer_rwnd = *recv_window as usize;
                action.merge(self.on_ack(*largest_acked, ranges, now));
            }
            (ConnState::Established | ConnState::Closing, Frame::KeepAlive { .. }) => {
                // Liveness already recorded above; no reply or state change.
            }
            (ConnState::Established | ConnState::Closing, Frame::Close { .. }) => {
                if matches!(self.state, ConnState::Established) {
                    self.state = ConnState::Closing;
                    self.close_deadline = Some(now + self.rto * 2);
                    self.rto_deadline = None;
                    self.keepalive_deadline = None;
                    self.idle_deadline = None;
                }
            }
            (_, Frame::Rst { .. }) => {
                return self.reset_no_rst_reply();
            }
            (ConnState::Closing, Frame::Data { .. } | Frame::Ack { .. }) => {
                // late frames from the same connection while draining: ignored, not a violation.
                trace!("ignoring late frame while closing");
            }
            _ => {
                warn!(?frame, state = ?self.state, "unexpected frame in current state, resetting");
                return self.reset();
            }
        }
        action
    }

    fn reset_no_rst_reply(&mut self) -> StreamAction {
        self.state = ConnState::Closed;
        self.rto_deadline = None;
        self.keepalive_deadline = None;
        self.idle_deadline = None;
        let already = self.disconnected;
        self.disconnected = true;
        StreamAction {
            to_send: vec![],
            events: if already { vec![] } else { vec![StreamEvent::DidDisconnect { reason: DisconnectReason::NonGraceful as u8 }] },
            ..Default::default()
        }
    }

    fn on_data(&mut self, packet_number: u64, stream_offset: u64, payload: &[u8], now: Instant) -> StreamAction {
        let mut action = StreamAction::default();
        self.largest_received = self.largest_received.max(packet_number);
        self.pending_acks.push(packet_number);

        let mut gap_detected = false;
        if stream_offset < self.next_expected_offset {
            // duplicate of already-delivered data; still ack it.
        } else if stream_offset == self.next_expected_offset {
            action.events.push(StreamEvent::DidRecv(payload.to_vec()));
            self.next_expected_offset += payload.len() as u64;
            self.drain_contiguous(&mut action);
        } else {
            gap_detected = true;
            if self.reorder_buffer.len() >= self.tuning.reorder_cap {
                if let Some(&earliest) = self.reorder_buffer.keys().next() {
                    self.reorder_buffer.remove(&earliest);
                }
            }
            self.reorder_buffer.insert(stream_offset, payload.to_vec());
        }

        if gap_detected {
            self.ack_deadline = Some(now);
        } else {
            self.ack_deadline = Some(self.ack_deadline.unwrap_or(now + self.tuning.ack_delay_max).min(now + self.tuning.ack_delay_max));
        }
        action
    }

    fn drain_contiguous(&mut self, action: &mut StreamAction) {
        while let Some(chunk) = self.reorder_buffer.remove(&self.next_expected_offset) {
            self.next_expected_offset += chunk.len() as u64;
            action.events.push(StreamEvent::DidRecv(chunk));
        }
    }

    fn on_ack(&mut self, largest_acked: u64, ranges: &[(u64, u64)], now: Instant) -> StreamAction {
        let mut action = StreamAction::default();
        let mut newly_acked = false;

        for &(start, end) in ranges {
            for pn in start..=end {
                if let Some(seg) = self.inflight.remove(&pn) {
                    newly_acked = true;
                    self.bytes_in_flight = self.bytes_in_flight.saturating_sub(seg.payload.len());
                    if !seg.retransmitted {
                        self.update_rto(now.saturating_duration_since(seg.sent_at));
                    }
                    self.grow_cwnd();
                }
            }
        }

        if newly_acked {
            self.dup_ack_count = 0;
            self.last_largest_acked = Some(largest_acked);
            if let Some(&earliest) = self.inflight.keys().next() {
                self.rto_deadline = self.inflight.get(&earliest).map(|s| s.sent_at + self.rto);
            } else {
                self.rto_deadline = None;
            }
        } else if self.last_largest_acked == Some(largest_acked) && !self.inflight.is_empty() {
            self.dup_ack_count += 1;
            if self.dup_ack_count >= 3 {
                self.dup_ack_count = 0;
                self.cwnd = self.ssthresh;
                action.merge(self.retransmit_earliest(now));
            }
        }

        action.merge(self.pump_send(now));
        if self.unsent.is_empty() && self.inflight.is_empty() {
            action.events.push(StreamEvent::DidSend);
        }
        action
    }

    fn grow_cwnd(&mut self) {
        if self.cwnd < self.ssthresh {
            self.cwnd += self.tuning.mss;
        } else {
            self.cwnd += (self.tuning.mss * self.tuning.mss) / self.cwnd.max(1);
        }
    }

    fn update_rto(&mut self, rtt: Duration) {
        match self.srtt {
            None => {
                self.srtt = Some(rtt);
                self.rttvar = rtt / 2;
            }
            Some(srtt) => {
                let delta = if srtt > rtt { srtt - rtt } else { rtt - srtt };
                self.rttvar = (self.rttvar * 3 + delta) / 4;
                self.srtt = Some((srtt * 7 + rtt) / 8);
            }
        }
        let srtt = self.srtt.unwrap_or(Duration::from_millis(200));
        let candidate = srtt + self.rttvar * 4;
        self.rto = candidate.clamp(crate::transport::tuning::RTO_MIN, crate::transport::tuning::RTO_MAX);
    }

    fn retransmit_earliest(&mut self, now: Instant) -> StreamAction {
        let mut action = StreamAction::default();
        let earliest_pn = match self.inflight.keys().next().copied() {
            Some(pn) => pn,
            None => return action,
        };
        let frame = {
            let seg = self.inflight.get_mut(&earliest_pn).expect("just located");
            seg.sent_at = now;
            seg.retransmitted = true;
            debug!(packet_number = earliest_pn, "retransmit");
            Frame::Data {
                src_conn_id: self.local_conn_id,
                dst_conn_id: self.peer_conn_id,
                packet_number: earliest_pn,
                stream_offset: seg.offset,
                payload: seg.payload.clone(),
            }
        };
        action.to_send.push(frame);
        action.retransmits += 1;
        action
    }

    /// Advance time. Returns frames to (re)send and events to raise: DIAL
    /// retransmit/give-up, RTO retransmit, delayed ACK flush, close drain.
    pub fn poll_timers(&mut self, now: Instant) -> StreamAction {
        let mut action = StreamAction::default();

        if self.state == ConnState::Dialing {
            if now >= self.dial_deadline {
                self.state = ConnState::Closed;
                action.events.push(StreamEvent::DidDial { success: false });
                action.events.push(StreamEvent::DidDisconnect { reason: DisconnectReason::NonGraceful as u8 });
                self.disconnected = true;
                return action;
            }
            if now >= self.dial_next_rtx_at {
                self.dial_backoff = (self.dial_backoff * 2).min(crate::transport::tuning::T_DIAL_RTX_MAX);
                self.dial_next_rtx_at = now + self.dial_backoff;
                action.to_send.push(Frame::Dial {
                    src_conn_id: self.local_conn_id,
                    dst_conn_id: 0,
                    version: self.local_version,
                });
            }
        }

        if self.state == ConnState::Established {
            if let Some(deadline) = self.idle_deadline {
                if now >= deadline {
                    return self.reset_no_rst_reply();
                }
            }
            if let Some(deadline) = self.ack_deadline {
                if now >= deadline {
                    action.merge(self.flush_ack(now));
                }
            }
            if let Some(deadline) = self.rto_deadline {
                if now >= deadline {
                    self.ssthresh = (self.cwnd / 2).max(2 * self.tuning.mss);
                    self.cwnd = self.tuning.mss;
                    self.rto = (self.rto * 2).min(crate::transport::tuning::RTO_MAX);
                    action.merge(self.retransmit_earliest(now));
                    if let Some((_, seg)) = self.inflight.iter().next() {
                        self.rto_deadline = Some(seg.sent_at + self.rto);
                    }
                }
            }
            action.merge(self.pump_send(now));

            // Only a connection with nothing else to send this tick needs a
            // keepalive; any other outgoing frame already proves liveness.
            if action.to_send.is_empty() {
                if let Some(deadline) = self.keepalive_deadline {
                    if now >= deadline {
                        action.to_send.push(Frame::KeepAlive {
                            src_conn_id: self.local_conn_id,
                            dst_conn_id: self.peer_conn_id,
                        });
                    }
                }
            }
            if !action.to_send.is_empty() {
                self.keepalive_deadline = Some(now + self.tuning.t_keepalive);
            }
        }

        if self.state == ConnState::Closing {
            if let Some(deadline) = self.close_deadline {
                if now >= deadline {
                    self.state = ConnState::Closed;
                    action.events.push(StreamEvent::DidDisconnect { reason: DisconnectReason::Graceful as u8 });
                }
            }
        }

        action
    }

    fn flush_ack(&mut self, now: Instant) -> StreamAction {
        self.ack_deadline = None;
        if self.pending_acks.is_empty() {
            return StreamAction::default();
        }
        let mut sorted = std::mem::take(&mut self.pending_acks);
        sorted.sort_unstable();
        sorted.dedup();
        let ranges = compress_ranges(&sorted);
        StreamAction {
            to_send: vec![Frame::Ack {
                src_conn_id: self.local_conn_id,
                dst_conn_id: self.peer_conn_id,
                largest_acked: self.largest_received,
                ack_delay_ticks: now.elapsed().as_millis().min(u16::MAX as u128) as u16,
                recv_window: self.advertised_window(),
                ranges,
            }],
            events: vec![],
            ..Default::default()
        }
    }

    fn pump_send(&mut self, now: Instant) -> StreamAction {
        let mut action = StreamAction::default();
        let window = self.available_window();
        while self.bytes_in_flight < window && !self.unsent.is_empty() {
            let budget = (window - self.bytes_in_flight).min(self.tuning.mss).min(self.unsent.len());
            if budget == 0 {
                break;
            }
            let payload: Vec<u8> = self.unsent.drain(..budget).collect();
            let pn = self.next_packet_number;
            self.next_packet_number += 1;
            let offset = self.next_send_offset;
            self.next_send_offset += payload.len() as u64;
            self.bytes_in_flight += payload.len();
            self.inflight.insert(pn, InFlightSegment { offset, payload: payload.clone(), sent_at: now, retransmitted: false });
            if self.rto_deadline.is_none() {
                self.rto_deadline = Some(now + self.rto);
            }
            action.to_send.push(Frame::Data {
                src_conn_id: self.local_conn_id,
                dst_conn_id: self.peer_conn_id,
                packet_number: pn,
                stream_offset: offset,
                payload,
            });
        }
        action
    }
}

/// Compress a sorted, deduplicated list of packet numbers into inclusive
/// `(start, end)` runs.
fn compress_ranges(sorted: &[u64]) -> Vec<(u64, u64)> {
    let mut ranges = Vec::new();
    let mut iter = sorted.iter().copied();
    let Some(mut start) = iter.next() else { return ranges };
    let mut end = start;
    for pn in iter {
        if pn == end + 1 {
            end = pn;
        } else {
            ranges.push((start, end));
            start = pn;
            end = pn;
        }
    }
    ranges.push((start, end));
    ranges
}

impl Frame {
    /// Validate that a frame names the expected connection id pair, or is an
    /// acceptable handshake frame naming only its own side. Used by the
    /// owning engine to detect spoofed/late frames before dispatch.
    pub fn matches_connection(&self, local_conn_id: u32, peer_conn_id: u32) -> bool {
        let (src, dst) = self.conn_ids();
        match self {
            Frame::Dial { .. } => dst == 0 || dst == local_conn_id,
            _ => src == peer_conn_id && dst == local_conn_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuning_fast() -> Tuning {
        Tuning {
            t_dial_rtx: Duration::from_millis(10),
            t_dial_giveup: Duration::from_millis(50),
            ..Tuning::default()
        }
    }

    #[test]
    fn frame_round_trip() {
        let frames = vec![
            Frame::Dial { src_conn_id: 1, dst_conn_id: 0, version: 7 },
            Frame::DialRsp { src_conn_id: 2, dst_conn_id: 1, chosen_version: 7 },
            Frame::Ack {
                src_conn_id: 1,
                dst_conn_id: 2,
                largest_acked: 9,
                ack_delay_ticks: 5,
                recv_window: 65536,
                ranges: vec![(0, 3), (5, 9)],
            },
            Frame::Data { src_conn_id: 1, dst_conn_id: 2, packet_number: 0, stream_offset: 0, payload: vec![1, 2, 3] },
            Frame::Rst { src_conn_id: 1, dst_conn_id: 2 },
            Frame::Close { src_conn_id: 1, dst_conn_id: 2 },
            Frame::KeepAlive { src_conn_id: 1, dst_conn_id: 2 },
        ];
        for f in frames {
            let wire = f.encode();
            assert_eq!(Frame::decode(&wire), Some(f));
        }
    }

    #[test]
    fn handshake_establishes_both_sides() {
        let now = Instant::now();
        let (mut dialer, dial_frame) = StreamConnection::dial(1, 1, now, Tuning::default());
        let mut listener = StreamConnection::listen(2, 1, Tuning::default());

        let resp = listener.on_frame(dial_frame, now);
        assert_eq!(listener.state(), ConnState::Established);
        assert_eq!(resp.to_send.len(), 1);

        let action = dialer.on_frame(resp.to_send[0].clone(), now);
        assert_eq!(dialer.state(), ConnState::Established);
        assert_eq!(action.events, vec![StreamEvent::DidDial { success: true }]);
    }

    #[test]
    fn dial_gives_up_after_deadline() {
        let now = Instant::now();
        let (mut dialer, _) = StreamConnection::dial(1, 1, now, tuning_fast());
        let action = dialer.poll_timers(now + Duration::from_millis(60));
        assert!(action.events.contains(&StreamEvent::DidDial { success: false }));
        assert!(action.events.contains(&StreamEvent::DidDisconnect { reason: 1 }));
        assert_eq!(dialer.state(), ConnState::Closed);
    }

    #[test]
    fn in_order_data_is_delivered_immediately() {
        let mut listener = StreamConnection::listen(2, 1, Tuning::default());
        listener.state = ConnState::Established;
        listener.peer_conn_id = 1;
        let now = Instant::now();
        let action = listener.on_frame(
            Frame::Data { src_conn_id: 1, dst_conn_id: 2, packet_number: 0, stream_offset: 0, payload: vec![9, 9] },
            now,
        );
        assert_eq!(action.events, vec![StreamEvent::DidRecv(vec![9, 9])]);
    }

    #[test]
    fn out_of_order_data_buffers_then_drains() {
        let mut listener = StreamConnection::listen(2, 1, Tuning::default());
        listener.state = ConnState::Established;
        listener.peer_conn_id = 1;
        let now = Instant::now();
        let a1 = listener.on_frame(
            Frame::Data { src_conn_id: 1, dst_conn_id: 2, packet_number: 1, stream_offset: 2, payload: vec![3, 4] },
            now,
        );
        assert!(a1.events.is_empty());
        let a2 = listener.on_frame(
            Frame::Data { src_conn_id: 1, dst_conn_id: 2, packet_number: 0, stream_offset: 0, payload: vec![1, 2] },
            now,
        );
        assert_eq!(a2.events, vec![StreamEvent::DidRecv(vec![1, 2]), StreamEvent::DidRecv(vec![3, 4])]);
    }

    #[test]
    fn keepalive_is_accepted_without_reset() {
        let mut listener = StreamConnection::listen(2, 1, Tuning::default());
        listener.state = ConnState::Established;
        listener.peer_conn_id = 1;
        let now = Instant::now();
        let action =
            listener.on_frame(Frame::KeepAlive { src_conn_id: 1, dst_conn_id: 2 }, now);
        assert!(action.to_send.is_empty());
        assert!(action.events.is_empty());
        assert_eq!(listener.state(), ConnState::Established);
    }

    #[test]
    fn idle_timeout_erases_connection_without_rst() {
        let tuning = Tuning { t_idle_timeout: Duration::from_millis(20), ..Tuning::default() };
        let now = Instant::now();
        let (mut dialer, _) = StreamConnection::dial(1, 1, now, tuning);
        let resp = Frame::DialRsp { src_conn_id: 2, dst_conn_id: 1, chosen_version: 1 };
        dialer.on_frame(resp, now);
        assert_eq!(dialer.state(), ConnState::Established);

        let action = dialer.poll_timers(now + Duration::from_millis(30));
        assert!(action.to_send.is_empty(), "idle timeout must not send a RST");
        assert_eq!(action.events, vec![StreamEvent::DidDisconnect { reason: DisconnectReason::NonGraceful as u8 }]);
        assert_eq!(dialer.state(), ConnState::Closed);
    }

    #[test]
    fn keepalive_sent_when_otherwise_idle() {
        let tuning = Tuning { t_keepalive: Duration::from_millis(20), ..Tuning::default() };
        let now = Instant::now();
        let (mut dialer, _) = StreamConnection::dial(1, 1, now, tuning);
        let resp = Frame::DialRsp { src_conn_id: 2, dst_conn_id: 1, chosen_version: 1 };
        dialer.on_frame(resp, now);

        let action = dialer.poll_timers(now + Duration::from_millis(30));
        assert_eq!(action.to_send, vec![Frame::KeepAlive { src_conn_id: 1, dst_conn_id: 2 }]);
    }

    #[test]
    fn send_window_is_capped_by_peer_advertised_rwnd() {
        let tuning = Tuning { mss: 100, ..Tuning::default() };
        let now = Instant::now();
        let (mut dialer, _) = StreamConnection::dial(1, 1, now, tuning);
        dialer.on_frame(Frame::DialRsp { src_conn_id: 2, dst_conn_id: 1, chosen_version: 1 }, now);

        // Peer advertises a receive window smaller than our congestion window.
        dialer.on_frame(
            Frame::Ack { src_conn_id: 2, dst_conn_id: 1, largest_acked: 0, ack_delay_ticks: 0, recv_window: 50, ranges: vec![] },
            now,
        );

        dialer.send(&[7u8; 1000]).expect("send");
        let action = dialer.poll_timers(now);
        let sent: usize = action
            .to_send
            .iter()
            .map(|f| match f {
                Frame::Data { payload, .. } => payload.len(),
                _ => 0,
            })
            .sum();
        assert!(sent <= 50, "send must be capped by the peer's advertised window, sent {sent}");
    }

    #[test]
    fn ack_carries_advertised_receive_window() {
        let mut listener = StreamConnection::listen(2, 1, Tuning::default());
        listener.state = ConnState::Established;
        listener.peer_conn_id = 1;
        let now = Instant::now();
        listener.on_frame(
            Frame::Data { src_conn_id: 1, dst_conn_id: 2, packet_number: 0, stream_offset: 0, payload: vec![1, 2] },
            now,
        );
        let action = listener.poll_timers(now + Duration::from_millis(100));
        let ack = action.to_send.iter().find(|f| matches!(f, Frame::Ack { .. })).expect("ack sent");
        match ack {
            Frame::Ack { recv_window, .. } => assert!(*recv_window > 0),
            _ => unreachable!(),
        }
    }
}
