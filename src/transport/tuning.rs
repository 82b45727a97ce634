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

//! Compile-time tuning constants for the stream transport and discovery
//! client. Pulled into a `Tuning` struct so tests can shrink the dial/give-up
//! timers without touching these process-wide defaults.

use std::time::Duration;

/// Maximum segment size: the payload budget per DATA frame.
pub const MSS: usize = 1350;
/// Pub/sub seen-set capacity.
pub const S_CAP: usize = 1 << 20;
/// Per-stream out-of-order reassembly gap capacity, in segments.
pub const REORDER_CAP: usize = 256;
/// Initial DIAL retransmit interval.
pub const T_DIAL_RTX: Duration = Duration::from_secs(1);
/// Total time budget before a dial is given up on.
pub const T_DIAL_GIVEUP: Duration = Duration::from_secs(10);
/// Discovery beacon re-announce interval.
pub const T_BEACON: Duration = Duration::from_secs(60);
/// Maximum delay before an ACK must be sent for a received DATA frame.
pub const ACK_DELAY_MAX: Duration = Duration::from_millis(25);

/// Initial congestion window, in bytes (`10 * MSS`).
pub const CWND_INIT: usize = 10 * MSS;
/// RTO floor.
pub const RTO_MIN: Duration = Duration::from_millis(200);
/// RTO ceiling.
pub const RTO_MAX: Duration = Duration::from_secs(60);
/// Cap on the DIAL retransmit backoff.
pub const T_DIAL_RTX_MAX: Duration = Duration::from_secs(64);
/// Idle-connection keepalive interval: how often an `Established` connection
/// with no outstanding timer activity sends a `KEEPALIVE`.
pub const T_KEEPALIVE: Duration = Duration::from_secs(20);
/// Idle-timeout: a connection that raises no timer activity (no frame
/// received, including keepalives) for this long is erased.
pub const T_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
/// Initial advertised receive window, in bytes.
pub const RWND_INIT: usize = 64 * MSS;

/// Runtime-overridable copy of the timing constants above, so integration
/// tests can run the give-up/retransmit scenarios without waiting 10 real
/// seconds.
#[derive(Debug, Clone, Copy)]
pub struct Tuning {
    /// See [`MSS`].
    pub mss: usize,
    /// See [`S_CAP`].
    pub s_cap: usize,
    /// See [`REORDER_CAP`].
    pub reorder_cap: usize,
    /// See [`T_DIAL_RTX`].
    pub t_dial_rtx: Duration,
    /// See [`T_DIAL_GIVEUP`].
    pub t_dial_giveup: Duration,
    /// See [`T_BEACON`].
    pub t_beacon: Duration,
    /// See [`ACK_DELAY_MAX`].
    pub ack_delay_max: Duration,
    /// See [`T_KEEPALIVE`].
    pub t_keepalive: Duration,
    /// See [`T_IDLE_TIMEOUT`].
    pub t_idle_timeout: Duration,
    /// See [`RWND_INIT`].
    pub rwnd: usize,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            mss: MSS,
            s_cap: S_CAP,
            reorder_cap: REORDER_CAP,
            t_dial_rtx: T_DIAL_RTX,
            t_dial_giveup: T_DIAL_GIVEUP,
            t_beacon: T_BEACON,
            ack_delay_max: ACK_DELAY_MAX,
            t_keepalive: T_KEEPALIVE,
            t_idle_timeout: T_IDLE_TIMEOUT,
            rwnd: RWND_INIT,
        }
    }
}
