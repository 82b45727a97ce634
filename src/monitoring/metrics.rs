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

use prometheus::{IntCounter, IntGauge, Registry};
use thiserror::Error;

/// Metrics errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus")]
    Prom,
}

/// Metrics container registered once at startup and cloned into every task
/// that needs to record a counter or gauge.
#[derive(Clone)]
pub struct Metrics {
    /// Registry.
    pub registry: Registry,

    /// Established stream connections.
    pub p2p_peers: IntGauge,

    /// Segments retransmitted (RTO or fast-retransmit).
    pub stream_retransmits_total: IntCounter,
    /// ACK frames sent.
    pub stream_acks_sent_total: IntCounter,
    /// Frames dropped for carrying an unsupported version tag.
    pub stream_version_mismatch_total: IntCounter,
    /// Frames dropped as a protocol violation (forces a RST).
    pub stream_protocol_violations_total: IntCounter,

    /// Messages deduplicated against the seen set.
    pub pubsub_seen_dropped_total: IntCounter,
    /// Seen-set entries evicted to stay within capacity.
    pub pubsub_seen_evicted_total: IntCounter,
    /// Forwards suppressed by a witness loop-break check.
    pub pubsub_witness_suppressed_total: IntCounter,
    /// Messages dropped for failing attestation verification.
    pub pubsub_attestation_failed_total: IntCounter,
    /// Messages delivered to local subscribers.
    pub pubsub_delivered_total: IntCounter,

    /// Beacon reconnect attempts.
    pub discovery_reconnects_total: IntCounter,
    /// Peers learned from PEERLIST responses.
    pub discovery_peers_learned_total: IntCounter,

    /// Dropped replay messages (legacy anti-replay counter, retained for
    /// dashboards built against the prior p2p stack).
    pub p2p_replay_dropped_total: IntCounter,
    /// Invalid decoded messages.
    pub p2p_invalid_msg_total: IntCounter,
    /// Rate-limited messages.
    pub p2p_rate_limited_total: IntCounter,
    /// Reputation-based throttled messages.
    pub p2p_reputation_throttled_total: IntCounter,
    /// Banned peer events.
    pub p2p_banned_total: IntCounter,
}

macro_rules! counter {
    ($registry:expr, $name:expr, $help:expr) => {{
        let c = IntCounter::new($name, $help).map_err(|_| MetricsError::Prom)?;
        $registry
            .register(Box::new(c.clone()))
            .map_err(|_| MetricsError::Prom)?;
        c
    }};
}

macro_rules! gauge {
    ($registry:expr, $name:expr, $help:expr) => {{
        let g = IntGauge::new($name, $help).map_err(|_| MetricsError::Prom)?;
        $registry
            .register(Box::new(g.clone()))
            .map_err(|_| MetricsError::Prom)?;
        g
    }};
}

impl Metrics {
    /// Create and register metrics.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let p2p_peers = gauge!(registry, "osiris_relay_p2p_peers", "Established stream connections");

        let stream_retransmits_total = counter!(
            registry,
            "osiris_relay_stream_retransmits_total",
            "Segments retransmitted"
        );
        let stream_acks_sent_total =
            counter!(registry, "osiris_relay_stream_acks_sent_total", "ACK frames sent");
        let stream_version_mismatch_total = counter!(
            registry,
            "osiris_relay_stream_version_mismatch_total",
            "Frames dropped for version mismatch"
        );
        let stream_protocol_violations_total = counter!(
            registry,
            "osiris_relay_stream_protocol_violations_total",
            "Frames dropped as protocol violations"
        );

        let pubsub_seen_dropped_total = counter!(
            registry,
            "osiris_relay_pubsub_seen_dropped_total",
            "Messages deduplicated against the seen set"
        );
        let pubsub_seen_evicted_total = counter!(
            registry,
            "osiris_relay_pubsub_seen_evicted_total",
            "Seen-set entries evicted for capacity"
        );
        let pubsub_witness_suppressed_total = counter!(
            registry,
            "osiris_relay_pubsub_witness_suppressed_total",
            "Forwards suppressed by witness loop-break"
        );
        let pubsub_attestation_failed_total = counter!(
            registry,
            "osiris_relay_pubsub_attestation_failed_total",
            "Messages dropped for failed attestation"
        );
        let pubsub_delivered_total = counter!(
            registry,
            "osiris_relay_pubsub_delivered_total",
            "Messages delivered to local subscribers"
        );

        let discovery_reconnects_total = counter!(
            registry,
            "osiris_relay_discovery_reconnects_total",
            "Beacon reconnect attempts"
        );
        let discovery_peers_learned_total = counter!(
            registry,
            "osiris_relay_discovery_peers_learned_total",
            "Peers learned from PEERLIST"
        );

        let p2p_replay_dropped_total = counter!(
            registry,
            "osiris_relay_p2p_replay_dropped_total",
            "Dropped replay messages"
        );
        let p2p_invalid_msg_total = counter!(
            registry,
            "osiris_relay_p2p_invalid_msg_total",
            "Invalid decoded messages"
        );
        let p2p_rate_limited_total = counter!(
            registry,
            "osiris_relay_p2p_rate_limited_total",
            "Rate-limited messages"
        );
        let p2p_reputation_throttled_total = counter!(
            registry,
            "osiris_relay_p2p_reputation_throttled_total",
            "Reputation-based throttled messages"
        );
        let p2p_banned_total =
            counter!(registry, "osiris_relay_p2p_banned_total", "Banned peer events");

        Ok(Self {
            registry,
            p2p_peers,
            stream_retransmits_total,
            stream_acks_sent_total,
            stream_version_mismatch_total,
            stream_protocol_violations_total,
            pubsub_seen_dropped_total,
            pubsub_seen_evicted_total,
            pubsub_witness_suppressed_total,
            pubsub_attestation_failed_total,
            pubsub_delivered_total,
            discovery_reconnects_total,
            discovery_peers_learned_total,
            p2p_replay_dropped_total,
            p2p_invalid_msg_total,
            p2p_rate_limited_total,
            p2p_reputation_throttled_total,
            p2p_banned_total,
        })
    }
}
