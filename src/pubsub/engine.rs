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

//! Component H: subscription management, message de-duplication, forwarding
//! policy, witness aggregation, attestation, and message-id assignment.
//!
//! The engine owns no socket; it sits above a [`crate::transport::StreamEngine`]
//! and is fed that engine's upward [`crate::transport::AddressedEvent`]
//! stream by [`PubSubEngine::run`].

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ring::digest::{digest, SHA256};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace, warn};

use crate::abci::AbciAdapter;
use crate::core::security::keystore::{FileEd25519Backend, Keystore};
use crate::core::socket_address::SocketAddress;
use crate::monitoring::metrics::Metrics;
use crate::pubsub::attester::Attester;
use crate::pubsub::wire::PubSubMessage;
use crate::pubsub::witnesser::Witnesser;
use crate::transport::framing::Framer;
use crate::transport::stream::StreamEvent;
use crate::transport::versioning::VersioningFiber;
use crate::transport::{AddressedEvent, StreamEngine};

/// A locally recognized channel's subscriber/publisher sets.
#[derive(Debug, Default)]
struct Channel {
    /// Peers to forward channel messages to, in the order they subscribed.
    subscribers: Vec<SocketAddress>,
    /// Peers that have published at least one message on this channel.
    publishers: Vec<SocketAddress>,
}

impl Channel {
    fn add_subscriber(&mut self, peer: SocketAddress) -> bool {
        if self.subscribers.contains(&peer) {
            return false;
        }
        self.subscribers.push(peer);
        true
    }

    fn remove_subscriber(&mut self, peer: &SocketAddress) {
        self.subscribers.retain(|p| p != peer);
    }

    fn note_publisher(&mut self, peer: SocketAddress) {
        if !self.publishers.contains(&peer) {
            self.publishers.push(peer);
        }
    }
}

/// Bounded FIFO de-dup registry: `message_id` -> membership, evicting the
/// oldest insertion once `cap` is reached (`spec.md` §3 invariant 2).
#[derive(Debug)]
struct SeenSet {
    cap: usize,
    order: VecDeque<u64>,
    index: HashSet<u64>,
}

impl SeenSet {
    fn new(cap: usize) -> Self {
        Self { cap: cap.max(1), order: VecDeque::new(), index: HashSet::new() }
    }

    fn contains(&self, id: u64) -> bool {
        self.index.contains(&id)
    }

    /// Insert `id`. Returns the id evicted to make room, if any. No-op
    /// (returns `None`) if `id` is already present.
    fn insert(&mut self, id: u64) -> Option<u64> {
        if !self.index.insert(id) {
            return None;
        }
        self.order.push_back(id);
        if self.order.len() > self.cap {
            let evicted = self.order.pop_front().expect("just exceeded cap, order non-empty");
            self.index.remove(&evicted);
            return Some(evicted);
        }
        None
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

/// Derive the 32-bit key tag that occupies the upper bits of an originated
/// `message_id`. `spec.md` §4.5 describes a "64-bit ... key-derived tag"
/// shifted left by 32, which cannot fit in a u64 alongside a counter; this
/// crate resolves the ambiguity by truncating the tag to 32 bits (see
/// `DESIGN.md`).
fn key_tag(pubkey: &[u8; 32]) -> u32 {
    let h = digest(&SHA256, pubkey);
    let b = h.as_ref();
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

/// The pub/sub relay core.
pub struct PubSubEngine {
    node_key: [u8; 32],
    stream: Arc<StreamEngine>,
    channels: Mutex<BTreeMap<String, Channel>>,
    seen: Mutex<SeenSet>,
    heard_from: Mutex<HashMap<u64, HashSet<SocketAddress>>>,
    counter: AtomicU64,
    attester: Box<dyn Attester>,
    witnesser: Box<dyn Witnesser>,
    keystore: Arc<Keystore<FileEd25519Backend>>,
    abci: Box<dyn AbciAdapter>,
    peer_keys: Mutex<HashMap<SocketAddress, [u8; 32]>>,
    framers: Mutex<HashMap<SocketAddress, Framer>>,
    versioning: VersioningFiber,
    metrics: Arc<Metrics>,
}

impl PubSubEngine {
    /// Construct an engine recognizing exactly `channels` (the node's
    /// startup-configured subscription set). `subscribe`/`did_recv_message`
    /// on any other channel name is a no-op.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        node_key: [u8; 32],
        channels: impl IntoIterator<Item = String>,
        stream: Arc<StreamEngine>,
        attester: Box<dyn Attester>,
        witnesser: Box<dyn Witnesser>,
        keystore: Arc<Keystore<FileEd25519Backend>>,
        abci: Box<dyn AbciAdapter>,
        seen_cap: usize,
        wire_version: u16,
        metrics: Arc<Metrics>,
    ) -> Self {
        let mut map = BTreeMap::new();
        for c in channels {
            map.insert(c, Channel::default());
        }
        Self {
            node_key,
            stream,
            channels: Mutex::new(map),
            seen: Mutex::new(SeenSet::new(seen_cap)),
            heard_from: Mutex::new(HashMap::new()),
            counter: AtomicU64::new(0),
            attester,
            witnesser,
            keystore,
            abci,
            peer_keys: Mutex::new(HashMap::new()),
            framers: Mutex::new(HashMap::new()),
            versioning: VersioningFiber::new(wire_version),
            metrics,
        }
    }

    /// Record `peer`'s public key, used to verify attestations it
    /// originates. `spec.md` §4.5 leaves the key registry's source
    /// unspecified ("a key registry supplied by the ABCI adapter"); none of
    /// this crate's wire formats (beacon PEERLIST, SUB) carry a remote
    /// peer's public key, so in practice this is populated only when an
    /// embedding adapter calls it directly. A peer with no registered key
    /// fails attestation verification and has its messages dropped, which
    /// matches `spec.md`'s fail-closed validation-failure behavior.
    pub async fn register_peer_key(&self, peer: SocketAddress, key: [u8; 32]) {
        self.peer_keys.lock().await.insert(peer, key);
    }

    fn next_message_id(&self) -> u64 {
        let tag = key_tag(&self.node_key) as u64;
        let counter = self.counter.fetch_add(1, Ordering::Relaxed) & 0xFFFF_FFFF;
        (tag << 32) | counter
    }

    /// Add `peer` to `channel`'s subscriber set. Idempotent. Returns `false`
    /// if `channel` is not locally recognized.
    pub async fn subscribe(&self, peer: SocketAddress, channel: &str) -> bool {
        let mut channels = self.channels.lock().await;
        match channels.get_mut(channel) {
            Some(c) => {
                c.add_subscriber(peer);
                true
            }
            None => false,
        }
    }

    /// Remove `peer` from `channel`'s subscriber set.
    pub async fn unsubscribe(&self, peer: SocketAddress, channel: &str) {
        let mut channels = self.channels.lock().await;
        if let Some(c) = channels.get_mut(channel) {
            c.remove_subscriber(&peer);
        }
    }

    /// Originate a new message on `channel`: assigns a message id, inserts
    /// it into the seen set, attests and witnesses it, and delivers it to
    /// every current subscriber. Returns `false` if `channel` is not
    /// locally recognized.
    pub async fn send_message_on_channel(&self, channel: &str, payload: &[u8]) -> bool {
        let subscribers = {
            let channels = self.channels.lock().await;
            match channels.get(channel) {
                Some(c) => c.subscribers.clone(),
                None => return false,
            }
        };

        let message_id = self.next_message_id();
        self.seen.lock().await.insert(message_id);

        let witness = self.witnesser.write(&[], &self.node_key);
        let attestation = self.attester.attest(payload, &self.keystore);

        for peer in subscribers {
            self.forward_to(peer, channel, message_id, payload, &witness, &attestation).await;
        }
        true
    }

    /// Handle a received channel message from `peer`. De-duplicates against
    /// the seen set, verifies the attestation, delivers to the local ABCI
    /// adapter, and forwards to every subscriber that has not already
    /// reported this id — breaking loops via the witness's `contains` check.
    pub async fn did_recv_message(
        &self,
        peer: SocketAddress,
        channel: &str,
        message_id: u64,
        payload: &[u8],
        witness: &[u8],
        attestation: &[u8],
    ) {
        {
            let mut seen = self.seen.lock().await;
            if seen.contains(message_id) {
                self.metrics.pubsub_seen_dropped_total.inc();
                return;
            }
            if seen.insert(message_id).is_some() {
                self.metrics.pubsub_seen_evicted_total.inc();
            }
        }

        {
            let mut heard = self.heard_from.lock().await;
            heard.entry(message_id).or_default().insert(peer);
        }

        if !attestation.is_empty() {
            let originator_key = self.peer_keys.lock().await.get(&peer).copied();
            let verified = match originator_key {
                Some(key) => self.attester.verify(&key, payload, attestation),
                None => false,
            };
            if !verified {
                self.metrics.pubsub_attestation_failed_total.inc();
                debug!(%peer, channel, "attestation verification failed, dropping message");
                return;
            }
        }

        self.metrics.pubsub_delivered_total.inc();
        let block_id = self.abci.analyze_block(payload);
        self.abci.did_analyze_block(payload, block_id);

        if self.witnesser.contains(witness, &self.node_key) {
            self.metrics.pubsub_witness_suppressed_total.inc();
            trace!(%peer, channel, message_id, "witness loop-break, not re-forwarding");
            return;
        }

        let forward_witness = self.witnesser.write(witness, &self.node_key);

        let (subscribers, already_heard) = {
            let mut channels = self.channels.lock().await;
            let Some(c) = channels.get_mut(channel) else { return };
            c.note_publisher(peer);
            let heard = self.heard_from.lock().await.get(&message_id).cloned().unwrap_or_default();
            (c.subscribers.clone(), heard)
        };

        for subscriber in subscribers {
            if subscriber == peer || already_heard.contains(&subscriber) {
                continue;
            }
            self.forward_to(subscriber, channel, message_id, payload, &forward_witness, attestation).await;
        }
    }

    async fn forward_to(
        &self,
        peer: SocketAddress,
        channel: &str,
        message_id: u64,
        payload: &[u8],
        witness: &[u8],
        attestation: &[u8],
    ) {
        if !self.stream.is_established(peer).await {
            debug!(%peer, channel, "subscriber transport not established, skipping");
            return;
        }
        let msg = PubSubMessage::Msg {
            channel: channel.to_string(),
            message_id,
            witness: witness.to_vec(),
            attestation: attestation.to_vec(),
            payload: payload.to_vec(),
        };
        let framed = Framer::encode(&self.versioning.encode(&msg.encode()));
        if let Err(e) = self.stream.send_to_addr(peer, &framed).await {
            debug!(%peer, channel, error = ?e, "forward send failed, relying on retransmit");
        }
    }

    /// Send a SUB request to `peer` for `channel`, over whatever connection
    /// is already established to it.
    pub async fn send_subscribe(&self, peer: SocketAddress, channel: &str) {
        let msg = PubSubMessage::Sub { channel: channel.to_string() };
        let framed = Framer::encode(&self.versioning.encode(&msg.encode()));
        let _ = self.stream.send_to_addr(peer, &framed).await;
    }

    /// Drop all subscription bookkeeping for `peer` (its transport has
    /// disconnected).
    async fn drop_peer(&self, peer: SocketAddress) {
        let mut channels = self.channels.lock().await;
        for c in channels.values_mut() {
            c.remove_subscriber(&peer);
            c.publishers.retain(|p| p != &peer);
        }
        drop(channels);
        self.framers.lock().await.remove(&peer);
        self.peer_keys.lock().await.remove(&peer);
    }

    /// Drive the engine from a [`StreamEngine`]'s upward event channel:
    /// de-frames and de-versions each peer's byte stream, dispatching the
    /// resulting pub/sub messages, and tears down subscriptions on
    /// disconnect. Runs until the channel closes.
    pub async fn run(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<AddressedEvent>) {
        while let Some(AddressedEvent { addr, event }) = events.recv().await {
            match event {
                StreamEvent::DidRecv(bytes) => self.on_bytes(addr, &bytes).await,
                StreamEvent::DidDisconnect { .. } => self.drop_peer(addr).await,
                StreamEvent::DidDial { .. } | StreamEvent::DidSend => {}
            }
        }
        warn!("pub/sub engine event stream closed");
    }

    async fn on_bytes(&self, peer: SocketAddress, bytes: &[u8]) {
        let messages = {
            let mut framers = self.framers.lock().await;
            framers.entry(peer).or_default().push(bytes)
        };
        for framed in messages {
            let Ok(tagged) = self.versioning.decode(&framed) else {
                self.metrics.stream_version_mismatch_total.inc();
                debug!(%peer, "dropping frame with mismatched pub/sub version tag");
                continue;
            };
            let Some(msg) = PubSubMessage::decode(tagged) else {
                self.metrics.stream_protocol_violations_total.inc();
                warn!(%peer, "dropping malformed pub/sub message");
                continue;
            };
            match msg {
                PubSubMessage::Sub { channel } => {
                    self.subscribe(peer, &channel).await;
                }
                PubSubMessage::Unsub { channel } => {
                    self.unsubscribe(peer, &channel).await;
                }
                PubSubMessage::Msg { channel, message_id, witness, attestation, payload } => {
                    self.did_recv_message(peer, &channel, message_id, &payload, &witness, &attestation).await;
                }
                PubSubMessage::Heartbeat => {}
            }
        }
    }

    /// Number of entries currently in the seen set (test/diagnostic use).
    pub async fn seen_len(&self) -> usize {
        self.seen.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seen_set_evicts_oldest_at_capacity() {
        let mut seen = SeenSet::new(4);
        for id in [1u64, 2, 3, 4] {
            assert!(seen.insert(id).is_none());
        }
        assert_eq!(seen.len(), 4);
        assert_eq!(seen.insert(5), Some(1));
        assert!(!seen.contains(1));
        assert!(seen.contains(5));
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn seen_set_accepts_reinsertion_after_eviction() {
        let mut seen = SeenSet::new(4);
        for id in [1u64, 2, 3, 4, 5] {
            seen.insert(id);
        }
        assert!(!seen.contains(1));
        assert_eq!(seen.insert(1), Some(2));
        assert!(seen.contains(1));
    }

    #[test]
    fn seen_set_duplicate_insert_is_noop() {
        let mut seen = SeenSet::new(4);
        assert!(seen.insert(1).is_none());
        assert!(seen.insert(1).is_none());
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn key_tag_is_deterministic() {
        let k = [7u8; 32];
        assert_eq!(key_tag(&k), key_tag(&k));
        assert_ne!(key_tag(&k), key_tag(&[8u8; 32]));
    }

    #[test]
    fn channel_subscribe_is_idempotent() {
        let mut c = Channel::default();
        let addr: SocketAddress = "127.0.0.1:1".parse().unwrap();
        assert!(c.add_subscriber(addr));
        assert!(!c.add_subscriber(addr));
        assert_eq!(c.subscribers.len(), 1);
    }
}
