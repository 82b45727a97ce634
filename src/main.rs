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

//! Relay node entrypoint (systemd-friendly).
//!
//! Loads a [`NodeConfig`] from `--config <path>` or `OSIRIS_CONFIG`
//! (defaulting to `./node.toml`), opens the node's keystore, wires the
//! stream transport, pub/sub engine, and discovery client together, and
//! serves Prometheus metrics over HTTP until the process is signalled to
//! stop.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use osiris_relay::abci::{AbciAdapter, NoopAbciAdapter};
use osiris_relay::core::security::keystore::{FileEd25519Backend, Keystore};
use osiris_relay::core::socket_address::SocketAddress;
use osiris_relay::core::types::{node_address_from_pubkey, AttesterKind, NodeConfig, WitnesserKind};
use osiris_relay::discovery::client::{DiscoveryClient, DiscoveryUpcalls};
use osiris_relay::discovery::wire::ProtocolSupport;
use osiris_relay::monitoring::http;
use osiris_relay::monitoring::metrics::Metrics;
use osiris_relay::networking::peer_registry::{load_and_verify_peer_registry_now, PeerRegistryPolicy};
use osiris_relay::networking::peer_score::{PeerScore, ScoreParams};
use osiris_relay::pubsub::attester::{Attester, EmptyAttester, LegacyAttester, LpfAttester};
use osiris_relay::pubsub::engine::PubSubEngine;
use osiris_relay::pubsub::witnesser::{BloomWitnesser, ChainWitnesser, LpfWitnesser, Witnesser};
use osiris_relay::transport::tuning::{Tuning, S_CAP};
use osiris_relay::transport::StreamEngine;

/// Protocol number this relay advertises to the discovery beacon. There is
/// exactly one protocol in this deployment, so the number is fixed rather
/// than configurable.
const RELAY_PROTOCOL_ID: u32 = 1;

/// Wire-tag version for both the stream handshake and the pub/sub
/// versioning fiber.
const WIRE_VERSION: u16 = 1;

fn config_path() -> PathBuf {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("OSIRIS_CONFIG").ok())
        .unwrap_or_else(|| "./node.toml".to_string())
        .into()
}

fn load_config(path: &PathBuf) -> Result<NodeConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
}

fn build_attester(kind: AttesterKind) -> Box<dyn Attester> {
    match kind {
        AttesterKind::Legacy => Box::new(LegacyAttester),
        AttesterKind::Lpf => Box::new(LpfAttester),
        AttesterKind::Empty => Box::new(EmptyAttester),
    }
}

fn build_witnesser(kind: WitnesserKind) -> Box<dyn Witnesser> {
    match kind {
        WitnesserKind::Bloom => Box::new(BloomWitnesser),
        WitnesserKind::Chain => Box::new(ChainWitnesser),
        WitnesserKind::Lpf => Box::new(LpfWitnesser),
    }
}

/// Bridges the discovery client's upcalls to the stream transport and the
/// pub/sub engine: every newly learned peer offering the relay protocol is
/// dialed, then asked to forward every channel this node subscribes to.
struct NodeBridge {
    stream: Arc<StreamEngine>,
    engine: Arc<PubSubEngine>,
    channels: Vec<String>,
}

impl DiscoveryUpcalls for NodeBridge {
    fn new_peer(&self, addr: SocketAddress, protocol: u32) {
        if protocol != RELAY_PROTOCOL_ID {
            return;
        }
        let stream = self.stream.clone();
        let engine = self.engine.clone();
        let channels = self.channels.clone();
        tokio::spawn(async move {
            let _handle = stream.dial(addr).await;
            for channel in &channels {
                engine.send_subscribe(addr, channel).await;
            }
        });
    }
}

async fn dial_bootstrap_peers(stream: &Arc<StreamEngine>, bootstrap: &[String]) {
    for raw in bootstrap {
        match raw.parse::<SocketAddress>() {
            Ok(addr) => {
                stream.dial(addr).await;
            }
            Err(e) => warn!(addr = %raw, error = ?e, "skipping unparsable bootstrap address"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_target(false).compact().try_init();

    let path = config_path();
    let config = match load_config(&path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("fatal: {e:#}");
            std::process::exit(1);
        }
    };

    std::fs::create_dir_all(&config.node.data_dir)
        .with_context(|| format!("creating data dir {}", config.node.data_dir))?;

    let keystore = Arc::new(
        Keystore::<FileEd25519Backend>::open(&config.node.data_dir)
            .context("opening node keystore")?,
    );
    let node_key = keystore.public_key();
    let node_address = node_address_from_pubkey(&node_key);
    info!(
        node = %config.node.name,
        address = %bs58::encode(node_address).into_string(),
        "node identity loaded"
    );

    if config.p2p.require_allow_peers && config.p2p.allow_peers.is_empty() {
        eprintln!("fatal: p2p.require_allow_peers is set but p2p.allow_peers is empty");
        std::process::exit(1);
    }

    if let (Some(registry_path), Some(pubkey_hex)) =
        (&config.p2p.peer_registry_path, &config.p2p.peer_registry_pubkey_hex)
    {
        let mut policy = PeerRegistryPolicy::default_with_now(0);
        policy.max_age_ms = config.p2p.peer_registry_max_age_ms;
        policy.grace_ms = config.p2p.peer_registry_grace_ms;
        policy.min_version = config.p2p.peer_registry_min_version;
        policy.require_freshness_fields = config.p2p.peer_registry_require_fresh;
        match load_and_verify_peer_registry_now(registry_path, pubkey_hex, &policy) {
            Ok(peers) => info!(count = peers.len(), "signed peer registry verified"),
            Err(e) => {
                eprintln!("fatal: peer registry verification failed: {e}");
                std::process::exit(1);
            }
        }
    }

    let metrics = Arc::new(Metrics::new().context("initializing metrics registry")?);

    let local_addr: SocketAddress = config
        .p2p
        .listen_addr
        .parse()
        .with_context(|| format!("invalid p2p.listen_addr {}", config.p2p.listen_addr))?;
    let discovery_addr: SocketAddress = config
        .p2p
        .discovery_listen_addr
        .parse()
        .with_context(|| format!("invalid p2p.discovery_listen_addr {}", config.p2p.discovery_listen_addr))?;
    let beacon_addr: SocketAddress = config
        .p2p
        .beacon_addr
        .parse()
        .with_context(|| format!("invalid p2p.beacon_addr {}", config.p2p.beacon_addr))?;

    let score = PeerScore::new(ScoreParams::default());
    let (stream, events_rx) =
        StreamEngine::bind(local_addr, WIRE_VERSION, Tuning::default(), score, metrics.clone())
            .await
            .with_context(|| format!("binding stream transport at {local_addr}"))?;

    let abci: Box<dyn AbciAdapter> = Box::new(NoopAbciAdapter::new(node_key));
    let engine = Arc::new(PubSubEngine::new(
        node_key,
        config.p2p.channels.clone(),
        stream.clone(),
        build_attester(config.p2p.attester),
        build_witnesser(config.p2p.witnesser),
        keystore,
        abci,
        S_CAP,
        WIRE_VERSION,
        metrics.clone(),
    ));

    tokio::spawn(stream.clone().run());
    tokio::spawn(engine.clone().run(events_rx));

    let http_listen = config.http.listen_addr.clone();
    let http_metrics = metrics.clone();
    tokio::spawn(async move {
        if let Err(e) = http::serve(&http_listen, http_metrics).await {
            warn!(error = ?e, "monitoring http server exited");
        }
    });

    dial_bootstrap_peers(&stream, &config.p2p.bootstrap).await;

    let discovery_client = DiscoveryClient::bind(
        discovery_addr,
        beacon_addr,
        node_key,
        vec![ProtocolSupport {
            proto_id: RELAY_PROTOCOL_ID,
            version_min: WIRE_VERSION,
            version_max: WIRE_VERSION,
        }],
        Tuning::default(),
        metrics.clone(),
    )
    .await
    .with_context(|| format!("binding discovery client at {discovery_addr}"))?;

    let bridge = Arc::new(NodeBridge {
        stream: stream.clone(),
        engine: engine.clone(),
        channels: config.p2p.channels.clone(),
    });

    info!(
        p2p = %local_addr,
        discovery = %discovery_addr,
        http = %config.http.listen_addr,
        "node starting"
    );

    tokio::select! {
        _ = discovery_client.run(bridge) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    Ok(())
}
