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

//! Shared scalar types and node configuration.

use serde::{Deserialize, Serialize};

/// 256-bit hash type (32 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct H256([u8; 32]);

impl H256 {
    /// Construct from raw bytes.
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }
    /// Return bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Ed25519 signature bytes (expected 64).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Signature(pub Vec<u8>);

/// A peer's identity key and last advertised address, as exchanged by the
/// discovery client and referenced by witness/attestation plug-ins.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    /// Unix milliseconds this peer was last heard from.
    pub last_seen: u64,
    /// Ed25519 public key.
    pub key: [u8; 32],
    /// 20-byte derived node address (`SHA-256(key)[..20]`).
    pub address: [u8; 20],
}

/// Derive a 20-byte node address from an Ed25519 public key.
pub fn node_address_from_pubkey(pubkey: &[u8; 32]) -> [u8; 20] {
    let digest = ring::digest::digest(&ring::digest::SHA256, pubkey);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest.as_ref()[..20]);
    out
}

/// Node configuration root, loaded from TOML.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node settings.
    pub node: NodeSettings,
    /// HTTP endpoints.
    pub http: HttpConfig,
    /// P2P settings.
    pub p2p: P2pConfig,
}

/// Node settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeSettings {
    /// Human-readable name.
    pub name: String,
    /// Data directory (keypair + peer registry cache).
    pub data_dir: String,
}

/// HTTP config.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Listen address, e.g. 0.0.0.0:9090.
    pub listen_addr: String,
}

/// Attester strategy selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttesterKind {
    /// Fixed-size Ed25519 signature.
    Legacy,
    /// Passthrough.
    Lpf,
    /// Always absent.
    Empty,
}

/// Witnesser strategy selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WitnesserKind {
    /// Fixed 32-byte bloom filter, loop-breaking.
    Bloom,
    /// Growing append-only chain of hop entries.
    Chain,
    /// Passthrough.
    Lpf,
}

/// P2P config embedded in node config.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct P2pConfig {
    /// Local listen address for the stream/datagram transport.
    pub listen_addr: String,
    /// Local listen address for the discovery client.
    pub discovery_listen_addr: String,
    /// Beacon server address.
    pub beacon_addr: String,
    /// Channels to subscribe to at startup.
    #[serde(default)]
    pub channels: Vec<String>,
    /// Attestation strategy.
    #[serde(default = "default_attester")]
    pub attester: AttesterKind,
    /// Witness strategy.
    #[serde(default = "default_witnesser")]
    pub witnesser: WitnesserKind,

    /// Bootstrap peers to dial at startup.
    #[serde(default)]
    pub bootstrap: Vec<String>,
    /// Allowlist of node addresses (hex, 20 bytes). Empty => allow all unless
    /// `require_allow_peers` is true.
    #[serde(default)]
    pub allow_peers: Vec<String>,
    /// If true, refuse to start when `allow_peers` is empty.
    #[serde(default)]
    pub require_allow_peers: bool,

    /// Optional path to a signed peer registry file (TOML).
    #[serde(default)]
    pub peer_registry_path: Option<String>,
    /// Ed25519 public key (hex, 32 bytes) verifying `peer_registry_path`.
    #[serde(default)]
    pub peer_registry_pubkey_hex: Option<String>,
    /// Minimum required peer registry format version.
    #[serde(default)]
    pub peer_registry_min_version: u32,
    /// Max age (now - issued_at_ms) allowed for the registry in milliseconds.
    #[serde(default)]
    pub peer_registry_max_age_ms: u64,
    /// Grace period after expires_at_ms in milliseconds.
    #[serde(default)]
    pub peer_registry_grace_ms: u64,
    /// Require registry freshness fields to be present.
    #[serde(default)]
    pub peer_registry_require_fresh: bool,
}

fn default_attester() -> AttesterKind {
    AttesterKind::Legacy
}

fn default_witnesser() -> WitnesserKind {
    WitnesserKind::Bloom
}
