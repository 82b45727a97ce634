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

//! A peer-to-peer overlay pub/sub relay core: authenticated streaming
//! sessions over an unreliable datagram substrate, channel forwarding with
//! witness-based loop breaking, per-message attestation, and a pluggable
//! application-blockchain interface.
//!
//! This crate provides:
//! - A hand-rolled reliable ordered byte-stream transport over UDP
//!   ([`transport`]), with handshake, retransmission, congestion control,
//!   flow control, and length-prefix/version-tag framing fibers.
//! - A channel pub/sub engine ([`pubsub`]) built on top of it: subscription
//!   management, FIFO message de-duplication, forwarding, and pluggable
//!   witness/attestation strategies.
//! - A beacon-based discovery client ([`discovery`]) that feeds the relay
//!   candidate peers grouped by protocol number.
//! - The [`abci`] adapter interface through which a blockchain-specific
//!   back-end analyzes received blocks and attests to them under the
//!   node's own key.
//! - Ambient node infrastructure: an Ed25519 keystore and signed peer
//!   allowlist ([`networking`]), and Prometheus metrics served over HTTP
//!   ([`monitoring`]).

/// The application-blockchain interface (component L): a pluggable adapter
/// that parses domain blocks and returns a local block identifier.
pub mod abci;
/// Wire-format primitives: the bounds-checked byte buffer (component A)
/// and socket address/CIDR types (component B), plus shared scalar types,
/// node identity derivation, and [`core::types::NodeConfig`].
pub mod core;
/// Component K: the beacon discovery client and its wire codec.
pub mod discovery;
/// Observability: Prometheus metrics and the `/metrics`/`/healthz` HTTP
/// endpoints.
pub mod monitoring;
/// Signed peer registry allowlist and deterministic peer scoring.
pub mod networking;
/// Component H: the subscription/forward/de-dup engine, and the
/// attestation/witness plug-ins (components I, J) it composes.
pub mod pubsub;
/// Components C-G: the transport manager, datagram socket wrapper, the
/// reliable ordered stream transport, and its framing/versioning fibers.
pub mod transport;
