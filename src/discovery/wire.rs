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

//! Wire codec for the beacon protocol (component K):
//!
//! `type:u8 (HELLO=0, PEERLIST=1) | key:[32] | proto_count:u8 |
//! [ proto_id:u32, version_min:u16, version_max:u16 ] x proto_count |
//! [ addr:18 bytes ] x n` for PEERLIST, where each 18-byte address entry is
//! a 16-byte IPv6 octet string (IPv4 addresses are encoded IPv4-mapped,
//! `::ffff:a.b.c.d`) followed by a 2-byte little-endian port.

use std::net::Ipv6Addr;

use crate::core::socket_address::SocketAddress;

/// A protocol this node (or its peer) supports, with the version range it
/// accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolSupport {
    /// Protocol identifier.
    pub proto_id: u32,
    /// Minimum supported version.
    pub version_min: u16,
    /// Maximum supported version.
    pub version_max: u16,
}

/// A decoded beacon message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeaconMessage {
    /// Announce this node's key and supported protocols to the beacon.
    Hello {
        /// Sender's Ed25519 public key.
        key: [u8; 32],
        /// Protocols the sender supports.
        protocols: Vec<ProtocolSupport>,
    },
    /// The beacon's response: its own key/protocols, plus a flat peer set
    /// that supports all the protocols listed.
    PeerList {
        /// Beacon's Ed25519 public key.
        key: [u8; 32],
        /// Protocols this peer list is grouped under.
        protocols: Vec<ProtocolSupport>,
        /// Candidate peer addresses.
        peers: Vec<SocketAddress>,
    },
}

fn encode_addr(out: &mut Vec<u8>, addr: &SocketAddress) {
    let (ip, port) = match addr {
        SocketAddress::V4(ip, port) => (ip.to_ipv6_mapped(), *port),
        SocketAddress::V6(ip, port) => (*ip, *port),
    };
    out.extend_from_slice(&ip.octets());
    out.extend_from_slice(&port.to_le_bytes());
}

fn decode_addr(cur: &mut Cursor<'_>) -> Option<SocketAddress> {
    let octets = cur.take(16)?;
    let mut buf = [0u8; 16];
    buf.copy_from_slice(octets);
    let port = cur.u16()?;
    let ip = Ipv6Addr::from(buf);
    match ip.to_ipv4_mapped() {
        Some(v4) => Some(SocketAddress::V4(v4, port)),
        None => Some(SocketAddress::V6(ip, port)),
    }
}

fn encode_protocols(out: &mut Vec<u8>, protocols: &[ProtocolSupport]) {
    out.push(protocols.len().min(u8::MAX as usize) as u8);
    for p in protocols.iter().take(u8::MAX as usize) {
        out.extend_from_slice(&p.proto_id.to_le_bytes());
        out.extend_from_slice(&p.version_min.to_le_bytes());
        out.extend_from_slice(&p.version_max.to_le_bytes());
    }
}

fn decode_protocols(cur: &mut Cursor<'_>) -> Option<Vec<ProtocolSupport>> {
    let count = cur.u8()? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let proto_id = cur.u32()?;
        let version_min = cur.u16()?;
        let version_max = cur.u16()?;
        out.push(ProtocolSupport { proto_id, version_min, version_max });
    }
    Some(out)
}

impl BeaconMessage {
    /// Encode to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            BeaconMessage::Hello { key, protocols } => {
                out.push(0);
                out.extend_from_slice(key);
                encode_protocols(&mut out, protocols);
            }
            BeaconMessage::PeerList { key, protocols, peers } => {
                out.push(1);
                out.extend_from_slice(key);
                encode_protocols(&mut out, protocols);
                for peer in peers {
                    encode_addr(&mut out, peer);
                }
            }
        }
        out
    }

    /// Decode a beacon message. Returns `None` on truncation or an
    /// unrecognized type tag.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let mut cur = Cursor::new(bytes);
        let kind = cur.u8()?;
        let mut key = [0u8; 32];
        key.copy_from_slice(cur.take(32)?);
        let protocols = decode_protocols(&mut cur)?;
        match kind {
            0 => Some(BeaconMessage::Hello { key, protocols }),
            1 => {
                let mut peers = Vec::new();
                while cur.remaining() > 0 {
                    peers.push(decode_addr(&mut cur)?);
                }
                Some(BeaconMessage::PeerList { key, protocols, peers })
            }
            _ => None,
        }
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn u8(&mut self) -> Option<u8> {
        let b = *self.buf.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    fn u16(&mut self) -> Option<u16> {
        let s = self.buf.get(self.pos..self.pos + 2)?;
        self.pos += 2;
        Some(u16::from_le_bytes([s[0], s[1]]))
    }

    fn u32(&mut self) -> Option<u32> {
        let s = self.buf.get(self.pos..self.pos + 4)?;
        self.pos += 4;
        let mut b = [0u8; 4];
        b.copy_from_slice(s);
        Some(u32::from_le_bytes(b))
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let s = self.buf.get(self.pos..self.pos + n)?;
        self.pos += n;
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_round_trips() {
        let m = BeaconMessage::Hello {
            key: [7u8; 32],
            protocols: vec![ProtocolSupport { proto_id: 1, version_min: 1, version_max: 2 }],
        };
        assert_eq!(BeaconMessage::decode(&m.encode()), Some(m));
    }

    #[test]
    fn peerlist_round_trips_v4_and_v6() {
        let m = BeaconMessage::PeerList {
            key: [9u8; 32],
            protocols: vec![ProtocolSupport { proto_id: 42, version_min: 0, version_max: 1 }],
            peers: vec![
                "10.0.0.1:5000".parse().unwrap(),
                "[fe80::1]:5000".parse().unwrap(),
            ],
        };
        assert_eq!(BeaconMessage::decode(&m.encode()), Some(m));
    }

    #[test]
    fn empty_peerlist_round_trips() {
        let m = BeaconMessage::PeerList { key: [0u8; 32], protocols: vec![], peers: vec![] };
        assert_eq!(BeaconMessage::decode(&m.encode()), Some(m));
    }

    #[test]
    fn truncated_message_is_rejected() {
        let m = BeaconMessage::Hello { key: [1u8; 32], protocols: vec![] };
        let wire = m.encode();
        assert_eq!(BeaconMessage::decode(&wire[..wire.len() - 1]), None);
    }

    #[test]
    fn unknown_type_tag_is_rejected() {
        let mut wire = BeaconMessage::Hello { key: [1u8; 32], protocols: vec![] }.encode();
        wire[0] = 0xEE;
        assert_eq!(BeaconMessage::decode(&wire), None);
    }
}
