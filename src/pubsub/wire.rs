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

//! Wire codec for the pub/sub message frame: the payload carried by a
//! framed, versioned DATA stream between two pub/sub engines.
//!
//! `version:u16 | message_type:u8 | channel_len:u16 | channel | message_id:u64
//! (MSG only) | witness_size:u16 (LE) | witness | attestation_size:u16 (LE) |
//! attestation | payload` (remainder of the frame; no length prefix of its
//! own, since framing already delimits the whole message).

/// Format version of this wire frame, distinct from the stream transport's
/// own version-tag fiber (component G).
pub const PUBSUB_WIRE_VERSION: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum MessageType {
    Sub = 0,
    Unsub = 1,
    Msg = 2,
    Heartbeat = 3,
}

impl MessageType {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Sub),
            1 => Some(Self::Unsub),
            2 => Some(Self::Msg),
            3 => Some(Self::Heartbeat),
            _ => None,
        }
    }
}

/// A decoded pub/sub message frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PubSubMessage {
    /// Request to receive future messages on `channel`.
    Sub {
        /// Channel name.
        channel: String,
    },
    /// Request to stop receiving messages on `channel`.
    Unsub {
        /// Channel name.
        channel: String,
    },
    /// A channel message, forwarded or originated.
    Msg {
        /// Channel name.
        channel: String,
        /// Originator-assigned (or copied, if forwarded) message id.
        message_id: u64,
        /// Aggregated per-hop witness bytes.
        witness: Vec<u8>,
        /// Per-message attestation bytes (may be empty).
        attestation: Vec<u8>,
        /// Application payload.
        payload: Vec<u8>,
    },
    /// Idle-connection liveness signal at the pub/sub layer.
    Heartbeat,
}

impl PubSubMessage {
    /// Encode to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&PUBSUB_WIRE_VERSION.to_le_bytes());
        match self {
            PubSubMessage::Sub { channel } => {
                out.push(MessageType::Sub as u8);
                write_channel(&mut out, channel);
                write_u16_le(&mut out, 0); // witness_size
                write_u16_le(&mut out, 0); // attestation_size
            }
            PubSubMessage::Unsub { channel } => {
                out.push(MessageType::Unsub as u8);
                write_channel(&mut out, channel);
                write_u16_le(&mut out, 0);
                write_u16_le(&mut out, 0);
            }
            PubSubMessage::Msg { channel, message_id, witness, attestation, payload } => {
                out.push(MessageType::Msg as u8);
                write_channel(&mut out, channel);
                out.extend_from_slice(&message_id.to_le_bytes());
                write_u16_le(&mut out, witness.len() as u16);
                out.extend_from_slice(witness);
                write_u16_le(&mut out, attestation.len() as u16);
                out.extend_from_slice(attestation);
                out.extend_from_slice(payload);
            }
            PubSubMessage::Heartbeat => {
                out.push(MessageType::Heartbeat as u8);
                write_channel(&mut out, "");
                write_u16_le(&mut out, 0);
                write_u16_le(&mut out, 0);
            }
        }
        out
    }

    /// Decode a pub/sub message frame. Returns `None` on truncation or an
    /// unrecognized message type; the caller treats this as a protocol
    /// violation.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let mut cur = Cursor::new(bytes);
        let _version = cur.u16()?;
        let kind = MessageType::from_u8(cur.u8()?)?;
        let channel_len = cur.u16()? as usize;
        let channel = String::from_utf8(cur.take(channel_len)?.to_vec()).ok()?;

        match kind {
            MessageType::Sub => {
                let _witness_size = cur.u16()?;
                let _attestation_size = cur.u16()?;
                Some(PubSubMessage::Sub { channel })
            }
            MessageType::Unsub => {
                let _witness_size = cur.u16()?;
                let _attestation_size = cur.u16()?;
                Some(PubSubMessage::Unsub { channel })
            }
            MessageType::Heartbeat => {
                let _witness_size = cur.u16()?;
                let _attestation_size = cur.u16()?;
                Some(PubSubMessage::Heartbeat)
            }
            MessageType::Msg => {
                let message_id = cur.u64()?;
                let witness_size = cur.u16()? as usize;
                let witness = cur.take(witness_size)?.to_vec();
                let attestation_size = cur.u16()? as usize;
                let attestation = cur.take(attestation_size)?.to_vec();
                let payload = cur.rest().to_vec();
                Some(PubSubMessage::Msg { channel, message_id, witness, attestation, payload })
            }
        }
    }
}

fn write_channel(out: &mut Vec<u8>, channel: &str) {
    write_u16_le(out, channel.len() as u16);
    out.extend_from_slice(channel.as_bytes());
}

fn write_u16_le(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

/// Minimal bounds-checked cursor over a borrowed slice, local to this codec:
/// the fields here are all variable-length strings/byte-runs, which the
/// fixed-width `core::buffer::Buffer` accessors don't model directly.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
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

    fn u64(&mut self) -> Option<u64> {
        let s = self.buf.get(self.pos..self.pos + 8)?;
        self.pos += 8;
        let mut b = [0u8; 8];
        b.copy_from_slice(s);
        Some(u64::from_le_bytes(b))
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let s = self.buf.get(self.pos..self.pos + n)?;
        self.pos += n;
        Some(s)
    }

    fn rest(&mut self) -> &'a [u8] {
        let s = &self.buf[self.pos.min(self.buf.len())..];
        self.pos = self.buf.len();
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_round_trips() {
        let m = PubSubMessage::Sub { channel: "eth".to_string() };
        assert_eq!(PubSubMessage::decode(&m.encode()), Some(m));
    }

    #[test]
    fn msg_round_trips_with_witness_and_attestation() {
        let m = PubSubMessage::Msg {
            channel: "eth".to_string(),
            message_id: 0x1122_3344_5566_7788,
            witness: vec![1, 2, 3],
            attestation: vec![9; 67],
            payload: b"block-bytes".to_vec(),
        };
        assert_eq!(PubSubMessage::decode(&m.encode()), Some(m));
    }

    #[test]
    fn msg_round_trips_with_empty_payload() {
        let m = PubSubMessage::Msg {
            channel: "eth".to_string(),
            message_id: 1,
            witness: vec![],
            attestation: vec![],
            payload: vec![],
        };
        assert_eq!(PubSubMessage::decode(&m.encode()), Some(m));
    }

    #[test]
    fn heartbeat_round_trips() {
        assert_eq!(PubSubMessage::decode(&PubSubMessage::Heartbeat.encode()), Some(PubSubMessage::Heartbeat));
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let m = PubSubMessage::Sub { channel: "eth".to_string() };
        let wire = m.encode();
        assert_eq!(PubSubMessage::decode(&wire[..wire.len() - 1]), None);
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        let mut wire = PubSubMessage::Heartbeat.encode();
        wire[2] = 0xEE; // corrupt the message-type byte
        assert_eq!(PubSubMessage::decode(&wire), None);
    }
}
