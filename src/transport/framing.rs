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

//! Length-prefix message framing over a byte stream.

/// Accumulates bytes from a stream and yields complete length-prefixed
/// messages. Each message is prefixed by a 4-byte little-endian length; the
/// residual prefix of an incomplete message is kept as "leftover" until more
/// bytes arrive.
#[derive(Debug, Default)]
pub struct Framer {
    leftover: Vec<u8>,
}

impl Framer {
    /// Empty framer.
    pub fn new() -> Self {
        Self { leftover: Vec::new() }
    }

    /// Feed newly received bytes, draining as many complete messages as are
    /// available. Incomplete trailing bytes remain buffered for the next call.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.leftover.extend_from_slice(bytes);
        let mut out = Vec::new();
        loop {
            if self.leftover.len() < 4 {
                break;
            }
            let len = u32::from_le_bytes([
                self.leftover[0],
                self.leftover[1],
                self.leftover[2],
                self.leftover[3],
            ]) as usize;
            if self.leftover.len() < 4 + len {
                break;
            }
            let msg = self.leftover[4..4 + len].to_vec();
            self.leftover.drain(..4 + len);
            out.push(msg);
        }
        out
    }

    /// Encode a message with its 4-byte little-endian length prefix.
    pub fn encode(msg: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + msg.len());
        out.extend_from_slice(&(msg.len() as u32).to_le_bytes());
        out.extend_from_slice(msg);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_message_round_trip() {
        let mut framer = Framer::new();
        let wire = Framer::encode(b"hello");
        let msgs = framer.push(&wire);
        assert_eq!(msgs, vec![b"hello".to_vec()]);
    }

    #[test]
    fn split_across_pushes() {
        let mut framer = Framer::new();
        let wire = Framer::encode(b"hello world");
        assert!(framer.push(&wire[..3]).is_empty());
        assert!(framer.push(&wire[3..6]).is_empty());
        let msgs = framer.push(&wire[6..]);
        assert_eq!(msgs, vec![b"hello world".to_vec()]);
    }

    #[test]
    fn multiple_messages_in_one_push() {
        let mut framer = Framer::new();
        let mut wire = Framer::encode(b"a");
        wire.extend(Framer::encode(b"bb"));
        let msgs = framer.push(&wire);
        assert_eq!(msgs, vec![b"a".to_vec(), b"bb".to_vec()]);
    }
}
