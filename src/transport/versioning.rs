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

//! Protocol version tagging, layered above the framing fiber.

/// Prepends/validates a 2-byte protocol-version tag on each framed message.
#[derive(Debug, Clone, Copy)]
pub struct VersioningFiber {
    local_version: u16,
}

impl VersioningFiber {
    /// Construct with the locally supported protocol version.
    pub fn new(local_version: u16) -> Self {
        Self { local_version }
    }

    /// Prepend this node's version tag to an outbound message.
    pub fn encode(&self, msg: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + msg.len());
        out.extend_from_slice(&self.local_version.to_le_bytes());
        out.extend_from_slice(msg);
        out
    }

    /// Validate and strip the version tag from an inbound message.
    /// Returns `Err(())` (the spec's "report -1 to the sender fiber") on a
    /// tag mismatch; the caller drops the message and does not forward it.
    pub fn decode<'a>(&self, msg: &'a [u8]) -> Result<&'a [u8], ()> {
        if msg.len() < 2 {
            return Err(());
        }
        let tag = u16::from_le_bytes([msg[0], msg[1]]);
        if tag != self.local_version {
            return Err(());
        }
        Ok(&msg[2..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_version_round_trips() {
        let fiber = VersioningFiber::new(1);
        let wire = fiber.encode(b"payload");
        assert_eq!(fiber.decode(&wire), Ok(b"payload".as_slice()));
    }

    #[test]
    fn mismatched_version_is_dropped() {
        let sender = VersioningFiber::new(2);
        let receiver = VersioningFiber::new(1);
        let wire = sender.encode(b"payload");
        assert_eq!(receiver.decode(&wire), Err(()));
    }

    #[test]
    fn short_message_is_dropped() {
        let fiber = VersioningFiber::new(1);
        assert_eq!(fiber.decode(&[0]), Err(()));
    }
}
