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

//! The application-blockchain interface: a pluggable adapter that parses
//! domain blocks and returns a local block identifier used for attestation.
//! Concrete chain-specific adapters (BSC/Matic/Tendermint/Near decoders)
//! are out of scope; this module ships the two reference adapters every
//! node can run without one.

use ring::digest::{digest, SHA256};

/// Implemented by a blockchain-specific adapter plugged into the pub/sub
/// engine. All methods are synchronous from the engine's point of view;
/// an adapter that needs to do real I/O should hand work off internally
/// and return promptly.
pub trait AbciAdapter: Send + Sync {
    /// Parse `block` (plus arbitrary metadata already extracted by the
    /// caller) and return a locally meaningful block id.
    fn analyze_block(&self, block: &[u8]) -> u64;

    /// Upward notification once a block has been analyzed, carrying the
    /// same id `analyze_block` returned.
    fn did_analyze_block(&self, block: &[u8], block_id: u64);

    /// The node's public key, used by witnesses and attesters.
    fn get_key(&self) -> [u8; 32];

    /// Fire-and-forget on-chain receipt submission. Any non-zero return is
    /// advisory only; the engine never retries.
    fn submit_receipt_onchain(&self, receipt: &[u8]) -> i32;
}

/// Always returns block id 0 and never submits a receipt. Mirrors the
/// source's `EmptyAbci`, useful when no adapter is configured.
#[derive(Debug, Clone, Copy)]
pub struct EmptyAbciAdapter {
    key: [u8; 32],
}

impl EmptyAbciAdapter {
    /// Construct with the node's public key.
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }
}

impl AbciAdapter for EmptyAbciAdapter {
    fn analyze_block(&self, _block: &[u8]) -> u64 {
        0
    }

    fn did_analyze_block(&self, _block: &[u8], _block_id: u64) {}

    fn get_key(&self) -> [u8; 32] {
        self.key
    }

    fn submit_receipt_onchain(&self, _receipt: &[u8]) -> i32 {
        1
    }
}

/// Returns a deterministic id derived from a hash of the block bytes.
/// Mirrors the source's `DefaultAbci`: useful for exercising the
/// `did_recv_message` → adapter path in tests and as the node binary's
/// default when no external adapter is configured.
#[derive(Debug, Clone, Copy)]
pub struct NoopAbciAdapter {
    key: [u8; 32],
}

impl NoopAbciAdapter {
    /// Construct with the node's public key.
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }
}

impl AbciAdapter for NoopAbciAdapter {
    fn analyze_block(&self, block: &[u8]) -> u64 {
        let hash = digest(&SHA256, block);
        let bytes = hash.as_ref();
        u64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ])
    }

    fn did_analyze_block(&self, _block: &[u8], _block_id: u64) {}

    fn get_key(&self) -> [u8; 32] {
        self.key
    }

    fn submit_receipt_onchain(&self, _receipt: &[u8]) -> i32 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_adapter_always_returns_zero() {
        let a = EmptyAbciAdapter::new([1u8; 32]);
        assert_eq!(a.analyze_block(b"anything"), 0);
        assert_eq!(a.submit_receipt_onchain(b"r"), 1);
    }

    #[test]
    fn noop_adapter_is_deterministic() {
        let a = NoopAbciAdapter::new([2u8; 32]);
        let id1 = a.analyze_block(b"block-bytes");
        let id2 = a.analyze_block(b"block-bytes");
        assert_eq!(id1, id2);
        let id3 = a.analyze_block(b"different-bytes");
        assert_ne!(id1, id3);
    }
}
