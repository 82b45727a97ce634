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

//! Per-hop witness strategies aggregated along a message's forwarding path,
//! used to break forwarding loops and audit routes.

/// Uniform interface implemented by every witness strategy, selected at
/// node startup from configuration.
pub trait Witnesser: Send + Sync {
    /// Size in bytes the witness header will occupy after appending this
    /// hop, given the previous hop's witness bytes (empty on origination).
    fn size(&self, prev: &[u8]) -> u64;

    /// Append this hop's witness to `prev`, returning the new witness
    /// bytes to carry forward.
    fn write(&self, prev: &[u8], public_key: &[u8; 32]) -> Vec<u8>;

    /// True if `public_key` already appears along the path recorded in
    /// `witness` — the loop-break check consulted before re-forwarding.
    fn contains(&self, witness: &[u8], public_key: &[u8; 32]) -> bool;

    /// Parse the advertised witness size from a received header's raw size
    /// field together with the bytes available at `offset`.
    fn parse_size(&self, buf: &[u8], offset: usize) -> Option<u64>;
}

const BLOOM_LEN: usize = 32;

/// Fixed 32-byte Bloom filter: each hop's public key sets 8 bit positions
/// (one per byte of the key, byte value as bit index across the 32-byte/
/// 256-bit filter). Forwarding ORs the incoming filter with the forwarder's
/// own bits; a message whose bits are already all set for this node's key
/// must not be re-forwarded (its path already passed through here).
#[derive(Debug, Default, Clone, Copy)]
pub struct BloomWitnesser;

impl BloomWitnesser {
    fn set_bit(bloom: &mut [u8; BLOOM_LEN], idx: u8) {
        bloom[(idx / 8) as usize] |= 1 << (idx % 8);
    }

    fn test_bit(bloom: &[u8], idx: u8) -> bool {
        bloom[(idx / 8) as usize] & (1 << (idx % 8)) != 0
    }
}

impl Witnesser for BloomWitnesser {
    fn size(&self, _prev: &[u8]) -> u64 {
        BLOOM_LEN as u64
    }

    fn write(&self, prev: &[u8], public_key: &[u8; 32]) -> Vec<u8> {
        let mut filter = [0u8; BLOOM_LEN];
        if prev.len() == BLOOM_LEN {
            filter.copy_from_slice(prev);
        }
        for &byte in &public_key[..8] {
            Self::set_bit(&mut filter, byte);
        }
        filter.to_vec()
    }

    fn contains(&self, witness: &[u8], public_key: &[u8; 32]) -> bool {
        if witness.len() != BLOOM_LEN {
            return false;
        }
        public_key[..8].iter().all(|&byte| Self::test_bit(witness, byte))
    }

    fn parse_size(&self, _buf: &[u8], _offset: usize) -> Option<u64> {
        Some(BLOOM_LEN as u64)
    }
}

/// Append-only chain of per-hop public points, each hop appending 32 bytes
/// derived from its own key. Never suppresses a forward on its own (loop
/// detection for this strategy is left to the seen set).
#[derive(Debug, Default, Clone, Copy)]
pub struct ChainWitnesser;

impl Witnesser for ChainWitnesser {
    fn size(&self, prev: &[u8]) -> u64 {
        if prev.is_empty() {
            2 + 32
        } else {
            prev.len() as u64 + 32
        }
    }

    fn write(&self, prev: &[u8], public_key: &[u8; 32]) -> Vec<u8> {
        let mut out = Vec::with_capacity(prev.len() + 32);
        out.extend_from_slice(prev);
        out.extend_from_slice(public_key);
        out
    }

    fn contains(&self, _witness: &[u8], _public_key: &[u8; 32]) -> bool {
        false
    }

    fn parse_size(&self, buf: &[u8], offset: usize) -> Option<u64> {
        let bytes = buf.get(offset..offset + 2)?;
        let len = u16::from_be_bytes([bytes[0], bytes[1]]) as u64;
        Some(len + 2)
    }
}

/// Passthrough witness (LPF): forwards whatever bytes arrived unmodified.
#[derive(Debug, Default, Clone, Copy)]
pub struct LpfWitnesser;

impl Witnesser for LpfWitnesser {
    fn size(&self, prev: &[u8]) -> u64 {
        if prev.is_empty() {
            2
        } else {
            prev.len() as u64
        }
    }

    fn write(&self, prev: &[u8], _public_key: &[u8; 32]) -> Vec<u8> {
        prev.to_vec()
    }

    fn contains(&self, _witness: &[u8], _public_key: &[u8; 32]) -> bool {
        false
    }

    fn parse_size(&self, buf: &[u8], offset: usize) -> Option<u64> {
        let bytes = buf.get(offset..offset + 2)?;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bloom_own_bits_set_after_first_hop() {
        let w = BloomWitnesser;
        let key = [7u8; 32];
        let witness = w.write(&[], &key);
        assert_eq!(witness.len(), BLOOM_LEN);
        assert!(w.contains(&witness, &key));
    }

    #[test]
    fn bloom_loop_break_on_cycle() {
        let w = BloomWitnesser;
        let k1 = {
            let mut k = [0u8; 32];
            k[0] = 1;
            k
        };
        let k2 = {
            let mut k = [0u8; 32];
            k[0] = 2;
            k
        };
        // N1 publishes: empty witness, N1 writes its own bits.
        let at_n1 = w.write(&[], &k1);
        // N2 forwards: ORs in its own bits.
        let at_n2 = w.write(&at_n1, &k2);
        // Message returns to N1 via N3 (N3 just relays N2's witness
        // unchanged for this check) - N1 should detect its own bits.
        assert!(w.contains(&at_n2, &k1));
    }

    #[test]
    fn chain_grows_by_32_bytes_per_hop() {
        let w = ChainWitnesser;
        let key = [9u8; 32];
        let first = w.write(&[], &key);
        assert_eq!(first.len(), 32);
        let second = w.write(&first, &key);
        assert_eq!(second.len(), 64);
    }

    #[test]
    fn lpf_is_passthrough() {
        let w = LpfWitnesser;
        let data = vec![1, 2, 3];
        assert_eq!(w.write(&data, &[0u8; 32]), data);
    }
}
