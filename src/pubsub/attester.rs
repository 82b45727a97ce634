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

//! Per-message attestation strategies: a fixed-size signature or MAC carried
//! alongside a pub/sub message, verified by receivers.

use subtle::ConstantTimeEq;

use crate::core::security::keystore::{verify_pubkey_bytes, FileEd25519Backend, Keystore};

/// Domain tag distinguishing a legacy attestation signature from signatures
/// over other message types signed by the same key.
const LEGACY_DOMAIN_TAG: u8 = 0x41;
/// `domain_tag(1) + ed25519_signature(64) + reserved(2)`.
const LEGACY_ATTESTATION_LEN: u64 = 67;

/// Uniform interface implemented by every attestation strategy, selected at
/// node startup from configuration.
pub trait Attester: Send + Sync {
    /// Size in bytes of the attestation this strategy produces (0 = absent).
    fn size(&self) -> u64;

    /// Build the attestation bytes for `msg`, signed by `keystore`.
    fn attest(&self, msg: &[u8], keystore: &Keystore<FileEd25519Backend>) -> Vec<u8>;

    /// Verify `attestation` over `msg` against `pubkey`. The absent case
    /// (empty attestation bytes) always verifies true.
    fn verify(&self, pubkey: &[u8; 32], msg: &[u8], attestation: &[u8]) -> bool;

    /// Parse the advertised attestation size from a received header's raw
    /// size field. Mirrors the source's ambiguous contract: returns `Some(67)`
    /// when the field reads 67, `Some(0)` (absent) otherwise — see
    /// `DESIGN.md` for why this ambiguity is resolved this way rather than
    /// guessed at differently.
    fn parse_size(&self, advertised: u16) -> Option<u64>;
}

/// Fixed-size Ed25519 signature attestation: 67 bytes when present, 0 when
/// absent (no local signing key configured for this channel).
#[derive(Debug, Default, Clone, Copy)]
pub struct LegacyAttester;

impl Attester for LegacyAttester {
    fn size(&self) -> u64 {
        LEGACY_ATTESTATION_LEN
    }

    fn attest(&self, msg: &[u8], keystore: &Keystore<FileEd25519Backend>) -> Vec<u8> {
        let sig = match keystore.sign(msg) {
            Ok(sig) => sig,
            Err(_) => return Vec::new(),
        };
        let mut out = Vec::with_capacity(LEGACY_ATTESTATION_LEN as usize);
        out.push(LEGACY_DOMAIN_TAG);
        out.extend_from_slice(&sig.0);
        out.extend_from_slice(&[0u8; 2]);
        out
    }

    fn verify(&self, pubkey: &[u8; 32], msg: &[u8], attestation: &[u8]) -> bool {
        if attestation.is_empty() {
            return true;
        }
        if attestation.len() != LEGACY_ATTESTATION_LEN as usize {
            return false;
        }
        if attestation[0].ct_eq(&LEGACY_DOMAIN_TAG).unwrap_u8() == 0 {
            return false;
        }
        let sig = crate::core::types::Signature(attestation[1..65].to_vec());
        verify_pubkey_bytes(pubkey, msg, &sig).is_ok()
    }

    fn parse_size(&self, advertised: u16) -> Option<u64> {
        if advertised as u64 == LEGACY_ATTESTATION_LEN {
            Some(LEGACY_ATTESTATION_LEN)
        } else {
            Some(0)
        }
    }
}

/// Passthrough attestation (LPF): forwards whatever size/bytes arrived,
/// signs nothing itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct LpfAttester;

impl Attester for LpfAttester {
    fn size(&self) -> u64 {
        0
    }

    fn attest(&self, _msg: &[u8], _keystore: &Keystore<FileEd25519Backend>) -> Vec<u8> {
        Vec::new()
    }

    fn verify(&self, _pubkey: &[u8; 32], _msg: &[u8], _attestation: &[u8]) -> bool {
        true
    }

    fn parse_size(&self, advertised: u16) -> Option<u64> {
        Some(advertised as u64)
    }
}

/// Always-absent attestation.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyAttester;

impl Attester for EmptyAttester {
    fn size(&self) -> u64 {
        0
    }

    fn attest(&self, _msg: &[u8], _keystore: &Keystore<FileEd25519Backend>) -> Vec<u8> {
        Vec::new()
    }

    fn verify(&self, _pubkey: &[u8; 32], _msg: &[u8], attestation: &[u8]) -> bool {
        attestation.is_empty()
    }

    fn parse_size(&self, _advertised: u16) -> Option<u64> {
        Some(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_parse_size_resolves_ambiguity() {
        let a = LegacyAttester;
        assert_eq!(a.parse_size(67), Some(67));
        assert_eq!(a.parse_size(0), Some(0));
        assert_eq!(a.parse_size(12), Some(0));
    }

    #[test]
    fn empty_attester_always_absent() {
        let a = EmptyAttester;
        assert_eq!(a.size(), 0);
        assert!(a.verify(&[0u8; 32], b"msg", &[]));
        assert!(!a.verify(&[0u8; 32], b"msg", &[1, 2, 3]));
    }

    #[test]
    fn lpf_attester_is_passthrough() {
        let a = LpfAttester;
        assert_eq!(a.parse_size(9), Some(9));
        assert!(a.verify(&[0u8; 32], b"anything", b"whatever-bytes"));
    }
}
