#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Core primitives: the wire-format buffer, address types, shared scalar
//! types/config, and the local key security module.

/// Bounds-checked byte buffer used by the wire codec.
pub mod buffer;
/// Ed25519 keystore and signature verification.
pub mod security;
/// Dual-stack socket address and CIDR containment.
pub mod socket_address;
/// Shared scalar types and node configuration.
pub mod types;
