#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Networking support: the signed peer registry allowlist and peer scoring.

pub mod peer_registry;
pub mod peer_score;
