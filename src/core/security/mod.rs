#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Local key management: an Ed25519 keystore backed by an encrypted file,
//! with rate limiting and an audit log.

/// File-backed Ed25519 keystore.
pub mod keystore;
