#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! The pub/sub relay core: channel subscription, message de-duplication,
//! forwarding, and the witness/attestation plug-ins every forwarded message
//! carries.

/// Per-message attestation strategies (Legacy/LPF/Empty).
pub mod attester;
/// The subscription/forward/de-dup engine (component H).
pub mod engine;
/// Wire codec for the pub/sub message frame.
pub mod wire;
/// Per-hop witness strategies (Bloom/Chain/LPF).
pub mod witnesser;
