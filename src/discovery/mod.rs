#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Component K: the discovery/beacon client, the thin client-side half of
//! peer discovery that feeds the relay a peer set grouped by protocol
//! number.

/// The periodic beacon client and its upward notification trait.
pub mod client;
/// Wire codec for the beacon protocol.
pub mod wire;
