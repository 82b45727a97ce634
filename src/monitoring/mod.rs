#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Observability: Prometheus metrics and the HTTP endpoints that serve them.

/// Prometheus counters/gauges for the stream transport, pub/sub engine, and
/// discovery client.
pub mod metrics;
/// `/metrics` and `/healthz` HTTP endpoints over `axum`.
pub mod http;
