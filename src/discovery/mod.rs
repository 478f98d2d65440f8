//! Gateway-side service discovery.
//!
//! Resolves service names against the registry over HTTP. Every failure
//! mode is reported as an explicit [`Unresolved`] value so callers decide
//! what a missing service means for them.

pub mod client;

pub use client::{internal_http_client, DiscoveryClient, PingStatus, ServicePing, Unresolved};
