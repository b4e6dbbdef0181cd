//! A minimal, from-scratch client for the old (pre-RecordBatch) Kafka wire
//! format: a binary codec, a session layer multiplexing requests over
//! per-broker TCP connections, a metadata cache, and a producer dispatch
//! path.
//!
//! Consumer group coordination, offset bookkeeping, compression, and
//! SASL/TLS handshakes are out of scope; see [`client`] and [`connection`]
//! for what is in it.

pub mod backoff;
pub mod client;
pub mod connection;
pub mod protocol;
pub mod throttle;
pub mod topic;

pub use client::{Client, ClientBuilder};
