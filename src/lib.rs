//! sdplc — a simulated programmable logic controller exposing one unified
//! node registry over Modbus (TCP/UDP/TLS/RTU) and OPC UA simultaneously,
//! and optionally consuming an upstream device over either protocol.
//!
//! This crate is the binary's home: CLI parsing, YAML configuration,
//! logging bootstrap and the optional HTTP control surface. The node
//! model and sync engine (C4-C6) live in `sdplc_core`; the wire
//! transports and codecs (C1-C3) live in `sdplc_protocol`.

pub mod args;
#[doc(hidden)]
pub mod boot;
pub mod config;
pub mod http;

pub use config::Config;
