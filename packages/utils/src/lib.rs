//! Small dependency-light helpers shared by `sdplc_protocol` and `sdplc_core`.
//!
//! Kept deliberately tiny: anything with real business logic belongs in one
//! of the protocol/core packages instead.

pub mod backoff;
pub mod hex;

pub use backoff::retry_backoff;
pub use hex::hex_dump;
