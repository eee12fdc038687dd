//! Modbus wire transports: TCP, UDP, TLS and serial-RTU servers, all
//! dispatching through the same `responder::respond` function against a
//! shared, mutex-guarded `ModbusSlave` (spec.md §5 — the Modbus memory map
//! is owned exclusively by the server, one writer, single critical
//! section per request).

pub mod framing;
pub mod responder;
pub mod serial;
pub mod tcp;
pub mod tls;
pub mod udp;

pub use responder::respond;
