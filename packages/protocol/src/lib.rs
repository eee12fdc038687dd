//! Protocol-facing leaf crate for the simulated PLC.
//!
//! Owns everything spec.md calls C1–C3: the scalar/register codec, the
//! per-slave Modbus memory map, the OPC UA address space adapter, and the
//! wire transports (Modbus/TCP, UDP, TLS, serial-RTU, plus the upstream
//! Modbus/OPC UA clients used when `client_role` is configured).
//!
//! Nothing in this crate knows about nodes, ticks, or reconciliation — that
//! is `sdplc_core`'s job. This crate only knows how to move bytes and
//! scalars around.

pub mod client;
pub mod codec;
pub mod error;
pub mod memory_map;
pub mod opcua_adapter;
pub mod transport;

pub use client::{ModbusClient as UpstreamModbusClient, OpcUaClient as UpstreamOpcUaClient};
pub use codec::{ByteOrder, NumericValue, RegisterCodec, ScalarKind, WordOrder};
pub use error::ProtocolError;
pub use memory_map::{ModbusSlave, RegisterKind, SlaveTable};
pub use opcua_adapter::{NumericOrBool, OpcUaAdapter, OpcUaHandle};
